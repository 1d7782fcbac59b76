pub mod service;

pub use service::CheckScheduler;
