pub mod http_checker;
pub mod service;
pub mod status;

pub use http_checker::HttpChecker;
pub use service::{CheckWorker, CheckWorkerBuilder};
pub use status::StatusService;
