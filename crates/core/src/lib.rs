pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppConfig, DatabaseConfig, LogConfig, SchedulerConfig, WorkerConfig};
pub use errors::{MonitorError, MonitorResult};
