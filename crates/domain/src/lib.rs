pub mod attribution;
pub mod backoff;
pub mod checker;
pub mod entities;
pub mod repositories;
pub mod scoring;
pub mod snapshot;
pub mod sqlx_impls;

pub use attribution::attribute_dependency;
pub use checker::{Checker, CheckerError};
pub use entities::*;
pub use repositories::*;
pub use scoring::{check_result_score, status_from_score, weighted_service_score};
pub use snapshot::compose_score;
pub use statuswatch_core::{MonitorError, MonitorResult};
