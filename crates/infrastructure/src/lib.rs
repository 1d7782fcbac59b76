pub mod database;
pub mod memory;
pub mod metrics;

pub use database::manager::create_pool;
pub use database::postgres::{
    PostgresIncidentRepository, PostgresResultRepository, PostgresServiceRepository,
    PostgresSnapshotRepository, PostgresTaskQueue,
};
pub use memory::{
    MemoryIncidentRepository, MemoryResultRepository, MemoryServiceRepository,
    MemorySnapshotRepository, MemoryTaskQueue,
};
pub use metrics::MetricsCollector;
