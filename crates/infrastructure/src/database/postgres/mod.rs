pub mod postgres_result_repository;
pub mod postgres_service_repository;
pub mod postgres_status_repository;
pub mod postgres_task_queue;

pub use postgres_result_repository::PostgresResultRepository;
pub use postgres_service_repository::PostgresServiceRepository;
pub use postgres_status_repository::{PostgresIncidentRepository, PostgresSnapshotRepository};
pub use postgres_task_queue::PostgresTaskQueue;
