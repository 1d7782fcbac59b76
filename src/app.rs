use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::info;

use statuswatch_core::AppConfig;
use statuswatch_domain::checker::Checker;
use statuswatch_infrastructure::{
    create_pool, MetricsCollector, PostgresIncidentRepository, PostgresResultRepository,
    PostgresServiceRepository, PostgresSnapshotRepository, PostgresTaskQueue,
};
use statuswatch_scheduler::CheckScheduler;
use statuswatch_worker::{CheckWorker, HttpChecker, StatusService};

/// 应用运行模式
#[derive(Debug, Clone)]
pub enum AppMode {
    /// 仅运行调度器
    Scheduler,
    /// 仅运行Worker
    Worker,
    /// 运行所有组件
    All,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    pool: PgPool,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let pool = create_pool(&config.database)
            .await
            .context("创建数据库连接池失败")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("执行数据库迁移失败")?;

        let metrics = Arc::new(MetricsCollector::new());

        Ok(Self {
            config,
            mode,
            pool,
            metrics,
        })
    }

    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Scheduler => self.run_scheduler(shutdown_rx).await,
            AppMode::Worker => self.run_worker(shutdown_rx).await,
            AppMode::All => self.run_all(shutdown_rx).await,
        }
    }

    fn build_scheduler(&self) -> CheckScheduler {
        CheckScheduler::new(
            Arc::new(PostgresServiceRepository::new(self.pool.clone())),
            Arc::new(PostgresTaskQueue::new(self.pool.clone())),
            Arc::clone(&self.metrics),
            self.config.scheduler.batch_size,
            self.config.worker.max_attempts,
        )
    }

    fn build_worker(&self) -> Result<CheckWorker> {
        let service_repo = Arc::new(PostgresServiceRepository::new(self.pool.clone()));
        let result_repo = Arc::new(PostgresResultRepository::new(self.pool.clone()));
        let status = Arc::new(StatusService::new(
            service_repo.clone(),
            result_repo.clone(),
            Arc::new(PostgresSnapshotRepository::new(self.pool.clone())),
            Arc::new(PostgresIncidentRepository::new(self.pool.clone())),
        ));
        let checker: Arc<dyn Checker> = Arc::new(
            HttpChecker::new(
                Duration::from_secs_f64(self.config.worker.http_timeout_seconds),
                &self.config.worker.user_agent,
            )
            .context("创建HTTP检查器失败")?,
        );

        Ok(CheckWorker::builder(
            Arc::new(PostgresTaskQueue::new(self.pool.clone())),
            service_repo,
            result_repo,
            status,
            checker,
        )
        .worker_id(self.config.worker.worker_id.clone())
        .metrics(Arc::clone(&self.metrics))
        .batch_size(self.config.worker.batch_size)
        .lease_seconds(self.config.worker.lease_seconds)
        .concurrency(self.config.worker.concurrency)
        .per_service_concurrency(self.config.worker.per_service_concurrency)
        .build())
    }

    async fn run_scheduler(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let scheduler = self.build_scheduler();
        let tick = Duration::from_secs_f64(self.config.scheduler.tick_seconds);
        scheduler.run(tick, shutdown_rx).await;
        Ok(())
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let worker = self.build_worker()?;
        let poll = Duration::from_secs_f64(self.config.worker.poll_seconds);
        worker.run(poll, shutdown_rx).await;
        Ok(())
    }

    async fn run_all(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let scheduler = self.build_scheduler();
        let worker = self.build_worker()?;

        let tick = Duration::from_secs_f64(self.config.scheduler.tick_seconds);
        let poll = Duration::from_secs_f64(self.config.worker.poll_seconds);

        let scheduler_rx = shutdown_rx.resubscribe();
        let scheduler_handle = tokio::spawn(async move {
            scheduler.run(tick, scheduler_rx).await;
        });

        let worker_rx = shutdown_rx.resubscribe();
        let worker_handle = tokio::spawn(async move {
            worker.run(poll, worker_rx).await;
        });

        let _ = tokio::join!(scheduler_handle, worker_handle);
        Ok(())
    }
}
