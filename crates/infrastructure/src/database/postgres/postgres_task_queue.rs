use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};

use statuswatch_core::MonitorResult;
use statuswatch_domain::backoff::retry_delay;
use statuswatch_domain::entities::{CheckTask, NewCheckTask, TaskStatus};
use statuswatch_domain::repositories::{
    CompleteOutcome, EnqueueOutcome, FailOutcome, TaskQueue,
};

/// Postgres 检查任务队列
///
/// 领取用 FOR UPDATE SKIP LOCKED，入队用幂等键上的条件插入，
/// 完成/失败/释放都是以租约归属为条件的单条 UPDATE。
pub struct PostgresTaskQueue {
    pool: PgPool,
}

impl PostgresTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> MonitorResult<CheckTask> {
        Ok(CheckTask {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            check_id: row.try_get("check_id")?,
            check_key: row.try_get("check_key")?,
            scheduled_for: row.try_get("scheduled_for")?,
            status: row.try_get("status")?,
            lease_owner: row.try_get("lease_owner")?,
            lease_expires_at: row.try_get("lease_expires_at")?,
            attempt_count: row.try_get("attempt_count")?,
            max_attempts: row.try_get("max_attempts")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

const TASK_COLUMNS: &str = "id, service_id, check_id, check_key, scheduled_for, status, \
     lease_owner, lease_expires_at, attempt_count, max_attempts, created_at";

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    #[instrument(skip(self, task), fields(check_id = %task.check_id, scheduled_for = %task.scheduled_for))]
    async fn enqueue(&self, task: NewCheckTask) -> MonitorResult<EnqueueOutcome> {
        let idempotency_key = CheckTask::idempotency_key(task.check_id, task.scheduled_for);

        let row = sqlx::query(
            r#"
            INSERT INTO check_tasks
                (service_id, check_id, check_key, scheduled_for, status, attempt_count, max_attempts, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(task.service_id)
        .bind(task.check_id)
        .bind(&task.check_key)
        .bind(task.scheduled_for)
        .bind(TaskStatus::Pending)
        .bind(task.max_attempts)
        .bind(&idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id: i64 = row.try_get("id")?;
                debug!("检查任务已入队: ID {}", id);
                Ok(EnqueueOutcome::Enqueued(id))
            }
            None => {
                debug!("应检时刻已有任务，幂等跳过: {}", idempotency_key);
                Ok(EnqueueOutcome::AlreadyExists)
            }
        }
    }

    #[instrument(skip(self), fields(worker_id = %worker_id, max_count = %max_count))]
    async fn lease_batch(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        max_count: usize,
        lease_duration: Duration,
    ) -> MonitorResult<Vec<CheckTask>> {
        let lease_expires_at = now + lease_duration;

        let rows = sqlx::query(&format!(
            r#"
            WITH claimable AS (
                SELECT id FROM check_tasks
                WHERE scheduled_for <= $3
                  AND (status = 'pending'
                       OR (status = 'leased' AND lease_expires_at IS NOT NULL AND lease_expires_at < $3))
                ORDER BY scheduled_for ASC, id ASC
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            UPDATE check_tasks t
            SET status = 'leased', lease_owner = $1, lease_expires_at = $2
            FROM claimable
            WHERE t.id = claimable.id
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(worker_id)
        .bind(lease_expires_at)
        .bind(now)
        .bind(max_count as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks: Vec<CheckTask> = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<MonitorResult<_>>()?;
        // RETURNING 不保证顺序，批内按到期先后重排
        tasks.sort_by_key(|t| (t.scheduled_for, t.id));

        if !tasks.is_empty() {
            debug!("领取到 {} 个检查任务", tasks.len());
        }
        Ok(tasks)
    }

    #[instrument(skip(self), fields(task_id = %task_id, worker_id = %worker_id))]
    async fn complete(&self, task_id: i64, worker_id: &str) -> MonitorResult<CompleteOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE check_tasks
            SET status = $3, lease_owner = NULL, lease_expires_at = NULL
            WHERE id = $1 AND status = $4 AND lease_owner = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(TaskStatus::Done)
        .bind(TaskStatus::Leased)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                "完成任务 {} 时租约已不属于 {}，忽略本次结果",
                task_id, worker_id
            );
            return Ok(CompleteOutcome::LostLease);
        }
        Ok(CompleteOutcome::Completed)
    }

    #[instrument(skip(self), fields(task_id = %task_id, worker_id = %worker_id))]
    async fn fail(
        &self,
        task_id: i64,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<FailOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT attempt_count, max_attempts FROM check_tasks
            WHERE id = $1 AND status = $3 AND lease_owner = $2
            FOR UPDATE
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(TaskStatus::Leased)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            warn!(
                "失败上报时任务 {} 的租约已不属于 {}，忽略",
                task_id, worker_id
            );
            return Ok(FailOutcome::LostLease);
        };

        let attempt_count: i32 = row.try_get("attempt_count")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;
        let attempt = attempt_count + 1;

        if attempt >= max_attempts {
            sqlx::query(
                r#"
                UPDATE check_tasks
                SET status = $2, attempt_count = $3, lease_owner = NULL, lease_expires_at = NULL
                WHERE id = $1
                "#,
            )
            .bind(task_id)
            .bind(TaskStatus::Failed)
            .bind(attempt)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            debug!("任务 {} 重试次数耗尽（{} 次），进入死信", task_id, attempt);
            return Ok(FailOutcome::DeadLettered);
        }

        let next_attempt_at = now + retry_delay(attempt);
        sqlx::query(
            r#"
            UPDATE check_tasks
            SET status = $2, attempt_count = $3, scheduled_for = $4,
                lease_owner = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(TaskStatus::Pending)
        .bind(attempt)
        .bind(next_attempt_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            "任务 {} 第 {} 次失败，退避到 {} 重试",
            task_id, attempt, next_attempt_at
        );
        Ok(FailOutcome::Retried { next_attempt_at })
    }

    #[instrument(skip(self), fields(task_id = %task_id, worker_id = %worker_id))]
    async fn release(&self, task_id: i64, worker_id: &str) -> MonitorResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE check_tasks
            SET status = $3, lease_owner = NULL, lease_expires_at = NULL
            WHERE id = $1 AND status = $4 AND lease_owner = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(TaskStatus::Pending)
        .bind(TaskStatus::Leased)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("释放任务 {} 时租约已转移，忽略", task_id);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> MonitorResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE check_tasks
            SET status = $2, lease_owner = NULL, lease_expires_at = NULL
            WHERE status = $3 AND lease_expires_at IS NOT NULL AND lease_expires_at < $1
            "#,
        )
        .bind(now)
        .bind(TaskStatus::Pending)
        .bind(TaskStatus::Leased)
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            debug!("收回 {} 个过期租约", reclaimed);
        }
        Ok(reclaimed)
    }
}
