use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use statuswatch_core::MonitorResult;
use statuswatch_domain::entities::CheckResult;
use statuswatch_domain::repositories::CheckResultRepository;

/// 检查结果仓储（只追加）
pub struct PostgresResultRepository {
    pool: PgPool,
}

impl PostgresResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_result(row: &sqlx::postgres::PgRow) -> MonitorResult<CheckResult> {
        Ok(CheckResult {
            check_key: row.try_get("check_key")?,
            status: row.try_get("status")?,
            observed_at: row.try_get("observed_at")?,
            latency_ms: row.try_get("latency_ms")?,
            http_status: row.try_get("http_status")?,
            error_code: row.try_get("error_code")?,
            error_message: row.try_get("error_message")?,
            metadata: row
                .try_get::<Option<serde_json::Value>, _>("metadata")?
                .unwrap_or(serde_json::Value::Null),
        })
    }
}

#[async_trait]
impl CheckResultRepository for PostgresResultRepository {
    #[instrument(skip(self, result), fields(
        task_id = %task_id,
        service_id = %service_id,
        check_key = %result.check_key,
        status = %result.status,
    ))]
    async fn record(
        &self,
        task_id: i64,
        service_id: i64,
        check_id: i64,
        result: &CheckResult,
    ) -> MonitorResult<()> {
        let metadata = match &result.metadata {
            serde_json::Value::Null => None,
            other => Some(other.clone()),
        };

        sqlx::query(
            r#"
            INSERT INTO check_runs
                (task_id, service_id, check_id, check_key, status, observed_at,
                 latency_ms, http_status, error_code, error_message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(task_id)
        .bind(service_id)
        .bind(check_id)
        .bind(&result.check_key)
        .bind(result.status)
        .bind(result.observed_at)
        .bind(result.latency_ms)
        .bind(result.http_status)
        .bind(&result.error_code)
        .bind(&result.error_message)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        debug!("检查结果已写入: task {} -> {}", task_id, result.status);
        Ok(())
    }

    #[instrument(skip(self), fields(service_id = %service_id))]
    async fn latest_by_service(&self, service_id: i64) -> MonitorResult<Vec<CheckResult>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (check_id)
                   check_key, status, observed_at, latency_ms, http_status,
                   error_code, error_message, metadata
            FROM check_runs
            WHERE service_id = $1
            ORDER BY check_id, observed_at DESC, id DESC
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_result).collect()
    }
}
