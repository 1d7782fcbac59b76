use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use statuswatch_core::{MonitorError, MonitorResult};
use statuswatch_domain::checker::{Checker, CheckerError};
use statuswatch_domain::entities::{CheckResult, ServiceCheck, ServiceStatus};

/// HTTP 探测检查器
///
/// 对检查的 endpoint 发起 GET，按状态码分类：
/// 5xx 为 down，4xx 为 degraded，其余为 up；延迟与状态码一并记录。
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(default_timeout: Duration, user_agent: &str) -> MonitorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(default_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| MonitorError::Internal(format!("构建HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }

    fn status_from_http(status_code: u16) -> ServiceStatus {
        if status_code >= 500 {
            return ServiceStatus::Down;
        }
        if status_code >= 400 {
            return ServiceStatus::Degraded;
        }
        ServiceStatus::Up
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn execute(&self, check: &ServiceCheck) -> Result<CheckResult, CheckerError> {
        let started = std::time::Instant::now();

        let response = self
            .client
            .get(&check.endpoint)
            .timeout(Duration::from_secs_f64(check.timeout_seconds))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CheckerError::Timeout
                } else {
                    CheckerError::Transport(e.to_string())
                }
            })?;

        let latency_ms = started.elapsed().as_millis() as i64;
        let status_code = response.status().as_u16();
        let status = Self::status_from_http(status_code);

        debug!(
            "探测 {} -> {} ({}ms, HTTP {})",
            check.endpoint, status, latency_ms, status_code
        );

        Ok(CheckResult {
            check_key: check.check_key.clone(),
            status,
            observed_at: Utc::now(),
            latency_ms: Some(latency_ms),
            http_status: Some(status_code as i32),
            error_code: None,
            error_message: None,
            metadata: serde_json::Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(HttpChecker::status_from_http(200), ServiceStatus::Up);
        assert_eq!(HttpChecker::status_from_http(204), ServiceStatus::Up);
        assert_eq!(HttpChecker::status_from_http(301), ServiceStatus::Up);
        assert_eq!(HttpChecker::status_from_http(404), ServiceStatus::Degraded);
        assert_eq!(HttpChecker::status_from_http(429), ServiceStatus::Degraded);
        assert_eq!(HttpChecker::status_from_http(500), ServiceStatus::Down);
        assert_eq!(HttpChecker::status_from_http(503), ServiceStatus::Down);
    }
}
