use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("服务未找到: {id}")]
    ServiceNotFound { id: i64 },
    #[error("检查项未找到: {id}")]
    CheckNotFound { id: i64 },
    #[error("检查任务未找到: {id}")]
    TaskNotFound { id: i64 },
    #[error("检查执行错误: {0}")]
    CheckExecution(String),
    #[error("检查执行超时")]
    CheckTimeout,
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

impl MonitorError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn service_not_found(id: i64) -> Self {
        Self::ServiceNotFound { id }
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MonitorError::Internal(_) | MonitorError::Configuration(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MonitorError::DatabaseOperation(_)
                | MonitorError::Network(_)
                | MonitorError::CheckTimeout
                | MonitorError::CheckExecution(_)
        )
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for MonitorError {
    fn from(err: anyhow::Error) -> Self {
        MonitorError::Internal(err.to_string())
    }
}
