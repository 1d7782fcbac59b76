//! 检查执行能力抽象
//!
//! 核心只依赖这一契约，不关心探测协议（HTTP、TCP 等）的具体实现。

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{CheckResult, ServiceCheck};

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("检查执行超时")]
    Timeout,
    #[error("网络错误: {0}")]
    Transport(String),
    #[error("检查器内部错误: {0}")]
    Internal(String),
}

/// 检查执行器
///
/// 实现方负责执行一次探测并产出 `CheckResult`；无法产出结果时返回
/// `CheckerError`，由调用方按失败路径处理（重试或死信）。
#[async_trait]
pub trait Checker: Send + Sync {
    async fn execute(&self, check: &ServiceCheck) -> Result<CheckResult, CheckerError>;
}
