//! 重试退避
//!
//! 失败的检查任务按指数间隔推迟下一次应检时间，并加入随机抖动
//! 避免同批失败的任务在同一时刻集中重试。

use chrono::Duration;

const MAX_DELAY_SECONDS: u64 = 60;
const JITTER_MS: f64 = 500.0;

/// 第 attempt 次失败后的重试延迟
///
/// attempt 从 1 开始计；延迟为 2^(attempt-1) 秒，封顶 60 秒，外加 0~500ms 抖动。
pub fn retry_delay(attempt: i32) -> Duration {
    let exponent = attempt.saturating_sub(1).clamp(0, 6) as u32;
    let base_seconds = (1u64 << exponent).min(MAX_DELAY_SECONDS);
    let jitter_ms = (rand::random::<f64>() * JITTER_MS) as i64;

    Duration::milliseconds(base_seconds as i64 * 1000 + jitter_ms)
}
