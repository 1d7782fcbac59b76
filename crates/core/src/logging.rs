use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 输出
///
/// RUST_LOG 环境变量优先于配置中的级别；格式支持 pretty 与 json。
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        "pretty" => builder.pretty().try_init(),
        "json" => builder.json().try_init(),
        other => bail!("不支持的日志格式: {other}"),
    }
    .map_err(|e| anyhow::anyhow!(e))
    .context("安装全局日志订阅器失败")
}
