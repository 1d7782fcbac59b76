use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use statuswatch_core::{logging, AppConfig};
use tokio::signal;
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::ShutdownManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Scheduler,
    Worker,
    All,
}

/// 服务健康监控与根因归因系统
#[derive(Debug, Parser)]
#[command(name = "statuswatch", version)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value = "all")]
    mode: Mode,

    /// Worker标识，留空则按主机名自动生成
    #[arg(long, value_name = "ID")]
    worker_id: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short = 'l', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 配置错误在启动期即失败，不带病运行
    let mut config = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;
    if let Some(id) = &cli.worker_id {
        config.worker.worker_id = id.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate().context("配置校验失败")?;

    logging::init_logging(&config.logging.level, &config.logging.format)?;

    info!("启动服务健康监控系统");
    if let Some(path) = &cli.config {
        info!("配置文件: {path}");
    }
    info!("运行模式: {:?}", cli.mode);

    let app_mode = resolve_app_mode(cli.mode, &config)?;
    let app = Arc::new(Application::new(config, app_mode).await?);

    let shutdown_manager = ShutdownManager::new();
    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    match tokio::time::timeout(Duration::from_secs(60), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("服务健康监控系统已退出");
    Ok(())
}

fn resolve_app_mode(mode: Mode, config: &AppConfig) -> Result<AppMode> {
    match mode {
        Mode::Scheduler => {
            if !config.scheduler.enabled {
                return Err(anyhow::anyhow!("调度器模式被禁用，请检查配置"));
            }
            Ok(AppMode::Scheduler)
        }
        Mode::Worker => {
            if !config.worker.enabled {
                return Err(anyhow::anyhow!("Worker模式被禁用，请检查配置"));
            }
            Ok(AppMode::Worker)
        }
        Mode::All => Ok(AppMode::All),
    }
}

/// 等待 Ctrl+C 或 SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
