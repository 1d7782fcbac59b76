use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{MonitorError, MonitorResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 调度扫描周期（秒）
    pub tick_seconds: f64,
    /// 每次扫描最多入队的检查数
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// Worker标识，留空则根据主机名自动生成
    pub worker_id: String,
    pub poll_seconds: f64,
    pub batch_size: usize,
    /// 全局并发检查数上限
    pub concurrency: usize,
    /// 单个服务的并发检查数上限
    pub per_service_concurrency: usize,
    pub lease_seconds: i64,
    pub max_attempts: i32,
    pub http_timeout_seconds: f64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/statuswatch".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                tick_seconds: 5.0,
                batch_size: 500,
            },
            worker: WorkerConfig {
                enabled: true,
                worker_id: String::new(),
                poll_seconds: 1.0,
                batch_size: 100,
                concurrency: 200,
                per_service_concurrency: 10,
                lease_seconds: 30,
                max_attempts: 3,
                http_timeout_seconds: 5.0,
                user_agent: "statuswatch/0.1.0".to_string(),
            },
            logging: LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/statuswatch.toml",
                "statuswatch.toml",
                "/etc/statuswatch/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        let defaults = AppConfig::default();
        builder = builder
            .set_default("database.url", defaults.database.url.clone())?
            .set_default(
                "database.max_connections",
                defaults.database.max_connections as i64,
            )?
            .set_default(
                "database.min_connections",
                defaults.database.min_connections as i64,
            )?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds as i64,
            )?
            .set_default(
                "database.idle_timeout_seconds",
                defaults.database.idle_timeout_seconds as i64,
            )?
            .set_default("scheduler.enabled", defaults.scheduler.enabled)?
            .set_default("scheduler.tick_seconds", defaults.scheduler.tick_seconds)?
            .set_default("scheduler.batch_size", defaults.scheduler.batch_size as i64)?
            .set_default("worker.enabled", defaults.worker.enabled)?
            .set_default("worker.worker_id", defaults.worker.worker_id.clone())?
            .set_default("worker.poll_seconds", defaults.worker.poll_seconds)?
            .set_default("worker.batch_size", defaults.worker.batch_size as i64)?
            .set_default("worker.concurrency", defaults.worker.concurrency as i64)?
            .set_default(
                "worker.per_service_concurrency",
                defaults.worker.per_service_concurrency as i64,
            )?
            .set_default("worker.lease_seconds", defaults.worker.lease_seconds)?
            .set_default("worker.max_attempts", defaults.worker.max_attempts as i64)?
            .set_default(
                "worker.http_timeout_seconds",
                defaults.worker.http_timeout_seconds,
            )?
            .set_default("worker.user_agent", defaults.worker.user_agent.clone())?
            .set_default("logging.level", defaults.logging.level.clone())?
            .set_default("logging.format", defaults.logging.format.clone())?;

        // 环境变量覆盖，例如 STATUSWATCH_DATABASE__URL
        builder = builder.add_source(
            Environment::with_prefix("STATUSWATCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("构建配置失败")?;
        let app_config: AppConfig = config.try_deserialize().context("解析配置失败")?;

        Ok(app_config)
    }

    /// 配置错误在启动期为致命错误，不在运行期恢复
    pub fn validate(&self) -> MonitorResult<()> {
        if self.database.url.is_empty() {
            return Err(MonitorError::config_error("database.url 不能为空"));
        }
        if self.database.max_connections == 0 {
            return Err(MonitorError::config_error(
                "database.max_connections 必须大于0",
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(MonitorError::config_error(
                "database.min_connections 不能大于 max_connections",
            ));
        }
        if self.scheduler.tick_seconds <= 0.0 {
            return Err(MonitorError::config_error(
                "scheduler.tick_seconds 必须大于0",
            ));
        }
        if self.scheduler.batch_size == 0 {
            return Err(MonitorError::config_error("scheduler.batch_size 必须大于0"));
        }
        if self.worker.poll_seconds <= 0.0 {
            return Err(MonitorError::config_error("worker.poll_seconds 必须大于0"));
        }
        if self.worker.batch_size == 0 {
            return Err(MonitorError::config_error("worker.batch_size 必须大于0"));
        }
        if self.worker.concurrency == 0 {
            return Err(MonitorError::config_error("worker.concurrency 必须大于0"));
        }
        if self.worker.per_service_concurrency == 0 {
            return Err(MonitorError::config_error(
                "worker.per_service_concurrency 必须大于0",
            ));
        }
        if self.worker.per_service_concurrency > self.worker.concurrency {
            return Err(MonitorError::config_error(
                "worker.per_service_concurrency 不能大于 worker.concurrency",
            ));
        }
        if self.worker.lease_seconds <= 0 {
            return Err(MonitorError::config_error("worker.lease_seconds 必须大于0"));
        }
        if self.worker.max_attempts < 1 {
            return Err(MonitorError::config_error("worker.max_attempts 必须至少为1"));
        }
        if self.worker.http_timeout_seconds <= 0.0 {
            return Err(MonitorError::config_error(
                "worker.http_timeout_seconds 必须大于0",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(MonitorError::config_error(format!(
                "无效的日志级别: {}，可选值: {:?}",
                self.logging.level, valid_levels
            )));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(MonitorError::config_error(format!(
                "无效的日志格式: {}，可选值: {:?}",
                self.logging.format, valid_formats
            )));
        }

        Ok(())
    }
}
