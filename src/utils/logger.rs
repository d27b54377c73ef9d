//! 日志初始化模块
//! 控制台 + 按大小滚动的文件输出

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::{Deserialize, Serialize};

use crate::core::error::ExchangeError;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志目录
    #[serde(default = "default_dir")]
    pub dir: String,
    /// 日志级别
    #[serde(default = "default_level")]
    pub level: String,
    /// 单个日志文件大小上限（MB）
    #[serde(default = "default_max_size")]
    pub max_file_size_mb: u64,
    /// 是否输出到控制台
    #[serde(default = "default_console")]
    pub console_output: bool,
}

fn default_dir() -> String {
    "logs".to_string()
}

fn default_level() -> String {
    "INFO".to_string()
}

fn default_max_size() -> u64 {
    10
}

fn default_console() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            level: default_level(),
            max_file_size_mb: default_max_size(),
            console_output: default_console(),
        }
    }
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "WARN" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// 初始化全局日志
pub fn init_logger(cfg: &LogConfig) -> Result<(), ExchangeError> {
    let pattern = "[{d(%Y-%m-%d %H:%M:%S%.3f)}] [{l}] [{M}] {m}{n}";

    let roller = FixedWindowRoller::builder()
        .build(&format!("{}/rusthedge.{{}}.log", cfg.dir), 5)
        .map_err(|e| ExchangeError::ConfigError(format!("日志滚动配置失败: {}", e)))?;
    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(cfg.max_file_size_mb * 1024 * 1024)),
        Box::new(roller),
    );

    let file_appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(format!("{}/rusthedge.log", cfg.dir), Box::new(policy))
        .map_err(|e| ExchangeError::ConfigError(format!("创建日志文件失败: {}", e)))?;

    let mut builder =
        Config::builder().appender(Appender::builder().build("file", Box::new(file_appender)));
    let mut root = Root::builder().appender("file");

    if cfg.console_output {
        let console = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(pattern)))
            .build();
        builder = builder.appender(Appender::builder().build("console", Box::new(console)));
        root = root.appender("console");
    }

    let config = builder
        .build(root.build(parse_level(&cfg.level)))
        .map_err(|e| ExchangeError::ConfigError(format!("日志配置错误: {}", e)))?;

    log4rs::init_config(config)
        .map_err(|e| ExchangeError::ConfigError(format!("日志初始化失败: {}", e)))?;

    Ok(())
}
