//! 对冲策略配置模块

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::ExchangeError;
use crate::utils::logger::LogConfig;
use crate::utils::webhook::DingTalkConfig;

use super::tiers::TrailingTierTable;

/// 对冲策略主配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HedgeConfig {
    /// 策略名称
    #[serde(default = "default_name")]
    pub name: String,

    /// 是否使用币安测试网
    #[serde(default)]
    pub testnet: bool,

    /// 止损与移动止盈配置
    pub stop_loss: StopLossConfig,

    /// 监控循环配置
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// 账户级停机阈值
    pub account: AccountConfig,

    /// 开仓配置
    #[serde(default)]
    pub entry: EntryConfig,

    /// 通知配置
    #[serde(default)]
    pub notification: NotificationConfig,

    /// 状态落盘配置
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_name() -> String {
    "hedge".to_string()
}

/// 止损与移动止盈配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StopLossConfig {
    /// 单腿止损百分比（正数，如1.0表示-1%触发）
    pub stop_loss_pct: f64,

    /// 移动止盈档位表
    #[serde(default)]
    pub tiers: TrailingTierTable,
}

/// 监控循环配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// 监控间隔（秒）
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// 开仓后最小监控延迟（秒），避免刚开仓即触发平仓
    #[serde(default = "default_min_delay")]
    pub min_monitor_delay_secs: u64,

    /// 触发账户级停机时是否强制平掉所有剩余持仓
    #[serde(default)]
    pub force_close_on_stop: bool,
}

fn default_interval() -> u64 {
    60
}

fn default_min_delay() -> u64 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            min_monitor_delay_secs: default_min_delay(),
            force_close_on_stop: false,
        }
    }
}

/// 账户级停机阈值
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    /// 累计已实现盈亏的最大亏损阈值（必填，负数），累计 <= 此值即停机
    pub max_total_profit_loss_usdt: f64,

    /// 累计已实现盈亏的目标盈利阈值（可选，正数），累计 >= 此值即停机
    #[serde(default)]
    pub min_total_profit_usdt: Option<f64>,
}

/// 开仓配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntryConfig {
    /// 是否由本程序负责开仓
    #[serde(default = "default_entry_enabled")]
    pub enabled: bool,

    /// 杠杆倍数
    #[serde(default = "default_leverage")]
    pub leverage: u32,

    /// 交易对及其双腿名义金额（USDT），键为OKX风格的instId
    #[serde(default)]
    pub pairs: BTreeMap<String, PairSizing>,
}

fn default_entry_enabled() -> bool {
    true
}

fn default_leverage() -> u32 {
    10
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            enabled: default_entry_enabled(),
            leverage: default_leverage(),
            pairs: BTreeMap::new(),
        }
    }
}

/// 单个交易对的开仓名义金额
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairSizing {
    #[serde(default = "default_amount")]
    pub long_amount_usdt: f64,
    #[serde(default = "default_amount")]
    pub short_amount_usdt: f64,
}

fn default_amount() -> f64 {
    20.0
}

/// 通知配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub dingtalk: Option<DingTalkConfig>,
}

/// 状态落盘配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// 状态文件路径，未配置时不落盘
    #[serde(default)]
    pub state_file: Option<String>,
}

impl HedgeConfig {
    /// 从YAML文件加载并校验
    pub fn from_file(path: &str) -> Result<Self, ExchangeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| ExchangeError::ConfigError(format!("解析配置失败: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// 校验配置有效性（启动期失败即退出）
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.stop_loss.stop_loss_pct <= 0.0 {
            return Err(ExchangeError::ConfigError(format!(
                "止损百分比必须为正数: {}",
                self.stop_loss.stop_loss_pct
            )));
        }

        // 档位表重新走一遍构造校验（阈值递增、回撤合法）
        TrailingTierTable::new(
            (0..self.stop_loss.tiers.len())
                .filter_map(|i| self.stop_loss.tiers.get(i).copied())
                .collect(),
        )?;

        if self.account.max_total_profit_loss_usdt >= 0.0 {
            return Err(ExchangeError::ConfigError(format!(
                "累计亏损阈值必须为负数: {}",
                self.account.max_total_profit_loss_usdt
            )));
        }

        if let Some(min_profit) = self.account.min_total_profit_usdt {
            if min_profit <= 0.0 {
                return Err(ExchangeError::ConfigError(format!(
                    "累计盈利目标必须为正数: {}",
                    min_profit
                )));
            }
        }

        if self.monitor.interval_secs == 0 {
            return Err(ExchangeError::ConfigError(
                "监控间隔必须大于0秒".to_string(),
            ));
        }

        if self.entry.enabled {
            if self.entry.pairs.is_empty() {
                return Err(ExchangeError::ConfigError(
                    "开仓已启用但未配置任何交易对".to_string(),
                ));
            }
            if self.entry.leverage == 0 {
                return Err(ExchangeError::ConfigError("杠杆倍数必须大于0".to_string()));
            }
            for (inst_id, sizing) in &self.entry.pairs {
                if sizing.long_amount_usdt <= 0.0 || sizing.short_amount_usdt <= 0.0 {
                    return Err(ExchangeError::ConfigError(format!(
                        "{} 的开仓金额必须为正数",
                        inst_id
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Default for HedgeConfig {
    fn default() -> Self {
        let mut pairs = BTreeMap::new();
        pairs.insert(
            "BTC-USDT-SWAP".to_string(),
            PairSizing {
                long_amount_usdt: 20.0,
                short_amount_usdt: 20.0,
            },
        );

        Self {
            name: default_name(),
            testnet: false,
            stop_loss: StopLossConfig {
                stop_loss_pct: 1.0,
                tiers: TrailingTierTable::default(),
            },
            monitor: MonitorConfig::default(),
            account: AccountConfig {
                max_total_profit_loss_usdt: -10.0,
                min_total_profit_usdt: None,
            },
            entry: EntryConfig {
                enabled: true,
                leverage: default_leverage(),
                pairs,
            },
            notification: NotificationConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LogConfig::default(),
        }
    }
}
