//! Webhook通知模块
//! 用于发送交易事件和告警通知到钉钉

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 钉钉Webhook配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DingTalkConfig {
    /// 钉钉webhook地址
    pub webhook_url: String,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最小推送级别
    #[serde(default = "default_min_level")]
    pub min_level: String,
    /// 同一类消息的推送间隔限制（秒）
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_min_level() -> String {
    "info".to_string()
}

fn default_rate_limit() -> u64 {
    60
}

/// 消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl MessageLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            "critical" => Self::Critical,
            _ => Self::Info,
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Self::Debug => "🔍",
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }
}

/// 钉钉消息格式
#[derive(Debug, Serialize)]
struct DingTalkMessage {
    msgtype: String,
    markdown: MarkdownContent,
}

#[derive(Debug, Serialize)]
struct MarkdownContent {
    title: String,
    text: String,
}

/// 钉钉返回体
#[derive(Debug, Deserialize)]
struct DingTalkResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// 钉钉Webhook通知器
pub struct DingTalkNotifier {
    config: DingTalkConfig,
    client: Client,
    /// 上次发送时间记录（用于限流）
    last_send_times: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl DingTalkNotifier {
    /// 创建新的通知器
    pub fn new(config: DingTalkConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            last_send_times: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 发送事件通知（markdown正文）
    pub async fn send_event(
        &self,
        strategy: &str,
        title: &str,
        body: &str,
        level: MessageLevel,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.enabled || self.config.webhook_url.is_empty() {
            return Ok(());
        }

        let min_level = MessageLevel::from_str(&self.config.min_level);
        if level < min_level {
            return Ok(());
        }

        let key = format!("{}::{}", strategy, title);
        if !self.check_rate_limit(&key).await {
            debug!("跳过推送，限流中: {}", key);
            return Ok(());
        }

        let content = self.build_event_message(strategy, title, body, level);
        self.send_to_dingtalk(title, content).await
    }

    /// 检查限流
    async fn check_rate_limit(&self, key: &str) -> bool {
        let mut times = self.last_send_times.write().await;
        let now = Utc::now();

        if let Some(last_time) = times.get(key) {
            let elapsed = now.signed_duration_since(*last_time);
            if elapsed < Duration::seconds(self.config.rate_limit_seconds as i64) {
                return false;
            }
        }

        times.insert(key.to_string(), now);
        true
    }

    fn build_event_message(
        &self,
        strategy: &str,
        title: &str,
        body: &str,
        level: MessageLevel,
    ) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

        format!(
            r#"## {} {}

**策略**: {}
**级别**: {:?}
**时间**: {}

{}

---
*自动交易机器人 - 对冲策略*"#,
            level.emoji(),
            title,
            strategy,
            level,
            now,
            body
        )
    }

    /// 发送到钉钉
    async fn send_to_dingtalk(
        &self,
        title: &str,
        content: String,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let message = DingTalkMessage {
            msgtype: "markdown".to_string(),
            markdown: MarkdownContent {
                title: title.to_string(),
                text: content,
            },
        };

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("钉钉通知发送失败: HTTP {}", response.status());
            return Ok(());
        }

        // 钉钉在HTTP 200里通过errcode表达失败
        match response.json::<DingTalkResponse>().await {
            Ok(result) if result.errcode == 0 => {
                info!("钉钉通知发送成功");
            }
            Ok(result) => {
                warn!("钉钉通知发送失败: {} - {}", result.errcode, result.errmsg);
            }
            Err(e) => {
                warn!("钉钉返回体解析失败: {}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_level_ordering() {
        assert!(MessageLevel::Debug < MessageLevel::Info);
        assert!(MessageLevel::Error < MessageLevel::Critical);
        assert_eq!(MessageLevel::from_str("WARN"), MessageLevel::Warning);
        assert_eq!(MessageLevel::from_str("unknown"), MessageLevel::Info);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_second_send() {
        let notifier = DingTalkNotifier::new(DingTalkConfig {
            webhook_url: "https://example.invalid/webhook".to_string(),
            enabled: true,
            min_level: "info".to_string(),
            rate_limit_seconds: 600,
        });

        assert!(notifier.check_rate_limit("hedge::止损").await);
        assert!(!notifier.check_rate_limit("hedge::止损").await);
        // 不同key互不影响
        assert!(notifier.check_rate_limit("hedge::完成").await);
    }
}
