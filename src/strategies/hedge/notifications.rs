//! 对冲策略通知封装
//! 通知失败只记录日志，绝不影响交易流程

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::types::PositionSide;
use crate::utils::webhook::{DingTalkNotifier, MessageLevel};

use super::config::NotificationConfig;
use super::pair::ClosedLeg;

/// 通知通道抽象（测试中可替换）
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, strategy: &str, title: &str, body: &str, level: MessageLevel);
}

/// 钉钉通道
struct DingTalkChannel {
    inner: DingTalkNotifier,
}

#[async_trait]
impl NotificationChannel for DingTalkChannel {
    async fn send(&self, strategy: &str, title: &str, body: &str, level: MessageLevel) {
        if let Err(e) = self.inner.send_event(strategy, title, body, level).await {
            log::warn!("钉钉通知发送失败: {}", e);
        }
    }
}

/// 对冲策略通知器
#[derive(Clone)]
pub struct HedgeNotifier {
    strategy: String,
    inner: Option<Arc<dyn NotificationChannel>>,
}

impl HedgeNotifier {
    pub fn new(strategy: &str, config: &NotificationConfig) -> Self {
        let inner = config.dingtalk.as_ref().map(|cfg| {
            Arc::new(DingTalkChannel {
                inner: DingTalkNotifier::new(cfg.clone()),
            }) as Arc<dyn NotificationChannel>
        });

        Self {
            strategy: strategy.to_string(),
            inner,
        }
    }

    /// 构造关闭通知的实例（测试用）
    pub fn disabled() -> Self {
        Self {
            strategy: "hedge".to_string(),
            inner: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    async fn send(&self, title: &str, body: &str, level: MessageLevel) {
        if let Some(channel) = &self.inner {
            channel.send(&self.strategy, title, body, level).await;
        }
    }

    /// 一腿止损通知
    pub async fn notify_leg_stopped(&self, symbol: &str, stopped: &ClosedLeg, survivor: PositionSide) {
        let body = format!(
            "**交易对**: {}\n\n{}已止损平仓，收益 {:.2} USDT ({:.2}%)\n\n{}进入移动止盈监控",
            symbol,
            stopped.side.cn(),
            stopped.pnl_usdt,
            stopped.pnl_pct,
            survivor.cn()
        );
        self.send("对冲腿止损", &body, MessageLevel::Warning).await;
    }

    /// 一对对冲完成通知
    pub async fn notify_pair_completed(
        &self,
        symbol: &str,
        long: &ClosedLeg,
        short: &ClosedLeg,
        pair_total_usdt: f64,
        ledger_total_usdt: f64,
    ) {
        let pair_symbol = if pair_total_usdt >= 0.0 { "📈" } else { "📉" };
        let body = format!(
            r#"**交易对**: {}

---

## 📊 多单信息
- **开仓价格**: ${:.6}
- **平仓价格**: ${:.6}
- **数量**: {}
- **收益**: {:.2} USDT ({:.2}%)

## 📊 空单信息
- **开仓价格**: ${:.6}
- **平仓价格**: ${:.6}
- **数量**: {}
- **收益**: {:.2} USDT ({:.2}%)

---

**本次对冲总收益**: {} {:.2} USDT

**累计总收益**: {:.2} USDT"#,
            symbol,
            long.entry_price,
            long.close_price,
            long.quantity,
            long.pnl_usdt,
            long.pnl_pct,
            short.entry_price,
            short.close_price,
            short.quantity,
            short.pnl_usdt,
            short.pnl_pct,
            pair_symbol,
            pair_total_usdt,
            ledger_total_usdt,
        );
        self.send("一对对冲完成", &body, MessageLevel::Info).await;
    }

    /// 账户级停机通知
    pub async fn notify_global_stop(&self, reason: &str, ledger_total_usdt: f64) {
        let body = format!(
            "**原因**: {}\n\n**累计总收益**: {:.2} USDT\n\n机器人已停止开新仓并退出监控",
            reason, ledger_total_usdt
        );
        self.send("账户级停机", &body, MessageLevel::Critical).await;
    }

    /// 影响资金的错误告警
    pub async fn notify_error(&self, context: &str, error: &str) {
        let body = format!("**场景**: {}\n\n```\n{}\n```", context, error);
        self.send("策略告警", &body, MessageLevel::Error).await;
    }
}
