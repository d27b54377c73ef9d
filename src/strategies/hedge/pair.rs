//! 对冲持仓状态机与账户级盈亏台账

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::PositionSide;

use super::trailing::TrailingState;

/// 一条腿的平仓记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedLeg {
    pub side: PositionSide,
    pub entry_price: f64,
    pub close_price: f64,
    pub quantity: f64,
    pub pnl_usdt: f64,
    pub pnl_pct: f64,
    /// true=止盈平仓，false=止损平仓
    pub is_profit: bool,
    pub closed_at: DateTime<Utc>,
}

/// 对冲持仓状态
///
/// TrailingState只存在于OneStopped变体中，止损事件之前无法访问。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairStatus {
    /// 多空双腿均持有
    OpenHedged,
    /// 一腿已止损，幸存腿进入移动止盈
    OneStopped {
        survivor: PositionSide,
        trailing: TrailingState,
        stopped: ClosedLeg,
    },
    /// 双腿均已了结，退出监控
    Closed,
}

/// 单个交易对的对冲持仓
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgePair {
    pub symbol: String,
    pub status: PairStatus,
    /// 首次观察到双腿持仓的时间（开仓保护期基准）
    pub first_seen: DateTime<Utc>,
}

impl HedgePair {
    pub fn new(symbol: String) -> Self {
        Self {
            symbol,
            status: PairStatus::OpenHedged,
            first_seen: Utc::now(),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, PairStatus::Closed)
    }

    /// 幸存腿的移动止盈状态（仅OneStopped时存在）
    pub fn trailing(&self) -> Option<&TrailingState> {
        match &self.status {
            PairStatus::OneStopped { trailing, .. } => Some(trailing),
            _ => None,
        }
    }
}

/// 账户级已实现盈亏台账
///
/// 单写者：只由监控循环在对冲对了结时更新。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountLedger {
    total_usdt: f64,
    closed_pairs: u32,
}

impl AccountLedger {
    /// 记录一对对冲的净已实现盈亏
    pub fn record_pair(&mut self, net_pnl_usdt: f64) {
        self.total_usdt += net_pnl_usdt;
        self.closed_pairs += 1;
    }

    pub fn total(&self) -> f64 {
        self.total_usdt
    }

    pub fn closed_pairs(&self) -> u32 {
        self.closed_pairs
    }

    /// 账户级停机判定（两端均为闭区间）
    ///
    /// max_loss为负数阈值；min_profit未配置时不参与判定。
    pub fn should_halt(&self, max_loss_usdt: f64, min_profit_usdt: Option<f64>) -> bool {
        if self.total_usdt <= max_loss_usdt {
            return true;
        }
        matches!(min_profit_usdt, Some(target) if self.total_usdt >= target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_total_is_sum_of_pair_nets() {
        let mut ledger = AccountLedger::default();
        ledger.record_pair(1.5);
        ledger.record_pair(-4.0);
        ledger.record_pair(0.25);
        assert!((ledger.total() - (1.5 - 4.0 + 0.25)).abs() < 1e-9);
        assert_eq!(ledger.closed_pairs(), 3);
    }

    #[test]
    fn test_halt_on_exact_loss_boundary() {
        let mut ledger = AccountLedger::default();
        ledger.record_pair(-10.0);
        // 边界包含
        assert!(ledger.should_halt(-10.0, None));
        assert!(!ledger.should_halt(-10.01, None));
    }

    #[test]
    fn test_halt_on_profit_target() {
        let mut ledger = AccountLedger::default();
        ledger.record_pair(20.0);
        assert!(ledger.should_halt(-10.0, Some(20.0)));
        assert!(!ledger.should_halt(-10.0, Some(20.5)));
        // 未配置盈利目标时不触发
        assert!(!ledger.should_halt(-10.0, None));
    }

    #[test]
    fn test_trailing_only_reachable_in_one_stopped() {
        let pair = HedgePair::new("BTCUSDT".to_string());
        assert!(pair.trailing().is_none());

        let stopped = ClosedLeg {
            side: PositionSide::Short,
            entry_price: 100.0,
            close_price: 101.2,
            quantity: 1.0,
            pnl_usdt: -1.2,
            pnl_pct: -1.2,
            is_profit: false,
            closed_at: Utc::now(),
        };
        let pair = HedgePair {
            status: PairStatus::OneStopped {
                survivor: PositionSide::Long,
                trailing: crate::strategies::hedge::trailing::TrailingState::new(0.5),
                stopped,
            },
            ..pair
        };
        let trailing = pair.trailing().unwrap();
        assert_eq!(trailing.tier, None);
        assert!((trailing.peak_pct - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_pair_status_serde_roundtrip() {
        let pair = HedgePair {
            symbol: "ETHUSDT".to_string(),
            status: PairStatus::OneStopped {
                survivor: PositionSide::Short,
                trailing: TrailingState {
                    tier: Some(3),
                    peak_pct: 1.8,
                },
                stopped: ClosedLeg {
                    side: PositionSide::Long,
                    entry_price: 2000.0,
                    close_price: 1975.0,
                    quantity: 0.1,
                    pnl_usdt: -2.5,
                    pnl_pct: -1.25,
                    is_profit: false,
                    closed_at: Utc::now(),
                },
            },
            first_seen: Utc::now(),
        };

        let json = serde_json::to_string(&pair).unwrap();
        let back: HedgePair = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, pair.status);
    }
}
