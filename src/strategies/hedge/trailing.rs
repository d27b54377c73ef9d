//! 幸存腿的移动止盈状态机

use serde::{Deserialize, Serialize};

use super::tiers::TrailingTierTable;

/// 单腿移动止盈状态
///
/// 档位与最高盈利在状态的整个生命周期内只增不减。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingState {
    /// 当前档位下标；None表示尚未进入任何档位
    pub tier: Option<usize>,
    /// 进入单边监控以来的最高盈亏百分比
    pub peak_pct: f64,
}

impl TrailingState {
    /// 一腿止损后以幸存腿当前盈亏初始化
    pub fn new(initial_pnl_pct: f64) -> Self {
        Self {
            tier: None,
            peak_pct: initial_pnl_pct,
        }
    }

    /// 当前武装的止盈触发线（未进入档位时无触发线）
    pub fn armed_stop_level(&self, table: &TrailingTierTable) -> Option<f64> {
        self.tier.map(|i| table.stop_level(i, self.peak_pct))
    }
}

/// advance的判定结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailingAction {
    /// 继续持有，携带更新后的状态
    Hold(TrailingState),
    /// 触发止盈平仓
    Close {
        peak_pct: f64,
        stop_level: f64,
        tier: usize,
    },
}

/// 移动止盈控制器
pub struct TrailingController;

impl TrailingController {
    /// 每个tick推进一次状态
    ///
    /// 1. 更新最高盈利；2. 选出最高盈利达到的目标档位；3. 档位只升不降；
    /// 4. 已进档位时计算触发线，当前盈亏跌破触发线即平仓。
    pub fn advance(
        state: TrailingState,
        current_pnl_pct: f64,
        table: &TrailingTierTable,
    ) -> TrailingAction {
        let peak_pct = state.peak_pct.max(current_pnl_pct);
        let target = table.select(peak_pct);

        let tier = match (state.tier, target) {
            (Some(current), Some(target)) => Some(current.max(target)),
            (Some(current), None) => Some(current),
            (None, target) => target,
        };

        if let Some(tier_index) = tier {
            let stop_level = table.stop_level(tier_index, peak_pct);
            if current_pnl_pct <= stop_level {
                return TrailingAction::Close {
                    peak_pct,
                    stop_level,
                    tier: tier_index,
                };
            }
        }

        TrailingAction::Hold(TrailingState { tier, peak_pct })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::hedge::tiers::{Drawback, Tier};

    fn table() -> TrailingTierTable {
        TrailingTierTable::default()
    }

    fn hold(action: TrailingAction) -> TrailingState {
        match action {
            TrailingAction::Hold(state) => state,
            TrailingAction::Close { .. } => panic!("期望HOLD，实际触发平仓: {:?}", action),
        }
    }

    #[test]
    fn test_no_tier_until_first_threshold() {
        let table = table();
        let state = TrailingState::new(0.3);
        let state = hold(TrailingController::advance(state, 0.5, &table));
        assert_eq!(state.tier, None);
        assert!((state.peak_pct - 0.5).abs() < 1e-9);
        assert_eq!(state.armed_stop_level(&table), None);
    }

    #[test]
    fn test_tier_never_decreases() {
        let table = table();
        let mut state = TrailingState::new(0.0);
        let mut last_tier: i64 = -1;

        // 盈亏序列来回波动，档位必须单调不降
        for pnl in [0.2, 0.8, 0.75, 1.1, 1.05, 2.1, 1.9, 2.6, 2.4] {
            state = hold(TrailingController::advance(state, pnl, &table));
            let tier = state.tier.map(|t| t as i64).unwrap_or(-1);
            assert!(tier >= last_tier, "档位从{}降到{}", last_tier, tier);
            last_tier = tier;
        }
        assert_eq!(state.tier, Some(5)); // peak 2.6 → 阈值2.5
    }

    #[test]
    fn test_tier_kept_when_target_lower() {
        let table = table();
        // 人为构造档位高于目标档位的状态：档位保持不变
        let state = TrailingState {
            tier: Some(5),
            peak_pct: 1.1,
        };
        assert_eq!(table.select(1.1), Some(1));
        let next = hold(TrailingController::advance(state, 1.1, &table));
        assert_eq!(next.tier, Some(5));
    }

    #[test]
    fn test_close_exactly_at_stop_level() {
        // 单档位表：阈值1.0，固定回撤0.3
        let table = TrailingTierTable::new(vec![Tier {
            threshold_pct: 1.0,
            drawback: Drawback::Fixed(0.3),
        }])
        .unwrap();

        let state = TrailingState {
            tier: Some(0),
            peak_pct: 1.5,
        };
        // 触发线 = 1.5 - 0.3 = 1.2，边界触发
        match TrailingController::advance(state, 1.2, &table) {
            TrailingAction::Close {
                peak_pct,
                stop_level,
                tier,
            } => {
                assert!((peak_pct - 1.5).abs() < 1e-9);
                assert!((stop_level - 1.2).abs() < 1e-9);
                assert_eq!(tier, 0);
            }
            other => panic!("期望平仓，实际: {:?}", other),
        }

        // 略高于触发线继续持有
        let next = hold(TrailingController::advance(state, 1.21, &table));
        assert_eq!(next.tier, Some(0));
    }

    #[test]
    fn test_proportional_stop_level() {
        // 比例回撤：peak 2.0、比例0.3 → 触发线1.4
        let table = TrailingTierTable::new(vec![Tier {
            threshold_pct: 1.0,
            drawback: Drawback::Proportional(0.3),
        }])
        .unwrap();

        let state = TrailingState {
            tier: Some(0),
            peak_pct: 2.0,
        };
        assert!((state.armed_stop_level(&table).unwrap() - 1.4).abs() < 1e-9);
        assert!(matches!(
            TrailingController::advance(state, 1.39, &table),
            TrailingAction::Close { .. }
        ));
        assert!(matches!(
            TrailingController::advance(state, 1.41, &table),
            TrailingAction::Hold(_)
        ));
    }

    #[test]
    fn test_climb_and_retrace_scenario() {
        // peak沿0.5→0.9→1.4爬升后回落到1.1
        let table = table();
        let mut state = TrailingState::new(0.5);

        state = hold(TrailingController::advance(state, 0.9, &table));
        assert_eq!(state.tier, Some(0)); // 0.7档
        // 0.9 - 20%×0.9 = 0.72，当前0.9高于触发线

        state = hold(TrailingController::advance(state, 1.4, &table));
        assert_eq!(state.tier, Some(2)); // 1.3档
        assert!((state.peak_pct - 1.4).abs() < 1e-9);

        // 触发线 = 1.4 - 0.3 = 1.1，回落到1.1正好触发
        assert!(matches!(
            TrailingController::advance(state, 1.1, &table),
            TrailingAction::Close { .. }
        ));
        // 回落到1.15尚未触发
        assert!(matches!(
            TrailingController::advance(state, 1.15, &table),
            TrailingAction::Hold(_)
        ));
    }

    #[test]
    fn test_peak_monotonic() {
        let table = table();
        let mut state = TrailingState::new(1.0);
        state = hold(TrailingController::advance(state, 0.8, &table));
        assert!((state.peak_pct - 1.0).abs() < 1e-9);
    }
}
