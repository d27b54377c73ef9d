//! 对冲腿止损判定

use crate::core::types::PositionSide;

/// 止损判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// 双腿均未触及止损线
    None,
    /// 指定腿需要止损
    Stop(PositionSide),
}

/// 止损判定器：纯函数，只依赖双腿盈亏和阈值
pub struct StopLossEvaluator;

impl StopLossEvaluator {
    /// 判定是否需要止损某一腿
    ///
    /// 双腿同时触线时平亏损更深的一腿；完全持平时先平多单，保证结果可复现。
    pub fn evaluate(long_pnl_pct: f64, short_pnl_pct: f64, stop_loss_pct: f64) -> StopDecision {
        let threshold = -stop_loss_pct;
        let long_hit = long_pnl_pct <= threshold;
        let short_hit = short_pnl_pct <= threshold;

        match (long_hit, short_hit) {
            (false, false) => StopDecision::None,
            (true, false) => StopDecision::Stop(PositionSide::Long),
            (false, true) => StopDecision::Stop(PositionSide::Short),
            (true, true) => {
                if short_pnl_pct < long_pnl_pct {
                    StopDecision::Stop(PositionSide::Short)
                } else {
                    StopDecision::Stop(PositionSide::Long)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_breach_returns_none() {
        assert_eq!(
            StopLossEvaluator::evaluate(0.5, -0.5, 1.0),
            StopDecision::None
        );
        // 略高于阈值不触发
        assert_eq!(
            StopLossEvaluator::evaluate(-0.99, 0.99, 1.0),
            StopDecision::None
        );
    }

    #[test]
    fn test_single_breach_stops_that_side() {
        assert_eq!(
            StopLossEvaluator::evaluate(0.5, -1.2, 1.0),
            StopDecision::Stop(PositionSide::Short)
        );
        assert_eq!(
            StopLossEvaluator::evaluate(-1.2, 0.5, 1.0),
            StopDecision::Stop(PositionSide::Long)
        );
    }

    #[test]
    fn test_boundary_is_inclusive() {
        assert_eq!(
            StopLossEvaluator::evaluate(-1.0, 0.5, 1.0),
            StopDecision::Stop(PositionSide::Long)
        );
    }

    #[test]
    fn test_dual_breach_stops_more_negative_leg() {
        assert_eq!(
            StopLossEvaluator::evaluate(-1.1, -1.5, 1.0),
            StopDecision::Stop(PositionSide::Short)
        );
        assert_eq!(
            StopLossEvaluator::evaluate(-2.0, -1.1, 1.0),
            StopDecision::Stop(PositionSide::Long)
        );
    }

    #[test]
    fn test_dual_breach_tie_prefers_long() {
        assert_eq!(
            StopLossEvaluator::evaluate(-1.5, -1.5, 1.0),
            StopDecision::Stop(PositionSide::Long)
        );
    }
}
