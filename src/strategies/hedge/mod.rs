//! 多空双开对冲策略
//! 同时持有多空两腿；一腿亏损触及止损线后平掉亏损腿，盈利腿进入分档移动止盈

pub mod config;
pub mod entry;
pub mod monitor;
pub mod notifications;
pub mod pair;
pub mod state;
pub mod stop_loss;
pub mod tiers;
pub mod trailing;

pub use config::HedgeConfig;
pub use monitor::{HedgePositionMonitor, HedgeStatus};
pub use notifications::HedgeNotifier;
pub use pair::{AccountLedger, HedgePair, PairStatus};
pub use stop_loss::{StopDecision, StopLossEvaluator};
pub use tiers::{Drawback, Tier, TrailingTierTable};
pub use trailing::{TrailingAction, TrailingController, TrailingState};
