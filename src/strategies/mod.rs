// 核心策略模块
pub mod hedge;

// 导出策略类型
pub use hedge::{HedgeConfig, HedgePositionMonitor};
