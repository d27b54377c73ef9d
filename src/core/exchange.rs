use crate::core::types::{OrderAck, Position, PositionSide, Result};
use async_trait::async_trait;

/// 对冲策略依赖的交易所接口
///
/// 快照查询与下单均为同步语义：调用方在一个tick内完成读-改-写，
/// 失败由调用方按错误类型决定重试或跳过。
#[async_trait]
pub trait HedgeExchange: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 加载全部合约的精度规则（tick size / step size），返回加载数量
    async fn load_instruments(&self) -> Result<usize>;

    /// 查询指定方向的持仓快照，无持仓时返回None
    async fn get_position(&self, symbol: &str, side: PositionSide) -> Result<Option<Position>>;

    /// 市价平掉指定方向的全部持仓
    async fn close_position(&self, symbol: &str, side: PositionSide) -> Result<OrderAck>;

    /// 市价开仓，数量按 名义金额 × 杠杆 / 标记价格 换算
    async fn open_position(
        &self,
        symbol: &str,
        side: PositionSide,
        amount_usdt: f64,
        leverage: u32,
    ) -> Result<OrderAck>;

    /// 设置杠杆倍数
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// 获取标记价格
    async fn get_mark_price(&self, symbol: &str) -> Result<f64>;

    /// 获取账户USDT余额
    async fn get_balance_usdt(&self) -> Result<f64>;
}
