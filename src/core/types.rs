use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, crate::core::error::ExchangeError>;

/// 持仓方向（双向持仓模式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// 币安API中的positionSide取值
    pub fn as_binance(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    /// 对冲的另一条腿
    pub fn opposite(&self) -> PositionSide {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    /// 平仓时需要的下单方向
    pub fn close_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    /// 开仓时需要的下单方向
    pub fn open_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    pub fn cn(&self) -> &'static str {
        match self {
            PositionSide::Long => "多单",
            PositionSide::Short => "空单",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_binance())
    }
}

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_binance(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_binance())
    }
}

/// 持仓快照（只读，每个tick由快照接口生成）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    /// 持仓数量（绝对值）
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub leverage: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// 以开仓价为基准的盈亏百分比
    pub fn pnl_pct(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        match self.side {
            PositionSide::Long => (self.mark_price - self.entry_price) / self.entry_price * 100.0,
            PositionSide::Short => (self.entry_price - self.mark_price) / self.entry_price * 100.0,
        }
    }

    /// 按指定平仓价计算已实现盈亏（USDT）
    pub fn realized_pnl_at(&self, close_price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (close_price - self.entry_price) * self.size,
            PositionSide::Short => (self.entry_price - close_price) * self.size,
        }
    }
}

/// 下单回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    #[serde(default)]
    pub executed_qty: f64,
    #[serde(default)]
    pub avg_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(side: PositionSide, entry: f64, mark: f64) -> Position {
        Position {
            symbol: "BTCUSDT".to_string(),
            side,
            size: 0.5,
            entry_price: entry,
            mark_price: mark,
            unrealized_pnl: 0.0,
            leverage: Some(10),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_pnl_pct_long_short_symmetry() {
        let long = position(PositionSide::Long, 100.0, 101.0);
        let short = position(PositionSide::Short, 100.0, 101.0);
        assert!((long.pnl_pct() - 1.0).abs() < 1e-9);
        assert!((short.pnl_pct() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_realized_pnl_uses_size() {
        let long = position(PositionSide::Long, 100.0, 0.0);
        assert!((long.realized_pnl_at(104.0) - 2.0).abs() < 1e-9);
        let short = position(PositionSide::Short, 100.0, 0.0);
        assert!((short.realized_pnl_at(104.0) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_entry_price_guard() {
        let p = position(PositionSide::Long, 0.0, 100.0);
        assert_eq!(p.pnl_pct(), 0.0);
    }
}
