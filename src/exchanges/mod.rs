pub mod binance;

pub use binance::BinanceFutures;
