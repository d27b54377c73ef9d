#![allow(dead_code)]
#![allow(unused_variables)]
#![allow(unused_imports)]

pub mod core;
pub mod exchanges;
pub mod strategies;
pub mod utils;

// 选择性导出，避免命名冲突
pub use self::core::{
    config::*,
    error::*,
    exchange::*,
    types::{OrderAck, OrderSide, Position, PositionSide},
};
pub use exchanges::*;
pub use strategies::*;
pub use utils::*;
