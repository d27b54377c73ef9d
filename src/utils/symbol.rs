//! 交易对与精度工具

/// 将类似 OKX 的 'CTC-USDT-SWAP' 转为币安格式 'CTCUSDT'
pub fn to_binance_symbol(inst_id: &str) -> String {
    let parts: Vec<&str> = inst_id.split('-').collect();
    if parts.len() >= 2 {
        format!("{}{}", parts[0], parts[1]).to_uppercase()
    } else {
        inst_id.replace(['-', '_'], "").to_uppercase()
    }
}

/// 价格按tick size向下取整
pub fn round_price_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 {
        return price;
    }
    (price / tick_size).floor() * tick_size
}

/// 数量按step size向下取整
pub fn round_qty_to_step(qty: f64, step_size: f64) -> f64 {
    if step_size <= 0.0 {
        return qty;
    }
    (qty / step_size).floor() * step_size
}

/// 步长的小数位数（用于格式化API参数）
pub fn decimals_of(step: f64) -> usize {
    if step <= 0.0 {
        return 8;
    }
    let s = format!("{:.8}", step);
    let trimmed = s.trim_end_matches('0');
    match trimmed.find('.') {
        Some(idx) => trimmed.len() - idx - 1,
        None => 0,
    }
}

/// 按步长精度格式化数量/价格为API字符串
pub fn format_with_step(value: f64, step: f64) -> String {
    format!("{:.*}", decimals_of(step), value)
}
