use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("订单被拒绝: {code} - {message}")]
    OrderRejected { code: i32, message: String },

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("交易对格式错误: {0}")]
    SymbolError(String),

    #[error("速率限制: {0}")]
    RateLimitError(String, Option<u64>),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("超时错误: 操作 '{operation}' 超时 ({timeout_seconds}秒)")]
    TimeoutError {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("其他错误: {0}")]
    Other(String),
}

impl ExchangeError {
    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::TimeoutError { .. } => true,
            ExchangeError::RateLimitError(_, _) => true,
            ExchangeError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// 获取建议的重试等待时间(秒)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimitError(_, retry_after) => *retry_after,
            ExchangeError::NetworkError(_) => Some(1),
            ExchangeError::TimeoutError { .. } => Some(2),
            ExchangeError::ApiError { code, .. } if *code >= 500 => Some(5),
            _ => None,
        }
    }

    /// 判断被拒绝的平仓是否因为持仓已不存在（视为平仓已完成）
    ///
    /// -2022: ReduceOnly Order is rejected（仓位已平）
    /// -4061: Order's position side does not match（双向模式下该方向无持仓）
    pub fn is_position_gone(&self) -> bool {
        match self {
            ExchangeError::OrderRejected { code, message } => {
                matches!(code, -2022 | -4061)
                    || message.contains("已不存在")
                    || message.to_lowercase().contains("reduceonly order is rejected")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let e = ExchangeError::ApiError {
            code: 503,
            message: "service unavailable".to_string(),
        };
        assert!(e.is_retryable());

        let e = ExchangeError::ApiError {
            code: 400,
            message: "bad request".to_string(),
        };
        assert!(!e.is_retryable());

        let e = ExchangeError::ConfigError("缺少档位表".to_string());
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_position_gone_detection() {
        let e = ExchangeError::OrderRejected {
            code: -2022,
            message: "ReduceOnly Order is rejected.".to_string(),
        };
        assert!(e.is_position_gone());

        let e = ExchangeError::OrderRejected {
            code: -4164,
            message: "Order's notional must be no smaller than 100".to_string(),
        };
        assert!(!e.is_position_gone());

        let e = ExchangeError::Other("x".to_string());
        assert!(!e.is_position_gone());
    }
}
