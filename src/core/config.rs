use crate::core::error::ExchangeError;

/// 币安期货端点配置
#[derive(Debug, Clone)]
pub struct BinanceEndpoints {
    pub name: String,
    pub testnet: bool,
    pub futures_base_url: String,
}

impl BinanceEndpoints {
    pub fn futures(testnet: bool) -> Self {
        let futures_base_url = if testnet {
            "https://testnet.binancefuture.com".to_string()
        } else {
            "https://fapi.binance.com".to_string()
        };

        Self {
            name: "Binance".to_string(),
            testnet,
            futures_base_url,
        }
    }
}

/// API密钥配置
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiKeys {
    /// 从环境变量加载API密钥
    pub fn from_env(exchange: &str) -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let exchange_upper = exchange.to_uppercase();

        let api_key = std::env::var(format!("{}_API_KEY", exchange_upper)).map_err(|_| {
            ExchangeError::ConfigError(format!("未找到{}的API_KEY环境变量", exchange))
        })?;

        // 尝试两种格式的密钥名称
        let api_secret = std::env::var(format!("{}_API_SECRET", exchange_upper))
            .or_else(|_| std::env::var(format!("{}_SECRET_KEY", exchange_upper)))
            .or_else(|_| std::env::var(format!("{}_SECRET", exchange_upper)))
            .map_err(|_| {
                ExchangeError::ConfigError(format!(
                    "未找到{}的API_SECRET或SECRET_KEY环境变量",
                    exchange
                ))
            })?;

        Ok(ApiKeys {
            api_key,
            api_secret,
        })
    }
}
