//! 币安USDT-M合约适配器
//! 只保留对冲策略用到的REST能力：持仓快照、市价开平仓、杠杆、余额

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::core::config::{ApiKeys, BinanceEndpoints};
use crate::core::error::ExchangeError;
use crate::core::exchange::HedgeExchange;
use crate::core::types::{OrderAck, Position, PositionSide, Result};
use crate::utils::symbol::{format_with_step, round_qty_to_step};

type HmacSha256 = Hmac<Sha256>;

/// 币安强制的最小名义价值（USDT）
const MIN_NOTIONAL_USDT: f64 = 100.0;

/// 合约精度规则
#[derive(Debug, Clone)]
pub struct InstrumentRules {
    pub tick_size: f64,
    pub step_size: f64,
}

pub struct BinanceFutures {
    endpoints: BinanceEndpoints,
    api_keys: ApiKeys,
    client: Client,
    /// 服务器时间偏移（毫秒）
    time_offset: Mutex<i64>,
    /// 合约精度规则缓存
    instruments: RwLock<HashMap<String, InstrumentRules>>,
}

impl BinanceFutures {
    pub fn new(endpoints: BinanceEndpoints, api_keys: ApiKeys) -> Self {
        Self {
            endpoints,
            api_keys,
            client: Client::new(),
            time_offset: Mutex::new(0),
            instruments: RwLock::new(HashMap::new()),
        }
    }

    /// Binance 签名: HMAC-SHA256(query_string)
    fn sign(&self, query_string: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_keys.api_secret.as_bytes())
            .expect("HMAC 支持任意长度密钥");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// 同步服务器时间，记录本地偏移
    pub async fn sync_server_time(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct ServerTime {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let server: ServerTime = self.send_public_request("/fapi/v1/time", None).await?;
        let local = Utc::now().timestamp_millis();
        let offset = server.server_time - local;
        *self.time_offset.lock().expect("Lock poisoned") = offset;
        log::info!("⏰ 币安服务器时间同步完成，偏移 {}ms", offset);
        Ok(())
    }

    fn corrected_timestamp(&self) -> i64 {
        let offset = *self.time_offset.lock().expect("Lock poisoned");
        Utc::now().timestamp_millis() + offset
    }

    fn instrument_rules(&self, symbol: &str) -> Option<InstrumentRules> {
        self.instruments
            .read()
            .expect("Lock poisoned")
            .get(symbol)
            .cloned()
    }

    /// 发送认证请求
    async fn send_signed_request<T>(
        &self,
        method: &str,
        endpoint: &str,
        mut params: HashMap<String, String>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        params.insert(
            "timestamp".to_string(),
            self.corrected_timestamp().to_string(),
        );
        params.insert("recvWindow".to_string(), "60000".to_string());

        // 按字母顺序排序参数以生成签名
        let mut sorted_params: Vec<(&String, &String)> = params.iter().collect();
        sorted_params.sort_by_key(|&(k, _)| k);

        let query_string: Vec<String> = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        let query_string = query_string.join("&");

        let signature = self.sign(&query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.endpoints.futures_base_url, endpoint, query_string, signature
        );

        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(&url),
            "POST" => self
                .client
                .post(&url)
                .header("Content-Type", "application/x-www-form-urlencoded"),
            "DELETE" => self.client.delete(&url),
            _ => return Err(ExchangeError::Other("不支持的HTTP方法".to_string())),
        };

        let response = request
            .header("X-MBX-APIKEY", &self.api_keys.api_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// 发送公共请求
    async fn send_public_request<T>(
        &self,
        endpoint: &str,
        params: Option<HashMap<String, String>>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut url = format!("{}{}", self.endpoints.futures_base_url, endpoint);

        if let Some(params) = params {
            if !params.is_empty() {
                let mut pairs: Vec<String> = params
                    .iter()
                    .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                    .collect();
                pairs.sort();
                url = format!("{}?{}", url, pairs.join("&"));
            }
        }

        let response = self.client.get(&url).send().await?;
        Self::parse_response(response).await
    }

    /// 处理响应：成功走JSON解码，失败解析币安错误体
    async fn parse_response<T>(response: reqwest::Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "未知错误".to_string());

        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(ExchangeError::RateLimitError(text, Some(5)));
        }

        #[derive(Deserialize)]
        struct BinanceApiError {
            code: i32,
            msg: String,
        }

        // 币安错误体形如 {"code":-2022,"msg":"..."}
        if let Ok(body) = serde_json::from_str::<BinanceApiError>(&text) {
            return Err(ExchangeError::ApiError {
                code: body.code,
                message: body.msg,
            });
        }

        Err(ExchangeError::ApiError {
            code: status.as_u16() as i32,
            message: text,
        })
    }

    /// 下单接口的错误转换：币安业务错误码视为订单被拒绝
    fn map_order_error(error: ExchangeError) -> ExchangeError {
        match error {
            ExchangeError::ApiError { code, message } if code <= -1000 => {
                ExchangeError::OrderRejected { code, message }
            }
            other => other,
        }
    }

    /// 查询指定方向的原始持仓（数量为0时返回None）
    async fn fetch_position_raw(
        &self,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<(Position, f64)>> {
        #[derive(Deserialize)]
        struct BinancePosition {
            symbol: String,
            #[serde(rename = "positionSide")]
            position_side: String,
            #[serde(rename = "positionAmt")]
            position_amt: String,
            #[serde(rename = "entryPrice")]
            entry_price: String,
            #[serde(rename = "markPrice")]
            mark_price: String,
            #[serde(rename = "unRealizedProfit")]
            unrealized_profit: String,
            leverage: String,
            #[serde(rename = "updateTime")]
            update_time: i64,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        let positions: Vec<BinancePosition> = self
            .send_signed_request("GET", "/fapi/v2/positionRisk", params)
            .await?;

        for pos in positions {
            if pos.symbol != symbol || pos.position_side != side.as_binance() {
                continue;
            }
            let amt = pos.position_amt.parse::<f64>().unwrap_or(0.0);
            if amt.abs() <= 0.0 {
                continue;
            }

            let position = Position {
                symbol: pos.symbol,
                side,
                size: amt.abs(),
                entry_price: pos.entry_price.parse().unwrap_or(0.0),
                mark_price: pos.mark_price.parse().unwrap_or(0.0),
                unrealized_pnl: pos.unrealized_profit.parse().unwrap_or(0.0),
                leverage: pos.leverage.parse().ok(),
                timestamp: chrono::DateTime::from_timestamp(pos.update_time / 1000, 0)
                    .unwrap_or_else(Utc::now),
            };
            return Ok(Some((position, amt)));
        }

        Ok(None)
    }

    /// 市价单下单
    async fn place_market_order(
        &self,
        symbol: &str,
        side: PositionSide,
        order_side: crate::core::types::OrderSide,
        quantity: f64,
    ) -> Result<OrderAck> {
        #[derive(Deserialize)]
        struct BinanceOrderResponse {
            #[serde(rename = "orderId")]
            order_id: i64,
            #[serde(rename = "executedQty", default)]
            executed_qty: String,
            #[serde(rename = "avgPrice", default)]
            avg_price: String,
        }

        let step = self
            .instrument_rules(symbol)
            .map(|r| r.step_size)
            .unwrap_or(0.0);

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("side".to_string(), order_side.as_binance().to_string());
        params.insert("type".to_string(), "MARKET".to_string());
        params.insert("quantity".to_string(), format_with_step(quantity, step));
        // 双向持仓模式：开平仓都通过positionSide区分，不使用reduceOnly
        params.insert("positionSide".to_string(), side.as_binance().to_string());

        let response: BinanceOrderResponse = self
            .send_signed_request("POST", "/fapi/v1/order", params)
            .await
            .map_err(Self::map_order_error)?;

        Ok(OrderAck {
            order_id: response.order_id.to_string(),
            executed_qty: response.executed_qty.parse().unwrap_or(0.0),
            avg_price: response.avg_price.parse().ok().filter(|p: &f64| *p > 0.0),
        })
    }
}

#[async_trait]
impl HedgeExchange for BinanceFutures {
    fn name(&self) -> &str {
        &self.endpoints.name
    }

    async fn load_instruments(&self) -> Result<usize> {
        #[derive(Deserialize)]
        struct ExchangeInfo {
            symbols: Vec<SymbolInfo>,
        }

        #[derive(Deserialize)]
        struct SymbolInfo {
            symbol: String,
            #[serde(default)]
            filters: Vec<SymbolFilter>,
        }

        #[derive(Deserialize)]
        struct SymbolFilter {
            #[serde(rename = "filterType")]
            filter_type: String,
            #[serde(rename = "tickSize", default)]
            tick_size: Option<String>,
            #[serde(rename = "stepSize", default)]
            step_size: Option<String>,
        }

        let info: ExchangeInfo = self
            .send_public_request("/fapi/v1/exchangeInfo", None)
            .await?;

        let mut rules = HashMap::new();
        for s in info.symbols {
            let mut tick_size = 0.0;
            let mut step_size = 0.0;
            for f in &s.filters {
                match f.filter_type.as_str() {
                    "PRICE_FILTER" => {
                        tick_size = f
                            .tick_size
                            .as_deref()
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0.0);
                    }
                    "LOT_SIZE" => {
                        step_size = f
                            .step_size
                            .as_deref()
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0.0);
                    }
                    _ => {}
                }
            }
            rules.insert(
                s.symbol,
                InstrumentRules {
                    tick_size,
                    step_size,
                },
            );
        }

        let count = rules.len();
        *self.instruments.write().expect("Lock poisoned") = rules;
        log::info!("已加载 {} 个币安合约的精度规则", count);
        Ok(count)
    }

    async fn get_position(&self, symbol: &str, side: PositionSide) -> Result<Option<Position>> {
        Ok(self
            .fetch_position_raw(symbol, side)
            .await?
            .map(|(position, _)| position))
    }

    async fn close_position(&self, symbol: &str, side: PositionSide) -> Result<OrderAck> {
        let Some((_, amt)) = self.fetch_position_raw(symbol, side).await? else {
            return Err(ExchangeError::OrderRejected {
                code: -2022,
                message: format!("{} {} 持仓已不存在，无需平仓", symbol, side.cn()),
            });
        };

        self.place_market_order(symbol, side, side.close_order_side(), amt.abs())
            .await
    }

    async fn open_position(
        &self,
        symbol: &str,
        side: PositionSide,
        amount_usdt: f64,
        leverage: u32,
    ) -> Result<OrderAck> {
        let mark_price = self.get_mark_price(symbol).await?;
        if mark_price <= 0.0 {
            return Err(ExchangeError::ParseError(format!(
                "无法获取 {} 的标记价格",
                symbol
            )));
        }

        let step = self
            .instrument_rules(symbol)
            .map(|r| r.step_size)
            .unwrap_or(0.0);

        let mut qty = round_qty_to_step(amount_usdt * leverage as f64 / mark_price, step);
        if qty <= 0.0 {
            return Err(ExchangeError::OrderRejected {
                code: -4164,
                message: format!("{} 计算出的合约数量太小，无法下单", symbol),
            });
        }

        // 名义价值不足时自动补足到交易所下限
        let notional = qty * mark_price;
        if notional < MIN_NOTIONAL_USDT {
            let min_qty = MIN_NOTIONAL_USDT / mark_price;
            let step_up = if step > 0.0 { step } else { 0.0 };
            qty = round_qty_to_step(min_qty, step) + step_up;
            log::info!(
                "{} 名义价值不足，已自动调整数量: {}，名义价值: {:.2} USDT",
                symbol,
                format_with_step(qty, step),
                qty * mark_price
            );
        }

        self.place_market_order(symbol, side, side.open_order_side(), qty)
            .await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        #[derive(Deserialize)]
        struct LeverageResponse {
            leverage: u32,
            symbol: String,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("leverage".to_string(), leverage.to_string());

        let response: LeverageResponse = self
            .send_signed_request("POST", "/fapi/v1/leverage", params)
            .await?;
        log::debug!("{} 杠杆已设置为 {}x", response.symbol, response.leverage);
        Ok(())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<f64> {
        #[derive(Deserialize)]
        struct TickerPrice {
            price: String,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        let ticker: TickerPrice = self
            .send_public_request("/fapi/v1/ticker/price", Some(params))
            .await?;

        ticker
            .price
            .parse()
            .map_err(|_| ExchangeError::ParseError(format!("无法解析 {} 的标记价格", symbol)))
    }

    async fn get_balance_usdt(&self) -> Result<f64> {
        #[derive(Deserialize)]
        struct BinanceBalance {
            asset: String,
            balance: String,
        }

        let balances: Vec<BinanceBalance> = self
            .send_signed_request("GET", "/fapi/v2/balance", HashMap::new())
            .await?;

        for b in balances {
            if b.asset == "USDT" {
                return Ok(b.balance.parse().unwrap_or(0.0));
            }
        }

        log::warn!("未找到USDT资产");
        Ok(0.0)
    }
}
