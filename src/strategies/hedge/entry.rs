//! 多空双开建仓
//! 对每个配置的交易对同时市价开多开空；部分成交时立即回撤，绝不裸奔单腿

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::exchange::HedgeExchange;
use crate::core::retry_policy::retry_async;
use crate::core::types::{PositionSide, Result};
use crate::utils::symbol::to_binance_symbol;

use super::config::{EntryConfig, PairSizing};
use super::notifications::HedgeNotifier;
use super::pair::HedgePair;

/// 建仓器：每个tick为缺仓的交易对补齐对冲双腿
pub struct HedgeEntryPlacer {
    config: EntryConfig,
    exchange: Arc<dyn HedgeExchange>,
    notifier: HedgeNotifier,
}

impl HedgeEntryPlacer {
    pub fn new(
        config: EntryConfig,
        exchange: Arc<dyn HedgeExchange>,
        notifier: HedgeNotifier,
    ) -> Self {
        Self {
            config,
            exchange,
            notifier,
        }
    }

    /// 为所有配置的交易对补齐对冲持仓
    ///
    /// 已了结的对冲记录在重新开仓前从监控表中移除，新开仓位会作为新的一对被登记。
    pub async fn ensure_entries(&self, pairs: &mut HashMap<String, HedgePair>) {
        if !self.config.enabled {
            return;
        }

        for (inst_id, sizing) in &self.config.pairs {
            let symbol = to_binance_symbol(inst_id);

            if let Some(existing) = pairs.get(&symbol) {
                if !existing.is_closed() {
                    continue;
                }
            }

            match self.enter_pair(&symbol, sizing).await {
                Ok(true) => {
                    // 旧的已了结记录让位给即将出现的新对冲
                    pairs.remove(&symbol);
                }
                Ok(false) => {}
                Err(e) => {
                    log::error!("{} 对冲开仓失败: {}", symbol, e);
                }
            }
        }
    }

    /// 为单个交易对开双腿，返回是否真正下了新仓
    async fn enter_pair(&self, symbol: &str, sizing: &PairSizing) -> Result<bool> {
        // 任一方向已有持仓则跳过（可能是幸存腿或手动仓位）
        let long = self
            .exchange
            .get_position(symbol, PositionSide::Long)
            .await?;
        let short = self
            .exchange
            .get_position(symbol, PositionSide::Short)
            .await?;

        if long.is_some() || short.is_some() {
            log::debug!("{} 已有持仓，跳过开仓", symbol);
            return Ok(false);
        }

        if let Err(e) = self
            .exchange
            .set_leverage(symbol, self.config.leverage)
            .await
        {
            log::warn!("{} 设置杠杆失败: {}", symbol, e);
        }

        let long_ack = self
            .exchange
            .open_position(
                symbol,
                PositionSide::Long,
                sizing.long_amount_usdt,
                self.config.leverage,
            )
            .await?;
        log::info!("{} 多单市价开仓成功，订单ID: {}", symbol, long_ack.order_id);

        match self
            .exchange
            .open_position(
                symbol,
                PositionSide::Short,
                sizing.short_amount_usdt,
                self.config.leverage,
            )
            .await
        {
            Ok(short_ack) => {
                log::info!(
                    "{} 空单市价开仓成功，订单ID: {}，对冲双腿建立完成",
                    symbol,
                    short_ack.order_id
                );
                Ok(true)
            }
            Err(e) => {
                // 空腿失败：立即回撤多腿，避免裸露的单边风险
                log::error!("{} 空单开仓失败，回撤已成交的多单: {}", symbol, e);
                let exchange = self.exchange.clone();
                let symbol_owned = symbol.to_string();
                let unwind = retry_async(
                    || {
                        let exchange = exchange.clone();
                        let symbol = symbol_owned.clone();
                        async move { exchange.close_position(&symbol, PositionSide::Long).await }
                    },
                    3,
                )
                .await;

                match unwind {
                    Ok(_) => {
                        self.notifier
                            .notify_error(
                                &format!("{} 对冲开仓", symbol),
                                &format!("空单开仓失败已回撤多单: {}", e),
                            )
                            .await;
                    }
                    Err(unwind_err) if unwind_err.is_position_gone() => {
                        log::info!("{} 多单已不存在，无需回撤", symbol);
                    }
                    Err(unwind_err) => {
                        // 回撤也失败了：资金正在裸露，必须立刻告警
                        log::error!("{} 回撤多单失败: {}", symbol, unwind_err);
                        self.notifier
                            .notify_error(
                                &format!("{} 对冲开仓", symbol),
                                &format!(
                                    "空单开仓失败: {}；回撤多单也失败: {}，当前存在裸露多头！",
                                    e, unwind_err
                                ),
                            )
                            .await;
                    }
                }

                Err(e)
            }
        }
    }
}
