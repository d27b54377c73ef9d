//! 对冲持仓监控循环
//! 每个tick依次处理所有交易对：止损判定 → 移动止盈推进 → 平仓 → 台账 → 账户级停机

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::core::exchange::HedgeExchange;
use crate::core::retry_policy::retry_async;
use crate::core::types::{Position, PositionSide, Result};
use crate::utils::symbol::to_binance_symbol;

use super::config::HedgeConfig;
use super::entry::HedgeEntryPlacer;
use super::notifications::HedgeNotifier;
use super::pair::{AccountLedger, ClosedLeg, HedgePair, PairStatus};
use super::state::{PersistedState, StateStore};
use super::stop_loss::{StopDecision, StopLossEvaluator};
use super::trailing::{TrailingAction, TrailingController, TrailingState};

/// 单个交易对的状态视图
#[derive(Debug, Clone)]
pub struct PairStatusView {
    pub symbol: String,
    pub status: String,
}

/// 监控整体状态（供展示/查询）
#[derive(Debug, Clone)]
pub struct HedgeStatus {
    pub ledger_total_usdt: f64,
    pub closed_pairs: u32,
    pub pairs: Vec<PairStatusView>,
    pub halted: bool,
}

/// 对冲持仓监控器
///
/// 所有持仓状态与台账由本循环独占持有，单写者，无需加锁。
pub struct HedgePositionMonitor {
    config: HedgeConfig,
    exchange: Arc<dyn HedgeExchange>,
    notifier: HedgeNotifier,
    entry: Option<HedgeEntryPlacer>,
    pairs: HashMap<String, HedgePair>,
    ledger: AccountLedger,
    running: Arc<AtomicBool>,
    halted: bool,
    store: Option<StateStore>,
}

impl HedgePositionMonitor {
    pub fn new(
        config: HedgeConfig,
        exchange: Arc<dyn HedgeExchange>,
        notifier: HedgeNotifier,
    ) -> Self {
        let entry = if config.entry.enabled {
            Some(HedgeEntryPlacer::new(
                config.entry.clone(),
                exchange.clone(),
                notifier.clone(),
            ))
        } else {
            None
        };

        let store = config
            .persistence
            .state_file
            .as_ref()
            .map(|path| StateStore::new(path));

        Self {
            config,
            exchange,
            notifier,
            entry,
            pairs: HashMap::new(),
            ledger: AccountLedger::default(),
            running: Arc::new(AtomicBool::new(true)),
            halted: false,
            store,
        }
    }

    /// 外部停止信号句柄（ctrl-c处理线程使用）
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// 从状态文件恢复持仓状态与台账
    pub fn restore(&mut self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        match store.load()? {
            Some(state) => {
                info!(
                    "已恢复监控状态：{}个交易对，累计收益 {:.2} USDT",
                    state.pairs.len(),
                    state.ledger.total()
                );
                self.pairs = state.pairs;
                self.ledger = state.ledger;
            }
            None => debug!("状态文件不存在，从空状态启动"),
        }
        Ok(())
    }

    /// 当前状态查询
    pub fn status(&self) -> HedgeStatus {
        let mut pairs: Vec<PairStatusView> = self
            .pairs
            .values()
            .map(|pair| {
                let status = match &pair.status {
                    PairStatus::OpenHedged => "OPEN_HEDGED".to_string(),
                    PairStatus::OneStopped {
                        survivor, trailing, ..
                    } => {
                        let tier = trailing
                            .tier
                            .map(|t| format!("第{}档", t + 1))
                            .unwrap_or_else(|| "未进档".to_string());
                        format!(
                            "ONE_STOPPED({}幸存, {}, 峰值{:.2}%)",
                            survivor.cn(),
                            tier,
                            trailing.peak_pct
                        )
                    }
                    PairStatus::Closed => "CLOSED".to_string(),
                };
                PairStatusView {
                    symbol: pair.symbol.clone(),
                    status,
                }
            })
            .collect();
        pairs.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        HedgeStatus {
            ledger_total_usdt: self.ledger.total(),
            closed_pairs: self.ledger.closed_pairs(),
            pairs,
            halted: self.halted,
        }
    }

    /// 监控主循环：停止信号在每个tick开头检查，进行中的tick会完整结束
    pub async fn run(&mut self) {
        info!(
            "启动对冲持仓监控，间隔 {}秒，止损阈值 -{}%",
            self.config.monitor.interval_secs, self.config.stop_loss.stop_loss_pct
        );

        let interval = Duration::from_secs(self.config.monitor.interval_secs);

        while self.running.load(Ordering::SeqCst) {
            self.tick().await;
            self.persist();

            if self.halted || !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        self.persist();
        info!("对冲监控循环已退出");
    }

    /// 单个tick：建仓补齐 → 逐对处理 → 账户级停机判定
    pub async fn tick(&mut self) {
        if !self.halted {
            if let Some(entry) = &self.entry {
                entry.ensure_entries(&mut self.pairs).await;
            }
        }

        let symbols = self.monitored_symbols();
        for symbol in symbols {
            if !self.running.load(Ordering::SeqCst) {
                info!("检测到停止信号，剩余交易对顺延到下个tick");
                break;
            }
            if let Err(e) = self.process_pair(&symbol).await {
                warn!("{} 本tick处理失败，状态保持不变: {}", symbol, e);
            }
        }

        self.check_global_stop().await;
    }

    /// 本tick需要处理的交易对：配置的全集 ∪ 已跟踪的
    fn monitored_symbols(&self) -> Vec<String> {
        let mut symbols: BTreeSet<String> = self
            .config
            .entry
            .pairs
            .keys()
            .map(|inst_id| to_binance_symbol(inst_id))
            .collect();
        symbols.extend(self.pairs.keys().cloned());
        symbols.into_iter().collect()
    }

    async fn process_pair(&mut self, symbol: &str) -> Result<()> {
        let tracked = self.pairs.get(symbol).cloned();

        match tracked {
            None => self.observe_new_pair(symbol).await,
            Some(pair) => match pair.status.clone() {
                PairStatus::OpenHedged => self.process_open_hedged(pair).await,
                PairStatus::OneStopped {
                    survivor,
                    trailing,
                    stopped,
                } => {
                    self.process_one_stopped(pair, survivor, trailing, stopped)
                        .await
                }
                // 已了结，退出主动监控
                PairStatus::Closed => Ok(()),
            },
        }
    }

    /// 带退避重试的持仓快照获取
    async fn fetch_leg(&self, symbol: &str, side: PositionSide) -> Result<Option<Position>> {
        let exchange = self.exchange.clone();
        let symbol = symbol.to_string();
        retry_async(
            || {
                let exchange = exchange.clone();
                let symbol = symbol.clone();
                async move { exchange.get_position(&symbol, side).await }
            },
            3,
        )
        .await
    }

    /// 尚未跟踪的交易对：双腿齐全时登记为新的对冲对
    async fn observe_new_pair(&mut self, symbol: &str) -> Result<()> {
        let long = self.fetch_leg(symbol, PositionSide::Long).await?;
        let short = self.fetch_leg(symbol, PositionSide::Short).await?;

        match (long, short) {
            (Some(long), Some(short)) => {
                info!(
                    "首次检测到对冲仓位：{}，多单 {}@{}，空单 {}@{}",
                    symbol, long.size, long.entry_price, short.size, short.entry_price
                );
                self.pairs
                    .insert(symbol.to_string(), HedgePair::new(symbol.to_string()));
            }
            (Some(_), None) | (None, Some(_)) => {
                debug!("{} 检测到单边持仓但不在对冲记录中，跳过监控", symbol);
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// 双腿持有状态：止损判定
    async fn process_open_hedged(&mut self, pair: HedgePair) -> Result<()> {
        let symbol = pair.symbol.clone();

        // 开仓保护期内不做任何平仓判定
        let since_open = Utc::now().signed_duration_since(pair.first_seen);
        let min_delay = self.config.monitor.min_monitor_delay_secs as i64;
        if since_open.num_seconds() < min_delay {
            debug!(
                "{} 开仓时间过短（{}秒），跳过止损检查（最小延迟：{}秒）",
                symbol,
                since_open.num_seconds(),
                min_delay
            );
            return Ok(());
        }

        let long = self.fetch_leg(&symbol, PositionSide::Long).await?;
        let short = self.fetch_leg(&symbol, PositionSide::Short).await?;

        let (long, short) = match (long, short) {
            (Some(long), Some(short)) => (long, short),
            (Some(survivor), None) => {
                return self.adopt_external_stop(pair, survivor, PositionSide::Short).await;
            }
            (None, Some(survivor)) => {
                return self.adopt_external_stop(pair, survivor, PositionSide::Long).await;
            }
            (None, None) => {
                warn!("{} 双腿均已在外部消失，按零收益了结", symbol);
                self.ledger.record_pair(0.0);
                self.mark_closed(&symbol);
                return Ok(());
            }
        };

        let long_pct = long.pnl_pct();
        let short_pct = short.pnl_pct();
        debug!(
            "监控 {}，多单盈亏：{:.2}%，空单盈亏：{:.2}%",
            symbol, long_pct, short_pct
        );

        let decision =
            StopLossEvaluator::evaluate(long_pct, short_pct, self.config.stop_loss.stop_loss_pct);

        let StopDecision::Stop(loser_side) = decision else {
            return Ok(());
        };

        let (loser, survivor) = match loser_side {
            PositionSide::Long => (long, short),
            PositionSide::Short => (short, long),
        };

        info!(
            "{} {}亏损触及-{}%，执行止损，{}进入移动止盈",
            symbol,
            loser_side.cn(),
            self.config.stop_loss.stop_loss_pct,
            survivor.side.cn()
        );

        let stopped = self.close_leg(&loser, false).await?;
        let trailing = TrailingState::new(survivor.pnl_pct());

        self.notifier
            .notify_leg_stopped(&symbol, &stopped, survivor.side)
            .await;

        if let Some(tracked) = self.pairs.get_mut(&symbol) {
            tracked.status = PairStatus::OneStopped {
                survivor: survivor.side,
                trailing,
                stopped,
            };
        }
        Ok(())
    }

    /// 一腿在外部被平掉：幸存腿直接进入移动止盈，消失腿按零收益记账
    async fn adopt_external_stop(
        &mut self,
        pair: HedgePair,
        survivor: Position,
        missing: PositionSide,
    ) -> Result<()> {
        let symbol = pair.symbol.clone();
        warn!(
            "{} {}已在外部消失（非本程序平仓），{}转入移动止盈监控",
            symbol,
            missing.cn(),
            survivor.side.cn()
        );
        self.notifier
            .notify_error(
                &format!("{} 对冲监控", symbol),
                &format!("{}在外部被平仓，已实现盈亏未知，按0计入台账", missing.cn()),
            )
            .await;

        let stopped = ClosedLeg {
            side: missing,
            entry_price: 0.0,
            close_price: 0.0,
            quantity: 0.0,
            pnl_usdt: 0.0,
            pnl_pct: 0.0,
            is_profit: false,
            closed_at: Utc::now(),
        };

        if let Some(tracked) = self.pairs.get_mut(&symbol) {
            tracked.status = PairStatus::OneStopped {
                survivor: survivor.side,
                trailing: TrailingState::new(survivor.pnl_pct()),
                stopped,
            };
        }
        Ok(())
    }

    /// 单腿幸存状态：兜底止损 + 移动止盈推进
    async fn process_one_stopped(
        &mut self,
        pair: HedgePair,
        survivor_side: PositionSide,
        trailing: TrailingState,
        stopped: ClosedLeg,
    ) -> Result<()> {
        let symbol = pair.symbol.clone();

        let Some(survivor) = self.fetch_leg(&symbol, survivor_side).await? else {
            warn!(
                "{} 幸存腿已在外部消失，按零收益了结该对冲",
                symbol
            );
            self.ledger.record_pair(stopped.pnl_usdt);
            self.mark_closed(&symbol);
            self.notifier
                .notify_error(
                    &format!("{} 对冲监控", symbol),
                    "幸存腿在外部被平仓，已实现盈亏未知，按0计入台账",
                )
                .await;
            return Ok(());
        };

        let pnl_pct = survivor.pnl_pct();
        debug!(
            "监控单边持仓 {} {}，盈亏：{:.2}%（最高：{:.2}%）",
            symbol,
            survivor_side.cn(),
            pnl_pct,
            trailing.peak_pct.max(pnl_pct)
        );

        // 兜底止损：幸存腿同样受原始止损线保护
        if pnl_pct <= -self.config.stop_loss.stop_loss_pct {
            info!(
                "{} 单边持仓{}亏损触及-{}%，执行止损",
                symbol,
                survivor_side.cn(),
                self.config.stop_loss.stop_loss_pct
            );
            let closed = self.close_leg(&survivor, false).await?;
            self.finalize_pair(&symbol, stopped, closed).await;
            return Ok(());
        }

        match TrailingController::advance(trailing, pnl_pct, &self.config.stop_loss.tiers) {
            TrailingAction::Close {
                peak_pct,
                stop_level,
                tier,
            } => {
                info!(
                    "{} {} 触发第{}档移动止盈，最高盈亏：{:.2}%，触发线：{:.2}%，当前盈亏：{:.2}%，执行平仓",
                    symbol,
                    survivor_side.cn(),
                    tier + 1,
                    peak_pct,
                    stop_level,
                    pnl_pct
                );
                let closed = self.close_leg(&survivor, true).await?;
                self.finalize_pair(&symbol, stopped, closed).await;
            }
            TrailingAction::Hold(next) => {
                if next.tier != trailing.tier {
                    let describe = |tier: Option<usize>| match tier {
                        Some(t) => format!("第{}档", t + 1),
                        None => "未进档".to_string(),
                    };
                    info!(
                        "{} {} 档位更新：{} -> {}，最高盈亏：{:.2}%",
                        symbol,
                        survivor_side.cn(),
                        describe(trailing.tier),
                        describe(next.tier),
                        next.peak_pct
                    );
                }
                if let Some(tracked) = self.pairs.get_mut(&symbol) {
                    tracked.status = PairStatus::OneStopped {
                        survivor: survivor_side,
                        trailing: next,
                        stopped,
                    };
                }
            }
        }
        Ok(())
    }

    /// 市价平掉一条腿并生成平仓记录
    ///
    /// 交易所拒单但原因是持仓已不存在时，视为平仓已完成。
    async fn close_leg(&self, snapshot: &Position, is_profit: bool) -> Result<ClosedLeg> {
        let exchange = self.exchange.clone();
        let symbol = snapshot.symbol.clone();
        let side = snapshot.side;

        let result = retry_async(
            || {
                let exchange = exchange.clone();
                let symbol = symbol.clone();
                async move { exchange.close_position(&symbol, side).await }
            },
            3,
        )
        .await;

        let close_price = match result {
            Ok(ack) => {
                debug!("{} {} 平仓订单已提交，订单ID: {}", symbol, side.cn(), ack.order_id);
                ack.avg_price.unwrap_or(snapshot.mark_price)
            }
            Err(e) if e.is_position_gone() => {
                warn!("{} {} 持仓已不存在，按已平仓处理: {}", symbol, side.cn(), e);
                snapshot.mark_price
            }
            Err(e) => {
                error!("{} {} 平仓失败: {}", symbol, side.cn(), e);
                self.notifier
                    .notify_error(&format!("{} {} 平仓", symbol, side.cn()), &e.to_string())
                    .await;
                return Err(e);
            }
        };

        let pnl_usdt = snapshot.realized_pnl_at(close_price);
        let notional = snapshot.entry_price * snapshot.size;
        let pnl_pct = if notional > 0.0 {
            pnl_usdt / notional * 100.0
        } else {
            0.0
        };

        info!(
            "已{}平仓：{} {}，数量：{}，收益：{:.2} USDT ({:.2}%)",
            if is_profit { "止盈" } else { "止损" },
            symbol,
            side.cn(),
            snapshot.size,
            pnl_usdt,
            pnl_pct
        );

        Ok(ClosedLeg {
            side,
            entry_price: snapshot.entry_price,
            close_price,
            quantity: snapshot.size,
            pnl_usdt,
            pnl_pct,
            is_profit,
            closed_at: Utc::now(),
        })
    }

    /// 双腿均已了结：记账、标记CLOSED、发送完成通知
    async fn finalize_pair(&mut self, symbol: &str, stopped: ClosedLeg, survivor: ClosedLeg) {
        let pair_total = stopped.pnl_usdt + survivor.pnl_usdt;
        self.ledger.record_pair(pair_total);

        info!("{}", "=".repeat(70));
        info!("✅ 一对对冲完成：{}", symbol);
        info!(
            "📊 本次对冲总收益：{:.2} USDT | 💰 累计总收益：{:.2} USDT（已了结{}对）",
            pair_total,
            self.ledger.total(),
            self.ledger.closed_pairs()
        );
        info!("{}", "=".repeat(70));

        self.mark_closed(symbol);

        let (long, short) = if stopped.side == PositionSide::Long {
            (&stopped, &survivor)
        } else {
            (&survivor, &stopped)
        };
        self.notifier
            .notify_pair_completed(symbol, long, short, pair_total, self.ledger.total())
            .await;
    }

    fn mark_closed(&mut self, symbol: &str) {
        if let Some(tracked) = self.pairs.get_mut(symbol) {
            tracked.status = PairStatus::Closed;
        }
    }

    /// 账户级停机判定（每tick处理完全部交易对后执行一次）
    async fn check_global_stop(&mut self) {
        if self.halted {
            return;
        }

        let max_loss = self.config.account.max_total_profit_loss_usdt;
        let min_profit = self.config.account.min_total_profit_usdt;
        if !self.ledger.should_halt(max_loss, min_profit) {
            return;
        }

        let total = self.ledger.total();
        let reason = if total <= max_loss {
            format!(
                "累计总收益({:.2} USDT) <= {:.2} USDT（最大允许亏损）",
                total, max_loss
            )
        } else {
            format!(
                "累计总收益({:.2} USDT) >= {:.2} USDT（目标盈利）",
                total,
                min_profit.unwrap_or(0.0)
            )
        };

        warn!("满足账户级停机条件：{}，停止开新仓并退出监控", reason);
        self.halted = true;
        self.running.store(false, Ordering::SeqCst);

        if self.config.monitor.force_close_on_stop {
            self.force_close_all().await;
        }

        self.notifier.notify_global_stop(&reason, total).await;
    }

    /// 停机时强制平掉所有剩余持仓（尽力而为）
    async fn force_close_all(&mut self) {
        let symbols: Vec<String> = self
            .pairs
            .iter()
            .filter(|(_, pair)| !pair.is_closed())
            .map(|(symbol, _)| symbol.clone())
            .collect();

        for symbol in symbols {
            let Some(pair) = self.pairs.get(&symbol).cloned() else {
                continue;
            };

            match pair.status {
                PairStatus::OpenHedged => {
                    let mut net = 0.0;
                    for side in [PositionSide::Long, PositionSide::Short] {
                        match self.fetch_leg(&symbol, side).await {
                            Ok(Some(pos)) => match self.close_leg(&pos, false).await {
                                Ok(closed) => net += closed.pnl_usdt,
                                Err(e) => error!("{} 强制平仓{}失败: {}", symbol, side.cn(), e),
                            },
                            Ok(None) => {}
                            Err(e) => error!("{} 强制平仓前查询{}失败: {}", symbol, side.cn(), e),
                        }
                    }
                    self.ledger.record_pair(net);
                    self.mark_closed(&symbol);
                }
                PairStatus::OneStopped { survivor, stopped, .. } => {
                    let mut net = stopped.pnl_usdt;
                    match self.fetch_leg(&symbol, survivor).await {
                        Ok(Some(pos)) => match self.close_leg(&pos, pos.pnl_pct() > 0.0).await {
                            Ok(closed) => net += closed.pnl_usdt,
                            Err(e) => error!("{} 强制平仓{}失败: {}", symbol, survivor.cn(), e),
                        },
                        Ok(None) => {}
                        Err(e) => error!("{} 强制平仓前查询{}失败: {}", symbol, survivor.cn(), e),
                    }
                    self.ledger.record_pair(net);
                    self.mark_closed(&symbol);
                }
                PairStatus::Closed => {}
            }
        }
    }

    /// tick结束后的状态落盘（失败只告警）
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let state = PersistedState {
            pairs: self.pairs.clone(),
            ledger: self.ledger.clone(),
            saved_at: Some(Utc::now()),
        };

        if let Err(e) = store.save(&state) {
            warn!("状态落盘失败: {}", e);
        }
    }
}
