use crate::evaluator::{self, ActivationCheck, CloseDecision};
use crate::events::EventBus;
use crate::persist::SignalPersistence;
use crate::pnl::profit_loss;
use crate::validation::validate_signal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_core::config::EngineConfig;
use vigil_core::context::{self, ExecutionContext};
use vigil_core::engine::entity::{ErrorEvent, RiskEvent, SignalEvent};
use vigil_core::engine::error::EngineError;
use vigil_core::market::entity::Candle;
use vigil_core::market::port::Exchange;
use vigil_core::risk::port::{RiskCheck, RiskPolicy, RiskVerdict};
use vigil_core::signal::entity::{CloseReason, Signal, SignalProposal, TickResult};
use vigil_core::signal::port::StrategySchema;

/// # Summary
/// 构建状态机实例所需的协作方集合，可在多个实例间共享。
#[derive(Clone)]
pub struct ClientDeps {
    pub exchange: Arc<dyn Exchange>,
    pub risk: Arc<dyn RiskPolicy>,
    pub persistence: SignalPersistence,
    pub config: EngineConfig,
    pub events: EventBus,
}

/// # Summary
/// 单个 (symbol, strategy) 的信号生命周期状态机。
///
/// # Invariants
/// - `pending` 与 `scheduled` 至多各有一个，且不会同时被占用。
/// - 每次调用恰好产生一个 `TickResult`；终态结果产生的同一步内槽位被清空。
/// - 实盘模式下，状态变更先落盘再修改内存槽位；落盘失败时保持原状态并返回错误。
/// - 历史回放（上下文 `is_historical == true`）从不读写持久化记录。
pub struct StrategyClient {
    symbol: String,
    schema: StrategySchema,
    deps: ClientDeps,
    // 在途（已激活）信号
    pending: Option<Signal>,
    // 等待激活的挂单信号
    scheduled: Option<Signal>,
    // 上一次调用信号源的时刻，用于节流
    last_signal_at: Option<DateTime<Utc>>,
    initialized: bool,
}

impl StrategyClient {
    pub fn new(symbol: impl Into<String>, schema: StrategySchema, deps: ClientDeps) -> Self {
        Self {
            symbol: symbol.into(),
            schema,
            deps,
            pending: None,
            scheduled: None,
            last_signal_at: None,
            initialized: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn strategy_name(&self) -> &str {
        &self.schema.name
    }

    pub fn exchange_name(&self) -> &str {
        self.deps.exchange.name()
    }

    pub fn pending_signal(&self) -> Option<&Signal> {
        self.pending.as_ref()
    }

    pub fn scheduled_signal(&self) -> Option<&Signal> {
        self.scheduled.as_ref()
    }

    /// # Summary
    /// 启动恢复：读取持久化的在途信号与挂单信号并装入槽位。只在实盘启动时调用一次。
    ///
    /// # Logic
    /// 1. 读取在途信号；策略或交易所名称不匹配的记录被丢弃。
    /// 2. 恢复的在途信号重新登记到风控，保证每个 add 都有对应的 remove。
    /// 3. 若在途信号存在，残留的挂单记录来自激活过程中的崩溃，直接删除；否则恢复挂单信号。
    pub async fn wait_for_init(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        let persistence = self.deps.persistence.clone();

        if let Some(signal) = persistence
            .read_pending(&self.schema.name, &self.symbol)
            .await?
        {
            if self.owns(&signal) {
                info!(
                    symbol = %self.symbol,
                    strategy = %self.schema.name,
                    signal_id = %signal.id,
                    "pending signal restored"
                );
                self.deps.risk.add_signal(&signal).await?;
                self.pending = Some(signal);
            } else {
                warn!(
                    symbol = %self.symbol,
                    strategy = %self.schema.name,
                    signal_id = %signal.id,
                    "discarding persisted signal owned by another configuration"
                );
            }
        }

        if let Some(signal) = persistence
            .read_scheduled(&self.schema.name, &self.symbol)
            .await?
        {
            if self.pending.is_some() {
                warn!(
                    symbol = %self.symbol,
                    strategy = %self.schema.name,
                    signal_id = %signal.id,
                    "stale scheduled record next to a pending signal, removing"
                );
                persistence
                    .remove_scheduled(&self.schema.name, &self.symbol)
                    .await?;
            } else if self.owns(&signal) {
                info!(
                    symbol = %self.symbol,
                    strategy = %self.schema.name,
                    signal_id = %signal.id,
                    "scheduled signal restored"
                );
                self.scheduled = Some(signal);
            }
        }

        self.initialized = true;
        Ok(())
    }

    /// # Summary
    /// 以当前价格样本推进状态机一步（实盘与历史共用）。
    ///
    /// # Returns
    /// 本步的 `TickResult`；结果同时投递到信号事件通道。
    pub async fn tick(&mut self) -> Result<TickResult, EngineError> {
        let ctx = self.context()?;
        let price = self.deps.exchange.get_average_price(&self.symbol).await?;

        let result = if let Some(scheduled) = self.scheduled.clone() {
            self.tick_scheduled(&ctx, scheduled, price).await?
        } else if let Some(pending) = self.pending.clone() {
            self.tick_active(&ctx, pending, price).await?
        } else {
            self.tick_idle(&ctx, price).await?
        };

        self.emit(&ctx, &result);
        Ok(result)
    }

    /// # Summary
    /// 快进：用预取的未来 1 分钟 K 线一次性推演当前信号直到终态。
    ///
    /// # Logic
    /// 1. 挂单信号：逐根检查 等待超时 → 击穿止损 → 到达激活价；
    ///    超时或击穿止损得到 `Cancelled`，激活后从下一根 K 线起按活跃信号推演。
    /// 2. 活跃信号：逐根按 到期 → 止盈 → 止损 判定。
    /// 3. K 线耗尽仍未结束：挂单信号取消，活跃信号以最后一根收盘价到期平仓。
    ///
    /// # Returns
    /// 恒为 `Closed` 或 `Cancelled`。没有信号或 K 线为空时返回 `InvalidState`。
    pub async fn backtest(&mut self, candles: &[Candle]) -> Result<TickResult, EngineError> {
        let ctx = self.context()?;
        let Some(last) = candles.last() else {
            return Err(EngineError::InvalidState(
                "fast-forward requires at least one candle".to_string(),
            ));
        };

        let result = if let Some(scheduled) = self.scheduled.clone() {
            self.fast_forward_scheduled(&ctx, scheduled, candles, last)
                .await?
        } else if let Some(pending) = self.pending.clone() {
            self.fast_forward_active(&ctx, pending, candles, last).await?
        } else {
            return Err(EngineError::InvalidState(format!(
                "no signal to fast-forward for {}/{}",
                self.schema.name, self.symbol
            )));
        };

        self.emit(&ctx, &result);
        Ok(result)
    }

    fn context(&self) -> Result<ExecutionContext, EngineError> {
        let ctx = context::execution()?;
        if ctx.symbol != self.symbol {
            return Err(EngineError::InvalidState(format!(
                "client for {} invoked in context of {}",
                self.symbol, ctx.symbol
            )));
        }
        Ok(ctx)
    }

    async fn tick_idle(
        &mut self,
        ctx: &ExecutionContext,
        price: f64,
    ) -> Result<TickResult, EngineError> {
        if let Some(last) = self.last_signal_at
            && ctx.when - last < self.schema.interval.duration()
        {
            return Ok(self.idle(price));
        }
        self.last_signal_at = Some(ctx.when);

        let check = self.risk_check(ctx, None, price);
        if let RiskVerdict::Reject(reason) = self.deps.risk.check_signal(&check).await? {
            self.reject(reason, price);
            return Ok(self.idle(price));
        }

        let Some(proposal) = self
            .schema
            .source
            .get_signal(&self.symbol, ctx.when)
            .await?
        else {
            return Ok(self.idle(price));
        };

        let signal = self.materialize(ctx, &proposal, price);
        if let Err(e) = validate_signal(&signal, price, &self.deps.config) {
            self.report(ctx, EngineError::from(e), "signal proposal rejected");
            return Ok(self.idle(price));
        }

        if signal.is_scheduled {
            if !ctx.is_historical {
                self.deps.persistence.write_scheduled(&signal).await?;
            }
            self.scheduled = Some(signal.clone());
            info!(
                symbol = %self.symbol,
                strategy = %self.schema.name,
                signal_id = %signal.id,
                position = %signal.position,
                price_open = signal.price_open,
                "signal scheduled"
            );
            return Ok(TickResult::Scheduled {
                signal,
                current_price: price,
            });
        }

        if !ctx.is_historical {
            self.deps.persistence.write_pending(&signal).await?;
        }
        self.pending = Some(signal.clone());
        if let Err(e) = self.deps.risk.add_signal(&signal).await {
            self.report(ctx, e.into(), "risk policy failed to register opened signal");
        }
        info!(
            symbol = %self.symbol,
            strategy = %self.schema.name,
            signal_id = %signal.id,
            position = %signal.position,
            price_open = signal.price_open,
            "signal opened"
        );
        Ok(TickResult::Opened {
            signal,
            current_price: price,
        })
    }

    async fn tick_scheduled(
        &mut self,
        ctx: &ExecutionContext,
        scheduled: Signal,
        price: f64,
    ) -> Result<TickResult, EngineError> {
        let check = evaluator::check_activation_sample(
            &scheduled,
            price,
            ctx.when,
            self.deps.config.schedule_await_minutes,
        );
        match check {
            ActivationCheck::TimedOut => {
                self.clear_scheduled(ctx).await?;
                info!(
                    symbol = %self.symbol,
                    strategy = %self.schema.name,
                    signal_id = %scheduled.id,
                    "scheduled signal cancelled: activation wait exceeded"
                );
                Ok(TickResult::Cancelled {
                    signal: scheduled,
                    current_price: price,
                    close_timestamp: ctx.when,
                })
            }
            ActivationCheck::StopLossBreached => {
                self.clear_scheduled(ctx).await?;
                warn!(
                    symbol = %self.symbol,
                    strategy = %self.schema.name,
                    signal_id = %scheduled.id,
                    price,
                    stop_loss = scheduled.price_stop_loss,
                    "scheduled signal dropped: stop loss breached before activation"
                );
                Ok(self.idle(price))
            }
            ActivationCheck::Reached => {
                match self.activate(ctx, &scheduled, price, ctx.when).await? {
                    Some(signal) => Ok(TickResult::Opened {
                        signal,
                        current_price: price,
                    }),
                    None => Ok(self.idle(price)),
                }
            }
            ActivationCheck::Waiting => Ok(TickResult::Active {
                signal: scheduled,
                current_price: price,
            }),
        }
    }

    async fn tick_active(
        &mut self,
        ctx: &ExecutionContext,
        pending: Signal,
        price: f64,
    ) -> Result<TickResult, EngineError> {
        match evaluator::evaluate_sample(&pending, price, ctx.when) {
            Some(decision) => self.close(ctx, pending, decision, price, ctx.when).await,
            None => Ok(TickResult::Active {
                signal: pending,
                current_price: price,
            }),
        }
    }

    async fn fast_forward_scheduled(
        &mut self,
        ctx: &ExecutionContext,
        scheduled: Signal,
        candles: &[Candle],
        last: &Candle,
    ) -> Result<TickResult, EngineError> {
        let await_minutes = self.deps.config.schedule_await_minutes;
        for (i, candle) in candles.iter().enumerate() {
            match evaluator::check_activation_candle(&scheduled, candle, await_minutes) {
                ActivationCheck::TimedOut | ActivationCheck::StopLossBreached => {
                    self.clear_scheduled(ctx).await?;
                    debug!(
                        symbol = %self.symbol,
                        strategy = %self.schema.name,
                        signal_id = %scheduled.id,
                        at = %candle.time,
                        "scheduled signal cancelled during fast-forward"
                    );
                    return Ok(TickResult::Cancelled {
                        signal: scheduled,
                        current_price: candle.close,
                        close_timestamp: candle.time,
                    });
                }
                ActivationCheck::Reached => {
                    let activated = self
                        .activate(ctx, &scheduled, scheduled.price_open, candle.time)
                        .await?;
                    return match activated {
                        Some(signal) => {
                            let rest = candles.get(i + 1..).unwrap_or_default();
                            self.fast_forward_active(ctx, signal, rest, last).await
                        }
                        None => Ok(TickResult::Cancelled {
                            signal: scheduled,
                            current_price: candle.close,
                            close_timestamp: candle.time,
                        }),
                    };
                }
                ActivationCheck::Waiting => {}
            }
        }

        self.clear_scheduled(ctx).await?;
        Ok(TickResult::Cancelled {
            signal: scheduled,
            current_price: last.close,
            close_timestamp: last.time,
        })
    }

    async fn fast_forward_active(
        &mut self,
        ctx: &ExecutionContext,
        pending: Signal,
        candles: &[Candle],
        last: &Candle,
    ) -> Result<TickResult, EngineError> {
        for candle in candles {
            if let Some(decision) = evaluator::evaluate_candle(&pending, candle) {
                let current_price = match decision.reason {
                    CloseReason::TimeExpired => candle.open,
                    _ => decision.price,
                };
                return self
                    .close(ctx, pending, decision, current_price, candle.time)
                    .await;
            }
        }

        let decision = CloseDecision {
            reason: CloseReason::TimeExpired,
            price: last.close,
        };
        self.close(ctx, pending, decision, last.close, last.time)
            .await
    }

    /// # Summary
    /// 挂单信号激活：再次询问风控，通过后落盘并切换槽位。
    ///
    /// # Logic
    /// 1. 风控拒绝：清除挂单并返回 None。
    /// 2. 写入在途记录；失败时状态不变并返回错误。
    /// 3. 切换内存槽位，随后删除挂单记录并登记风控；这两步的失败只上报，不影响激活结果。
    ///
    /// # Returns
    /// 激活后的信号；风控拒绝时返回 None，此时挂单槽位已被清空。
    async fn activate(
        &mut self,
        ctx: &ExecutionContext,
        scheduled: &Signal,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Signal>, EngineError> {
        let check = self.risk_check(ctx, Some(proposal_of(scheduled)), price);
        if let RiskVerdict::Reject(reason) = self.deps.risk.check_signal(&check).await? {
            self.clear_scheduled(ctx).await?;
            self.reject(reason, price);
            return Ok(None);
        }

        let activated = scheduled.activate(at);
        if !ctx.is_historical {
            self.deps.persistence.write_pending(&activated).await?;
        }
        // 在途记录落盘即视为激活完成；残留的挂单记录由平仓或启动恢复清除
        self.pending = Some(activated.clone());
        self.scheduled = None;
        if !ctx.is_historical
            && let Err(e) = self
                .deps
                .persistence
                .remove_scheduled(&self.schema.name, &self.symbol)
                .await
        {
            self.report(ctx, e.into(), "failed to remove scheduled record after activation");
        }
        if let Err(e) = self.deps.risk.add_signal(&activated).await {
            self.report(ctx, e.into(), "risk policy failed to register activated signal");
        }
        info!(
            symbol = %self.symbol,
            strategy = %self.schema.name,
            signal_id = %activated.id,
            pending_at = %activated.pending_at,
            "scheduled signal activated"
        );
        Ok(Some(activated))
    }

    async fn close(
        &mut self,
        ctx: &ExecutionContext,
        signal: Signal,
        decision: CloseDecision,
        current_price: f64,
        at: DateTime<Utc>,
    ) -> Result<TickResult, EngineError> {
        let pnl = profit_loss(&signal, decision.price, &self.deps.config);
        if !ctx.is_historical {
            // 先清除激活时可能残留的挂单记录，再删除在途记录
            self.deps
                .persistence
                .remove_scheduled(&self.schema.name, &self.symbol)
                .await?;
            self.deps
                .persistence
                .remove_pending(&self.schema.name, &self.symbol)
                .await?;
        }
        self.pending = None;
        if let Err(e) = self.deps.risk.remove_signal(&signal).await {
            self.report(ctx, e.into(), "risk policy failed to release closed signal");
        }
        info!(
            symbol = %self.symbol,
            strategy = %self.schema.name,
            signal_id = %signal.id,
            reason = %decision.reason,
            pnl = pnl.pnl_percentage,
            "signal closed"
        );
        Ok(TickResult::Closed {
            signal,
            current_price,
            close_reason: decision.reason,
            close_timestamp: at,
            pnl,
        })
    }

    /// 取消挂单信号。内存中没有在途信号时，先清除可能孤立的在途记录，再删除挂单记录。
    async fn clear_scheduled(&mut self, ctx: &ExecutionContext) -> Result<(), EngineError> {
        if !ctx.is_historical {
            if self.pending.is_none() {
                self.deps
                    .persistence
                    .remove_pending(&self.schema.name, &self.symbol)
                    .await?;
            }
            self.deps
                .persistence
                .remove_scheduled(&self.schema.name, &self.symbol)
                .await?;
        }
        self.scheduled = None;
        Ok(())
    }

    /// 已生效的状态变更之后发生的失败：不回滚，作为可恢复错误上报。
    fn report(&self, ctx: &ExecutionContext, error: EngineError, message: &'static str) {
        warn!(
            symbol = %self.symbol,
            strategy = %self.schema.name,
            error = %error,
            "{}",
            message
        );
        self.deps.events.error(ErrorEvent {
            strategy_name: Some(self.schema.name.clone()),
            context: Some(ctx.clone()),
            message: error.to_string(),
        });
    }

    fn materialize(
        &self,
        ctx: &ExecutionContext,
        proposal: &SignalProposal,
        price: f64,
    ) -> Signal {
        let scheduled_open = proposal
            .price_open
            .filter(|open| (open - price).abs() > f64::EPSILON);
        Signal {
            id: Uuid::new_v4().to_string(),
            symbol: self.symbol.clone(),
            strategy_name: self.schema.name.clone(),
            exchange_name: self.deps.exchange.name().to_string(),
            position: proposal.position,
            price_open: scheduled_open.unwrap_or(price),
            price_take_profit: proposal.price_take_profit,
            price_stop_loss: proposal.price_stop_loss,
            minute_estimated_time: proposal.minute_estimated_time,
            note: proposal.note.clone(),
            scheduled_at: ctx.when,
            pending_at: ctx.when,
            is_scheduled: scheduled_open.is_some(),
        }
    }

    fn risk_check(
        &self,
        ctx: &ExecutionContext,
        proposal: Option<SignalProposal>,
        price: f64,
    ) -> RiskCheck {
        RiskCheck {
            symbol: self.symbol.clone(),
            strategy_name: self.schema.name.clone(),
            exchange_name: self.deps.exchange.name().to_string(),
            proposal,
            current_price: price,
            when: ctx.when,
        }
    }

    fn reject(&self, reason: String, price: f64) {
        info!(
            symbol = %self.symbol,
            strategy = %self.schema.name,
            reason = %reason,
            "risk policy rejected signal"
        );
        self.deps.events.risk(RiskEvent {
            symbol: self.symbol.clone(),
            strategy_name: self.schema.name.clone(),
            reason,
            current_price: price,
        });
    }

    fn idle(&self, price: f64) -> TickResult {
        TickResult::Idle {
            symbol: self.symbol.clone(),
            strategy_name: self.schema.name.clone(),
            current_price: price,
        }
    }

    fn owns(&self, signal: &Signal) -> bool {
        signal.strategy_name == self.schema.name
            && signal.exchange_name == self.deps.exchange.name()
            && signal.symbol == self.symbol
    }

    fn emit(&self, ctx: &ExecutionContext, result: &TickResult) {
        debug!(
            symbol = %self.symbol,
            strategy = %self.schema.name,
            action = result.action(),
            when = %ctx.when,
            "tick"
        );
        self.deps.events.signal(SignalEvent {
            is_historical: ctx.is_historical,
            result: result.clone(),
        });
    }
}

fn proposal_of(signal: &Signal) -> SignalProposal {
    SignalProposal {
        position: signal.position,
        price_open: Some(signal.price_open),
        price_take_profit: signal.price_take_profit,
        price_stop_loss: signal.price_stop_loss,
        minute_estimated_time: signal.minute_estimated_time,
        note: signal.note.clone(),
    }
}
