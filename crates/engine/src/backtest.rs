use crate::client::StrategyClient;
use crate::events::EventBus;
use crate::frame::Timeline;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::common::CandleInterval;
use vigil_core::context::{self, ExecutionContext, MethodContext};
use vigil_core::engine::entity::{DoneEvent, ErrorEvent};
use vigil_core::engine::error::EngineError;
use vigil_core::market::port::Exchange;
use vigil_core::signal::entity::TickResult;

/// # Summary
/// 历史驱动器：沿预先计算的时间轴推进一个状态机实例，逐个产出 `Closed` / `Cancelled`。
///
/// # Invariants
/// - 每个时刻在 `(symbol, when, is_historical = true)` 执行上下文内执行，不落盘、不休眠。
/// - 信号开出（或挂单）后立即拉取未来 1 分钟 K 线快进到终态，早于终态时刻的时刻被跳过。
/// - 取消只在两个时刻之间生效，进行中的一步总会完成。
/// - 单步失败投递到错误通道后继续下一个时刻。
pub struct BacktestRun {
    client: StrategyClient,
    exchange: Arc<dyn Exchange>,
    events: EventBus,
    method: MethodContext,
    instants: Vec<DateTime<Utc>>,
    cursor: usize,
    // 快进得到的终态时刻，之前的时刻不再处理
    skip_until: Option<DateTime<Utc>>,
    schedule_await_minutes: u32,
    cancel: CancellationToken,
    finished: bool,
}

impl BacktestRun {
    /// # Summary
    /// 创建历史驱动器。
    ///
    /// # Arguments
    /// * `client`: 本次运行专用的状态机实例。
    /// * `exchange`: 快进时拉取未来 K 线的交易所。
    /// * `timeline`: 时间轴。
    /// * `frame_name`: 时间框架名称，写入方法上下文。
    /// * `cancel`: 协作式取消令牌。
    pub fn new(
        client: StrategyClient,
        exchange: Arc<dyn Exchange>,
        events: EventBus,
        timeline: &Timeline,
        frame_name: impl Into<String>,
        schedule_await_minutes: u32,
        cancel: CancellationToken,
    ) -> Self {
        let method = MethodContext {
            strategy_name: client.strategy_name().to_string(),
            exchange_name: client.exchange_name().to_string(),
            frame_name: frame_name.into(),
        };
        Self {
            client,
            exchange,
            events,
            method,
            instants: timeline.instants().to_vec(),
            cursor: 0,
            skip_until: None,
            schedule_await_minutes,
            cancel,
            finished: false,
        }
    }

    /// 本次运行的状态机实例。
    pub fn client(&self) -> &StrategyClient {
        &self.client
    }

    /// # Summary
    /// 拉取下一个终态结果。
    ///
    /// # Returns
    /// 时间轴耗尽或被取消时返回 None，并投递一次 done 事件。
    pub async fn next(&mut self) -> Option<TickResult> {
        while !self.finished {
            if self.cancel.is_cancelled() {
                info!(strategy = %self.method.strategy_name, symbol = %self.client.symbol(), "backtest cancelled");
                self.finish();
                break;
            }
            let Some(when) = self.instants.get(self.cursor).copied() else {
                self.finish();
                break;
            };
            self.cursor += 1;

            if self.skip_until.is_some_and(|until| when < until) {
                continue;
            }

            let ctx = ExecutionContext {
                symbol: self.client.symbol().to_string(),
                when,
                is_historical: true,
            };
            let method = self.method.clone();
            let outcome =
                context::with_method(method, context::with_execution(ctx.clone(), self.step()))
                    .await;

            match outcome {
                Ok(Some(result)) => {
                    self.skip_until = result.close_timestamp();
                    return Some(result);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        strategy = %self.method.strategy_name,
                        symbol = %ctx.symbol,
                        when = %when,
                        error = %e,
                        "backtest step failed"
                    );
                    self.events.error(ErrorEvent {
                        strategy_name: Some(self.method.strategy_name.clone()),
                        context: Some(ctx),
                        message: e.to_string(),
                    });
                }
            }
        }
        None
    }

    /// 运行到底，收集全部终态结果。
    pub async fn collect(mut self) -> Vec<TickResult> {
        let mut results = Vec::new();
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    /// 转换为异步流，每次拉取推进到下一个终态结果。
    pub fn into_stream(self) -> impl Stream<Item = TickResult> {
        futures::stream::unfold(self, |mut run| async move {
            run.next().await.map(|result| (result, run))
        })
    }

    /// 单个时刻：普通 tick，开出或挂单后快进。
    async fn step(&mut self) -> Result<Option<TickResult>, EngineError> {
        let result = self.client.tick().await?;
        let limit = match &result {
            TickResult::Closed { .. } | TickResult::Cancelled { .. } => return Ok(Some(result)),
            TickResult::Opened { signal, .. } => signal.minute_estimated_time.saturating_add(1),
            TickResult::Scheduled { signal, .. } => {
                signal
                    .minute_estimated_time
                    .saturating_add(self.schedule_await_minutes)
                    .saturating_add(1)
            }
            TickResult::Idle { .. } | TickResult::Active { .. } => return Ok(None),
        };

        let limit = usize::try_from(limit)
            .map_err(|_| EngineError::InvalidState(format!("candle limit {} overflows", limit)))?;
        let candles = self
            .exchange
            .get_next_candles(self.client.symbol(), CandleInterval::Minute1, limit)
            .await?;
        if candles.is_empty() {
            warn!(
                strategy = %self.method.strategy_name,
                symbol = %self.client.symbol(),
                "no future candles, signal stays on regular ticks"
            );
            return Ok(None);
        }

        self.client.backtest(&candles).await.map(Some)
    }

    fn finish(&mut self) {
        self.finished = true;
        self.events.done(DoneEvent {
            symbol: self.client.symbol().to_string(),
            strategy_name: self.method.strategy_name.clone(),
            exchange_name: self.method.exchange_name.clone(),
            is_historical: true,
        });
    }
}
