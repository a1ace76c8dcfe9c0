use crate::client::StrategyClient;
use crate::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::common::time::TimeProvider;
use vigil_core::context::{self, ExecutionContext, MethodContext};
use vigil_core::engine::entity::{DoneEvent, ErrorEvent};
use vigil_core::engine::error::EngineError;
use vigil_core::signal::entity::TickResult;

/// # Summary
/// 实盘驱动器：按固定间隔以当前时刻推进状态机，直到被取消。
///
/// # Invariants
/// - 每一步在 `(symbol, when = now, is_historical = false)` 执行上下文内执行。
/// - 只向调用方产出 `Opened` / `Closed` / `Cancelled`，其余结果在内部消化（仍会投递信号事件）。
/// - 取消在每轮开始前、休眠期间以及取得实例锁之后检查；已经开始的一步总会完成。
/// - 单步失败投递到错误通道，下一轮照常进行。
pub struct LiveRun {
    client: Arc<Mutex<StrategyClient>>,
    clock: Arc<dyn TimeProvider>,
    events: EventBus,
    method: MethodContext,
    symbol: String,
    tick_interval: Duration,
    cancel: CancellationToken,
    // 上一轮已执行，下次拉取前需要先休眠
    needs_sleep: bool,
    finished: bool,
}

impl LiveRun {
    /// # Summary
    /// 创建实盘驱动器。
    ///
    /// # Arguments
    /// * `client`: 注册表中共享的状态机实例。
    /// * `clock`: 提供每一步 `when` 的时钟。
    /// * `tick_interval`: 两步之间的休眠。
    /// * `cancel`: 协作式取消令牌。
    pub async fn new(
        client: Arc<Mutex<StrategyClient>>,
        clock: Arc<dyn TimeProvider>,
        events: EventBus,
        tick_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (symbol, method) = {
            let guard = client.lock().await;
            (
                guard.symbol().to_string(),
                MethodContext {
                    strategy_name: guard.strategy_name().to_string(),
                    exchange_name: guard.exchange_name().to_string(),
                    frame_name: String::new(),
                },
            )
        };
        Self {
            client,
            clock,
            events,
            method,
            symbol,
            tick_interval,
            cancel,
            needs_sleep: false,
            finished: false,
        }
    }

    /// # Summary
    /// 拉取下一个对外可见的结果（开仓、平仓或取消）。
    ///
    /// # Returns
    /// 被取消时返回 None，并投递一次 done 事件。
    pub async fn next(&mut self) -> Option<TickResult> {
        while !self.finished {
            if self.needs_sleep {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.tick_interval) => {}
                }
            }
            if self.cancel.is_cancelled() {
                info!(strategy = %self.method.strategy_name, symbol = %self.symbol, "live run stopped");
                self.finished = true;
                self.events.done(DoneEvent {
                    symbol: self.symbol.clone(),
                    strategy_name: self.method.strategy_name.clone(),
                    exchange_name: self.method.exchange_name.clone(),
                    is_historical: false,
                });
                break;
            }

            self.needs_sleep = true;
            let ctx = ExecutionContext {
                symbol: self.symbol.clone(),
                when: self.clock.now(),
                is_historical: false,
            };
            let outcome = context::with_method(
                self.method.clone(),
                context::with_execution(ctx.clone(), step(&self.client, &self.cancel)),
            )
            .await;

            match outcome {
                Ok(Some(
                    result @ (TickResult::Opened { .. }
                    | TickResult::Closed { .. }
                    | TickResult::Cancelled { .. }),
                )) => return Some(result),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        strategy = %self.method.strategy_name,
                        symbol = %self.symbol,
                        when = %ctx.when,
                        error = %e,
                        "live step failed"
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

    /// 运行直到被取消，丢弃产出的结果（它们已经通过信号事件投递）。
    pub async fn run(mut self) {
        while self.next().await.is_some() {}
    }
}

/// 启动恢复只在第一次成功前执行；失败时下一轮重试。
/// 等锁期间被取消时不推进实例，返回 None。
async fn step(
    client: &Mutex<StrategyClient>,
    cancel: &CancellationToken,
) -> Result<Option<TickResult>, EngineError> {
    let mut client = client.lock().await;
    if cancel.is_cancelled() {
        return Ok(None);
    }
    client.wait_for_init().await?;
    client.tick().await.map(Some)
}
