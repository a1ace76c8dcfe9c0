use crate::registry::{ClientKey, ClientRegistry};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_core::common::time::TimeProvider;
use vigil_core::engine::error::EngineError;
use vigil_core::signal::port::StrategySchema;
use vigil_engine::backtest::BacktestRun;
use vigil_engine::client::{ClientDeps, StrategyClient};
use vigil_engine::frame::FrameSchema;
use vigil_engine::live::LiveRun;
use vigil_engine::stats::WalkerMetric;
use vigil_engine::walker::WalkerRun;

/// # Summary
/// Manager 层的统一错误类型。
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Strategy not found: {0}")]
    NotFound(String),
    #[error("Strategy already registered: {0}")]
    AlreadyExists(String),
    #[error("Strategy already running: {0}")]
    AlreadyRunning(String),
    #[error("Strategy not running: {0}")]
    NotRunning(String),
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),
}

/// 运行中的实盘任务
struct LiveTask {
    // 区分同一个键上先后启动的任务
    id: Uuid,
    cancel: CancellationToken,
}

/// # Summary
/// 策略管理器，系统的应用服务层门面 (Facade)。
/// 持有策略注册表、状态机实例注册表与实盘任务表，所有协作方通过构造函数注入。
///
/// # Invariants
/// - 每个 `(symbol, strategy)` 至多一个实盘任务，任务结束后自行从任务表移除。
/// - 实盘任务共享注册表中的状态机实例；回测与对比每次使用全新的实例，不影响实盘状态。
/// - 所有驱动器的取消令牌都派生自管理器的根令牌，`shutdown` 一次性停止全部运行。
pub struct StrategyManager {
    deps: ClientDeps,
    clock: Arc<dyn TimeProvider>,
    schemas: DashMap<String, StrategySchema>,
    registry: ClientRegistry,
    live_tasks: Arc<DashMap<ClientKey, LiveTask>>,
    root: CancellationToken,
}

impl StrategyManager {
    /// # Summary
    /// 创建 StrategyManager 实例。
    ///
    /// # Arguments
    /// * `deps` - 交易所、风控、持久化、配置与事件总线。
    /// * `clock` - 实盘驱动器使用的时钟。
    ///
    /// # Returns
    /// * `Arc<Self>` - 可共享的管理器实例。
    pub fn new(deps: ClientDeps, clock: Arc<dyn TimeProvider>) -> Arc<Self> {
        Arc::new(Self {
            deps,
            clock,
            schemas: DashMap::new(),
            registry: ClientRegistry::new(),
            live_tasks: Arc::new(DashMap::new()),
            root: CancellationToken::new(),
        })
    }

    /// 注册策略，名称重复时拒绝。
    pub fn add_strategy(&self, schema: StrategySchema) -> Result<(), ManagerError> {
        match self.schemas.entry(schema.name.clone()) {
            Entry::Occupied(_) => Err(ManagerError::AlreadyExists(schema.name)),
            Entry::Vacant(slot) => {
                info!(strategy = %schema.name, interval = %schema.interval, "strategy registered");
                slot.insert(schema);
                Ok(())
            }
        }
    }

    /// 已注册的策略名称，按字典序排列。
    pub fn strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// # Summary
    /// 获取（必要时构建）某个组合的共享状态机实例。
    pub fn client(
        &self,
        symbol: &str,
        strategy: &str,
    ) -> Result<Arc<Mutex<StrategyClient>>, ManagerError> {
        let schema = self.schema(strategy)?;
        Ok(self.registry.get_or_create(symbol, &schema, &self.deps))
    }

    /// # Summary
    /// 启动一个实盘任务。
    ///
    /// # Logic
    /// 1. 在任务表中占位，同一组合已有任务时拒绝。
    /// 2. 从注册表取得共享实例。
    /// 3. tokio::spawn 执行实盘驱动器直到被取消。
    /// 4. 协程结束后按任务 ID 清理任务表，不会误删随后重新启动的任务。
    ///
    /// # Returns
    /// * `Result<Uuid, ManagerError>` - 成功返回任务 ID。
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn start_live(&self, symbol: &str, strategy: &str) -> Result<Uuid, ManagerError> {
        let schema = self.schema(strategy)?;
        let key: ClientKey = (symbol.to_string(), strategy.to_string());
        let id = Uuid::new_v4();
        let cancel = self.root.child_token();

        match self.live_tasks.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(ManagerError::AlreadyRunning(format!("{}:{}", strategy, symbol)));
            }
            Entry::Vacant(slot) => {
                slot.insert(LiveTask {
                    id,
                    cancel: cancel.clone(),
                });
            }
        }

        let client = self.registry.get_or_create(symbol, &schema, &self.deps);
        let clock = self.clock.clone();
        let events = self.deps.events.clone();
        let interval = Duration::from_millis(self.deps.config.tick_interval_ms);
        let live_tasks = self.live_tasks.clone();

        tokio::spawn(async move {
            LiveRun::new(client, clock, events, interval, cancel)
                .await
                .run()
                .await;
            live_tasks.remove_if(&key, |_, task| task.id == id);
            info!(symbol = %key.0, strategy = %key.1, task_id = %id, "live task exited");
        });

        info!(symbol = %symbol, strategy = %strategy, task_id = %id, "live task started");
        Ok(id)
    }

    /// # Summary
    /// 请求停止一个实盘任务。进行中的一步会先完成。
    pub fn stop_live(&self, symbol: &str, strategy: &str) -> Result<(), ManagerError> {
        let key: ClientKey = (symbol.to_string(), strategy.to_string());
        let Some((_, task)) = self.live_tasks.remove(&key) else {
            return Err(ManagerError::NotRunning(format!("{}:{}", strategy, symbol)));
        };
        task.cancel.cancel();
        info!(symbol = %symbol, strategy = %strategy, task_id = %task.id, "live task stop requested");
        Ok(())
    }

    pub fn is_running(&self, symbol: &str, strategy: &str) -> bool {
        self.live_tasks
            .contains_key(&(symbol.to_string(), strategy.to_string()))
    }

    /// # Summary
    /// 为单个策略构建历史驱动器，使用全新的状态机实例。
    ///
    /// # Arguments
    /// * `frame` - 时间框架，决定时间轴。
    pub fn backtest(
        &self,
        symbol: &str,
        strategy: &str,
        frame: &FrameSchema,
    ) -> Result<BacktestRun, ManagerError> {
        let schema = self.schema(strategy)?;
        let timeline = frame.timeline()?;
        let client = StrategyClient::new(symbol, schema, self.deps.clone());
        Ok(BacktestRun::new(
            client,
            self.deps.exchange.clone(),
            self.deps.events.clone(),
            &timeline,
            frame.name.clone(),
            self.deps.config.schedule_await_minutes,
            self.root.child_token(),
        ))
    }

    /// # Summary
    /// 为一组策略构建对比驱动器。
    ///
    /// # Arguments
    /// * `strategies` - 参与对比的策略名称，按顺序执行。
    /// * `metric` - 评选指标名称，例如 `sharpeRatio`。
    pub fn walker(
        &self,
        symbol: &str,
        strategies: &[&str],
        metric: &str,
        frame: &FrameSchema,
    ) -> Result<WalkerRun, ManagerError> {
        let metric: WalkerMetric = metric.parse().map_err(ManagerError::InvalidMetric)?;
        let schemas = strategies
            .iter()
            .map(|name| self.schema(name))
            .collect::<Result<Vec<_>, _>>()?;
        let timeline = frame.timeline()?;
        Ok(WalkerRun::new(
            symbol,
            schemas,
            metric,
            frame.name.clone(),
            timeline,
            self.deps.clone(),
            self.root.child_token(),
        ))
    }

    /// # Summary
    /// 释放某个组合：停止其实盘任务（如有）并移除共享实例。
    ///
    /// # Logic
    /// 1. 取消实盘任务。
    /// 2. 取得实例锁，等待进行中的一步结束；已取消的任务拿到锁后不会再推进实例。
    /// 3. 持锁从注册表移除实例。
    ///
    /// # Returns
    /// 实例存在过时返回 true。返回后旧实例不再被推进。
    pub async fn dispose(&self, symbol: &str, strategy: &str) -> bool {
        if self.stop_live(symbol, strategy).is_ok() {
            warn!(symbol = %symbol, strategy = %strategy, "disposing client with a running live task");
        }
        let Some(client) = self.registry.get(symbol, strategy) else {
            return false;
        };
        let _guard = client.lock().await;
        self.registry.dispose(symbol, strategy)
    }

    /// 取消全部实盘任务与尚未结束的驱动器。
    pub fn shutdown(&self) {
        info!(live_tasks = self.live_tasks.len(), "manager shutting down");
        self.root.cancel();
    }

    fn schema(&self, strategy: &str) -> Result<StrategySchema, ManagerError> {
        self.schemas
            .get(strategy)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ManagerError::NotFound(strategy.to_string()))
    }
}
