use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use std::sync::Mutex;
use vigil_cache::mem::MemCache;
use vigil_core::common::time::FakeClockProvider;
use vigil_core::common::{CandleInterval, SignalInterval};
use vigil_core::config::EngineConfig;
use vigil_core::context;
use vigil_core::market::entity::Candle;
use vigil_core::market::error::MarketError;
use vigil_core::market::port::Exchange;
use vigil_core::risk::port::NoRisk;
use vigil_core::signal::entity::{Position, SignalProposal, TickResult};
use vigil_core::signal::error::StrategyError;
use vigil_core::signal::port::{SignalSource, StrategySchema};
use vigil_engine::client::ClientDeps;
use vigil_engine::events::{EventBus, EventStreams};
use vigil_engine::frame::FrameSchema;
use vigil_engine::persist::SignalPersistence;
use vigil_manager::strategy::{ManagerError, StrategyManager};

const SYMBOL: &str = "BTCUSDT";
const WAIT: std::time::Duration = std::time::Duration::from_secs(2);

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// 30 分钟前价格为 42000，之后为 43100。
struct StepExchange;

impl StepExchange {
    fn price(when: DateTime<Utc>) -> f64 {
        if when < at(30) { 42_000.0 } else { 43_100.0 }
    }

    fn candle(time: DateTime<Utc>) -> Candle {
        let open = Self::price(time);
        let close = Self::price(time + Duration::minutes(1));
        Candle {
            time,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1.0,
        }
    }

    fn when() -> Result<DateTime<Utc>, MarketError> {
        context::execution()
            .map(|c| c.when)
            .map_err(|e| MarketError::Unknown(e.to_string()))
    }
}

#[async_trait]
impl Exchange for StepExchange {
    fn name(&self) -> &str {
        "step"
    }

    async fn get_candles(
        &self,
        _symbol: &str,
        _interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let when = Self::when()?;
        Ok((1..=limit)
            .rev()
            .map(|i| Self::candle(when - Duration::minutes(i64::try_from(i).unwrap())))
            .collect())
    }

    async fn get_next_candles(
        &self,
        _symbol: &str,
        _interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let when = Self::when()?;
        Ok((0..limit)
            .map(|i| Self::candle(when + Duration::minutes(i64::try_from(i).unwrap())))
            .collect())
    }

    async fn get_average_price(&self, _symbol: &str) -> Result<f64, MarketError> {
        Ok(Self::price(Self::when()?))
    }
}

/// 只给出一次提案的信号源
struct OneShot {
    proposal: Mutex<Option<SignalProposal>>,
}

impl OneShot {
    fn new(proposal: Option<SignalProposal>) -> Arc<Self> {
        Arc::new(Self {
            proposal: Mutex::new(proposal),
        })
    }
}

#[async_trait]
impl SignalSource for OneShot {
    async fn get_signal(
        &self,
        _symbol: &str,
        _when: DateTime<Utc>,
    ) -> Result<Option<SignalProposal>, StrategyError> {
        Ok(self.proposal.lock().unwrap().take())
    }
}

fn long() -> Option<SignalProposal> {
    Some(SignalProposal {
        position: Position::Long,
        price_open: None,
        price_take_profit: 43_000.0,
        price_stop_loss: 41_000.0,
        minute_estimated_time: 60,
        note: None,
    })
}

fn short() -> Option<SignalProposal> {
    Some(SignalProposal {
        position: Position::Short,
        price_open: None,
        price_take_profit: 41_000.0,
        price_stop_loss: 43_000.0,
        minute_estimated_time: 60,
        note: None,
    })
}

fn schema(name: &str, source: Arc<OneShot>) -> StrategySchema {
    StrategySchema {
        name: name.to_string(),
        interval: SignalInterval::Minute1,
        source,
    }
}

fn frame() -> FrameSchema {
    FrameSchema {
        name: "2h".to_string(),
        interval: CandleInterval::Minute1,
        start: at(0),
        end: at(120),
    }
}

fn setup() -> (Arc<StrategyManager>, EventStreams, Arc<MemCache>) {
    let store = Arc::new(MemCache::new());
    let (events, streams) = EventBus::channel();
    let config = EngineConfig {
        tick_interval_ms: 5,
        ..EngineConfig::default()
    };
    let deps = ClientDeps {
        exchange: Arc::new(StepExchange),
        risk: Arc::new(NoRisk),
        persistence: SignalPersistence::new(store.clone()),
        config,
        events,
    };
    let manager = StrategyManager::new(deps, Arc::new(FakeClockProvider::new(at(0))));
    (manager, streams, store)
}

#[tokio::test]
async fn test_strategy_registration() {
    let (manager, _streams, _store) = setup();

    manager.add_strategy(schema("zeta", OneShot::new(None))).unwrap();
    manager.add_strategy(schema("alpha", OneShot::new(None))).unwrap();
    let duplicate = manager.add_strategy(schema("zeta", OneShot::new(None)));

    assert!(matches!(duplicate, Err(ManagerError::AlreadyExists(name)) if name == "zeta"));
    assert_eq!(manager.strategies(), vec!["alpha".to_string(), "zeta".to_string()]);
    assert!(matches!(
        manager.backtest(SYMBOL, "missing", &frame()),
        Err(ManagerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_client_registry_memoizes_until_dispose() {
    let (manager, _streams, _store) = setup();
    manager.add_strategy(schema("trend", OneShot::new(None))).unwrap();

    let first = manager.client(SYMBOL, "trend").unwrap();
    let again = manager.client(SYMBOL, "trend").unwrap();
    let other_symbol = manager.client("ETHUSDT", "trend").unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other_symbol));

    assert!(manager.dispose(SYMBOL, "trend").await);
    assert!(!manager.dispose(SYMBOL, "trend").await);
    let rebuilt = manager.client(SYMBOL, "trend").unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[tokio::test]
async fn test_live_task_lifecycle() {
    let (manager, mut streams, store) = setup();
    manager.add_strategy(schema("trend", OneShot::new(long()))).unwrap();

    manager.start_live(SYMBOL, "trend").unwrap();
    assert!(manager.is_running(SYMBOL, "trend"));
    assert!(matches!(
        manager.start_live(SYMBOL, "trend"),
        Err(ManagerError::AlreadyRunning(_))
    ));

    // 第一个对外可见的信号事件必然是开仓
    let opened = loop {
        let event = tokio::time::timeout(WAIT, streams.signal.recv())
            .await
            .unwrap()
            .unwrap();
        if event.result.action() != "idle" {
            break event;
        }
    };
    assert_eq!(opened.result.action(), "opened");
    assert!(!opened.is_historical);
    assert_eq!(store.len(), 1);

    manager.stop_live(SYMBOL, "trend").unwrap();
    assert!(!manager.is_running(SYMBOL, "trend"));
    let done = tokio::time::timeout(WAIT, streams.done.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!done.is_historical);
    assert!(matches!(
        manager.stop_live(SYMBOL, "trend"),
        Err(ManagerError::NotRunning(_))
    ));

    // 实盘任务推进的是注册表中的共享实例
    let client = manager.client(SYMBOL, "trend").unwrap();
    assert!(client.lock().await.pending_signal().is_some());
}

#[tokio::test]
async fn test_dispose_waits_out_running_live_task() {
    let (manager, mut streams, _store) = setup();
    manager.add_strategy(schema("trend", OneShot::new(long()))).unwrap();
    let first = manager.client(SYMBOL, "trend").unwrap();
    manager.start_live(SYMBOL, "trend").unwrap();

    loop {
        let event = tokio::time::timeout(WAIT, streams.signal.recv())
            .await
            .unwrap()
            .unwrap();
        if event.result.action() == "opened" {
            break;
        }
    }

    assert!(manager.dispose(SYMBOL, "trend").await);
    assert!(!manager.is_running(SYMBOL, "trend"));
    let done = tokio::time::timeout(WAIT, streams.done.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.strategy_name, "trend");

    // 释放返回后旧实例不再被推进
    while streams.signal.try_recv().is_ok() {}
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(streams.signal.try_recv().is_err());
    assert!(first.lock().await.pending_signal().is_some());

    let rebuilt = manager.client(SYMBOL, "trend").unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert!(rebuilt.lock().await.pending_signal().is_none());
}

#[tokio::test]
async fn test_shutdown_stops_every_live_task() {
    let (manager, mut streams, _store) = setup();
    manager.add_strategy(schema("a", OneShot::new(None))).unwrap();
    manager.add_strategy(schema("b", OneShot::new(None))).unwrap();
    manager.start_live(SYMBOL, "a").unwrap();
    manager.start_live(SYMBOL, "b").unwrap();

    manager.shutdown();

    for _ in 0..2 {
        tokio::time::timeout(WAIT, streams.done.recv())
            .await
            .unwrap()
            .unwrap();
    }
    // 任务退出后自行清理任务表
    tokio::time::timeout(WAIT, async {
        while manager.is_running(SYMBOL, "a") || manager.is_running(SYMBOL, "b") {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_backtest_uses_fresh_client() {
    let (manager, _streams, store) = setup();
    manager.add_strategy(schema("trend", OneShot::new(long()))).unwrap();

    let results = manager.backtest(SYMBOL, "trend", &frame()).unwrap().collect().await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], TickResult::Closed { .. }));
    assert!(store.is_empty());
    let shared = manager.client(SYMBOL, "trend").unwrap();
    assert!(shared.lock().await.pending_signal().is_none());
}

#[tokio::test]
async fn test_walker_through_manager() {
    let (manager, mut streams, _store) = setup();
    manager.add_strategy(schema("winner", OneShot::new(long()))).unwrap();
    manager.add_strategy(schema("loser", OneShot::new(short()))).unwrap();

    assert!(matches!(
        manager.walker(SYMBOL, &["winner"], "bestEver", &frame()),
        Err(ManagerError::InvalidMetric(_))
    ));
    assert!(matches!(
        manager.walker(SYMBOL, &["winner", "ghost"], "avgPnl", &frame()),
        Err(ManagerError::NotFound(name)) if name == "ghost"
    ));

    let mut walker = manager
        .walker(SYMBOL, &["loser", "winner"], "totalPnl", &frame())
        .unwrap();
    let last = walker.run_to_end().await.unwrap();

    assert_eq!(last.best_strategy.as_deref(), Some("winner"));
    assert_eq!(last.metric, "totalPnl");
    assert!(streams.progress.try_recv().is_ok());
}
