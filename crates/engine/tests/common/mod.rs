#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vigil_cache::mem::MemCache;
use vigil_core::common::{CandleInterval, SignalInterval};
use vigil_core::config::EngineConfig;
use vigil_core::context::{self, ExecutionContext};
use vigil_core::market::entity::Candle;
use vigil_core::market::error::MarketError;
use vigil_core::market::port::Exchange;
use vigil_core::persist::error::PersistError;
use vigil_core::persist::port::PersistStore;
use vigil_core::risk::error::RiskError;
use vigil_core::risk::port::{RiskCheck, RiskPolicy, RiskVerdict};
use vigil_core::signal::entity::{Position, Signal, SignalProposal};
use vigil_core::signal::error::StrategyError;
use vigil_core::signal::port::{SignalSource, StrategySchema};
use vigil_engine::client::ClientDeps;
use vigil_engine::events::EventBus;
use vigil_engine::persist::SignalPersistence;

pub const SYMBOL: &str = "BTCUSDT";
pub const EXCHANGE: &str = "mock-exchange";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

pub fn ctx(when: DateTime<Utc>, is_historical: bool) -> ExecutionContext {
    ExecutionContext {
        symbol: SYMBOL.to_string(),
        when,
        is_historical,
    }
}

type PricePath = Box<dyn Fn(DateTime<Utc>) -> f64 + Send + Sync>;

/// # Summary
/// 模拟交易所：价格由时间函数给出，可被测试临时覆盖或设置为失败。
pub struct MockExchange {
    path: PricePath,
    override_price: Mutex<Option<f64>>,
    failing: AtomicBool,
    pub next_candle_calls: AtomicUsize,
}

impl MockExchange {
    pub fn with_path(path: impl Fn(DateTime<Utc>) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            path: Box::new(path),
            override_price: Mutex::new(None),
            failing: AtomicBool::new(false),
            next_candle_calls: AtomicUsize::new(0),
        }
    }

    pub fn fixed(price: f64) -> Self {
        Self::with_path(move |_| price)
    }

    pub fn set_price(&self, price: f64) {
        *self.override_price.lock().unwrap() = Some(price);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn price_at(&self, when: DateTime<Utc>) -> f64 {
        let overridden = *self.override_price.lock().unwrap();
        overridden.unwrap_or_else(|| (self.path)(when))
    }

    fn candle_at(&self, time: DateTime<Utc>, interval: CandleInterval) -> Candle {
        let open = self.price_at(time);
        let close = self.price_at(time + interval.duration());
        Candle {
            time,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1.0,
        }
    }

    fn check(&self) -> Result<DateTime<Utc>, MarketError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MarketError::Network("exchange unavailable".to_string()));
        }
        context::execution()
            .map(|c| c.when)
            .map_err(|e| MarketError::Unknown(e.to_string()))
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &str {
        EXCHANGE
    }

    async fn get_candles(
        &self,
        _symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let when = self.check()?;
        Ok((1..=limit)
            .rev()
            .map(|i| {
                let back = interval.duration() * i32::try_from(i).unwrap();
                self.candle_at(when - back, interval)
            })
            .collect())
    }

    async fn get_next_candles(
        &self,
        _symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let when = self.check()?;
        self.next_candle_calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..limit)
            .map(|i| {
                let offset = interval.duration() * i32::try_from(i).unwrap();
                self.candle_at(when + offset, interval)
            })
            .collect())
    }

    async fn get_average_price(&self, _symbol: &str) -> Result<f64, MarketError> {
        let when = self.check()?;
        Ok(self.price_at(when))
    }
}

/// # Summary
/// 按脚本依次返回提案的信号源，脚本耗尽后返回 None。
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<SignalProposal>>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<SignalProposal>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn once(proposal: SignalProposal) -> Self {
        Self::new(vec![Some(proposal)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalSource for ScriptedSource {
    async fn get_signal(
        &self,
        _symbol: &str,
        _when: DateTime<Utc>,
    ) -> Result<Option<SignalProposal>, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.lock().unwrap().pop_front().flatten())
    }
}

/// # Summary
/// 记录调用时可见的环境上下文的信号源。
#[derive(Default)]
pub struct ContextProbe {
    pub seen: Mutex<Vec<(bool, String, String)>>,
}

#[async_trait]
impl SignalSource for ContextProbe {
    async fn get_signal(
        &self,
        _symbol: &str,
        _when: DateTime<Utc>,
    ) -> Result<Option<SignalProposal>, StrategyError> {
        let exec = context::execution().map_err(|e| StrategyError::Source(e.to_string()))?;
        let method = context::method().map_err(|e| StrategyError::Source(e.to_string()))?;
        self.seen.lock().unwrap().push((
            exec.is_historical,
            method.strategy_name,
            method.frame_name,
        ));
        Ok(None)
    }
}

/// # Summary
/// 计数型风控：记录 add/remove 次数，可配置为拒绝或登记失败。
#[derive(Default)]
pub struct CountingRisk {
    pub reject: AtomicBool,
    // add/remove 返回后端错误（计数仍然增加）
    pub broken: AtomicBool,
    pub checks: AtomicUsize,
    pub adds: AtomicUsize,
    pub removes: AtomicUsize,
}

impl CountingRisk {
    pub fn rejecting() -> Self {
        let risk = Self::default();
        risk.reject.store(true, Ordering::SeqCst);
        risk
    }

    pub fn broken() -> Self {
        let risk = Self::default();
        risk.broken.store(true, Ordering::SeqCst);
        risk
    }

    fn outcome(&self) -> Result<(), RiskError> {
        if self.broken.load(Ordering::SeqCst) {
            Err(RiskError::Backend("risk backend down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RiskPolicy for CountingRisk {
    async fn check_signal(&self, _check: &RiskCheck) -> Result<RiskVerdict, RiskError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            Ok(RiskVerdict::Reject("position limit reached".to_string()))
        } else {
            Ok(RiskVerdict::Accept)
        }
    }

    async fn add_signal(&self, _signal: &Signal) -> Result<(), RiskError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn remove_signal(&self, _signal: &Signal) -> Result<(), RiskError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

/// # Summary
/// 写入总是失败的持久化后端。
pub struct FailingStore;

#[async_trait]
impl PersistStore for FailingStore {
    async fn write_raw(&self, _key: &str, _value: Vec<u8>) -> Result<(), PersistError> {
        Err(PersistError::Storage("disk full".to_string()))
    }

    async fn read_raw(&self, _key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(None)
    }

    async fn remove(&self, _key: &str) -> Result<(), PersistError> {
        Ok(())
    }
}

/// # Summary
/// 内存存储的包装，删除操作可被临时设置为失败。
#[derive(Default)]
pub struct FlakyStore {
    inner: MemCache,
    pub fail_removes: AtomicBool,
}

impl FlakyStore {
    pub async fn has(&self, key: &str) -> bool {
        self.inner.read_raw(key).await.unwrap().is_some()
    }
}

#[async_trait]
impl PersistStore for FlakyStore {
    async fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        self.inner.write_raw(key, value).await
    }

    async fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        self.inner.read_raw(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(PersistError::Storage("io".to_string()));
        }
        self.inner.remove(key).await
    }
}

pub fn proposal(
    position: Position,
    price_open: Option<f64>,
    take_profit: f64,
    stop_loss: f64,
    minutes: u32,
) -> SignalProposal {
    SignalProposal {
        position,
        price_open,
        price_take_profit: take_profit,
        price_stop_loss: stop_loss,
        minute_estimated_time: minutes,
        note: Some("test".to_string()),
    }
}

pub fn schema(name: &str, source: Arc<dyn SignalSource>) -> StrategySchema {
    StrategySchema {
        name: name.to_string(),
        interval: SignalInterval::Minute1,
        source,
    }
}

pub fn deps(
    exchange: Arc<dyn Exchange>,
    risk: Arc<dyn RiskPolicy>,
    store: Arc<dyn PersistStore>,
    events: EventBus,
) -> ClientDeps {
    ClientDeps {
        exchange,
        risk,
        persistence: SignalPersistence::new(store),
        config: EngineConfig::default(),
        events,
    }
}

pub fn mem_store() -> Arc<MemCache> {
    Arc::new(MemCache::new())
}
