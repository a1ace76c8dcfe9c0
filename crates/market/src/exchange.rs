use crate::price::{check_anomalies, vwap};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use vigil_core::common::CandleInterval;
use vigil_core::common::time::{RealTimeProvider, TimeProvider};
use vigil_core::config::EngineConfig;
use vigil_core::context;
use vigil_core::market::entity::Candle;
use vigil_core::market::error::MarketError;
use vigil_core::market::port::{CandleProvider, Exchange};

/// # Summary
/// `Exchange` 的标准实现：包装原始 `CandleProvider`，补齐时间定位、重试、异常检测与 VWAP。
///
/// # Invariants
/// - 时间基准一律取自执行上下文的 `when`，不读取系统时钟，回放与实盘共用同一套逻辑。
/// - `get_candles` 只返回在 `when` 之前已经收盘的 K 线，杜绝回放中的未来数据。
/// - 单次调用的尝试次数不超过 `get_candles_retry_count`，重试间隔固定。
pub struct ExchangeClient {
    name: String,
    provider: Arc<dyn CandleProvider>,
    config: EngineConfig,
    clock: Arc<dyn TimeProvider>,
}

impl ExchangeClient {
    /// # Summary
    /// 使用系统时钟创建交易所客户端。
    ///
    /// # Arguments
    /// * `name`: 交易所配置名称。
    /// * `provider`: 原始 K 线数据源。
    /// * `config`: 引擎配置（重试、异常检测、VWAP 参数）。
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn CandleProvider>,
        config: EngineConfig,
    ) -> Self {
        Self::with_clock(name, provider, config, Arc::new(RealTimeProvider))
    }

    /// 注入时钟，用于判断 `get_next_candles` 的请求区间是否已经发生。
    pub fn with_clock(
        name: impl Into<String>,
        provider: Arc<dyn CandleProvider>,
        config: EngineConfig,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            config,
            clock,
        }
    }

    /// # Summary
    /// 带重试与异常检测的单次拉取。
    ///
    /// # Logic
    /// 1. 调用数据源；失败或数据异常时记录 warn 并等待固定间隔后重试。
    /// 2. 尝试次数耗尽后返回最后一次的错误。
    async fn fetch_checked(
        &self,
        symbol: &str,
        interval: CandleInterval,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let max_attempts = self.config.get_candles_retry_count.max(1);
        let delay = std::time::Duration::from_millis(self.config.get_candles_retry_delay_ms);
        let mut attempt = 1;

        loop {
            let result = match self
                .provider
                .fetch_candles(symbol, interval, since, limit)
                .await
            {
                Ok(candles) => check_anomalies(
                    &candles,
                    self.config.anomaly_threshold_factor,
                    self.config.anomaly_median_min_candles,
                )
                .map(|()| candles),
                Err(e) => Err(e),
            };

            match result {
                Ok(candles) => break Ok(candles),
                Err(e) if attempt >= max_attempts => break Err(e),
                Err(e) => {
                    warn!(
                        exchange = %self.name,
                        symbol,
                        %interval,
                        attempt,
                        max_attempts,
                        error = %e,
                        "candle fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn span(interval: CandleInterval, limit: usize) -> Result<Duration, MarketError> {
    let count = i64::try_from(limit)
        .map_err(|_| MarketError::Unknown(format!("candle limit {} is too large", limit)))?;
    interval
        .minutes()
        .checked_mul(count)
        .and_then(Duration::try_minutes)
        .ok_or_else(|| MarketError::Unknown(format!("candle span overflow for limit {}", limit)))
}

#[async_trait]
impl Exchange for ExchangeClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let when = context::execution()
            .map_err(|e| MarketError::Unknown(e.to_string()))?
            .when;
        let since = when - span(interval, limit)?;

        let candles = self.fetch_checked(symbol, interval, since, limit).await?;
        let step = interval.duration();
        let closed: Vec<Candle> = candles
            .into_iter()
            .filter(|c| c.time >= since && c.time + step <= when)
            .collect();

        debug!(exchange = %self.name, symbol, %interval, count = closed.len(), %when, "candles loaded");
        Ok(closed)
    }

    async fn get_next_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let when = context::execution()
            .map_err(|e| MarketError::Unknown(e.to_string()))?
            .when;
        let until = when + span(interval, limit)?;
        if until > self.clock.now() {
            debug!(exchange = %self.name, symbol, %until, "requested range has not happened yet");
            return Ok(Vec::new());
        }

        let candles = self.fetch_checked(symbol, interval, when, limit).await?;
        Ok(candles
            .into_iter()
            .filter(|c| c.time >= when && c.time < until)
            .collect())
    }

    async fn get_average_price(&self, symbol: &str) -> Result<f64, MarketError> {
        let candles = self
            .get_candles(
                symbol,
                CandleInterval::Minute1,
                self.config.avg_price_candles_count,
            )
            .await?;
        vwap(&candles)
    }
}
