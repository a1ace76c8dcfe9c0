use crate::common::CandleInterval;
use crate::market::entity::Candle;
use crate::market::error::MarketError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 原始行情数据提供者接口（交易所适配器实现）。
///
/// # Invariants
/// - 返回的 K 线按时间升序排列，且第一根的 `time >= since`。
/// - 实现者只负责一次请求，重试与异常数据检测由上层 `Exchange` 实现负责。
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// # Summary
    /// 获取特定标的自 `since` 起的最多 `limit` 根 K 线。
    ///
    /// # Arguments
    /// * `symbol`: 交易标的。
    /// * `interval`: K 线周期。
    /// * `since`: 起始时间（包含）。
    /// * `limit`: 数量上限。
    ///
    /// # Returns
    /// 成功返回 K 线列表。
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError>;
}

/// # Summary
/// 引擎使用的交易所端口，时间基准取自当前执行上下文的 `when`。
///
/// # Invariants
/// - 所有方法都必须在执行上下文作用域内调用。
/// - 回放模式下绝不返回 `when` 之后的数据给 `get_candles` / `get_average_price`。
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 交易所配置名称。
    fn name(&self) -> &str;

    /// # Summary
    /// 获取截至 `when` 的最近 `limit` 根 K 线。
    async fn get_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError>;

    /// # Summary
    /// 获取自 `when` 起的后续 `limit` 根 K 线（快进回测使用）。
    ///
    /// # Returns
    /// 若请求区间尚未发生（实盘），返回空列表。
    async fn get_next_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError>;

    /// # Summary
    /// 获取当前价格样本：最近若干根 1 分钟 K 线的成交量加权平均价。
    async fn get_average_price(&self, symbol: &str) -> Result<f64, MarketError>;
}
