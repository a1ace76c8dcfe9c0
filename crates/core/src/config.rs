use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub store: StoreConfig,
}

/// # Summary
/// 引擎只读配置项。由外部协作方负责校验与下发，引擎内部仅读取。
///
/// # Invariants
/// - 所有字段都有默认值，缺省的配置文件也能得到可运行的引擎。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // 止盈距离下限（百分比），覆盖往返手续费与安全边际
    pub min_take_profit_distance_percent: f64,
    // 止损距离上限（百分比），限制单笔最大亏损
    pub max_stop_loss_distance_percent: f64,
    // 信号最长存活分钟数
    pub max_signal_lifetime_minutes: u32,
    // 挂单信号等待激活的最长分钟数
    pub schedule_await_minutes: u32,
    // 计算 VWAP 使用的 1 分钟 K 线数量
    pub avg_price_candles_count: usize,
    // 数据源单次调用的最大尝试次数（含首次）
    pub get_candles_retry_count: u32,
    // 两次重试之间的固定间隔（毫秒）
    pub get_candles_retry_delay_ms: u64,
    // 异常 K 线判定阈值：价格低于参考价 / factor 视为异常
    pub anomaly_threshold_factor: f64,
    // 使用中位数作为参考价所需的最少 K 线数量
    pub anomaly_median_min_candles: usize,
    // 实盘驱动器两次 tick 之间的休眠（毫秒）
    pub tick_interval_ms: u64,
    // 单边手续费（百分比）
    pub percent_fee: f64,
    // 单边滑点（百分比）
    pub percent_slippage: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_take_profit_distance_percent: 0.3,
            max_stop_loss_distance_percent: 20.0,
            max_signal_lifetime_minutes: 1440,
            schedule_await_minutes: 120,
            avg_price_candles_count: 5,
            get_candles_retry_count: 3,
            get_candles_retry_delay_ms: 5_000,
            anomaly_threshold_factor: 1_000.0,
            anomaly_median_min_candles: 5,
            tick_interval_ms: 61_000,
            percent_fee: 0.1,
            percent_slippage: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    // 持久化数据根目录
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

impl AppConfig {
    /// # Summary
    /// 分层加载配置。
    ///
    /// # Logic
    /// 1. 以默认值为底。
    /// 2. 若给定 TOML 文件路径，则叠加文件内容（文件可缺省）。
    /// 3. 叠加 `VIGIL__` 前缀的环境变量，例如 `VIGIL__ENGINE__TICK_INTERVAL_MS=1000`。
    ///
    /// # Arguments
    /// * `path` - 可选的配置文件路径。
    ///
    /// # Returns
    /// * `Result<AppConfig, ConfigError>`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        debug!(path = ?path, "loading configuration");
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder
            .add_source(Environment::with_prefix("VIGIL").separator("__"))
            .build()?
            .try_deserialize()
    }
}
