use crate::context::ExecutionContext;
use crate::signal::entity::TickResult;
use serde::{Deserialize, Serialize};

/// # Summary
/// 每个 tick 结果对应一条信号事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    // 是否来自历史回放
    pub is_historical: bool,
    pub result: TickResult,
}

/// # Summary
/// 可恢复错误与致命错误共用的事件载荷。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub strategy_name: Option<String>,
    // 出错时所处的执行上下文（若存在）
    pub context: Option<ExecutionContext>,
    pub message: String,
}

/// # Summary
/// 风控拒绝事件，与校验失败分开投递。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub symbol: String,
    pub strategy_name: String,
    pub reason: String,
    pub current_price: f64,
}

/// # Summary
/// 驱动器结束事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneEvent {
    pub symbol: String,
    pub strategy_name: String,
    pub exchange_name: String,
    pub is_historical: bool,
}

/// # Summary
/// 多策略对比驱动器在每个策略完成后产出的进度记录。
///
/// # Invariants
/// - `best_*` 仅由指标值为有限数的策略更新，严格大于才替换。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub symbol: String,
    pub strategy_name: String,
    pub metric: String,
    // 本策略的指标值，None 表示不参与评选
    pub metric_value: Option<f64>,
    pub best_strategy: Option<String>,
    pub best_metric: Option<f64>,
    pub strategies_tested: usize,
    pub total_strategies: usize,
}
