use crate::context::ContextError;
use crate::market::error::MarketError;
use crate::persist::error::PersistError;
use crate::risk::error::RiskError;
use crate::signal::error::{StrategyError, ValidationError};
use thiserror::Error;

/// # Summary
/// 引擎域错误枚举。
///
/// # Invariants
/// - 涵盖信号校验、风控、数据源、持久化及上下文缺失等失败场景。
/// - 除 `Fatal` 外均为可恢复错误：所属循环在下一次调度时继续运行。
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    // 信号校验失败，本步按 idle 处理
    #[error(transparent)]
    Validation(#[from] ValidationError),
    // 组合风控拒绝，本步按 idle 处理
    #[error("Risk rejected: {0}")]
    RiskRejected(String),
    // 组合风控协作方自身故障
    #[error(transparent)]
    Risk(#[from] RiskError),
    // 数据源错误（含异常数据），已经过有限次重试
    #[error(transparent)]
    Market(#[from] MarketError),
    // 持久化错误，本步结果不具备持久性
    #[error(transparent)]
    Persist(#[from] PersistError),
    // 用户信号源执行失败
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    // 在上下文作用域外调用
    #[error(transparent)]
    Context(#[from] ContextError),
    // 状态机被以不合法的方式调用
    #[error("Invalid state: {0}")]
    InvalidState(String),
    // 不可隔离到单个策略的失败
    #[error("Fatal error: {0}")]
    Fatal(String),
}
