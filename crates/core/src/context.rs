//! 环境上下文：在一次 tick 的完整调用链上携带 "哪个标的 / 什么时刻 / 是否历史回放"，
//! 以及在一次运行内保持不变的 "哪个策略 / 哪个交易所 / 哪个时间框架"。
//!
//! 两者都是 tokio 任务本地值，作用域由驱动器建立，离开作用域即销毁。
//! 同一进程内并发运行的多个实例各自持有独立的作用域，互不可见。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// # Summary
/// 单步执行上下文。
///
/// # Invariants
/// - 由驱动器在每一步开始时建立，该步结束时销毁。
/// - `is_historical == true` 表示正在回放历史数据，此时不得进行持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    // 当前处理的交易标的
    pub symbol: String,
    // 本步所代表的时刻
    pub when: DateTime<Utc>,
    // 是否为历史回放
    pub is_historical: bool,
}

/// # Summary
/// 运行级方法上下文，标识当前生效的策略、交易所与时间框架配置名称。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodContext {
    pub strategy_name: String,
    pub exchange_name: String,
    // 实盘运行没有时间框架，为空字符串
    pub frame_name: String,
}

/// # Summary
/// 在作用域外读取上下文时产生的错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("execution context is not established for the current task")]
    NoExecution,
    #[error("method context is not established for the current task")]
    NoMethod,
}

tokio::task_local! {
    static EXECUTION: ExecutionContext;
    static METHOD: MethodContext;
}

/// 在给定执行上下文的作用域内运行 `fut`。
pub async fn with_execution<F>(ctx: ExecutionContext, fut: F) -> F::Output
where
    F: Future,
{
    EXECUTION.scope(ctx, fut).await
}

/// 在给定方法上下文的作用域内运行 `fut`。作用域可嵌套，内层覆盖外层。
pub async fn with_method<F>(ctx: MethodContext, fut: F) -> F::Output
where
    F: Future,
{
    METHOD.scope(ctx, fut).await
}

/// 读取当前任务的执行上下文。
pub fn execution() -> Result<ExecutionContext, ContextError> {
    EXECUTION
        .try_with(|ctx| ctx.clone())
        .map_err(|_| ContextError::NoExecution)
}

/// 读取当前任务的方法上下文。
pub fn method() -> Result<MethodContext, ContextError> {
    METHOD
        .try_with(|ctx| ctx.clone())
        .map_err(|_| ContextError::NoMethod)
}
