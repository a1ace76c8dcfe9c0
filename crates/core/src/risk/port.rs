use crate::risk::error::RiskError;
use crate::signal::entity::{Signal, SignalProposal};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 风控检查的输入参数。
#[derive(Debug, Clone)]
pub struct RiskCheck {
    pub symbol: String,
    pub strategy_name: String,
    pub exchange_name: String,
    // 待检查的信号意图；开仓前的准入检查尚无意图，为 None
    pub proposal: Option<SignalProposal>,
    // 当前价格样本
    pub current_price: f64,
    pub when: DateTime<Utc>,
}

/// # Summary
/// 风控检查结论。
#[derive(Debug, Clone, PartialEq)]
pub enum RiskVerdict {
    Accept,
    Reject(String),
}

/// # Summary
/// 组合风控协作方接口 (Port)。具体的持仓上限策略由外部实现。
///
/// # Invariants
/// - 实现类必须保证线程安全 (`Send` + `Sync`)，多个实例会并发调用。
/// - 每个 `add_signal` 最终都会对应一次 `remove_signal`。
#[async_trait]
pub trait RiskPolicy: Send + Sync {
    /// 判断当前是否允许开出新仓位。
    async fn check_signal(&self, check: &RiskCheck) -> Result<RiskVerdict, RiskError>;

    /// 记录一笔新增敞口。
    async fn add_signal(&self, signal: &Signal) -> Result<(), RiskError>;

    /// 移除一笔已平仓的敞口。
    async fn remove_signal(&self, signal: &Signal) -> Result<(), RiskError>;
}

/// # Summary
/// 不做任何限制的默认风控实现。
pub struct NoRisk;

#[async_trait]
impl RiskPolicy for NoRisk {
    async fn check_signal(&self, _check: &RiskCheck) -> Result<RiskVerdict, RiskError> {
        Ok(RiskVerdict::Accept)
    }

    async fn add_signal(&self, _signal: &Signal) -> Result<(), RiskError> {
        Ok(())
    }

    async fn remove_signal(&self, _signal: &Signal) -> Result<(), RiskError> {
        Ok(())
    }
}
