use crate::common::SignalInterval;
use crate::signal::entity::SignalProposal;
use crate::signal::error::StrategyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// # Summary
/// 用户策略的信号源接口 (Port)。
///
/// # Invariants
/// - 实现类必须保证线程安全 (`Send` + `Sync`)。
/// - 可以通过 `vigil_core::context` 读取当前执行上下文，也可以只依赖参数。
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// # Summary
    /// 询问策略此刻是否要开仓。
    ///
    /// # Arguments
    /// * `symbol`: 交易标的。
    /// * `when`: 本步所代表的时刻。
    ///
    /// # Returns
    /// * `Ok(None)` - 本步不做任何动作。
    /// * `Ok(Some(proposal))` - 待校验的开仓意图。
    async fn get_signal(
        &self,
        symbol: &str,
        when: DateTime<Utc>,
    ) -> Result<Option<SignalProposal>, StrategyError>;
}

/// # Summary
/// 策略配置：名称、节流周期与信号源。
#[derive(Clone)]
pub struct StrategySchema {
    pub name: String,
    pub interval: SignalInterval,
    pub source: Arc<dyn SignalSource>,
}

impl std::fmt::Debug for StrategySchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategySchema")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
