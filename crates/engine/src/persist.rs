use std::sync::Arc;
use tracing::debug;
use vigil_core::persist::error::PersistError;
use vigil_core::persist::port::{PersistStore, PersistStoreExt};
use vigil_core::signal::entity::Signal;

/// # Summary
/// 信号持久化协调器：为每个 (symbol, strategy) 维护 "在途信号" 与 "挂单信号" 两条记录。
///
/// # Invariants
/// - 每个键只有一个写入者，即拥有该 (symbol, strategy) 的状态机实例。
/// - 原子性由底层 `PersistStore` 保证，本层只负责键的组织与序列化。
#[derive(Clone)]
pub struct SignalPersistence {
    store: Arc<dyn PersistStore>,
}

/// 在途信号的持久化键。
pub fn pending_key(strategy_name: &str, symbol: &str) -> String {
    format!("signal:{}:{}", strategy_name, symbol)
}

/// 挂单信号的持久化键。
pub fn scheduled_key(strategy_name: &str, symbol: &str) -> String {
    format!("schedule:{}:{}", strategy_name, symbol)
}

impl SignalPersistence {
    pub fn new(store: Arc<dyn PersistStore>) -> Self {
        Self { store }
    }

    pub async fn write_pending(&self, signal: &Signal) -> Result<(), PersistError> {
        let key = pending_key(&signal.strategy_name, &signal.symbol);
        self.store.write(&key, signal).await?;
        debug!(key, signal_id = %signal.id, "pending signal persisted");
        Ok(())
    }

    pub async fn read_pending(
        &self,
        strategy_name: &str,
        symbol: &str,
    ) -> Result<Option<Signal>, PersistError> {
        self.store.read(&pending_key(strategy_name, symbol)).await
    }

    pub async fn remove_pending(&self, strategy_name: &str, symbol: &str) -> Result<(), PersistError> {
        self.store.remove(&pending_key(strategy_name, symbol)).await
    }

    pub async fn write_scheduled(&self, signal: &Signal) -> Result<(), PersistError> {
        let key = scheduled_key(&signal.strategy_name, &signal.symbol);
        self.store.write(&key, signal).await?;
        debug!(key, signal_id = %signal.id, "scheduled signal persisted");
        Ok(())
    }

    pub async fn read_scheduled(
        &self,
        strategy_name: &str,
        symbol: &str,
    ) -> Result<Option<Signal>, PersistError> {
        self.store.read(&scheduled_key(strategy_name, symbol)).await
    }

    pub async fn remove_scheduled(
        &self,
        strategy_name: &str,
        symbol: &str,
    ) -> Result<(), PersistError> {
        self.store.remove(&scheduled_key(strategy_name, symbol)).await
    }
}
