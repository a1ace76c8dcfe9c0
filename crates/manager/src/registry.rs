use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use vigil_core::signal::port::StrategySchema;
use vigil_engine::client::{ClientDeps, StrategyClient};

/// 注册表键：`(symbol, strategy_name)`
pub type ClientKey = (String, String);

/// # Summary
/// 状态机实例注册表，每个 `(symbol, strategy)` 组合至多一个实例。
///
/// # Invariants
/// - 实例在首次查找时构建，之后的查找返回同一个实例，直到被显式 `dispose`。
/// - 实例由 `tokio::sync::Mutex` 保护，同一时刻只有一个驱动器在推进它。
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientKey, Arc<Mutex<StrategyClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Summary
    /// 查找实例，不存在时用给定的策略与依赖构建。
    ///
    /// # Arguments
    /// * `symbol`: 交易对。
    /// * `schema`: 策略配置，仅在构建时使用。
    /// * `deps`: 共享依赖。
    pub fn get_or_create(
        &self,
        symbol: &str,
        schema: &StrategySchema,
        deps: &ClientDeps,
    ) -> Arc<Mutex<StrategyClient>> {
        self.clients
            .entry((symbol.to_string(), schema.name.clone()))
            .or_insert_with(|| {
                debug!(symbol = %symbol, strategy = %schema.name, "client created");
                Arc::new(Mutex::new(StrategyClient::new(
                    symbol,
                    schema.clone(),
                    deps.clone(),
                )))
            })
            .clone()
    }

    pub fn get(&self, symbol: &str, strategy: &str) -> Option<Arc<Mutex<StrategyClient>>> {
        self.clients
            .get(&(symbol.to_string(), strategy.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// 移除实例，返回是否存在过。持有旧实例的驱动器不受影响。
    pub fn dispose(&self, symbol: &str, strategy: &str) -> bool {
        self.clients
            .remove(&(symbol.to_string(), strategy.to_string()))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
