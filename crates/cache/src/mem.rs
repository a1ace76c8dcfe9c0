use async_trait::async_trait;
use dashmap::DashMap;
use vigil_core::persist::error::PersistError;
use vigil_core::persist::port::PersistStore;

/// # Summary
/// 基于 DashMap 的内存持久化实现，不具备跨进程持久性。
///
/// # Invariants
/// - 所有操作均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 单次插入整体替换旧值，读方不会观察到半写状态。
/// - 用于历史回放与测试；实盘崩溃恢复需使用 `vigil-store` 中的持久化后端。
pub struct MemCache {
    // 线程安全的 KV 存储容器
    storage: DashMap<String, Vec<u8>>,
}

impl MemCache {
    /// 创建一个新的空 MemCache 实例。
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// 当前保存的键数量。
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for MemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistStore for MemCache {
    /// # Summary
    /// 写入原始字节数据。
    ///
    /// # Logic
    /// 将 Key 转换为 String 后与 Value 一并插入哈希表。若存在同名 Key 则覆盖。
    async fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        self.storage.insert(key.to_string(), value);
        Ok(())
    }

    /// # Summary
    /// 读取原始字节数据。
    ///
    /// # Logic
    /// 从哈希表中检索 Key 对应的引用，并将其克隆为独立的所有权对象返回。
    async fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.storage.get(key).map(|v| v.value().clone()))
    }

    /// # Summary
    /// 删除指定键。无论键是否存在均返回 Ok。
    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.storage.remove(key);
        Ok(())
    }
}
