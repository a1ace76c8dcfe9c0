use crate::persist::error::PersistError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

/// # Summary
/// 业务无关的异步 KV 持久化接口 (Port)。
///
/// # Invariants
/// - 处理原始字节，确保 Trait 是对象安全的 (Object Safe)。
/// - `write_raw` 必须是原子的：任何时刻崩溃都不能留下可读但残缺的记录。
/// - `remove` 对不存在的键必须幂等返回 Ok。
#[async_trait]
pub trait PersistStore: Send + Sync {
    /// # Summary
    /// 原子写入原始字节数据。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `value`: 原始字节数组。
    ///
    /// # Returns
    /// 成功返回 Ok，失败返回 `PersistError`。
    async fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError>;

    /// # Summary
    /// 读取原始字节数据。
    ///
    /// # Returns
    /// 存在则返回 `Some(Vec<u8>)`，否则返回 `None`。
    async fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;

    /// # Summary
    /// 删除指定键，键不存在时同样返回 Ok。
    async fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// # Summary
/// 持久化泛型扩展接口，提供便捷的序列化支持。
///
/// # Invariants
/// - 自动为所有实现 `PersistStore` 的类型提供支持。
#[async_trait]
pub trait PersistStoreExt: PersistStore {
    /// # Summary
    /// 存入强类型对象。
    ///
    /// # Logic
    /// 1. 使用 JSON 序列化对象。
    /// 2. 调用底层 `write_raw` 写入。
    async fn write<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PersistError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| PersistError::Serialize(e.to_string()))?;
        self.write_raw(key, bytes).await
    }

    /// # Summary
    /// 取出强类型对象。
    ///
    /// # Logic
    /// 1. 调用底层 `read_raw` 获取字节。
    /// 2. 使用 JSON 反序列化为目标类型。
    async fn read<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, PersistError> {
        match self.read_raw(key).await? {
            Some(bytes) => {
                let val = serde_json::from_slice(&bytes)
                    .map_err(|e| PersistError::Deserialize(e.to_string()))?;
                Ok(Some(val))
            }
            None => Ok(None),
        }
    }
}

impl<T: PersistStore + ?Sized> PersistStoreExt for T {}
