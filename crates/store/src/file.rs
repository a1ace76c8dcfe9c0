use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;
use vigil_core::persist::error::PersistError;
use vigil_core::persist::port::PersistStore;

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// # Summary
/// 基于文件系统的持久化实现，每个键对应根目录下的一个文件。
///
/// # Invariants
/// - 写入流程固定为：写临时文件 → fsync → rename 覆盖正式文件 → fsync 目录。
///   崩溃只可能留下旧记录或新记录，不会留下残缺记录。
/// - 临时文件以 `.tmp` 结尾，`open` 时清理上次崩溃遗留的临时文件。
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// # Summary
    /// 打开（必要时创建）持久化根目录。
    ///
    /// # Logic
    /// 1. 递归创建根目录。
    /// 2. 删除遗留的临时文件，它们只可能来自写入中途崩溃。
    ///
    /// # Arguments
    /// * `root` - 数据根目录。
    ///
    /// # Returns
    /// * `Result<Self, PersistError>`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| PersistError::Storage(format!("create {}: {}", root.display(), e)))?;

        let mut entries = tokio::fs::read_dir(&root)
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXT) {
                warn!(path = %path.display(), "removing leftover temp file");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to remove temp file");
                }
            }
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", encode_key(key), RECORD_EXT))
    }

    #[cfg(unix)]
    async fn sync_root(&self) -> Result<(), PersistError> {
        let dir = tokio::fs::File::open(&self.root)
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))?;
        dir.sync_all()
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))
    }

    #[cfg(not(unix))]
    async fn sync_root(&self) -> Result<(), PersistError> {
        Ok(())
    }
}

/// 将键编码为安全的文件名：字母、数字、`-`、`_` 原样保留，其余字节转为 `%XX`。
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[async_trait]
impl PersistStore for FileStore {
    async fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        let target = self.record_path(key);
        let temp = self
            .root
            .join(format!("{}.{}.{}", encode_key(key), Uuid::new_v4(), TEMP_EXT));

        let written: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&value).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &target).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(path = %temp.display(), error = %cleanup, "failed to remove temp file");
            }
            return Err(PersistError::Storage(format!("write {}: {}", key, e)));
        }

        self.sync_root().await?;
        debug!(key, path = %target.display(), "record written");
        Ok(())
    }

    async fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        match tokio::fs::read(self.record_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Storage(format!("read {}: {}", key, e))),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        match tokio::fs::remove_file(self.record_path(key)).await {
            Ok(()) => {
                self.sync_root().await?;
                debug!(key, "record removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistError::Storage(format!("remove {}: {}", key, e))),
        }
    }
}
