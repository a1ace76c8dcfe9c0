use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use std::path::Path;
use tracing::info;
use vigil_core::persist::error::PersistError;
use vigil_core::persist::port::PersistStore;

/// # Summary
/// PersistStore 的 SQLite 实现，所有键值存放于单表 `signal_records`。
///
/// # Invariants
/// - 每次写入是单条 Upsert 语句，由 SQLite 事务保证原子性。
/// - 使用 WAL + `synchronous=FULL`，已提交的写入在进程崩溃后依然可见。
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// # Summary
    /// 打开（必要时创建）数据库文件并建表。
    ///
    /// # Arguments
    /// * `db_path` - 数据库文件路径。
    ///
    /// # Returns
    /// * `Result<Self, PersistError>`
    pub async fn open(db_path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistError::Storage(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_records (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| PersistError::Storage(e.to_string()))?;

        info!(path = %db_path.display(), "sqlite persist store opened");
        Ok(Self { pool })
    }
}

#[async_trait]
impl PersistStore for SqliteStore {
    async fn write_raw(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        sqlx::query(
            r#"
            INSERT INTO signal_records (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM signal_records WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PersistError::Storage(e.to_string()))?;
        Ok(row.map(|(value,)| value))
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        sqlx::query("DELETE FROM signal_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistError::Storage(e.to_string()))?;
        Ok(())
    }
}
