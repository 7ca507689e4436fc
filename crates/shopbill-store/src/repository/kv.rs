//! # Key-Value Repository
//!
//! String values keyed by name in the `session_kv` table. The session
//! layer stores `token`, `refreshToken` and `user` here.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct KvRepository {
    pool: SqlitePool,
}

impl KvRepository {
    pub fn new(pool: SqlitePool) -> Self {
        KvRepository { pool }
    }

    /// Returns the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM session_kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Inserts or replaces the value under `key`.
    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        debug!(key = %key, "Storing value");
        sqlx::query(
            r#"
            INSERT INTO session_kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes every key in `keys` in one transaction. Missing keys are fine.
    pub async fn remove_many(&self, keys: &[&str]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for key in keys {
            removed += sqlx::query("DELETE FROM session_kv WHERE key = ?1")
                .bind(*key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        debug!(requested = keys.len(), removed, "Removed keys");
        Ok(removed)
    }

    /// When `key` was last written.
    pub async fn updated_at(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let at = sqlx::query_scalar::<_, DateTime<Utc>>("SELECT updated_at FROM session_kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(at)
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> StoreResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>("SELECT key FROM session_kv ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Store, StoreConfig};

    async fn repo() -> super::KvRepository {
        Store::open(StoreConfig::in_memory()).await.unwrap().kv()
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let kv = repo().await;
        assert_eq!(kv.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let kv = repo().await;
        kv.set("token", "T1").await.unwrap();
        kv.set("token", "T2").await.unwrap();

        assert_eq!(kv.get("token").await.unwrap().as_deref(), Some("T2"));
        assert_eq!(kv.keys().await.unwrap(), vec!["token".to_string()]);
        assert!(kv.updated_at("token").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_many() {
        let kv = repo().await;
        kv.set("token", "T").await.unwrap();
        kv.set("refreshToken", "R").await.unwrap();
        kv.set("theme", "dark").await.unwrap();

        let removed = kv.remove_many(&["token", "refreshToken", "user"]).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(kv.keys().await.unwrap(), vec!["theme".to_string()]);
    }
}
