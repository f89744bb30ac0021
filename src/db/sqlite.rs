//! Store persistente su SQLite

use super::{init_db, DbPool, StatusStore};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = init_db(database_url).await?;
        Ok(Self { pool })
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64> {
        // Singola istruzione: l'incremento resta atomico anche tra più processi
        let value = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO kv (key, value) VALUES (?, CAST(? AS TEXT))
            ON CONFLICT(key) DO UPDATE
                SET value = CAST(CAST(kv.value AS INTEGER) + ? AS TEXT)
            RETURNING CAST(value AS INTEGER)
            "#,
        )
        .bind(key)
        .bind(delta)
        .bind(delta)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}

impl StatusStore for SqliteStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM lists WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.add(key, -1).await
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT INTO lists (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>> {
        let values =
            sqlx::query_scalar::<_, String>("SELECT value FROM lists WHERE key = ? ORDER BY id DESC")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;

        Ok(values)
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lists WHERE key = ? AND value = ?")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = memory_store().await;
        store.set("job-1", "queued").await.unwrap();
        store.set("job-1", "processing").await.unwrap();
        assert_eq!(
            store.get("job-1").await.unwrap().as_deref(),
            Some("processing")
        );
        assert_eq!(store.get("job-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_decr() {
        let store = memory_store().await;
        assert_eq!(store.incr("customer.a").await.unwrap(), 1);
        assert_eq!(store.incr("customer.a").await.unwrap(), 2);
        assert_eq!(store.decr("customer.a").await.unwrap(), 1);
        assert_eq!(store.decr("customer.b").await.unwrap(), -1);
        assert_eq!(store.get("customer.a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_lists_and_delete() {
        let store = memory_store().await;
        store.lpush("images.x.actions", "upload").await.unwrap();
        store.lpush("images.x.actions", "crop").await.unwrap();
        assert_eq!(
            store.lrange("images.x.actions").await.unwrap(),
            vec!["crop", "upload"]
        );

        assert_eq!(store.lrem("images.x.actions", "crop").await.unwrap(), 1);
        store.set("images.x.actions", "shadow").await.unwrap();
        store.delete("images.x.actions").await.unwrap();
        assert!(store.lrange("images.x.actions").await.unwrap().is_empty());
        assert_eq!(store.get("images.x.actions").await.unwrap(), None);
    }
}
