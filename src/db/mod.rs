//! Store chiave/valore condiviso per metadati immagini, cronologia azioni
//! e stato dei job.

pub mod memory;
pub mod sqlite;

use std::future::Future;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type DbPool = SqlitePool;

/// Primitive atomiche richieste allo store di stato.
///
/// Ogni operazione agisce su una sola chiave: il core non richiede
/// transazioni multi-chiave.
pub trait StatusStore: Send + Sync + 'static {
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Rimuove sia il valore sia l'eventuale lista associata alla chiave
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    fn incr(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    fn decr(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Inserisce in testa alla lista
    fn lpush(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Lista completa, dal più recente al più vecchio
    fn lrange(&self, key: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Rimuove tutte le occorrenze di `value`, ritorna quante ne ha rimosse
    fn lrem(&self, key: &str, value: &str) -> impl Future<Output = Result<u64>> + Send;
}

/// Inizializza il database SQLite
pub async fn init_db(database_url: &str) -> std::result::Result<DbPool, sqlx::Error> {
    // Un database in memoria esiste solo sulla connessione che l'ha creato
    let in_memory = database_url.contains(":memory:");
    let max_connections = if in_memory { 1 } else { 20 };
    let idle_timeout = (!in_memory).then(|| Duration::from_secs(60));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(idle_timeout)
        .max_lifetime(idle_timeout.map(|_| Duration::from_secs(30 * 60)))
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Esegue le migrazioni del database
async fn run_migrations(pool: &DbPool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_lists_key ON lists(key);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
