//! Store in memoria, usato di default e nei test

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use super::StatusStore;
use crate::error::{AppError, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    lists: RwLock<HashMap<String, VecDeque<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64> {
        let mut values = self.values.write().await;
        let current = match values.get(key) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                AppError::Store(format!("Valore non intero per la chiave {}: {}", key, raw))
            })?,
            None => 0,
        };
        let next = current + delta;
        values.insert(key.to_string(), next.to_string());
        Ok(next)
    }
}

impl StatusStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        self.lists.write().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.add(key, -1).await
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        self.lists
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .lists
            .read()
            .await
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<u64> {
        let mut lists = self.lists.write().await;
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|v| v != value);
        Ok((before - list.len()) as u64)
    }
}
