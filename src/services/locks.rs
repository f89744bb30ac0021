//! Tabella dei lock per risorsa
//!
//! Un solo lock per `resource_id`, creato alla prima richiesta e condiviso
//! da tutti i worker: al più una trasformazione in corso per immagine.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::ResourceId;

#[derive(Debug, Default)]
pub struct ResourceLocks {
    table: Mutex<HashMap<ResourceId, Arc<Mutex<()>>>>,
}

/// Accesso esclusivo a una risorsa, rilasciato al drop
#[derive(Debug)]
pub struct ResourceGuard {
    resource_id: ResourceId,
    _guard: OwnedMutexGuard<()>,
}

impl ResourceGuard {
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attende finché la risorsa è libera; non blocca su risorse diverse
    pub async fn acquire(&self, resource_id: &ResourceId) -> ResourceGuard {
        let lock = self.entry(resource_id).await;
        let guard = lock.lock_owned().await;

        ResourceGuard {
            resource_id: resource_id.clone(),
            _guard: guard,
        }
    }

    /// Come `acquire`, ma ritorna `None` se la risorsa è già occupata
    pub async fn try_acquire(&self, resource_id: &ResourceId) -> Option<ResourceGuard> {
        let lock = self.entry(resource_id).await;
        let guard = lock.try_lock_owned().ok()?;

        Some(ResourceGuard {
            resource_id: resource_id.clone(),
            _guard: guard,
        })
    }

    /// Numero di risorse per cui esiste un lock
    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn entry(&self, resource_id: &ResourceId) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().await;
        table
            .entry(resource_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_resource_is_exclusive() {
        let locks = ResourceLocks::new();
        let resource = ResourceId::new();

        let guard = locks.acquire(&resource).await;
        assert_eq!(guard.resource_id(), &resource);
        assert!(locks.try_acquire(&resource).await.is_none());

        drop(guard);
        assert!(locks.try_acquire(&resource).await.is_some());
        assert_eq!(locks.len().await, 1);
    }

    #[tokio::test]
    async fn test_different_resources_do_not_block() {
        let locks = ResourceLocks::new();
        let _a = locks.acquire(&ResourceId::new()).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&ResourceId::new()),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_holders_never_overlap() {
        let locks = Arc::new(ResourceLocks::new());
        let resource = ResourceId::new();
        let holders = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let resource = resource.clone();
            let holders = holders.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(&resource).await;
                let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                holders.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        let locks = ResourceLocks::new();
        let resource = ResourceId::new();

        let result: Result<(), &str> = async {
            let _guard = locks.acquire(&resource).await;
            Err("trasformazione fallita")
        }
        .await;

        assert!(result.is_err());
        assert!(locks.try_acquire(&resource).await.is_some());
    }
}
