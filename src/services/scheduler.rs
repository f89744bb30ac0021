//! Punto d'ingresso del motore: intake, stato e avvio dei worker

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use crate::config::Config;
use crate::db::StatusStore;
use crate::error::{AppError, Result};
use crate::models::{
    Action, ActionParams, ImageInfo, Job, JobId, JobStatus, QueueEntryInfo, ResourceId, TenantId,
};

use super::catalog::ImageCatalog;
use super::locks::ResourceLocks;
use super::queue::FairQueue;
use super::retry::Backoff;
use super::status::{StatusReceiver, StatusTracker};
use super::transform::ImageBackend;
use super::worker::WorkerPool;

/// Stato condiviso fra intake e worker
pub struct Scheduler<S, B> {
    pub(crate) queue: Arc<FairQueue>,
    pub(crate) locks: Arc<ResourceLocks>,
    pub(crate) status: StatusTracker<S>,
    pub(crate) catalog: ImageCatalog<S>,
    pub(crate) backend: Arc<B>,
    pub(crate) retry: Backoff,
    config: Arc<Config>,
}

impl<S, B> Clone for Scheduler<S, B> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            locks: self.locks.clone(),
            status: self.status.clone(),
            catalog: self.catalog.clone(),
            backend: self.backend.clone(),
            retry: self.retry,
            config: self.config.clone(),
        }
    }
}

impl<S: StatusStore, B: ImageBackend> Scheduler<S, B> {
    pub fn new(store: Arc<S>, backend: B, config: Config) -> Self {
        Self {
            queue: Arc::new(FairQueue::new(config.base_priority)),
            locks: Arc::new(ResourceLocks::new()),
            status: StatusTracker::new(store.clone(), &config),
            catalog: ImageCatalog::new(store),
            backend: Arc::new(backend),
            retry: Backoff::from_config(&config),
            config: Arc::new(config),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Valida la richiesta e accoda il job.
    ///
    /// Azione o parametri non validi, oppure una risorsa sconosciuta, non
    /// creano alcun job.
    pub async fn submit(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
        action: &str,
        params: &ActionParams,
    ) -> Result<JobId> {
        let action = match Action::from_request(action, params) {
            Ok(action) => action,
            Err(e) => {
                tracing::info!(tenant_id = %tenant_id, resource_id = %resource_id, "Richiesta rifiutata: {}", e);
                return Err(e);
            }
        };

        self.submit_action(tenant_id, resource_id, action).await
    }

    /// Come [`Scheduler::submit`], con l'azione già validata
    pub async fn submit_action(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
        action: Action,
    ) -> Result<JobId> {
        if !self.catalog.exists(&resource_id).await? {
            return Err(AppError::ResourceNotFound(resource_id.to_string()));
        }

        let job = Job::new(tenant_id, resource_id, action);
        let job_id = job.id.clone();

        self.status.mark_queued(&job).await?;

        if let Err(e) = self
            .catalog
            .record_job(&job.resource_id, &job.id, job.action.name())
            .await
        {
            // Il job non è mai esistito: niente stato orfano nello store
            if let Err(discard_err) = self.status.discard(&job.id).await {
                tracing::error!(job_id = %job.id, "Stato queued non rimosso: {}", discard_err);
            }
            return Err(e);
        }

        let tenant_id = job.tenant_id.clone();
        let resource_id = job.resource_id.clone();
        let action = job.action.to_string();
        self.status.announce_queued(&job);
        let priority_key = self.queue.push(job).await;

        tracing::info!(
            job_id = %job_id,
            tenant_id = %tenant_id,
            resource_id = %resource_id,
            action = %action,
            priority_key,
            "Job accodato"
        );

        Ok(job_id)
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobStatus> {
        self.status.current(job_id).await
    }

    /// Attende uno stato terminale, al più per `timeout`.
    ///
    /// Allo scadere ritorna l'ultimo stato noto, anche se non terminale.
    pub async fn wait(&self, job_id: &JobId, timeout: Duration) -> Result<JobStatus> {
        let deadline = Instant::now() + timeout;
        // Iscrizione prima della lettura: nessun aggiornamento va perso
        let mut updates = self.status.subscribe();

        let current = self.status.current(job_id).await?;
        if current.is_terminal() {
            return Ok(current);
        }

        loop {
            match tokio::time::timeout_at(deadline, updates.recv()).await {
                Ok(Ok(update)) if &update.job.id == job_id && update.status.is_terminal() => {
                    return Ok(update.status);
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(job_id = %job_id, skipped, "Aggiornamenti persi, rilettura dallo store");
                    let current = self.status.current(job_id).await?;
                    if current.is_terminal() {
                        return Ok(current);
                    }
                }
                Ok(Err(RecvError::Closed)) | Err(_) => {
                    return self.status.current(job_id).await;
                }
            }
        }
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.status.subscribe()
    }

    pub async fn register_image(&self, owner: &TenantId, path: &Path) -> Result<ResourceId> {
        self.catalog.register(owner, path).await
    }

    pub async fn describe_image(&self, resource_id: &ResourceId) -> Result<ImageInfo> {
        self.catalog.describe(resource_id).await
    }

    pub async fn delete_image(&self, resource_id: &ResourceId) -> Result<()> {
        // Niente cancellazione a metà di una trasformazione
        let _guard = self.locks.acquire(resource_id).await;
        self.catalog.delete(resource_id).await
    }

    pub async fn list_images(&self) -> Result<Vec<ResourceId>> {
        self.catalog.all_ids().await
    }

    /// Voci in coda, senza consumarle
    pub async fn queue_snapshot(&self) -> Vec<QueueEntryInfo> {
        self.queue.snapshot().await
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Avvia `config.workers` worker sulla coda condivisa
    pub fn start_workers(&self) -> WorkerPool {
        WorkerPool::start(self.clone(), self.config.workers, self.config.poll_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::transform::RasterBackend;

    fn scheduler() -> Scheduler<MemoryStore, RasterBackend> {
        Scheduler::new(
            Arc::new(MemoryStore::new()),
            RasterBackend::default(),
            Config::for_tests(2),
        )
    }

    async fn register(
        scheduler: &Scheduler<MemoryStore, RasterBackend>,
        dir: &tempfile::TempDir,
    ) -> ResourceId {
        let path = dir.path().join("foto.png");
        image::RgbImage::new(40, 20).save(&path).unwrap();
        scheduler
            .register_image(&TenantId::from("owner"), &path)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_marks_queued() {
        let scheduler = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let resource = register(&scheduler, &dir).await;

        let job_id = scheduler
            .submit(
                TenantId::from("t"),
                resource.clone(),
                "resize",
                &ActionParams::size("10,10"),
            )
            .await
            .unwrap();

        assert_eq!(scheduler.status(&job_id).await.unwrap(), JobStatus::Queued);
        assert_eq!(scheduler.queue_len().await, 1);

        let info = scheduler.describe_image(&resource).await.unwrap();
        assert_eq!(info.actions, vec!["upload", "resize"]);
        assert_eq!(info.last_job, job_id.as_str());
        assert_eq!(info.last_job_state, "queued");
    }

    #[tokio::test]
    async fn test_rejected_requests_create_no_job() {
        let scheduler = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let resource = register(&scheduler, &dir).await;
        let tenant = TenantId::from("t");

        let bad_box = scheduler
            .submit(tenant.clone(), resource.clone(), "crop", &ActionParams::bbox("50,150,90,80"))
            .await;
        assert!(matches!(bad_box, Err(AppError::InvalidParameters(_))));

        let bad_action = scheduler
            .submit(tenant.clone(), resource.clone(), "rotate", &ActionParams::default())
            .await;
        assert!(matches!(bad_action, Err(AppError::InvalidAction(_))));

        let unknown = scheduler
            .submit(tenant.clone(), ResourceId::new(), "resize", &ActionParams::size("1,1"))
            .await;
        assert!(matches!(unknown, Err(AppError::ResourceNotFound(_))));

        assert_eq!(scheduler.queue_len().await, 0);
        assert_eq!(
            scheduler.describe_image(&resource).await.unwrap().actions,
            vec!["upload"]
        );
        assert_eq!(scheduler.queue.in_flight(&tenant).await, 0);
    }

    #[tokio::test]
    async fn test_wait_times_out_with_last_status() {
        let scheduler = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let resource = register(&scheduler, &dir).await;

        let job_id = scheduler
            .submit_action(TenantId::from("t"), resource, Action::resize(5, 5).unwrap())
            .await
            .unwrap();

        // Nessun worker avviato: il job resta in coda
        let status = scheduler
            .wait(&job_id, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_wait_unknown_job() {
        let scheduler = scheduler();
        let err = scheduler
            .wait(&JobId::from("job-mancante"), Duration::from_millis(10))
            .await;
        assert!(matches!(err, Err(AppError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_snapshot_shows_fair_keys() {
        let scheduler = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let a = register(&scheduler, &dir).await;
        let other = dir.path().join("altra.png");
        image::RgbImage::new(4, 4).save(&other).unwrap();
        let b = scheduler
            .register_image(&TenantId::from("owner"), &other)
            .await
            .unwrap();

        scheduler
            .submit_action(TenantId::from("a"), a, Action::resize(2, 2).unwrap())
            .await
            .unwrap();
        scheduler
            .submit_action(TenantId::from("a"), b.clone(), Action::resize(2, 2).unwrap())
            .await
            .unwrap();
        scheduler
            .submit_action(TenantId::from("b"), b, Action::resize(3, 3).unwrap())
            .await
            .unwrap();

        let keys: Vec<(String, u64)> = scheduler
            .queue_snapshot()
            .await
            .into_iter()
            .map(|e| (e.tenant_id, e.priority_key))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), 6),
                ("b".to_string(), 6),
                ("a".to_string(), 7)
            ]
        );
        assert_eq!(scheduler.queue_len().await, 3);
    }
}
