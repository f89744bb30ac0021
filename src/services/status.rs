//! Pubblicazione dello stato dei job
//!
//! Lo stato vive nello store sotto la chiave del `job_id`; ogni cambio viene
//! anche trasmesso sul canale broadcast per chi attende in memoria.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::config::Config;
use crate::db::StatusStore;
use crate::error::{AppError, Result};
use crate::models::{Job, JobId, JobStatus, StatusUpdate};

use super::retry::Backoff;

pub type StatusSender = broadcast::Sender<StatusUpdate>;
pub type StatusReceiver = broadcast::Receiver<StatusUpdate>;

const CHANNEL_CAPACITY: usize = 256;

pub struct StatusTracker<S> {
    store: Arc<S>,
    updates: StatusSender,
    backoff: Backoff,
    /// Ultimo stato pubblicato dei job non ancora terminati
    live: Arc<Mutex<HashMap<JobId, JobStatus>>>,
}

impl<S> Clone for StatusTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            updates: self.updates.clone(),
            backoff: self.backoff,
            live: self.live.clone(),
        }
    }
}

impl<S: StatusStore> StatusTracker<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            store,
            updates,
            backoff: Backoff::from_config(config),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.updates.subscribe()
    }

    /// Scrive `queued` nello store, senza trasmetterlo.
    ///
    /// Scritto in sincrono all'intake: un errore qui annulla la richiesta.
    /// L'annuncio parte con [`StatusTracker::announce_queued`] quando il job
    /// è davvero accodato.
    pub async fn mark_queued(&self, job: &Job) -> Result<()> {
        self.store
            .set(job.id.as_str(), &JobStatus::Queued.to_string())
            .await?;
        self.live.lock().await.insert(job.id.clone(), JobStatus::Queued);
        Ok(())
    }

    pub fn announce_queued(&self, job: &Job) {
        self.broadcast(job, JobStatus::Queued);
    }

    /// Annulla un `mark_queued` il cui intake non è andato a buon fine
    pub async fn discard(&self, job_id: &JobId) -> Result<()> {
        self.live.lock().await.remove(job_id);
        self.store.delete(job_id.as_str()).await
    }

    pub async fn mark_processing(&self, job: &Job) {
        self.publish(job, JobStatus::Processing).await;
    }

    pub async fn mark_done(&self, job: &Job) {
        self.publish(job, JobStatus::Done).await;
    }

    pub async fn mark_failed(&self, job: &Job, message: impl Into<String>) {
        self.publish(job, JobStatus::Error(message.into())).await;
    }

    /// Stato corrente letto dallo store
    pub async fn current(&self, job_id: &JobId) -> Result<JobStatus> {
        let raw = self
            .store
            .get(job_id.as_str())
            .await?
            .ok_or_else(|| AppError::JobNotFound(job_id.to_string()))?;

        JobStatus::parse(&raw).ok_or_else(|| {
            AppError::Store(format!("Stato non riconosciuto per {}: {}", job_id, raw))
        })
    }

    /// Avanza lo stato del job e lo scrive con backoff esponenziale.
    ///
    /// Le transizioni non ammesse vengono scartate. Se lo store resta
    /// irraggiungibile lo stato in memoria viene comunque trasmesso.
    async fn publish(&self, job: &Job, status: JobStatus) {
        if !self.advance(&job.id, &status).await {
            return;
        }

        let value = status.to_string();
        let store = self.store.as_ref();
        let (key, raw) = (job.id.as_str(), value.as_str());
        let written = self
            .backoff
            .run("status", move || store.set(key, raw))
            .await;

        if let Err(e) = written {
            tracing::error!(job_id = %job.id, status = %value, "Stato non pubblicato: {}", e);
        }

        self.broadcast(job, status);
    }

    /// Registra la transizione in memoria se la macchina a stati la ammette
    async fn advance(&self, job_id: &JobId, next: &JobStatus) -> bool {
        let mut live = self.live.lock().await;

        let allowed = live
            .get(job_id)
            .is_some_and(|current| current.can_transition_to(next));

        if !allowed {
            tracing::error!(
                job_id = %job_id,
                from = ?live.get(job_id),
                to = %next,
                "Transizione di stato non ammessa"
            );
            return false;
        }

        if next.is_terminal() {
            live.remove(job_id);
        } else {
            live.insert(job_id.clone(), next.clone());
        }
        true
    }

    fn broadcast(&self, job: &Job, status: JobStatus) {
        // Nessun ricevitore attivo non è un errore
        let _ = self.updates.send(StatusUpdate::new(job, status));
    }
}
