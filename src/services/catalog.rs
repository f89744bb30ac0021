//! Catalogo delle immagini registrate
//!
//! Layout delle chiavi nello store:
//!
//! - `images.all`: lista di tutti gli id
//! - `images.{id}.location`: percorso corrente del file
//! - `images.{id}.user`: proprietario
//! - `images.{id}.actions`: cronologia azioni, più recente in testa
//! - `images.{id}.last_job`: ultimo job richiesto
//! - `user.{uid}.images`: immagini del proprietario

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::StatusStore;
use crate::error::{AppError, Result};
use crate::models::{ImageInfo, JobId, ResourceId, TenantId};

const ALL_IMAGES: &str = "images.all";
const NONE: &str = "none";
/// Prima voce della cronologia di ogni immagine
pub const UPLOAD_ACTION: &str = "upload";

fn location_key(id: &ResourceId) -> String {
    format!("images.{}.location", id)
}

fn user_key(id: &ResourceId) -> String {
    format!("images.{}.user", id)
}

fn actions_key(id: &ResourceId) -> String {
    format!("images.{}.actions", id)
}

fn last_job_key(id: &ResourceId) -> String {
    format!("images.{}.last_job", id)
}

fn user_images_key(user: &str) -> String {
    format!("user.{}.images", user)
}

pub struct ImageCatalog<S> {
    store: Arc<S>,
}

impl<S> Clone for ImageCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: StatusStore> ImageCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registra un file esistente e ritorna il nuovo id
    pub async fn register(&self, owner: &TenantId, path: &Path) -> Result<ResourceId> {
        if !path.is_file() {
            return Err(AppError::ResourceNotFound(format!(
                "File non trovato: {}",
                path.display()
            )));
        }

        let id = ResourceId::new();
        let location = path.to_string_lossy();

        self.store.set(&location_key(&id), &location).await?;
        self.store.set(&user_key(&id), owner.as_str()).await?;
        self.store.lpush(&actions_key(&id), UPLOAD_ACTION).await?;
        self.store.lpush(ALL_IMAGES, id.as_str()).await?;
        self.store
            .lpush(&user_images_key(owner.as_str()), id.as_str())
            .await?;

        tracing::debug!(resource_id = %id, owner = %owner, "Immagine registrata: {}", location);
        Ok(id)
    }

    pub async fn exists(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.store.get(&location_key(id)).await?.is_some())
    }

    /// Percorso corrente del file
    pub async fn location(&self, id: &ResourceId) -> Result<PathBuf> {
        self.store
            .get(&location_key(id))
            .await?
            .map(PathBuf::from)
            .ok_or_else(|| AppError::ResourceNotFound(id.to_string()))
    }

    pub async fn set_location(&self, id: &ResourceId, path: &Path) -> Result<()> {
        self.store
            .set(&location_key(id), &path.to_string_lossy())
            .await
    }

    /// Annota il job nella cronologia dell'immagine.
    ///
    /// Se la cronologia non si aggiorna, `last_job` torna al valore
    /// precedente: nessuna traccia parziale del job.
    pub async fn record_job(&self, id: &ResourceId, job_id: &JobId, action: &str) -> Result<()> {
        let key = last_job_key(id);
        let previous = self.store.get(&key).await?;

        self.store.set(&key, job_id.as_str()).await?;

        if let Err(e) = self.store.lpush(&actions_key(id), action).await {
            let restored = match &previous {
                Some(value) => self.store.set(&key, value).await,
                None => self.store.delete(&key).await,
            };
            if let Err(restore_err) = restored {
                tracing::error!(resource_id = %id, "Ripristino last_job fallito: {}", restore_err);
            }
            return Err(e);
        }

        Ok(())
    }

    pub async fn describe(&self, id: &ResourceId) -> Result<ImageInfo> {
        let location = self
            .store
            .get(&location_key(id))
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(id.to_string()))?;

        let mut actions = self.store.lrange(&actions_key(id)).await?;
        actions.reverse();

        let last_job = self.store.get(&last_job_key(id)).await?;
        let last_job_state = match &last_job {
            Some(job_id) => self.store.get(job_id).await?,
            None => None,
        };

        Ok(ImageInfo {
            id: id.clone(),
            actions,
            location,
            last_job: last_job.unwrap_or_else(|| NONE.to_string()),
            last_job_state: last_job_state.unwrap_or_else(|| NONE.to_string()),
        })
    }

    /// Rimuove file e metadati. Lo stato dei job passati resta consultabile.
    pub async fn delete(&self, id: &ResourceId) -> Result<()> {
        let location = self.location(id).await?;

        match tokio::fs::remove_file(&location).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(resource_id = %id, "File già assente: {}", location.display());
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(owner) = self.store.get(&user_key(id)).await? {
            self.store
                .lrem(&user_images_key(&owner), id.as_str())
                .await?;
        }
        self.store.lrem(ALL_IMAGES, id.as_str()).await?;

        for key in [
            location_key(id),
            user_key(id),
            actions_key(id),
            last_job_key(id),
        ] {
            self.store.delete(&key).await?;
        }

        tracing::debug!(resource_id = %id, "Immagine eliminata");
        Ok(())
    }

    /// Id registrati, dal più recente
    pub async fn all_ids(&self) -> Result<Vec<ResourceId>> {
        let ids = self.store.lrange(ALL_IMAGES).await?;
        Ok(ids.iter().map(|s| ResourceId::from(s.as_str())).collect())
    }

    /// Immagini di un proprietario, dalla più recente
    pub async fn owned_by(&self, owner: &TenantId) -> Result<Vec<ResourceId>> {
        let ids = self.store.lrange(&user_images_key(owner.as_str())).await?;
        Ok(ids.iter().map(|s| ResourceId::from(s.as_str())).collect())
    }
}
