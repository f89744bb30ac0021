use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::utils::validation::validate_extension;

/// Handle restituito al chiamante e chiave di stato nello store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(format!("job-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identificativo di un'immagine registrata
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chiamante che ha inviato il job, usato solo per il calcolo della priorità
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rettangolo di crop `(x0, y0, x1, y1)`, estremi superiori esclusi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    /// Il rettangolo deve essere non negativo e non vuoto
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Result<Self> {
        if x0 < 0 || y0 < 0 || x1 < 0 || y1 < 0 {
            return Err(AppError::InvalidParameters(format!(
                "Box con coordinate negative: ({}, {}, {}, {})",
                x0, y0, x1, y1
            )));
        }

        if x1 <= x0 || y1 <= y0 {
            return Err(AppError::InvalidParameters(format!(
                "Box vuoto o invertito: ({}, {}, {}, {})",
                x0, y0, x1, y1
            )));
        }

        let coord = |v: i64| {
            u32::try_from(v).map_err(|_| {
                AppError::InvalidParameters(format!("Coordinata fuori intervallo: {}", v))
            })
        };

        Ok(Self {
            x0: coord(x0)?,
            y0: coord(y0)?,
            x1: coord(x1)?,
            y1: coord(y1)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Trasformazione richiesta su un'immagine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Transcode { extension: String },
    Resize { width: u32, height: u32 },
    Crop { bbox: BoundingBox },
}

impl Action {
    pub fn transcode(extension: &str) -> Result<Self> {
        let extension = validate_extension(extension).map_err(|e| match e {
            AppError::UnsupportedFormat(msg) => AppError::InvalidParameters(msg),
            other => other,
        })?;
        Ok(Action::Transcode { extension })
    }

    pub fn resize(width: i64, height: i64) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(AppError::InvalidParameters(format!(
                "Dimensioni non positive: {}x{}",
                width, height
            )));
        }

        let dim = |v: i64| {
            u32::try_from(v).map_err(|_| {
                AppError::InvalidParameters(format!("Dimensione fuori intervallo: {}", v))
            })
        };

        Ok(Action::Resize {
            width: dim(width)?,
            height: dim(height)?,
        })
    }

    pub fn crop(x0: i64, y0: i64, x1: i64, y1: i64) -> Result<Self> {
        Ok(Action::Crop {
            bbox: BoundingBox::new(x0, y0, x1, y1)?,
        })
    }

    /// Nome registrato nella cronologia azioni dell'immagine
    pub fn name(&self) -> &'static str {
        match self {
            Action::Transcode { .. } => "transcode",
            Action::Resize { .. } => "resize",
            Action::Crop { .. } => "crop",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Transcode { extension } => write!(f, "transcode({})", extension),
            Action::Resize { width, height } => write!(f, "resize({}x{})", width, height),
            Action::Crop { bbox } => write!(
                f,
                "crop({},{},{},{})",
                bbox.x0, bbox.y0, bbox.x1, bbox.y1
            ),
        }
    }
}

/// Stato pubblicato di un job: queued → processing → done | error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error(_))
    }

    /// Transizioni ammesse dalla macchina a stati del job
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Done)
                | (JobStatus::Processing, JobStatus::Error(_))
        )
    }

    /// Decodifica il valore salvato nello store
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "done" => Some(JobStatus::Done),
            other => other
                .strip_prefix("error:")
                .map(|msg| JobStatus::Error(msg.trim_start().to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Singola trasformazione richiesta su una singola immagine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub resource_id: ResourceId,
    pub tenant_id: TenantId,
    pub action: Action,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    priority_key: Option<u64>,
}

impl Job {
    pub fn new(tenant_id: TenantId, resource_id: ResourceId, action: Action) -> Self {
        Self {
            id: JobId::new(),
            resource_id,
            tenant_id,
            action,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            priority_key: None,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn priority_key(&self) -> Option<u64> {
        self.priority_key
    }

    /// Assegnata una sola volta, all'accodamento
    pub(crate) fn assign_priority(&mut self, key: u64) {
        if self.priority_key.is_none() {
            self.priority_key = Some(key);
        }
    }

    /// Ritorna false se il job era già stato avviato
    pub fn mark_started(&mut self) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        // L'orologio può arretrare: il timestamp non scende mai sotto created_at
        self.started_at = Some(Utc::now().max(self.created_at));
        true
    }

    /// Ritorna false se il job non è avviato o è già completato
    pub fn mark_completed(&mut self) -> bool {
        match (self.started_at, self.completed_at) {
            (Some(started), None) => {
                self.completed_at = Some(Utc::now().max(started));
                true
            }
            _ => false,
        }
    }
}

/// Notifica di cambio stato inviata via broadcast
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub job: Job,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(job: &Job, status: JobStatus) -> Self {
        Self {
            job: job.clone(),
            status,
            timestamp: Utc::now(),
        }
    }
}
