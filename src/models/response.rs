use serde::Serialize;

use super::{JobStatus, ResourceId};

/// Vista di un'immagine registrata con la sua cronologia
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageInfo {
    pub id: ResourceId,
    /// Azioni applicate, dalla più vecchia alla più recente
    pub actions: Vec<String>,
    pub location: String,
    /// Ultimo job richiesto, "none" se nessuno
    pub last_job: String,
    /// Stato dell'ultimo job, "none" se nessuno
    pub last_job_state: String,
}

/// Voce della coda restituita dal dump di debug
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueEntryInfo {
    pub job_id: String,
    pub tenant_id: String,
    pub resource_id: String,
    pub action: String,
    pub priority_key: u64,
    pub sequence: u64,
}

/// Risposta di intake
#[derive(Debug, Clone, Serialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
    pub status: JobStatus,
}
