//! Ordinamento delle voci in coda

use std::cmp::Ordering;

use crate::models::{Job, QueueEntryInfo};

/// Voce in coda: job più chiave di priorità e numero di sequenza.
///
/// Ordinata per `(priority_key, sequence)`: chiave minore servita prima,
/// a parità di chiave vince l'ordine di inserimento.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub priority_key: u64,
    pub sequence: u64,
    pub job: Job,
}

impl QueueEntry {
    pub fn info(&self) -> QueueEntryInfo {
        QueueEntryInfo {
            job_id: self.job.id.to_string(),
            tenant_id: self.job.tenant_id.to_string(),
            resource_id: self.job.resource_id.to_string(),
            action: self.job.action.to_string(),
            priority_key: self.priority_key,
            sequence: self.sequence,
        }
    }

    fn sort_key(&self) -> (u64, u64) {
        (self.priority_key, self.sequence)
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
