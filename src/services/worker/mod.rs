//! Pool di worker sulla coda condivisa

mod processor;

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::StatusStore;

use super::scheduler::Scheduler;
use super::transform::ImageBackend;

pub use processor::process_job;

/// Worker avviati; si fermano con [`WorkerPool::shutdown`]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn start<S: StatusStore, B: ImageBackend>(
        scheduler: Scheduler<S, B>,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let workers = workers.max(1);

        let handles = (0..workers)
            .map(|worker_id| {
                let scheduler = scheduler.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(run_worker(worker_id, scheduler, poll_interval, shutdown))
            })
            .collect();

        tracing::info!(workers, "Worker pool avviato");

        Self { handles, shutdown }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Ferma i worker. Un job già estratto viene portato a termine.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker terminato in modo anomalo: {}", e);
            }
        }

        tracing::info!("Worker pool fermato");
    }
}

async fn run_worker<S: StatusStore, B: ImageBackend>(
    worker_id: usize,
    scheduler: Scheduler<S, B>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker_id, "Worker avviato");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                // Sender chiuso equivale a shutdown
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            job = scheduler.queue.pop(poll_interval) => match job {
                Some(job) => process_job(&scheduler, job).await,
                None => tracing::debug!(worker_id, "Nessun job entro il polling, nuovo tentativo"),
            },
        }
    }

    tracing::debug!(worker_id, "Worker fermato");
}
