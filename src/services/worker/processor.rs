//! Esecuzione di un singolo job

use std::path::{Path, PathBuf};

use crate::db::StatusStore;
use crate::error::{AppError, Result};
use crate::models::Job;
use crate::services::scheduler::Scheduler;
use crate::services::transform::{self, ImageBackend};

/// Esegue il job fino a uno stato terminale.
///
/// Non ritorna errori: ogni fallimento diventa lo stato `error: ...` del
/// job e il worker passa al successivo.
pub async fn process_job<S: StatusStore, B: ImageBackend>(scheduler: &Scheduler<S, B>, mut job: Job) {
    job.mark_started();
    scheduler.status.mark_processing(&job).await;

    tracing::debug!(
        job_id = %job.id,
        resource_id = %job.resource_id,
        action = %job.action,
        "Elaborazione job"
    );

    {
        // Lock tenuto fino alla pubblicazione dello stato finale
        let _guard = scheduler.locks.acquire(&job.resource_id).await;

        let outcome = execute(scheduler, &job).await;
        job.mark_completed();

        match outcome {
            Ok(location) => {
                tracing::info!(
                    job_id = %job.id,
                    resource_id = %job.resource_id,
                    action = %job.action,
                    "Job completato: {}",
                    location.display()
                );
                scheduler.status.mark_done(&job).await;
            }
            Err(e) => {
                let message = failure_message(e);
                tracing::warn!(
                    job_id = %job.id,
                    resource_id = %job.resource_id,
                    action = %job.action,
                    "Job fallito: {}",
                    message
                );
                scheduler.status.mark_failed(&job, message).await;
            }
        }
    }

    scheduler.queue.retire(&job).await;
}

/// Il percorso viene letto qui e non all'intake: un job precedente sulla
/// stessa risorsa può averlo cambiato.
async fn execute<S: StatusStore, B: ImageBackend>(
    scheduler: &Scheduler<S, B>,
    job: &Job,
) -> Result<PathBuf> {
    let src = scheduler.catalog.location(&job.resource_id).await?;

    let backend = scheduler.backend.clone();
    let action = job.action.clone();
    let input = src.clone();

    let dest = tokio::task::spawn_blocking(move || transform::apply(&*backend, &action, &input))
        .await
        .map_err(|e| AppError::TransformFailure(format!("Task interrotto: {}", e)))??;

    if dest != src {
        relocate(scheduler, job, &src, &dest).await?;
    }

    Ok(dest)
}

/// Registra il nuovo percorso dopo un transcode, poi rimuove il vecchio file.
///
/// Se la scrittura non riesce nemmeno con i retry, il nuovo file viene
/// rimosso e la risorsa resta sul sorgente originale.
async fn relocate<S: StatusStore, B: ImageBackend>(
    scheduler: &Scheduler<S, B>,
    job: &Job,
    src: &Path,
    dest: &Path,
) -> Result<()> {
    let catalog = &scheduler.catalog;
    let resource_id = &job.resource_id;

    let saved = scheduler
        .retry
        .run("location", move || catalog.set_location(resource_id, dest))
        .await;

    if let Err(e) = saved {
        if let Err(cleanup) = tokio::fs::remove_file(dest).await {
            tracing::warn!(job_id = %job.id, "Nuovo file non rimosso {}: {}", dest.display(), cleanup);
        }
        return Err(e);
    }

    if let Err(e) = tokio::fs::remove_file(src).await {
        tracing::warn!(job_id = %job.id, "Vecchio file non rimosso {}: {}", src.display(), e);
    }

    Ok(())
}

fn failure_message(error: AppError) -> String {
    match error {
        AppError::TransformFailure(detail) => detail,
        other => other.to_string(),
    }
}
