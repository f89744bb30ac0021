use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagejobs::db::{MemoryStore, SqliteStore, StatusStore};
use imagejobs::models::{ActionParams, JobCreatedResponse, TenantId};
use imagejobs::{Config, RasterBackend, Result, Scheduler};

const USAGE: &str = "Uso: imagejobs <immagine> <azione>=<parametri>...\n\
    Azioni: transcode=png | resize=50,50 | crop=x0,y0,x1,y1";

/// Attesa massima per ogni job prima di riportarne lo stato corrente
const JOB_WAIT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() {
    // Carica variabili da .env
    dotenvy::dotenv().ok();

    // Inizializza logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagejobs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((path, requests)) = args.split_first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let requests = match parse_requests(requests) {
        Some(requests) if !requests.is_empty() => requests,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::from_env();
    let path = PathBuf::from(path);

    let outcome = match config.database_url.clone() {
        Some(url) => {
            tracing::info!("Connessione al database: {}", url);
            match SqliteStore::connect(&url).await {
                Ok(store) => run(Arc::new(store), config, path, requests).await,
                Err(e) => {
                    tracing::error!("Errore inizializzazione database: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => run(Arc::new(MemoryStore::new()), config, path, requests).await,
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

/// Coppie `azione=parametri` nell'ordine dato
fn parse_requests(raw: &[String]) -> Option<Vec<(String, ActionParams)>> {
    raw.iter()
        .map(|arg| {
            let (action, value) = arg.split_once('=')?;
            let params = match action {
                "transcode" => ActionParams::extension(value),
                "resize" => ActionParams::size(value),
                "crop" => ActionParams::bbox(value),
                _ => ActionParams::default(),
            };
            Some((action.to_string(), params))
        })
        .collect()
}

async fn run<S: StatusStore>(
    store: Arc<S>,
    config: Config,
    path: PathBuf,
    requests: Vec<(String, ActionParams)>,
) -> Result<()> {
    let backend = RasterBackend::new(config.max_pixels);
    let scheduler = Scheduler::new(store, backend, config);
    let tenant = TenantId::from("cli");

    let resource_id = scheduler.register_image(&tenant, &path).await?;
    let pool = scheduler.start_workers();

    let mut job_ids = Vec::with_capacity(requests.len());
    for (action, params) in &requests {
        let job_id = scheduler
            .submit(tenant.clone(), resource_id.clone(), action, params)
            .await?;
        job_ids.push(job_id);
    }

    for job_id in &job_ids {
        let status = scheduler.wait(job_id, JOB_WAIT).await?;
        print_json(&JobCreatedResponse {
            job_id: job_id.to_string(),
            status,
        });
    }

    pool.shutdown().await;

    let info = scheduler.describe_image(&resource_id).await?;
    print_json(&info);

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Serializzazione fallita: {}", e),
    }
}
