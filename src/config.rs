use std::time::Duration;

/// 100 megapixel
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    pub poll_interval: Duration,
    pub base_priority: u64,
    pub database_url: Option<String>,
    pub publish_retries: u32,
    pub publish_backoff: Duration,
    /// Pixel massimi di un'immagine prodotta da un resize
    pub max_pixels: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 10,
            poll_interval: Duration::from_secs(10),
            base_priority: 5,
            database_url: None,
            publish_retries: 5,
            publish_backoff: Duration::from_millis(200),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(workers) = std::env::var("IMAGEJOBS_WORKERS") {
            if let Ok(w) = workers.parse::<usize>() {
                config.workers = w.max(1);
            }
        }

        if let Ok(secs) = std::env::var("IMAGEJOBS_POLL_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                config.poll_interval = Duration::from_secs(s);
            }
        }

        if let Ok(priority) = std::env::var("IMAGEJOBS_BASE_PRIORITY") {
            if let Ok(p) = priority.parse() {
                config.base_priority = p;
            }
        }

        if let Ok(url) = std::env::var("IMAGEJOBS_DATABASE_URL") {
            if !url.is_empty() {
                config.database_url = Some(url);
            }
        }

        if let Ok(retries) = std::env::var("IMAGEJOBS_PUBLISH_RETRIES") {
            if let Ok(r) = retries.parse() {
                config.publish_retries = r;
            }
        }

        if let Ok(ms) = std::env::var("IMAGEJOBS_PUBLISH_BACKOFF_MS") {
            if let Ok(m) = ms.parse() {
                config.publish_backoff = Duration::from_millis(m);
            }
        }

        if let Ok(pixels) = std::env::var("IMAGEJOBS_MAX_PIXELS") {
            if let Ok(p) = pixels.parse::<u64>() {
                config.max_pixels = p.max(1);
            }
        }

        config
    }

    /// Configurazione compatta per i test: pochi worker, polling rapido
    pub fn for_tests(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            poll_interval: Duration::from_millis(50),
            publish_backoff: Duration::from_millis(5),
            ..Self::default()
        }
    }
}

// Formati supportati
pub mod formats {
    /// Estensioni accettate come destinazione di un transcode
    pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

    pub fn is_allowed_extension(ext: &str) -> bool {
        ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}
