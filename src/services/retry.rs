//! Retry con backoff esponenziale per le scritture sullo store

use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    retries: u32,
    base: Duration,
}

impl Backoff {
    pub fn new(retries: u32, base: Duration) -> Self {
        Self { retries, base }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.publish_retries, config.publish_backoff)
    }

    /// Attesa prima del tentativo `attempt + 1`: `base * 2^attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Esegue `op` fino a `retries + 1` volte. Ritorna l'ultimo errore se
    /// nessun tentativo riesce.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        "Scrittura fallita, nuovo tentativo tra {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        operation,
                        "Scrittura abbandonata dopo {} tentativi: {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}
