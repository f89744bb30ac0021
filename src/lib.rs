//! Motore di job asincroni per trasformazioni di immagini
//!
//! Le richieste vengono validate, accodate in una coda con correzione di
//! equità per tenant ed eseguite da un pool di worker, con al più una
//! trasformazione alla volta per immagine.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{RasterBackend, Scheduler, WorkerPool};
