//! Fair priority queue
//!
//! Coda condivisa tra produttori e worker, ordinata per chiave di equità
//! con spareggio FIFO.

mod core;
mod entry;

pub use core::{FairQueue, BASE_PRIORITY};
pub use entry::QueueEntry;
