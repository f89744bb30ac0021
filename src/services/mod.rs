pub mod catalog;
pub mod locks;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod transform;
pub mod worker;

pub use catalog::ImageCatalog;
pub use locks::{ResourceGuard, ResourceLocks};
pub use queue::{FairQueue, BASE_PRIORITY};
pub use retry::Backoff;
pub use scheduler::Scheduler;
pub use status::StatusTracker;
pub use transform::{ImageBackend, RasterBackend};
pub use worker::WorkerPool;
