//! File ingestion: watching folders, waiting for files to settle and running
//! them through the hash/identify/resolve job chain.

pub mod change_queue;
pub mod fs_watch;
pub mod orchestration;
pub mod readiness;
pub mod stages;

pub use change_queue::{ChangeQueue, ChangeQueueDrainer, PendingFile, PendingState};
pub use fs_watch::{FolderEvent, FolderWatcher, NotifyBackend, WatchBackend};
pub use readiness::{Readiness, ReadinessGate};
