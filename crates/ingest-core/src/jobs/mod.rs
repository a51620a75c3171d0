//! JobStore (C3) and JobQueue (C4): job persistence/state machine, and a
//! priority-ordered bounded queue of pending work dispatched to a worker
//! pool.

pub mod queue;
pub mod store;

pub use queue::{JobExecutor, JobPayload, JobQueue, JobQueueError, Priority, QueueStatus, QueuedItemPreview};
pub use store::{JobStore, JobStoreError};
