pub mod engine;
pub mod error;
pub mod ids;
pub mod pile_queue;
pub mod request;
pub mod status;
pub mod waiting_area;
pub mod watcher;

pub use engine::{BrakePolicy, Scheduler, SchedulerConfig};
pub use error::SchedulerError;
pub use request::{Request, RequestStage};
pub use status::{RequestStatus, RequestStatusKind, SnapshotEntry};
pub use watcher::CompletionWatcher;
