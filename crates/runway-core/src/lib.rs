//! Event model, persisted event window and pure state machines behind the
//! runway operations monitor. Nothing in this crate touches a socket or a clock.

pub mod buffer;
pub mod event;
pub mod polling;
pub mod reducer;
pub mod status;
pub mod store;
pub mod transport;

pub use buffer::{EventBuffer, EVENTS_STORE_KEY, EVENT_BUFFER_CAPACITY};
pub use event::{classify_frame, EventError, Frame, PendingJob, RunwayEvent};
pub use polling::{PollCommand, PollingFallback};
pub use reducer::{
    reduce, BuildRun, EsiBudget, InflightRun, LogEntry, QueueDepth, Snapshot,
    RECENT_BUILDS_LIMIT, RECENT_JOBS_LIMIT,
};
pub use status::{PolledLog, StatusSnapshot};
pub use store::{FileStore, MemoryStore, SessionStore, StoreError};
pub use transport::{BackoffPolicy, Transport, TransportAction, TransportInput, TransportState};
