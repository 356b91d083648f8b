//! Per-file change detection and the render-and-publish reaction.

mod error;
mod orchestrator;
mod poller;

pub use error::WatchError;
pub use orchestrator::{DocumentPublisher, Orchestrator, WatchSet, WatchSettings};
pub use poller::{ChangePoller, DEFAULT_POLL_INTERVAL, PollOutcome};
