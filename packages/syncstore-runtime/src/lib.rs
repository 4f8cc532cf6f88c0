//! Tick-based maintenance runtime.
//!
//! Requests are served directly against the store; this runtime owns the
//! background work: periodic expiry sweeps, periodic persistence flushes
//! and on-demand commands such as a final flush at shutdown.

use syncstore_core::error::StorageError;
use tokio::sync::oneshot;

mod runtime;
mod stats;
mod tick_phases;

pub use runtime::{Runtime, TickPhase};
pub use stats::RuntimeStats;
pub use syncstore_core::persistence::FlushReport;
pub use tick_phases::TickPhaseProcessor;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Response sender for maintenance commands
pub type ResponseSender<T> = oneshot::Sender<Result<T>>;

/// Command sent to the runtime from other threads
#[derive(Debug)]
pub enum MaintenanceCommand {
    /// Flush dirty owners now
    Flush {
        response: Option<ResponseSender<FlushReport>>,
    },
    /// Sweep expired objects now
    Sweep {
        response: Option<ResponseSender<usize>>,
    },
    /// Stop the loop after a final flush
    Shutdown,
}

impl MaintenanceCommand {
    /// Flush command paired with the receiver for its result.
    pub fn flush() -> (Self, oneshot::Receiver<Result<FlushReport>>) {
        let (tx, rx) = oneshot::channel();
        (MaintenanceCommand::Flush { response: Some(tx) }, rx)
    }

    /// Sweep command paired with the receiver for its result.
    pub fn sweep() -> (Self, oneshot::Receiver<Result<usize>>) {
        let (tx, rx) = oneshot::channel();
        (MaintenanceCommand::Sweep { response: Some(tx) }, rx)
    }
}
