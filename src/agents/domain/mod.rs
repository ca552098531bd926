//! Domain types for the agent system

mod chat;
mod message;
mod tool;

pub use chat::*;
pub use message::*;
pub use tool::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag threaded through a turn.
///
/// Checked at each tool-loop step and at awaited I/O boundaries; in-flight
/// calls that cannot be aborted run to completion and their result is
/// discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
