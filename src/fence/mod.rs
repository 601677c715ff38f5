#[cfg(windows)]
mod event;
mod manual;
#[cfg(windows)]
mod queue;

use std::time::Duration;

pub use manual::ManualFence;
#[cfg(windows)]
pub use queue::QueueFence;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    TimedOut,
}

/// A monotonically increasing counter shared between the CPU and the GPU timeline.
pub trait Fence {
    /// The highest value the GPU has written so far
    fn completed_value(&self) -> u64;

    /// Enqueues a write of `value`, which happens once the GPU reaches this point of its queue.
    fn signal(&self, value: u64) -> Result<()>;

    /// Blocks the calling thread until `value` has been reached.
    /// A `timeout` of `None` waits forever.
    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> Result<WaitOutcome>;
}

impl<F: Fence + ?Sized> Fence for std::sync::Arc<F> {
    fn completed_value(&self) -> u64 {
        (**self).completed_value()
    }

    fn signal(&self, value: u64) -> Result<()> {
        (**self).signal(value)
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> Result<WaitOutcome> {
        (**self).wait_for(value, timeout)
    }
}
