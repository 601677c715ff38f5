use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Fence, WaitOutcome};
use crate::error::Result;

#[derive(Debug, Default)]
struct Values {
    completed: u64,
    signaled: u64,
    blocked_waits: usize,
}

/// Software fence whose completed value only moves when [`ManualFence::complete`] is called.
/// Stands in for the GPU timeline wherever no device is available.
#[derive(Debug, Default)]
pub struct ManualFence {
    values: Mutex<Values>,
    reached: Condvar,
}

impl ManualFence {
    pub fn new(initial_value: u64) -> Self {
        ManualFence {
            values: Mutex::new(Values {
                completed: initial_value,
                signaled: initial_value,
                blocked_waits: 0,
            }),
            reached: Condvar::new(),
        }
    }

    /// Marks everything up to `value` as executed. Never moves the completed value backwards.
    pub fn complete(&self, value: u64) {
        let mut values = self.values.lock();
        if value > values.completed {
            values.completed = value;
            self.reached.notify_all();
        }
    }

    /// Completes every value signaled so far
    pub fn complete_all(&self) {
        let signaled = self.values.lock().signaled;
        self.complete(signaled);
    }

    /// The last value passed to [`Fence::signal`]
    pub fn last_signaled(&self) -> u64 {
        self.values.lock().signaled
    }

    /// How many calls to [`Fence::wait_for`] had to suspend the caller
    pub fn blocked_waits(&self) -> usize {
        self.values.lock().blocked_waits
    }
}

impl Fence for ManualFence {
    fn completed_value(&self) -> u64 {
        self.values.lock().completed
    }

    fn signal(&self, value: u64) -> Result<()> {
        let mut values = self.values.lock();
        values.signaled = values.signaled.max(value);
        Ok(())
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let mut values = self.values.lock();
        if values.completed >= value {
            return Ok(WaitOutcome::Reached);
        }
        values.blocked_waits += 1;

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        while values.completed < value {
            match deadline {
                Some(deadline) => {
                    if self.reached.wait_until(&mut values, deadline).timed_out() {
                        if values.completed >= value {
                            break;
                        }
                        return Ok(WaitOutcome::TimedOut);
                    }
                }
                None => self.reached.wait(&mut values),
            }
        }

        Ok(WaitOutcome::Reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn completed_value_never_decreases() {
        let fence = ManualFence::new(0);
        fence.complete(4);
        fence.complete(2);
        assert_eq!(fence.completed_value(), 4);
    }

    #[test]
    fn signal_does_not_complete() {
        let fence = ManualFence::new(0);
        fence.signal(3).unwrap();
        assert_eq!(fence.completed_value(), 0);
        assert_eq!(fence.last_signaled(), 3);

        fence.complete_all();
        assert_eq!(fence.completed_value(), 3);
    }

    #[test]
    fn reached_value_returns_without_blocking() {
        let fence = ManualFence::new(5);
        assert_eq!(fence.wait_for(5, None).unwrap(), WaitOutcome::Reached);
        assert_eq!(fence.blocked_waits(), 0);
    }

    #[test]
    fn wait_times_out() {
        let fence = ManualFence::new(0);
        let outcome = fence.wait_for(1, Some(Duration::from_millis(10))).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(fence.blocked_waits(), 1);
    }

    #[test]
    fn wait_wakes_on_complete() {
        let fence = Arc::new(ManualFence::new(0));
        let gpu = {
            let fence = fence.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                fence.complete(2);
            })
        };

        assert_eq!(fence.wait_for(2, None).unwrap(), WaitOutcome::Reached);
        gpu.join().unwrap();
    }
}
