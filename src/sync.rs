use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fence::{Fence, WaitOutcome};
use crate::frame_ring::{FrameRing, FrameSlot, SlotState};

/// Paces the CPU against the GPU over a ring of frame slots.
///
/// Each submission signals the next value of a single counter and records it as the slot's
/// watermark. Reusing a slot waits until the fence has reached that watermark, so the CPU never
/// overwrites memory a command list in flight still reads.
pub struct FrameSync<F, T> {
    fence: F,
    ring: FrameRing<T>,
    /// Last value handed to `Fence::signal`
    counter: u64,
    default_timeout: Option<Duration>,
    blocking_waits: u64,
    /// Set by a flush, cleared as soon as anything may have been queued after it
    flushed: bool,
}

impl<F: Fence, T> FrameSync<F, T> {
    /// The counter starts at the fence's current completed value, so fresh slots never wait.
    pub fn new(fence: F, ring: FrameRing<T>) -> Self {
        let counter = fence.completed_value();
        FrameSync {
            fence,
            ring,
            counter,
            default_timeout: None,
            blocking_waits: 0,
            flushed: false,
        }
    }

    /// Bounds the wait of [`FrameSync::advance_frame`]. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Makes the next slot current and blocks until the GPU is done with it.
    /// A wait exceeding the configured timeout is reported as [`Error::WaitFailed`].
    pub fn advance_frame(&mut self) -> Result<&mut T> {
        match self.advance_frame_timeout(self.default_timeout)? {
            WaitOutcome::Reached => self.current_mut(),
            WaitOutcome::TimedOut => {
                let slot = self.ring.current();
                Err(Error::WaitFailed {
                    value: slot.watermark,
                    reason: format!("timed out after {:?}", self.default_timeout),
                })
            }
        }
    }

    /// Like [`FrameSync::advance_frame`], but reports a timeout instead of failing.
    /// After `TimedOut` the cursor has still moved; call [`FrameSync::wait_current`] before
    /// touching the slot.
    pub fn advance_frame_timeout(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let previous = self.ring.current_mut();
        if previous.state == SlotState::Recording {
            warn!("Advancing past a frame slot that was never submitted");
            previous.state = SlotState::Idle;
        }

        let index = self.ring.advance();
        debug!(index, "Advanced frame ring");
        self.wait_current(timeout)
    }

    /// Blocks until the current slot's watermark is reached and marks it as recording
    pub fn wait_current(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let index = self.ring.current_index();
        let watermark = self.ring.current().watermark;

        if self.fence.completed_value() < watermark {
            debug!(index, watermark, "Waiting for the GPU to release frame slot");
            self.blocking_waits += 1;
            if self.fence.wait_for(watermark, timeout)? == WaitOutcome::TimedOut {
                debug!(index, watermark, "Frame slot wait timed out");
                return Ok(WaitOutcome::TimedOut);
            }
        }

        self.ring.current_mut().state = SlotState::Recording;
        Ok(WaitOutcome::Reached)
    }

    /// Signals the next fence value for the current slot, which becomes its new watermark.
    /// The commands using the slot must already be in the queue.
    pub fn submit_frame(&mut self) -> Result<u64> {
        let index = self.ring.current_index();
        let slot = self.ring.current();
        if slot.state == SlotState::Submitted {
            return Err(Error::AlreadySubmitted {
                index,
                watermark: slot.watermark,
            });
        }

        let value = self.signal()?;
        let slot = self.ring.current_mut();
        slot.watermark = value;
        slot.state = SlotState::Submitted;
        debug!(index, value, "Submitted frame slot");

        Ok(value)
    }

    /// Signals a value that belongs to no slot, e.g. after a one-off upload
    pub fn signal(&mut self) -> Result<u64> {
        let value = self.counter + 1;
        self.fence.signal(value)?;
        self.counter = value;
        self.flushed = false;
        Ok(value)
    }

    /// Records that work was put on the queue outside of [`FrameSync::submit_frame`] and
    /// [`FrameSync::signal`], so the next flush cannot be skipped.
    pub fn note_enqueued(&mut self) {
        self.flushed = false;
    }

    /// Signals a new fence value and blocks until the GPU has reached it, which covers
    /// everything queued before the call. Afterwards no slot is in flight.
    ///
    /// A flush directly following another flush, with nothing queued in between, signals
    /// nothing and leaves the counter alone.
    pub fn flush_all(&mut self) -> Result<()> {
        if !self.flushed {
            self.signal()?;
        }

        if self.fence.completed_value() < self.counter {
            info!(value = self.counter, "Flushing command queue");
            self.blocking_waits += 1;
            self.fence.wait_for(self.counter, None)?;
        }

        for slot in self.ring.iter_mut() {
            if slot.state == SlotState::Submitted {
                slot.state = SlotState::Idle;
            }
        }
        self.flushed = true;

        Ok(())
    }

    /// Resources of the current slot, only while the GPU cannot be reading them
    pub fn current_mut(&mut self) -> Result<&mut T> {
        let index = self.ring.current_index();
        let completed = self.fence.completed_value();
        let slot = self.ring.current_mut();

        if slot.state == SlotState::Submitted && completed < slot.watermark {
            return Err(Error::SlotInFlight {
                index,
                watermark: slot.watermark,
                completed,
            });
        }

        // A flushed or already reached slot can go straight back to recording
        slot.state = SlotState::Recording;
        Ok(&mut slot.resources)
    }

    pub fn current(&self) -> &T {
        &self.ring.current().resources
    }

    pub fn current_index(&self) -> usize {
        self.ring.current_index()
    }

    pub fn current_slot(&self) -> &FrameSlot<T> {
        self.ring.current()
    }

    pub fn watermark(&self, index: usize) -> Option<u64> {
        self.ring.get(index).map(|slot| slot.watermark)
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn completed_value(&self) -> u64 {
        self.fence.completed_value()
    }

    /// How many times the CPU had to wait on the GPU
    pub fn blocking_waits(&self) -> u64 {
        self.blocking_waits
    }

    pub fn fence(&self) -> &F {
        &self.fence
    }

    pub fn ring(&self) -> &FrameRing<T> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::ManualFence;

    fn frame_sync(frame_count: usize) -> FrameSync<ManualFence, usize> {
        FrameSync::new(
            ManualFence::new(0),
            FrameRing::from_fn(frame_count, |index| index).unwrap(),
        )
    }

    #[test]
    fn submit_assigns_increasing_watermarks() {
        let mut sync = frame_sync(2);
        assert_eq!(sync.submit_frame().unwrap(), 1);
        assert_eq!(sync.watermark(0), Some(1));
        assert_eq!(sync.fence().last_signaled(), 1);

        sync.advance_frame().unwrap();
        assert_eq!(sync.submit_frame().unwrap(), 2);
        assert_eq!(sync.watermark(1), Some(2));
    }

    #[test]
    fn double_submit_is_rejected() {
        let mut sync = frame_sync(2);
        sync.submit_frame().unwrap();
        assert!(matches!(
            sync.submit_frame(),
            Err(Error::AlreadySubmitted {
                index: 0,
                watermark: 1
            })
        ));
        assert_eq!(sync.counter(), 1);
    }

    #[test]
    fn in_flight_slot_is_not_handed_out() {
        let mut sync = frame_sync(1);
        sync.submit_frame().unwrap();

        let outcome = sync
            .advance_frame_timeout(Some(Duration::from_millis(5)))
            .unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(matches!(
            sync.current_mut(),
            Err(Error::SlotInFlight {
                index: 0,
                watermark: 1,
                completed: 0
            })
        ));

        sync.fence().complete(1);
        assert_eq!(sync.wait_current(None).unwrap(), WaitOutcome::Reached);
        assert_eq!(*sync.current_mut().unwrap(), 0);
    }

    #[test]
    fn configured_timeout_fails_advance() {
        let mut sync = frame_sync(1).with_timeout(Some(Duration::from_millis(5)));
        sync.submit_frame().unwrap();
        assert!(matches!(
            sync.advance_frame(),
            Err(Error::WaitFailed { value: 1, .. })
        ));
    }

    #[test]
    fn counter_continues_from_fence_value() {
        let mut sync = FrameSync::new(
            ManualFence::new(41),
            FrameRing::from_fn(2, |index| index).unwrap(),
        );
        assert_eq!(sync.submit_frame().unwrap(), 42);
        assert_eq!(sync.watermark(1), Some(0));
        sync.advance_frame().unwrap();
        assert_eq!(sync.blocking_waits(), 0);
    }

    #[test]
    fn signal_leaves_watermarks_alone() {
        let mut sync = frame_sync(2);
        assert_eq!(sync.signal().unwrap(), 1);
        assert_eq!(sync.watermark(0), Some(0));
        assert_eq!(sync.watermark(1), Some(0));
        sync.fence().complete_all();
        sync.advance_frame().unwrap();
        assert_eq!(sync.blocking_waits(), 0);
    }

    #[test]
    fn flush_signals_past_the_last_submission() {
        let mut sync = frame_sync(2);
        sync.submit_frame().unwrap();
        sync.fence().complete(2);

        sync.flush_all().unwrap();
        assert_eq!(sync.counter(), 2);
        assert_eq!(sync.fence().last_signaled(), 2);
        assert_eq!(sync.watermark(0), Some(1));
        assert_eq!(sync.current_slot().state, SlotState::Idle);
    }

    #[test]
    fn enqueued_work_reopens_flush() {
        let mut sync = frame_sync(1);
        sync.fence().complete(3);

        sync.flush_all().unwrap();
        sync.flush_all().unwrap();
        assert_eq!(sync.counter(), 1);

        sync.note_enqueued();
        sync.flush_all().unwrap();
        assert_eq!(sync.counter(), 2);
        assert_eq!(sync.fence().last_signaled(), 2);
    }

    #[test]
    fn skipped_submission_returns_slot_to_idle() {
        let mut sync = frame_sync(2);
        sync.advance_frame().unwrap();
        assert_eq!(sync.ring().get(0).unwrap().state, SlotState::Idle);
        assert_eq!(sync.current_slot().state, SlotState::Recording);
    }
}
