use std::time::{Duration, Instant};

use windows::Win32::Graphics::Direct3D12::*;
use windows::core::HSTRING;

use super::event::Event;
use super::{Fence, WaitOutcome};
use crate::error::Result;

/// `ID3D12Fence` signaled from a command queue, waited on through a Win32 event
pub struct QueueFence {
    fence: ID3D12Fence,
    queue: ID3D12CommandQueue,
    event: Event,
}

impl QueueFence {
    pub fn new(
        device: &ID3D12Device9,
        queue: ID3D12CommandQueue,
        initial_value: u64,
        name: &str,
    ) -> Result<Self> {
        let fence: ID3D12Fence = unsafe { device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }?;
        unsafe { fence.SetName(&HSTRING::from(name)) }?;
        let event = Event::new(false)?;

        Ok(QueueFence {
            fence,
            queue,
            event,
        })
    }

    pub fn fence(&self) -> &ID3D12Fence {
        &self.fence
    }
}

impl Fence for QueueFence {
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn signal(&self, value: u64) -> Result<()> {
        unsafe { self.queue.Signal(&self.fence, value) }?;
        Ok(())
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        // A registration left over from an earlier timed out wait can wake the event early,
        // so the completed value is checked again after every wake up
        while self.completed_value() < value {
            let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Ok(WaitOutcome::TimedOut);
            }

            unsafe { self.fence.SetEventOnCompletion(value, *self.event) }?;
            if self.event.wait(value, remaining)? == WaitOutcome::TimedOut {
                if self.completed_value() >= value {
                    break;
                }
                return Ok(WaitOutcome::TimedOut);
            }
        }

        Ok(WaitOutcome::Reached)
    }
}
