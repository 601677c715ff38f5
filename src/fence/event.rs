use std::ops::Deref;
use std::time::Duration;

use windows::Win32::{
    Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT},
    System::Threading::{CreateEventA, INFINITE, WaitForSingleObject},
};

use super::WaitOutcome;
use crate::error::{Error, Result};

pub struct Event {
    handle: HANDLE,
}

impl Event {
    /// Creates an event with a default security descriptor, automatic reset, and no name
    pub fn new(initially_signaled: bool) -> Result<Self> {
        let handle = unsafe { CreateEventA(None, false, initially_signaled, None) }?;

        Ok(Event { handle })
    }

    /// `value` is only used to describe a failed wait
    pub fn wait(&self, value: u64, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let milliseconds = match timeout {
            Some(timeout) => u32::try_from(timeout.as_millis()).unwrap_or(INFINITE - 1),
            None => INFINITE,
        };

        let result = unsafe { WaitForSingleObject(self.handle, milliseconds) };
        if result == WAIT_OBJECT_0 {
            Ok(WaitOutcome::Reached)
        } else if result == WAIT_TIMEOUT {
            Ok(WaitOutcome::TimedOut)
        } else {
            Err(Error::WaitFailed {
                value,
                reason: format!("Windows event wait returned {:#01X}", result.0),
            })
        }
    }
}

impl Deref for Event {
    type Target = HANDLE;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Err(error) = unsafe { CloseHandle(self.handle) } {
            tracing::error!("Failed to close event handle: {error}");
        }
    }
}
