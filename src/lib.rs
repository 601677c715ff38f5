//! CPU/GPU frame pacing for Direct3D 12 render loops.
//!
//! A fixed ring of per-frame resources is reused round robin. Every submission signals the next
//! value of one fence counter and stores it as the slot's watermark, and reusing a slot waits
//! until the GPU has reached it. The pacing core ([`FrameSync`]) only depends on the [`Fence`]
//! trait and runs on any platform; the Direct3D 12 pieces are only built on Windows.

pub mod config;
pub mod constant_buffer;
pub mod error;
pub mod fence;
pub mod frame_ring;
pub mod sync;
pub mod timer;

#[cfg(windows)]
mod app;
#[cfg(windows)]
pub mod frame_resource;
#[cfg(windows)]
pub mod gpulib;
#[cfg(windows)]
mod running_state;
#[cfg(windows)]
pub mod swapchain;

pub use config::{AppConfig, FrameCounts};
pub use error::{Error, Result};
pub use fence::{Fence, ManualFence, WaitOutcome};
pub use frame_ring::{FrameRing, FrameSlot, SlotState};
pub use sync::FrameSync;
pub use timer::{FrameStats, Timer};

#[cfg(windows)]
pub use app::{App, AppFrame, BoxError, FrameContext, Setup, UpdateContext, run_app};
#[cfg(windows)]
pub use gpulib::GPULib;
