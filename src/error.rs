use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("a frame ring needs at least one slot")]
    EmptyRing,

    /// The slot's last submission has not been reached by the GPU yet.
    #[error("frame slot {index} is still in flight (watermark {watermark}, completed {completed})")]
    SlotInFlight {
        index: usize,
        watermark: u64,
        completed: u64,
    },

    #[error("frame slot {index} was already submitted with fence value {watermark}")]
    AlreadySubmitted { index: usize, watermark: u64 },

    #[error("waiting for fence value {value} failed: {reason}")]
    WaitFailed { value: u64, reason: String },

    #[error("index {index} is out of range for a buffer of {count} elements")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Direct3D did not return a {0}")]
    Missing(&'static str),

    #[cfg(windows)]
    #[error(transparent)]
    Windows(#[from] windows::core::Error),
}
