// Capture - Bar-bounded recording of the mixed output

pub mod session;
pub mod sink;

pub use session::{CapturePlan, CaptureRecorder, CaptureSession};
pub use sink::{CaptureSink, CaptureTap, RingCaptureSink, capture_channel};

/// Capture error types
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture sink failed: {0}")]
    Sink(String),
}
