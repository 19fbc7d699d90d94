use camview_common::frame::Frame;

use super::SinkError;

/// Display side of a capture session.
///
/// Implementations receive the newest frame each time the consumer loop
/// takes one from the buffer. Frames skipped by the buffer never reach a sink.
pub trait FrameSink: Send {
    fn show(&mut self, camera: &str, frame: &Frame) -> Result<(), SinkError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
