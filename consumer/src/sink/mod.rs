pub mod log;
pub mod snapshot;
pub mod traits;

use camview_common::config::ViewerConfig;
use camview_common::frame::Frame;
use tracing::warn;

pub use self::log::LogSink;
pub use self::snapshot::SnapshotSink;
pub use self::traits::FrameSink;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write {0}: {1}")]
    Io(String, std::io::Error),
}

/// Fan-out over every configured sink. A failing sink is logged and does not
/// stop the others.
#[derive(Default)]
pub struct Sinks {
    sinks: Vec<Box<dyn FrameSink>>,
}

impl Sinks {
    /// Log sink always, snapshot sink when `snapshot_dir` is configured.
    pub fn from_config(config: &ViewerConfig) -> Result<Self, SinkError> {
        let mut sinks = Self::default();
        sinks.push(LogSink::new(config.log_every));
        if let Some(dir) = &config.snapshot_dir {
            sinks.push(SnapshotSink::new(dir)?);
        }
        Ok(sinks)
    }

    pub fn push(&mut self, sink: impl FrameSink + 'static) {
        self.sinks.push(Box::new(sink));
    }
}

impl FrameSink for Sinks {
    fn show(&mut self, camera: &str, frame: &Frame) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            if let Err(e) = sink.show(camera, frame) {
                warn!(error = %e, camera, sink = sink.name(), seq = frame.seq, "sink failed");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "sinks"
    }
}
