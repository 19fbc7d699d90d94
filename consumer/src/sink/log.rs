use camview_common::frame::Frame;
use chrono::Utc;
use tracing::{debug, info};

use super::{FrameSink, SinkError};

/// Logs frame arrival and end-to-end latency; every `every`-th frame at info.
pub struct LogSink {
    every: u64,
    shown: u64,
    last_seq: Option<u64>,
    /// Frames the buffer dropped between the ones this sink saw.
    skipped: u64,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            shown: 0,
            last_seq: None,
            skipped: 0,
        }
    }
}

impl FrameSink for LogSink {
    fn show(&mut self, camera: &str, frame: &Frame) -> Result<(), SinkError> {
        if let Some(last) = self.last_seq {
            self.skipped += frame.seq.saturating_sub(last + 1);
        }
        self.last_seq = Some(frame.seq);
        self.shown += 1;

        let age_ms = frame.age_ms(Utc::now().timestamp_millis());
        if self.shown % self.every == 0 {
            info!(
                camera,
                seq = frame.seq,
                bytes = frame.payload_size(),
                age_ms,
                shown = self.shown,
                skipped = self.skipped,
                "frame"
            );
        } else {
            debug!(camera, seq = frame.seq, age_ms, "frame");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
