use std::sync::Arc;

use camview_common::buffer::{LatestFrameBuffer, Published};
use camview_common::frame::Frame;
use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::CaptureSource;

/// Why the producer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The source reported end-of-stream.
    EndOfStream,
    /// A read failed (device disconnected, stream error).
    ReadFailed,
    /// The consumer side closed the buffer.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerExit {
    pub reason: ExitReason,
    /// Frames read from the source and handed to the buffer.
    pub frames: u64,
}

/// Drain `source` into `buffer` until the source ends, fails, or the buffer
/// is closed from the consumer side.
///
/// Every exit path closes the buffer, so a consumer blocked in `take` is
/// released, and releases the source. The buffer is also closed if the
/// source panics mid-read.
pub async fn run_producer<S: CaptureSource>(
    mut source: S,
    buffer: Arc<LatestFrameBuffer<Frame>>,
) -> ProducerExit {
    let camera = source.identifier().to_string();
    let _close_guard = CloseOnDrop(&buffer);
    let mut seq: u64 = 0;

    info!(camera, "producer started");
    let reason = loop {
        let read = tokio::select! {
            biased;
            _ = buffer.closed() => break ExitReason::Closed,
            read = source.read() => read,
        };

        match read {
            Ok(Some(payload)) => {
                let frame = Frame::new(payload, Utc::now().timestamp_millis(), seq);
                match buffer.publish(frame) {
                    Published::Stored => {}
                    Published::Replaced => trace!(camera, seq, "replaced unconsumed frame"),
                    Published::Closed => break ExitReason::Closed,
                }
                seq += 1;
                if seq % 100 == 0 {
                    debug!(camera, seq, "frames captured");
                }
            }
            Ok(None) => {
                info!(camera, frames = seq, "capture source reached end of stream");
                break ExitReason::EndOfStream;
            }
            Err(e) => {
                warn!(error = %e, camera, frames = seq, "capture read failed, stopping producer");
                break ExitReason::ReadFailed;
            }
        }
    };

    buffer.close();
    source.release();
    info!(camera, ?reason, frames = seq, "producer stopped, capture source released");

    ProducerExit {
        reason,
        frames: seq,
    }
}

/// Closes the buffer when dropped, including while unwinding.
struct CloseOnDrop<'a>(&'a LatestFrameBuffer<Frame>);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureError;
    use bytes::Bytes;
    use camview_common::frame::FramePayload;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Replays a fixed script of read results, then pends forever (or panics
    /// when `panic_when_exhausted` is set).
    struct ScriptedSource {
        script: VecDeque<Result<Option<FramePayload>, CaptureError>>,
        released: Arc<AtomicBool>,
        panic_when_exhausted: bool,
        /// Closed from inside the next read, before it returns.
        close_on_read: Option<Arc<LatestFrameBuffer<Frame>>>,
    }

    impl ScriptedSource {
        fn new(
            script: Vec<Result<Option<FramePayload>, CaptureError>>,
        ) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            let source = Self {
                script: script.into(),
                released: Arc::clone(&released),
                panic_when_exhausted: false,
                close_on_read: None,
            };
            (source, released)
        }
    }

    impl CaptureSource for ScriptedSource {
        fn identifier(&self) -> &str {
            "scripted"
        }

        fn is_open(&self) -> bool {
            !self.released.load(Ordering::SeqCst)
        }

        fn set_resolution(&mut self, _width: u32, _height: u32) {}

        async fn read(&mut self) -> Result<Option<FramePayload>, CaptureError> {
            if let Some(buffer) = self.close_on_read.take() {
                buffer.close();
            }
            match self.script.pop_front() {
                Some(step) => step,
                None if self.panic_when_exhausted => panic!("capture device went away"),
                None => std::future::pending().await,
            }
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn jpeg(byte: u8) -> Result<Option<FramePayload>, CaptureError> {
        Ok(Some(FramePayload::Jpeg(Bytes::from(vec![byte]))))
    }

    #[tokio::test]
    async fn end_of_stream_closes_buffer_keeping_last_frame() {
        let (source, released) = ScriptedSource::new(vec![jpeg(1), jpeg(2), jpeg(3), Ok(None)]);
        let buffer = Arc::new(LatestFrameBuffer::new());

        let exit = run_producer(source, Arc::clone(&buffer)).await;
        assert_eq!(exit.reason, ExitReason::EndOfStream);
        assert_eq!(exit.frames, 3);
        assert!(released.load(Ordering::SeqCst));
        assert!(buffer.is_closed());

        let last = buffer.take().await.unwrap();
        assert_eq!(last.seq, 2);
        assert_eq!(last.jpeg_data().unwrap(), &[3]);
        assert!(buffer.take().await.is_none());
        assert_eq!(buffer.stats().dropped, 2);
    }

    #[tokio::test]
    async fn read_failure_releases_waiting_consumer() {
        let (source, released) =
            ScriptedSource::new(vec![Err(CaptureError::HttpStatus(503))]);
        let buffer = Arc::new(LatestFrameBuffer::<Frame>::new());

        let consumer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.take().await })
        };
        let exit = run_producer(source, Arc::clone(&buffer)).await;
        assert_eq!(exit.reason, ExitReason::ReadFailed);
        assert_eq!(exit.frames, 0);
        assert!(released.load(Ordering::SeqCst));

        let taken = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer left blocked after read failure")
            .unwrap();
        assert!(taken.is_none());
    }

    #[tokio::test]
    async fn closing_buffer_stops_producer_blocked_in_read() {
        let (source, released) = ScriptedSource::new(vec![jpeg(9)]);
        let buffer = Arc::new(LatestFrameBuffer::new());
        let producer = tokio::spawn(run_producer(source, Arc::clone(&buffer)));

        let first = buffer.take().await.unwrap();
        assert_eq!(first.seq, 0);

        buffer.close();
        let exit = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer did not notice close")
            .unwrap();
        assert_eq!(exit.reason, ExitReason::Closed);
        assert_eq!(exit.frames, 1);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_source_still_closes_buffer() {
        let (mut source, _released) = ScriptedSource::new(vec![jpeg(5)]);
        source.panic_when_exhausted = true;
        let buffer = Arc::new(LatestFrameBuffer::<Frame>::new());

        let consumer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut seqs = Vec::new();
                while let Some(frame) = buffer.take().await {
                    seqs.push(frame.seq);
                }
                seqs
            })
        };
        let producer = tokio::spawn(run_producer(source, Arc::clone(&buffer)));

        assert!(producer.await.unwrap_err().is_panic());
        assert!(buffer.is_closed());
        let seqs = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer left blocked after producer panic")
            .unwrap();
        assert_eq!(seqs, vec![0]);
    }

    #[tokio::test]
    async fn frame_refused_after_close_is_not_counted() {
        let (mut source, released) = ScriptedSource::new(vec![jpeg(1)]);
        let buffer = Arc::new(LatestFrameBuffer::new());
        source.close_on_read = Some(Arc::clone(&buffer));

        let exit = run_producer(source, Arc::clone(&buffer)).await;
        assert_eq!(exit.reason, ExitReason::Closed);
        assert_eq!(exit.frames, 0);
        assert!(released.load(Ordering::SeqCst));
        assert!(buffer.take().await.is_none());
    }
}
