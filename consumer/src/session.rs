use std::future::Future;
use std::pin::pin;
use std::sync::Arc;

use camview_common::buffer::LatestFrameBuffer;
use camview_common::config::CameraConfig;
use camview_common::frame::Frame;
use camview_producer::{run_producer, CaptureError, CaptureSource, ExitReason, Source};
use tracing::{info, warn};

use crate::sink::FrameSink;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("camera {camera}: failed to open capture source: {source}")]
    Open {
        camera: String,
        source: CaptureError,
    },
    #[error("camera {0}: producer task failed: {1}")]
    Producer(String, tokio::task::JoinError),
}

/// Why the consumer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The producer closed the buffer and the last frame was displayed.
    EndOfStream,
    /// The quit signal fired.
    Quit,
    /// `max_frames` frames were displayed.
    FrameLimit,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub camera: String,
    /// Frames the producer read from the source.
    pub produced: u64,
    /// Frames handed to the sink.
    pub displayed: u64,
    /// Frames overwritten in the buffer before the consumer took them.
    pub dropped: u64,
    pub producer: ExitReason,
    pub stop: StopReason,
}

/// One camera: its capture source, its latest-frame buffer, and the
/// producer/consumer pair connecting them.
///
/// Nothing runs until [`run`](Self::run) is called.
pub struct CaptureSession<S = Source> {
    camera: String,
    source: S,
    buffer: Arc<LatestFrameBuffer<Frame>>,
}

impl CaptureSession<Source> {
    /// Open the camera's source. Fails fast if the camera cannot be opened.
    pub async fn open(camera: &CameraConfig) -> Result<Self, SessionError> {
        let source = Source::open(camera)
            .await
            .map_err(|source| SessionError::Open {
                camera: camera.name.clone(),
                source,
            })?;
        info!(camera = camera.name, url = source.identifier(), "camera open");
        Ok(Self::new(camera.name.clone(), source))
    }
}

impl<S: CaptureSource + 'static> CaptureSession<S> {
    pub fn new(camera: String, source: S) -> Self {
        Self {
            camera,
            source,
            buffer: Arc::new(LatestFrameBuffer::new()),
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Run the producer in the background and display frames until the
    /// stream ends, `quit` resolves, or `max_frames` frames were shown.
    ///
    /// On return the buffer is closed, the producer has stopped and the
    /// capture source has been released.
    pub async fn run<K, Q>(
        self,
        mut sink: K,
        quit: Q,
        max_frames: Option<u64>,
    ) -> Result<SessionReport, SessionError>
    where
        K: FrameSink,
        Q: Future<Output = ()>,
    {
        let Self {
            camera,
            source,
            buffer,
        } = self;
        let producer = tokio::spawn(run_producer(source, Arc::clone(&buffer)));

        let mut quit = pin!(quit);
        let mut displayed: u64 = 0;
        let stop = loop {
            if max_frames.is_some_and(|max| displayed >= max) {
                break StopReason::FrameLimit;
            }
            let taken = tokio::select! {
                biased;
                _ = &mut quit => break StopReason::Quit,
                frame = buffer.take() => frame,
            };
            let Some(frame) = taken else {
                break StopReason::EndOfStream;
            };
            if let Err(e) = sink.show(&camera, &frame) {
                warn!(error = %e, camera, seq = frame.seq, "sink rejected frame");
            }
            displayed += 1;
        };

        // Closing makes the producer release the capture source.
        buffer.close();
        let exit = producer
            .await
            .map_err(|e| SessionError::Producer(camera.clone(), e))?;
        let stats = buffer.stats();

        info!(
            camera,
            ?stop,
            producer = ?exit.reason,
            produced = exit.frames,
            displayed,
            dropped = stats.dropped,
            "session finished"
        );
        Ok(SessionReport {
            camera,
            produced: exit.frames,
            displayed,
            dropped: stats.dropped,
            producer: exit.reason,
            stop,
        })
    }
}
