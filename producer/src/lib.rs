//! Capture sources and the producer loop feeding a [`LatestFrameBuffer`].
//!
//! [`LatestFrameBuffer`]: camview_common::buffer::LatestFrameBuffer

pub mod mjpeg;
pub mod polling;
mod run;
pub mod synthetic;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::time::Duration;

use camview_common::config::{CameraConfig, SourceKind};
use camview_common::frame::FramePayload;

pub use run::{run_producer, ExitReason, ProducerExit};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("invalid capture identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("frame rate must be positive and finite, got {0}")]
    InvalidFps(f64),
    #[error("unsupported resolution {0}x{1}")]
    InvalidResolution(u32, u32),
    #[error("capture source {0} is not open")]
    NotOpen(String),
}

/// A camera the producer loop can pull frames from.
///
/// Sources are opened by their own constructors, which fail when the camera
/// cannot be reached at all.
pub trait CaptureSource: Send {
    /// The url or device identifier this source was opened with.
    fn identifier(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Request a capture resolution. Takes effect from the next `read`.
    fn set_resolution(&mut self, width: u32, height: u32);

    /// Wait for the next frame.
    ///
    /// `Ok(None)` means the source has reached end-of-stream; an error means
    /// the read failed. Either way the producer stops.
    fn read(
        &mut self,
    ) -> impl Future<Output = Result<Option<FramePayload>, CaptureError>> + Send;

    /// Release the underlying device or connection. Later reads fail with
    /// [`CaptureError::NotOpen`].
    fn release(&mut self);
}

/// Any of the supported capture sources, chosen at runtime from config.
pub enum Source {
    Mjpeg(mjpeg::MjpegSource),
    Polling(polling::PollingSource),
    Synthetic(synthetic::SyntheticSource),
}

impl Source {
    /// Open the source described by `camera`.
    pub async fn open(camera: &CameraConfig) -> Result<Self, CaptureError> {
        let options = StreamOptions {
            quality: camera.quality,
            fps: camera.fps,
            resolution: camera.resolution(),
        };
        let source = match camera.source {
            SourceKind::Mjpeg => {
                Source::Mjpeg(mjpeg::MjpegSource::open(&camera.url, options).await?)
            }
            SourceKind::Polling => {
                Source::Polling(polling::PollingSource::open(&camera.url, options).await?)
            }
            SourceKind::Synthetic => Source::Synthetic(synthetic::SyntheticSource::open(
                &camera.url,
                options,
                camera.frames,
            )?),
        };
        Ok(source)
    }
}

impl CaptureSource for Source {
    fn identifier(&self) -> &str {
        match self {
            Source::Mjpeg(source) => source.identifier(),
            Source::Polling(source) => source.identifier(),
            Source::Synthetic(source) => source.identifier(),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Source::Mjpeg(source) => source.is_open(),
            Source::Polling(source) => source.is_open(),
            Source::Synthetic(source) => source.is_open(),
        }
    }

    fn set_resolution(&mut self, width: u32, height: u32) {
        match self {
            Source::Mjpeg(source) => source.set_resolution(width, height),
            Source::Polling(source) => source.set_resolution(width, height),
            Source::Synthetic(source) => source.set_resolution(width, height),
        }
    }

    async fn read(&mut self) -> Result<Option<FramePayload>, CaptureError> {
        match self {
            Source::Mjpeg(source) => source.read().await,
            Source::Polling(source) => source.read().await,
            Source::Synthetic(source) => source.read().await,
        }
    }

    fn release(&mut self) {
        match self {
            Source::Mjpeg(source) => source.release(),
            Source::Polling(source) => source.release(),
            Source::Synthetic(source) => source.release(),
        }
    }
}

/// Capture parameters shared by every source kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    pub quality: u32,
    pub fps: f64,
    pub resolution: Option<(u32, u32)>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            quality: 80,
            fps: 10.0,
            resolution: None,
        }
    }
}

impl StreamOptions {
    /// Interval between frames at the configured fps.
    pub fn tick_period(&self) -> Result<Duration, CaptureError> {
        Duration::try_from_secs_f64(1.0 / self.fps)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or(CaptureError::InvalidFps(self.fps))
    }

    /// Append the capture parameters to a camera url as query parameters.
    pub fn apply_to_url(&self, base: &str) -> String {
        let sep = if base.contains('?') { '&' } else { '?' };
        let mut url = format!("{base}{sep}quality={}&fps={}", self.quality, self.fps);
        if let Some((width, height)) = self.resolution {
            url.push_str(&format!("&width={width}&height={height}"));
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_gets_capture_parameters() {
        let options = StreamOptions {
            quality: 70,
            fps: 15.0,
            resolution: Some((640, 480)),
        };
        assert_eq!(
            options.apply_to_url("http://cam.local/stream"),
            "http://cam.local/stream?quality=70&fps=15&width=640&height=480"
        );
    }

    #[test]
    fn url_with_existing_query_is_extended() {
        let options = StreamOptions::default();
        assert_eq!(
            options.apply_to_url("http://cam.local/stream?cam=1"),
            "http://cam.local/stream?cam=1&quality=80&fps=10"
        );
    }

    #[test]
    fn tick_period_rejects_bad_rates() {
        let at = |fps| StreamOptions {
            fps,
            ..StreamOptions::default()
        };
        assert_eq!(at(4.0).tick_period().unwrap(), Duration::from_millis(250));
        assert!(at(0.0).tick_period().is_err());
        assert!(at(-1.0).tick_period().is_err());
        assert!(at(f64::NAN).tick_period().is_err());
    }

    #[tokio::test]
    async fn opens_synthetic_source_from_config() {
        let camera = CameraConfig {
            name: "stub".into(),
            source: SourceKind::Synthetic,
            url: "stub://pattern".into(),
            width: Some(8),
            height: Some(4),
            fps: 1000.0,
            quality: 80,
            frames: Some(1),
        };
        let mut source = Source::open(&camera).await.unwrap();
        assert!(source.is_open());
        assert_eq!(source.identifier(), "stub://pattern");

        match source.read().await.unwrap() {
            Some(FramePayload::Raw { width, height, data }) => {
                assert_eq!((width, height), (8, 4));
                assert_eq!(data.len(), 32);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(source.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_mjpeg_camera_fails_to_open() {
        let camera = CameraConfig {
            name: "gone".into(),
            source: SourceKind::Mjpeg,
            url: "http://127.0.0.1:1/stream".into(),
            width: None,
            height: None,
            fps: 10.0,
            quality: 80,
            frames: None,
        };
        assert!(matches!(
            Source::open(&camera).await,
            Err(CaptureError::HttpConnect(_))
        ));
    }
}
