use bytes::Bytes;
use camview_common::config::MAX_DIMENSION;
use camview_common::frame::FramePayload;
use tokio::time::{Interval, MissedTickBehavior};

use crate::{CaptureError, CaptureSource, StreamOptions};

const SCHEME: &str = "stub://";
const DEFAULT_SIZE: (u32, u32) = (64, 48);
/// Largest frame the generator will allocate, in pixels.
const MAX_PIXELS: usize = MAX_DIMENSION as usize * MAX_DIMENSION as usize;

/// Generated grayscale test pattern for `stub://` identifiers.
///
/// Each frame is a diagonal gradient shifted by one pixel per frame, so
/// consecutive frames differ. After `limit` frames the source reports
/// end-of-stream. Must be opened from within a Tokio runtime.
pub struct SyntheticSource {
    identifier: String,
    width: u32,
    height: u32,
    ticker: Interval,
    limit: Option<u64>,
    generated: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn open(
        identifier: &str,
        options: StreamOptions,
        limit: Option<u64>,
    ) -> Result<Self, CaptureError> {
        if !identifier.starts_with(SCHEME) {
            return Err(CaptureError::InvalidIdentifier(identifier.to_string()));
        }
        let (width, height) = options.resolution.unwrap_or(DEFAULT_SIZE);
        frame_len(width, height)?;
        let mut ticker = tokio::time::interval(options.tick_period()?);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Ok(Self {
            identifier: identifier.to_string(),
            width,
            height,
            ticker,
            limit,
            generated: 0,
            open: true,
        })
    }

    fn render(&self) -> Result<Bytes, CaptureError> {
        let shift = self.generated as u32;
        let mut pixels = Vec::with_capacity(frame_len(self.width, self.height)?);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push(x.wrapping_add(y).wrapping_add(shift) as u8);
            }
        }
        Ok(Bytes::from(pixels))
    }
}

fn frame_len(width: u32, height: u32) -> Result<usize, CaptureError> {
    (width as usize)
        .checked_mul(height as usize)
        .filter(|&len| len > 0 && len <= MAX_PIXELS)
        .ok_or(CaptureError::InvalidResolution(width, height))
}

impl CaptureSource for SyntheticSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn is_open(&self) -> bool {
        self.open
    }

    /// An unsupported size is reported by the next `read`.
    fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    async fn read(&mut self) -> Result<Option<FramePayload>, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen(self.identifier.clone()));
        }
        if self.limit.is_some_and(|limit| self.generated >= limit) {
            return Ok(None);
        }
        self.ticker.tick().await;

        let data = self.render()?;
        self.generated += 1;
        Ok(Some(FramePayload::Raw {
            width: self.width,
            height: self.height,
            data,
        }))
    }

    fn release(&mut self) {
        self.open = false;
    }
}
