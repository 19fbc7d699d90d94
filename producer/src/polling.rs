use std::time::Duration;

use bytes::Bytes;
use camview_common::frame::FramePayload;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::{CaptureError, CaptureSource, StreamOptions};

/// Polling fallback for cameras that only serve single-frame snapshots.
///
/// One GET is issued per tick at the configured fps. Ticks missed while a
/// slow request was in flight are skipped rather than burst-fetched.
pub struct PollingSource {
    url: String,
    options: StreamOptions,
    client: reqwest::Client,
    ticker: Interval,
    /// Frame fetched by `open` to check the camera; returned by the first read.
    primed: Option<Bytes>,
    open: bool,
}

impl PollingSource {
    /// Fetch the snapshot url once. Fails if the camera is unreachable or
    /// answers with a non-success status.
    pub async fn open(url: &str, options: StreamOptions) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(CaptureError::HttpClient)?;

        let mut ticker = tokio::time::interval(options.tick_period()?);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The initial fetch below stands in for the first tick.
        ticker.tick().await;

        let mut source = Self {
            url: url.to_string(),
            options,
            client,
            ticker,
            primed: None,
            open: true,
        };
        source.primed = Some(source.fetch().await?);
        Ok(source)
    }

    async fn fetch(&self) -> Result<Bytes, CaptureError> {
        let url = self.options.apply_to_url(&self.url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(CaptureError::HttpConnect)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url, "non-success response from camera");
            return Err(CaptureError::HttpStatus(response.status().as_u16()));
        }
        let jpeg = response.bytes().await.map_err(CaptureError::HttpStream)?;
        debug!(bytes = jpeg.len(), "fetched snapshot");
        Ok(jpeg)
    }
}

impl CaptureSource for PollingSource {
    fn identifier(&self) -> &str {
        &self.url
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_resolution(&mut self, width: u32, height: u32) {
        self.options.resolution = Some((width, height));
    }

    async fn read(&mut self) -> Result<Option<FramePayload>, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen(self.url.clone()));
        }
        if let Some(jpeg) = self.primed.take() {
            return Ok(Some(FramePayload::Jpeg(jpeg)));
        }
        self.ticker.tick().await;
        let jpeg = self.fetch().await?;
        Ok(Some(FramePayload::Jpeg(jpeg)))
    }

    fn release(&mut self) {
        self.primed = None;
        self.open = false;
    }
}
