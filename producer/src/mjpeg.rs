use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use camview_common::frame::FramePayload;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info};

use crate::{CaptureError, CaptureSource, StreamOptions};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Parse state for the MJPEG multipart stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for `multipart/x-mixed-replace` MJPEG bodies.
///
/// Feed it chunks as they arrive with [`push`](Self::push) and pull complete
/// JPEGs with [`next_frame`](Self::next_frame). A part is only emitted once
/// the following boundary has been seen.
pub struct MjpegParser {
    buffer: BytesMut,
    state: ParseState,
    /// Offset in `buffer` where the boundary search resumes while collecting.
    scan_from: usize,
}

impl MjpegParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scan_from: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Drop any partial part, e.g. after reconnecting.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ParseState::SeekingBoundary;
        self.scan_from = 0;
    }

    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    let pos = find_subsequence(&self.buffer, HEADER_END)?;
                    let _ = self.buffer.split_to(pos + HEADER_END.len());
                    self.scan_from = 0;
                    self.state = ParseState::CollectingJpeg;
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.scan_from..], BOUNDARY)
                    else {
                        // Avoid re-scanning old data on the next chunk
                        self.scan_from = self.buffer.len().saturating_sub(BOUNDARY.len());
                        return None;
                    };

                    let jpeg_end = self.scan_from + pos;
                    // Strip trailing \r\n before boundary
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };

                    let jpeg = self.buffer.split_to(end).freeze();
                    let _ = self.buffer.split_to(jpeg_end - end + BOUNDARY.len());
                    self.scan_from = 0;
                    self.state = ParseState::SeekingHeaderEnd;

                    if !jpeg.is_empty() {
                        return Some(jpeg);
                    }
                }
            }
        }
    }
}

impl Default for MjpegParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Camera serving a continuous MJPEG stream over HTTP.
///
/// `read` awaits the next complete JPEG on the open response body, so the
/// producer sleeps until the camera actually delivers data.
pub struct MjpegSource {
    url: String,
    options: StreamOptions,
    client: reqwest::Client,
    stream: Option<ByteStream>,
    parser: MjpegParser,
    needs_connect: bool,
    open: bool,
}

impl MjpegSource {
    /// Connect to the stream. Fails if the camera is unreachable or answers
    /// with a non-success status.
    pub async fn open(url: &str, options: StreamOptions) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(CaptureError::HttpClient)?;
        let mut source = Self {
            url: url.to_string(),
            options,
            client,
            stream: None,
            parser: MjpegParser::new(),
            needs_connect: true,
            open: true,
        };
        source.connect().await?;
        Ok(source)
    }

    async fn connect(&mut self) -> Result<(), CaptureError> {
        let url = self.options.apply_to_url(&self.url);
        info!(url, "connecting to MJPEG stream");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(CaptureError::HttpConnect)?;
        if !response.status().is_success() {
            return Err(CaptureError::HttpStatus(response.status().as_u16()));
        }

        info!(status = %response.status(), "connected to MJPEG stream");
        self.stream = Some(Box::pin(response.bytes_stream()));
        self.parser.reset();
        self.needs_connect = false;
        Ok(())
    }
}

impl CaptureSource for MjpegSource {
    fn identifier(&self) -> &str {
        &self.url
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_resolution(&mut self, width: u32, height: u32) {
        if self.options.resolution == Some((width, height)) {
            return;
        }
        debug!(width, height, "resolution changed, reconnecting on next read");
        self.options.resolution = Some((width, height));
        self.stream = None;
        self.needs_connect = true;
    }

    async fn read(&mut self) -> Result<Option<FramePayload>, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen(self.url.clone()));
        }
        if self.needs_connect {
            self.connect().await?;
        }

        loop {
            if let Some(jpeg) = self.parser.next_frame() {
                return Ok(Some(FramePayload::Jpeg(jpeg)));
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            match stream.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(CaptureError::HttpStream)?;
                    self.parser.push(&chunk);
                }
                None => {
                    info!(url = self.url, "MJPEG stream ended");
                    self.stream = None;
                    return Ok(None);
                }
            }
        }
    }

    fn release(&mut self) {
        self.stream = None;
        self.parser.reset();
        self.open = false;
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
