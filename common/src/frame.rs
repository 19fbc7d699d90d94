use bytes::Bytes;
use chrono::{DateTime, Utc};

/// The payload carried inside a frame. The buffer and the producer loop never
/// look inside it; only sinks do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// Encoded JPEG image, as delivered by MJPEG and snapshot cameras.
    Jpeg(Bytes),
    /// Uncompressed 8-bit grayscale pixels, row-major (synthetic sources).
    Raw { width: u32, height: u32, data: Bytes },
}

/// A captured camera frame with timestamp metadata.
///
/// `seq` is assigned by the producer loop and increases by one per frame read
/// from the source, so gaps in the sequence seen by a consumer are frames the
/// latest-frame buffer dropped.
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: FramePayload,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn new(payload: FramePayload, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            payload,
            captured_at_ms,
            seq,
        }
    }

    /// Create a JPEG frame.
    pub fn jpeg(jpeg_data: Vec<u8>, captured_at_ms: i64, seq: u64) -> Self {
        Self::new(FramePayload::Jpeg(Bytes::from(jpeg_data)), captured_at_ms, seq)
    }

    // -- Convenience accessors --------------------------------------------------

    /// Returns the JPEG data if this is a JPEG frame.
    pub fn jpeg_data(&self) -> Option<&[u8]> {
        match &self.payload {
            FramePayload::Jpeg(data) => Some(data),
            _ => None,
        }
    }

    /// Pixel dimensions, known only for raw frames (JPEGs are never decoded).
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.payload {
            FramePayload::Raw { width, height, .. } => Some((*width, *height)),
            FramePayload::Jpeg(_) => None,
        }
    }

    /// Returns the raw payload bytes regardless of type.
    pub fn payload_bytes(&self) -> &[u8] {
        match &self.payload {
            FramePayload::Jpeg(data) => data,
            FramePayload::Raw { data, .. } => data,
        }
    }

    /// Returns the size of the payload data in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload_bytes().len()
    }

    /// File extension matching the payload type.
    pub fn extension(&self) -> &'static str {
        match &self.payload {
            FramePayload::Jpeg(_) => "jpg",
            FramePayload::Raw { .. } => "raw",
        }
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.captured_at_ms).unwrap_or_else(Utc::now)
    }

    /// Milliseconds between capture and `now_ms`, clamped at zero for clock skew.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.captured_at_ms).max(0)
    }

    /// Snapshot file name for a camera, e.g. `front.jpg`.
    pub fn file_name(&self, camera: &str) -> String {
        format!("{camera}.{ext}", ext = self.extension())
    }
}
