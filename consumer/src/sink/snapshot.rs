use std::fs;
use std::path::{Path, PathBuf};

use camview_common::frame::Frame;
use tracing::debug;

use super::{FrameSink, SinkError};

/// Keeps `<dir>/<camera>.<ext>` holding the newest displayed frame.
///
/// Bytes are written as captured. Writes go to a temporary file that is then
/// renamed over the target, so readers never observe a partial frame.
pub struct SnapshotSink {
    dir: PathBuf,
}

impl SnapshotSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| SinkError::Io(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, camera: &str, frame: &Frame) -> PathBuf {
        self.dir.join(frame.file_name(camera))
    }
}

impl FrameSink for SnapshotSink {
    fn show(&mut self, camera: &str, frame: &Frame) -> Result<(), SinkError> {
        let path = self.path_for(camera, frame);
        let tmp = path.with_extension(format!("{}.tmp", frame.extension()));

        fs::write(&tmp, frame.payload_bytes())
            .map_err(|e| SinkError::Io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &path).map_err(|e| SinkError::Io(path.display().to_string(), e))?;

        debug!(camera, seq = frame.seq, path = %path.display(), "snapshot updated");
        Ok(())
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}
