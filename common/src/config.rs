use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Largest accepted capture width or height.
pub const MAX_DIMENSION: u32 = 16384;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "camera", default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which kind of capture source backs a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Continuous `multipart/x-mixed-replace` MJPEG stream.
    Mjpeg,
    /// Single-frame snapshot URL fetched once per tick.
    Polling,
    /// Generated test pattern (`stub://` urls).
    Synthetic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    #[serde(default = "default_source")]
    pub source: SourceKind,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_quality")]
    pub quality: u32,
    /// Synthetic sources only: number of frames before end-of-stream.
    pub frames: Option<u64>,
}

impl CameraConfig {
    /// Requested capture resolution, if both dimensions are set.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Directory receiving the newest frame of each camera.
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default = "default_log_every")]
    pub log_every: u64,
    /// Stop each camera after this many displayed frames.
    pub max_frames: Option<u64>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            log_every: default_log_every(),
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config = content.parse()?;
        debug!(path = %path.display(), cameras = config.cameras.len(), "config loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid("at least one [[camera]] is required".into()));
        }

        let mut names = HashSet::new();
        for camera in &self.cameras {
            if camera.name.is_empty() {
                return Err(ConfigError::Invalid("camera name must not be empty".into()));
            }
            // The name becomes a snapshot file name.
            if camera.name.contains(['/', '\\']) || camera.name == "." || camera.name == ".." {
                return Err(ConfigError::Invalid(format!(
                    "camera name {:?} must not contain path separators",
                    camera.name
                )));
            }
            if !names.insert(camera.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate camera name {:?}",
                    camera.name
                )));
            }
            if camera.url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "camera {:?} has an empty url",
                    camera.name
                )));
            }
            if !(camera.fps.is_finite() && camera.fps > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "camera {:?}: fps must be positive, got {}",
                    camera.name, camera.fps
                )));
            }
            if camera.width.is_some() != camera.height.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "camera {:?}: width and height must be set together",
                    camera.name
                )));
            }
            if let Some((width, height)) = camera.resolution() {
                if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
                    return Err(ConfigError::Invalid(format!(
                        "camera {:?}: resolution {width}x{height} out of range (1..={MAX_DIMENSION})",
                        camera.name
                    )));
                }
            }
        }

        if self.viewer.log_every == 0 {
            return Err(ConfigError::Invalid("viewer.log_every must be at least 1".into()));
        }
        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_source() -> SourceKind {
    SourceKind::Mjpeg
}
fn default_fps() -> f64 {
    10.0
}
fn default_quality() -> u32 {
    80
}
fn default_log_every() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
