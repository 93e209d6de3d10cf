use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// Upper bound on each lifecycle wait. 0 waits forever.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_motion_hash_size")]
    pub motion_hash_size: u32,
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: u32,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_schemes")]
    pub schemes: Vec<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_frame_count")]
    pub frame_count: u64,
    #[serde(default = "default_transition_delay")]
    pub transition_delay_ms: u64,
    #[serde(default = "default_true")]
    pub stage_insertion: bool,
    #[serde(default = "default_true")]
    pub control_panel: bool,
    /// Lifecycle step at which the pipeline reports its resources unavailable.
    #[serde(default)]
    pub fail_at: Option<FailurePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePoint {
    Configure,
    Prefetch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: default_wait_timeout(),
        }
    }
}

impl HarnessConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        match self.wait_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            motion_hash_size: default_motion_hash_size(),
            motion_threshold: default_motion_threshold(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            schemes: default_schemes(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            frame_count: default_frame_count(),
            transition_delay_ms: default_transition_delay(),
            stage_insertion: true,
            control_panel: true,
            fail_at: None,
        }
    }
}

impl SyntheticConfig {
    pub fn frame_interval(&self) -> Duration {
        if self.fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.fps)
        } else {
            Duration::ZERO
        }
    }
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
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_wait_timeout() -> u64 {
    30
}
fn default_motion_hash_size() -> u32 {
    16
}
fn default_motion_threshold() -> u32 {
    10
}
fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S%.3f".into()
}
fn default_schemes() -> Vec<String> {
    vec!["file".into(), "http".into(), "rtp".into(), "synthetic".into()]
}
fn default_width() -> u32 {
    320
}
fn default_height() -> u32 {
    240
}
fn default_fps() -> f64 {
    15.0
}
fn default_frame_count() -> u64 {
    90
}
fn default_transition_delay() -> u64 {
    20
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
