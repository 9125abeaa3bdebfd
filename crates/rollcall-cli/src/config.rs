use anyhow::{Context, Result};
use rollcall_core::http::Endpoints;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Client configuration: defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the attendance backend.
    pub api_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// V4L2 device path.
    pub camera_device: String,
    /// Resolution requested from the camera and sent to the recognizer.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    pub jpeg_quality: u8,
    /// Identity recorded with approval changes.
    pub reviewer_id: i64,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            warmup_frames: 4,
            jpeg_quality: rollcall_hw::encoder::DEFAULT_JPEG_QUALITY,
            reviewer_id: 1,
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Load from `path` (if any) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ROLLCALL_API_URL") {
            self.api_url = url;
        }
        if let Some(device) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        self.request_timeout_secs =
            parse_or(&lookup, "ROLLCALL_REQUEST_TIMEOUT_SECS", self.request_timeout_secs);
        self.capture_width = parse_or(&lookup, "ROLLCALL_CAPTURE_WIDTH", self.capture_width);
        self.capture_height = parse_or(&lookup, "ROLLCALL_CAPTURE_HEIGHT", self.capture_height);
        self.warmup_frames = parse_or(&lookup, "ROLLCALL_WARMUP_FRAMES", self.warmup_frames);
        self.jpeg_quality = parse_or(&lookup, "ROLLCALL_JPEG_QUALITY", self.jpeg_quality);
        self.reviewer_id = parse_or(&lookup, "ROLLCALL_REVIEWER_ID", self.reviewer_id);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable config override");
                current
            }
        },
        None => current,
    }
}
