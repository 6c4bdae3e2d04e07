// src/config.rs
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::smoothing::SmoothingConfig;

pub const CONFIG_ENV: &str = "AIR_WRITER_CONFIG";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("hold_frames must be at least 1, got {0}")]
    HoldFrames(u32),
    #[error("min_distance_threshold must be positive, got {0}")]
    MinDistance(f64),
    #[error("pinch_ratio must be positive, got {0}")]
    PinchRatio(f64),
    #[error("frame resolution must be non-zero, got {width}x{height}")]
    Resolution { width: u32, height: u32 },
    #[error("min_detection_confidence must be within [0, 1], got {0}")]
    DetectionConfidence(f64),
    #[error("dropout_end_frames must be at least 1 when set")]
    DropoutFrames,
    #[error("smoothing.duplicate_distance must not be negative, got {0}")]
    DuplicateDistance(f64),
    #[error("smoothing.simplify_epsilon must be a positive distance, got {0}")]
    SimplifyEpsilon(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirWriterConfig {
    /// Consecutive frames a gesture must hold before it counts.
    pub hold_frames: u32,
    /// Minimum fingertip travel (pixels) between stored stroke points.
    pub min_distance_threshold: f64,
    /// Pinch when thumb-index distance is below this fraction of palm size.
    pub pinch_ratio: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Hands reported below this confidence are treated as absent.
    pub min_detection_confidence: f64,
    /// End an open stroke after this many consecutive frames without a hand.
    /// `None` keeps the stroke open through any dropout.
    pub dropout_end_frames: Option<u32>,
    pub smoothing: SmoothingConfig,
}

impl Default for AirWriterConfig {
    fn default() -> Self {
        Self {
            hold_frames: 5,
            min_distance_threshold: 5.0,
            pinch_ratio: 0.25,
            frame_width: 1280,
            frame_height: 720,
            min_detection_confidence: 0.7,
            dropout_end_frames: None,
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl AirWriterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hold_frames < 1 {
            return Err(ConfigError::HoldFrames(self.hold_frames));
        }
        if !(self.min_distance_threshold > 0.0) || !self.min_distance_threshold.is_finite() {
            return Err(ConfigError::MinDistance(self.min_distance_threshold));
        }
        if !(self.pinch_ratio > 0.0) || !self.pinch_ratio.is_finite() {
            return Err(ConfigError::PinchRatio(self.pinch_ratio));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Resolution {
                width: self.frame_width,
                height: self.frame_height,
            });
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(ConfigError::DetectionConfidence(self.min_detection_confidence));
        }
        if self.dropout_end_frames == Some(0) {
            return Err(ConfigError::DropoutFrames);
        }
        if !(self.smoothing.duplicate_distance >= 0.0) {
            return Err(ConfigError::DuplicateDistance(self.smoothing.duplicate_distance));
        }
        if let Some(epsilon) = self.smoothing.simplify_epsilon {
            if !(epsilon > 0.0) || !epsilon.is_finite() {
                return Err(ConfigError::SimplifyEpsilon(epsilon));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Invalid configuration JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Bad config file: {}", path.display()))
    }

    /// `$AIR_WRITER_CONFIG`, then the platform config directory, then defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            info!("Loading config from {}", path);
            return Self::load_from_path(path);
        }
        if let Some(path) = default_config_path().filter(|p| p.exists()) {
            info!("Loading config from {}", path.display());
            return Self::load_from_path(path);
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "airwriter", "AirWriter")
        .map(|dirs| dirs.config_dir().join("config.json"))
}
