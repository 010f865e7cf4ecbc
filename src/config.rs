//! Configuration
//!
//! Loads configuration from TOML at `<config dir>/sketch-loop/config.toml`.
//! A default file is written on first run if none exists.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::Endpoints;
use crate::brush::BrushStyle;
use crate::canvas::RasterFormat;
use crate::frame_sync::OverlapPolicy;
use crate::prompt::DEFAULT_PROMPT;
use crate::session::Timing;
use crate::wire::{PayloadField, WireFormat};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub timing: TimingConfig,
    pub canvas: CanvasConfig,
    pub brush: BrushStyle,
    pub prompt: PromptConfig,
}

/// Backend location and wire agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub predict_path: String,
    pub prompt_path: String,
    /// JSON field carrying the image: "base64_image" or "image"
    pub payload_field: PayloadField,
    /// Encoding of the canvas sent upstream: "png" or "jpeg"
    pub request_format: RasterFormat,
    pub data_uri_prefix: bool,
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let endpoints = Endpoints::default();
        Self {
            url: endpoints.base_url,
            predict_path: endpoints.predict_path,
            prompt_path: endpoints.prompt_path,
            payload_field: PayloadField::default(),
            request_format: RasterFormat::default(),
            data_uri_prefix: false,
            request_timeout_ms: 5_000,
        }
    }
}

/// Timer periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub frame_interval_ms: u64,
    pub color_interval_ms: u64,
    pub prompt_interval_ms: u64,
    /// "skip_if_busy" or "latest_wins"
    pub overlap: OverlapPolicy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 750,
            color_interval_ms: 10_000,
            prompt_interval_ms: 45_000,
            overlap: OverlapPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Background image; its size becomes the canvas size
    pub background: PathBuf,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self { background: PathBuf::from("images/myImage.jpg") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Shown until the first successful prompt fetch
    pub initial: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { initial: DEFAULT_PROMPT.to_string() }
    }
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            log::info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                log::warn!("Failed to create default config file: {:#}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Configuration loaded from {:?}", path);
        log::debug!("Config: {:?}", config);
        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("sketch-loop");
        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_string = toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        log::info!("Created default config file at {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        if timing.frame_interval_ms == 0 || timing.color_interval_ms == 0 || timing.prompt_interval_ms == 0 {
            bail!("timer periods must be greater than zero");
        }
        if self.backend.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be greater than zero");
        }
        if self.backend.url.trim().is_empty() {
            bail!("backend url is empty");
        }
        self.brush.validate().map_err(anyhow::Error::msg).context("invalid [brush] section")?;
        Ok(())
    }

    pub fn session_timing(&self) -> Timing {
        Timing {
            frame_interval: Duration::from_millis(self.timing.frame_interval_ms),
            color_interval: Duration::from_millis(self.timing.color_interval_ms),
            prompt_interval: Duration::from_millis(self.timing.prompt_interval_ms),
            request_timeout: Duration::from_millis(self.backend.request_timeout_ms),
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            base_url: self.backend.url.clone(),
            predict_path: self.backend.predict_path.clone(),
            prompt_path: self.backend.prompt_path.clone(),
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        WireFormat {
            field: self.backend.payload_field,
            raster: self.backend.request_format,
            data_uri_prefix: self.backend.data_uri_prefix,
        }
    }
}
