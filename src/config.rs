//! Engine configuration.
//!
//! Every field has a default so an empty (or missing) JSON file is valid.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable pointing at a JSON config file
pub const CONFIG_ENV: &str = "GUIDANCE_CONFIG";

/// Capture & normalize settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Normalized image width
    pub target_width: u32,
    /// Normalized image height
    pub target_height: u32,
    /// Palette size of the encoded image
    pub palette_colors: u16,
    /// Root directory for session folders
    pub screenshot_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_width: 1366,
            target_height: 768,
            palette_colors: 64,
            screenshot_dir: default_screenshot_dir(),
        }
    }
}

fn default_screenshot_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("guidance-overlay")
        .join("screenshots")
}

/// Global input hook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Signals closer together than this count as one interaction
    pub duplicate_window_ms: u64,
    /// One-shot timer used when no global hook is available
    pub fallback_timeout_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: 100,
            fallback_timeout_ms: 10_000,
        }
    }
}

impl InputConfig {
    pub fn duplicate_window(&self) -> Duration {
        Duration::from_millis(self.duplicate_window_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }
}

/// Auto-capture coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCaptureConfig {
    /// Start capturing on user interaction as soon as the engine starts
    pub enabled: bool,
    /// Minimum spacing between two honored interactions
    pub debounce_ms: u64,
    /// Wait between the interaction and the capture so the UI can settle
    pub settle_delay_ms: u64,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 1_000,
            settle_delay_ms: 1_000,
        }
    }
}

impl AutoCaptureConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Arrow overlay defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Arrow box size in pixels
    pub arrow_size: f64,
    pub color: String,
    pub opacity: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            arrow_size: 150.0,
            color: "#D4AF37".to_string(),
            opacity: 0.7,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub input: InputConfig,
    pub auto_capture: AutoCaptureConfig,
    pub overlay: OverlayConfig,
}

impl EngineConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `$GUIDANCE_CONFIG` if set, otherwise defaults
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.target_width == 0 || self.capture.target_height == 0 {
            bail!(
                "Capture target resolution {}x{} must be non-zero",
                self.capture.target_width,
                self.capture.target_height
            );
        }
        if !(2..=256).contains(&self.capture.palette_colors) {
            bail!(
                "Palette size {} out of range (2-256)",
                self.capture.palette_colors
            );
        }
        if !(0.0..=1.0).contains(&self.overlay.opacity) {
            bail!("Overlay opacity {} out of range (0.0-1.0)", self.overlay.opacity);
        }
        if self.overlay.arrow_size <= 0.0 {
            bail!("Arrow size {} must be positive", self.overlay.arrow_size);
        }
        Ok(())
    }
}
