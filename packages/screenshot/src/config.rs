use crate::record::DEFAULT_MAX_PIXELS;
use crate::renderer::DEFAULT_TILE_SIZE;
use crate::{Result, ScreenshotError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "screenshot.config.json";

/// Screenshot session configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotConfig {
    /// Edge length of a rendered tile in pixels
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,

    /// Default pixel budget for new records; `<= 0` disables it
    #[serde(default = "default_max_pixels")]
    pub max_pixels: i64,

    /// Album (sub-directory) name screenshots are stored under
    #[serde(default = "default_album_name")]
    pub album_name: String,

    /// Root directory of the on-disk album
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_dir: Option<PathBuf>,
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

fn default_max_pixels() -> i64 {
    DEFAULT_MAX_PIXELS
}

fn default_album_name() -> String {
    "default".to_string()
}

impl ScreenshotConfig {
    /// Load config from a directory, falling back to defaults
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: ScreenshotConfig = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(ScreenshotConfig::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(ScreenshotError::Config("tileSize must be positive".to_string()));
        }
        if self.album_name.is_empty() || self.album_name.contains(['/', '\\']) {
            return Err(ScreenshotError::Config(format!(
                "invalid albumName {:?}",
                self.album_name
            )));
        }
        Ok(())
    }
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            max_pixels: default_max_pixels(),
            album_name: default_album_name(),
            album_dir: None,
        }
    }
}
