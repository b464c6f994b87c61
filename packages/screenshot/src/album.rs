//! Artifact storage ("album")
//!
//! The capture engine only talks to the [`Album`] trait. Two implementations
//! ship with the crate: [`MemoryAlbum`] keeps everything in process, and
//! [`DirectoryAlbum`] writes PNG tiles and JSON documents to disk.

use crate::record::Tiling;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Screenshot name already used in this run: {0}")]
    DuplicateName(String),
}

/// Storage key of a tile: `<name>_<tile_x>_<tile_y>`
pub fn tile_key(name: &str, tile_x: u32, tile_y: u32) -> String {
    format!("{name}_{tile_x}_{tile_y}")
}

/// Summary of a finished capture, as stored in the album manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub test_class: Option<String>,

    pub test_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default)]
    pub extras: BTreeMap<String, String>,

    pub tiling: Tiling,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// RFC 3339 timestamp
    pub captured_at: String,
}

/// Storage collaborator for captured screenshots
pub trait Album: Send + Sync {
    /// Remove artifacts left over from a previous run
    fn cleanup(&self) -> Result<(), AlbumError>;

    /// Store one tile and return its identifier
    fn write_tile(
        &self,
        name: &str,
        tile_x: u32,
        tile_y: u32,
        pixels: &RgbaImage,
    ) -> Result<String, AlbumError>;

    fn write_view_hierarchy(&self, name: &str, document: &str) -> Result<(), AlbumError>;

    fn write_ax_issues(&self, name: &str, document: &str) -> Result<(), AlbumError>;

    fn add_record(&self, record: &RecordMetadata) -> Result<(), AlbumError>;

    fn flush(&self) -> Result<(), AlbumError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A tile as seen by [`MemoryAlbum`]
#[derive(Debug, Clone)]
pub struct StoredTile {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Option<RgbaImage>,
}

#[derive(Debug, Default)]
struct MemoryAlbumState {
    tiles: Vec<StoredTile>,
    view_hierarchies: BTreeMap<String, String>,
    ax_issues: BTreeMap<String, String>,
    records: Vec<RecordMetadata>,
    cleanups: usize,
    flushes: usize,
}

/// In-process album that remembers every write
#[derive(Debug)]
pub struct MemoryAlbum {
    retain_pixels: bool,
    state: Mutex<MemoryAlbumState>,
}

impl MemoryAlbum {
    pub fn new() -> Self {
        Self {
            retain_pixels: true,
            state: Mutex::default(),
        }
    }

    /// Only record tile keys and sizes, dropping pixel data
    pub fn keys_only() -> Self {
        Self {
            retain_pixels: false,
            state: Mutex::default(),
        }
    }

    pub fn tiles(&self) -> Vec<StoredTile> {
        lock(&self.state).tiles.clone()
    }

    pub fn tile_keys(&self) -> Vec<String> {
        lock(&self.state).tiles.iter().map(|t| t.key.clone()).collect()
    }

    pub fn tile(&self, key: &str) -> Option<RgbaImage> {
        lock(&self.state)
            .tiles
            .iter()
            .find(|t| t.key == key)
            .and_then(|t| t.pixels.clone())
    }

    pub fn view_hierarchy(&self, name: &str) -> Option<String> {
        lock(&self.state).view_hierarchies.get(name).cloned()
    }

    pub fn view_hierarchy_count(&self) -> usize {
        lock(&self.state).view_hierarchies.len()
    }

    pub fn ax_issues(&self, name: &str) -> Option<String> {
        lock(&self.state).ax_issues.get(name).cloned()
    }

    pub fn records(&self) -> Vec<RecordMetadata> {
        lock(&self.state).records.clone()
    }

    pub fn cleanup_count(&self) -> usize {
        lock(&self.state).cleanups
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.state).flushes
    }
}

impl Default for MemoryAlbum {
    fn default() -> Self {
        Self::new()
    }
}

impl Album for MemoryAlbum {
    fn cleanup(&self) -> Result<(), AlbumError> {
        let mut state = lock(&self.state);
        let cleanups = state.cleanups + 1;
        *state = MemoryAlbumState {
            cleanups,
            ..MemoryAlbumState::default()
        };
        Ok(())
    }

    fn write_tile(
        &self,
        name: &str,
        tile_x: u32,
        tile_y: u32,
        pixels: &RgbaImage,
    ) -> Result<String, AlbumError> {
        let key = tile_key(name, tile_x, tile_y);
        lock(&self.state).tiles.push(StoredTile {
            key: key.clone(),
            width: pixels.width(),
            height: pixels.height(),
            pixels: self.retain_pixels.then(|| pixels.clone()),
        });
        Ok(key)
    }

    fn write_view_hierarchy(&self, name: &str, document: &str) -> Result<(), AlbumError> {
        lock(&self.state)
            .view_hierarchies
            .insert(name.to_string(), document.to_string());
        Ok(())
    }

    fn write_ax_issues(&self, name: &str, document: &str) -> Result<(), AlbumError> {
        lock(&self.state)
            .ax_issues
            .insert(name.to_string(), document.to_string());
        Ok(())
    }

    fn add_record(&self, record: &RecordMetadata) -> Result<(), AlbumError> {
        let mut state = lock(&self.state);
        if state.records.iter().any(|r| r.name == record.name) {
            return Err(AlbumError::DuplicateName(record.name.clone()));
        }
        state.records.push(record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), AlbumError> {
        lock(&self.state).flushes += 1;
        Ok(())
    }
}

/// Name of the manifest written by [`DirectoryAlbum::flush`]
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// On-disk album rooted at `<root>/<album name>/`
#[derive(Debug)]
pub struct DirectoryAlbum {
    dir: PathBuf,
    records: Mutex<Vec<RecordMetadata>>,
}

impl DirectoryAlbum {
    pub fn new(root: impl AsRef<Path>, album_name: &str) -> Result<Self, AlbumError> {
        let dir = root.as_ref().join(album_name);
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            records: Mutex::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records(&self) -> Vec<RecordMetadata> {
        lock(&self.records).clone()
    }
}

impl Album for DirectoryAlbum {
    fn cleanup(&self) -> Result<(), AlbumError> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;
        lock(&self.records).clear();

        info!("Cleaned album at {}", self.dir.display());
        Ok(())
    }

    fn write_tile(
        &self,
        name: &str,
        tile_x: u32,
        tile_y: u32,
        pixels: &RgbaImage,
    ) -> Result<String, AlbumError> {
        let file_name = format!("{}.png", tile_key(name, tile_x, tile_y));
        pixels.save_with_format(self.dir.join(&file_name), ImageFormat::Png)?;

        debug!("Wrote tile {}", file_name);
        Ok(file_name)
    }

    fn write_view_hierarchy(&self, name: &str, document: &str) -> Result<(), AlbumError> {
        std::fs::write(self.dir.join(format!("{name}_dump.json")), document)?;
        Ok(())
    }

    fn write_ax_issues(&self, name: &str, document: &str) -> Result<(), AlbumError> {
        std::fs::write(self.dir.join(format!("{name}_issues.json")), document)?;
        Ok(())
    }

    fn add_record(&self, record: &RecordMetadata) -> Result<(), AlbumError> {
        let mut records = lock(&self.records);
        if records.iter().any(|r| r.name == record.name) {
            return Err(AlbumError::DuplicateName(record.name.clone()));
        }
        records.push(record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), AlbumError> {
        let records = lock(&self.records);
        let json = serde_json::to_string_pretty(&*records)?;
        std::fs::write(self.dir.join(METADATA_FILE_NAME), json)?;

        info!(
            "Flushed {} screenshot records to {}",
            records.len(),
            self.dir.display()
        );
        Ok(())
    }
}
