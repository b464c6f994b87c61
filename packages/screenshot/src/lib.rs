//! # Paperclip Screenshot
//!
//! Tiled screenshot capture for UI components that are not attached to a live
//! window.
//!
//! ## Design Philosophy
//!
//! A screenshot test builds a component, measures and lays it out, and then
//! asks for a capture. The component usually never sees a real window, so the
//! engine simulates window attachment for the duration of the capture, renders
//! the surface tile by tile into one reusable buffer, and hands every tile to
//! an [`Album`] along with a structural hierarchy document.
//!
//! ## Core Pieces
//!
//! - [`AttachmentSimulator`] - fakes "attached to a window" state, idempotently
//! - [`TileRenderer`] - renders one bounded tile at a time
//! - [`ScreenshotSession`] - entry point, marshals work onto the render thread
//! - [`RecordBuilder`] - per-capture naming, options and result state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paperclip_screenshot::{MemoryAlbum, ScreenshotConfig, ScreenshotSession};
//! use std::sync::Arc;
//!
//! let album = Arc::new(MemoryAlbum::new());
//! let session = ScreenshotSession::builder(album.clone())
//!     .config(ScreenshotConfig::default())
//!     .build()?;
//!
//! session
//!     .snap(component)
//!     .set_name("checkout_button")?
//!     .set_group("buttons")?
//!     .record()?;
//! ```

mod album;
mod attachment;
mod component;
mod config;
mod hierarchy;
mod record;
mod render_thread;
mod renderer;
mod session;
mod test_context;

pub use album::{
    tile_key, Album, AlbumError, DirectoryAlbum, MemoryAlbum, RecordMetadata, StoredTile,
    METADATA_FILE_NAME,
};
pub use attachment::{
    AttachCallbacks, AttachGuard, AttachInfo, AttachmentRegistry, AttachmentSimulator, Detacher,
    StubCallbacks, StubWindow, StubWindowSession, WindowHandle, WindowSession, WindowToken,
    HOST_ADAPTER_VERSION,
};
pub use component::{
    AccessibilityInfo, Canvas, Component, ComponentId, DisplayInfo, HostError, Screen, Visibility,
};
pub use config::{ScreenshotConfig, DEFAULT_CONFIG_NAME};
pub use hierarchy::{HierarchyDumper, LayoutHierarchyDumper, METADATA_VERSION};
pub use record::{RecordBuilder, RecordState, Tiling, DEFAULT_MAX_PIXELS};
pub use render_thread::RenderThread;
pub use renderer::{TileGrid, TileRect, TileRenderer, DEFAULT_TILE_SIZE};
pub use session::{ScreenshotSession, SessionBuilder};
pub use test_context::{FixedTestContext, TestContext, ThreadNameTestContext};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("Invalid screenshot name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Can't take a screenshot, since this component is not measured ({width}x{height})")]
    NotMeasured { width: u32, height: u32 },

    #[error("Component too large: ({width}, {height}) exceeds the limit of {max_pixels} pixels")]
    SizeLimitExceeded {
        width: u32,
        height: u32,
        max_pixels: i64,
    },

    #[error("Window attachment failed: {0}")]
    Attachment(#[from] HostError),

    #[error("Expected all tiles to be filled, tile ({x}, {y}) is empty")]
    IncompleteTiling { x: u32, y: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] AlbumError),

    #[error("Hierarchy dump failed: {0}")]
    Hierarchy(String),

    #[error("Invalid record state: {0}")]
    InvalidState(String),

    #[error("No component to capture")]
    MissingComponent,

    #[error("Render thread panicked: {0}")]
    RenderThreadPanicked(String),

    #[error("Render thread is no longer running")]
    RenderThreadGone,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScreenshotError>;
