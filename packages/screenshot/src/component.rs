//! Host framework adapter surface
//!
//! Everything the capture engine needs from the UI framework goes through the
//! traits in this module. A host wires its own node type into [`Component`];
//! the engine never reaches into framework internals beyond these calls.

use crate::attachment::AttachInfo;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity token for a component subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Failure reported by the host framework adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Window visibility passed along with the attach notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    Invisible,
    Gone,
}

/// Host display the simulated window pretends to live on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub display_id: u32,
    pub width: u32,
    pub height: u32,
    pub density: f32,
}

impl Default for DisplayInfo {
    fn default() -> Self {
        Self {
            display_id: 0,
            width: 1080,
            height: 1920,
            density: 1.0,
        }
    }
}

/// Accessibility properties of a single node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessibilityInfo {
    /// Semantic role (e.g., "button", "text")
    pub role: String,

    /// Text announced by assistive technology
    pub label: Option<String>,

    /// Whether the node can take input focus
    pub focusable: bool,
}

/// A node in the host's displayable-element tree.
///
/// Components are expected to be measured and laid out before capture. All
/// methods are only ever called on the render thread.
pub trait Component: Send + Sync {
    fn id(&self) -> ComponentId;

    /// Measured width in pixels
    fn width(&self) -> u32;

    /// Measured height in pixels
    fn height(&self) -> u32;

    /// Offset from the parent's left edge
    fn left(&self) -> i32 {
        0
    }

    /// Offset from the parent's top edge
    fn top(&self) -> i32 {
        0
    }

    fn class_name(&self) -> &str;

    /// True when the subtree is attached to a genuine, live window
    fn has_window(&self) -> bool {
        false
    }

    fn display(&self) -> Result<DisplayInfo, HostError> {
        Ok(DisplayInfo::default())
    }

    fn dispatch_attached_to_window(
        &self,
        info: &Arc<AttachInfo>,
        visibility: Visibility,
    ) -> Result<(), HostError>;

    fn dispatch_detached_from_window(&self) -> Result<(), HostError>;

    /// Draw the subtree in its own coordinate space
    fn draw(&self, canvas: &mut Canvas<'_>);

    fn children(&self) -> Vec<Arc<dyn Component>> {
        Vec::new()
    }

    fn accessibility(&self) -> Option<AccessibilityInfo> {
        None
    }
}

/// A whole screen (e.g., an activity); captured through its root component
pub trait Screen: Send + Sync {
    fn root_component(&self) -> Option<Arc<dyn Component>>;
}

/// Translation-aware drawing surface over an RGBA buffer.
///
/// Coordinates passed to drawing calls are shifted by the current translation
/// and clipped to the buffer, so a component can paint its full surface while
/// only the visible tile lands in the pixels.
pub struct Canvas<'a> {
    image: &'a mut RgbaImage,
    dx: i64,
    dy: i64,
}

impl<'a> Canvas<'a> {
    pub fn new(image: &'a mut RgbaImage) -> Self {
        Self { image, dx: 0, dy: 0 }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn translate(&mut self, dx: i64, dy: i64) {
        self.dx += dx;
        self.dy += dy;
    }

    pub fn translation(&self) -> (i64, i64) {
        (self.dx, self.dy)
    }

    /// Fill the whole buffer, ignoring translation
    pub fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    pub fn put_pixel(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        self.fill_rect(x, y, 1, 1, color);
    }

    pub fn fill_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: Rgba<u8>) {
        let left = (x + self.dx).max(0);
        let top = (y + self.dy).max(0);
        let right = (x + self.dx + i64::from(width)).min(i64::from(self.image.width()));
        let bottom = (y + self.dy + i64::from(height)).min(i64::from(self.image.height()));

        if left >= right || top >= bottom {
            return;
        }

        for py in top..bottom {
            for px in left..right {
                self.image.put_pixel(px as u32, py as u32, color);
            }
        }
    }

    /// Read back a pixel in translated coordinates
    pub fn pixel(&self, x: i64, y: i64) -> Option<Rgba<u8>> {
        let px = x + self.dx;
        let py = y + self.dy;
        if px < 0 || py < 0 || px >= i64::from(self.image.width()) || py >= i64::from(self.image.height()) {
            return None;
        }
        Some(*self.image.get_pixel(px as u32, py as u32))
    }
}
