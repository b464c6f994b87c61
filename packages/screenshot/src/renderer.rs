//! Tile rendering
//!
//! A component surface is split into a grid of `tile_size`-edged tiles. Each
//! tile is drawn into one reusable buffer through a translation that maps the
//! tile's top-left corner to the buffer origin, so memory stays bounded by a
//! single tile no matter how large the component is.
//!
//! Tiling assumes a component draws the same pixels every time it is asked to
//! and has no side effects between draws.

use crate::component::{Canvas, Component};
use image::RgbaImage;

pub const DEFAULT_TILE_SIZE: u32 = 512;

/// One rectangular region of a component surface, `[left, right) x [top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub column: u32,
    pub row: u32,
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TileRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// Tile layout for a `width x height` surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_size: u32,
    columns: u32,
    rows: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        let tile_size = tile_size.max(1);
        Self {
            width,
            height,
            tile_size,
            columns: width.div_ceil(tile_size),
            rows: height.div_ceil(tile_size),
        }
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tile(&self, column: u32, row: u32) -> TileRect {
        let left = column * self.tile_size;
        let top = row * self.tile_size;
        TileRect {
            column,
            row,
            left,
            top,
            right: left.saturating_add(self.tile_size).min(self.width),
            bottom: top.saturating_add(self.tile_size).min(self.height),
        }
    }

    /// Tiles in row-major order
    pub fn iter(&self) -> impl Iterator<Item = TileRect> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.columns).map(move |column| self.tile(column, row)))
    }
}

/// Renders tiles of a component into a single reusable buffer
#[derive(Debug)]
pub struct TileRenderer {
    tile_size: u32,
    buffer: Option<RgbaImage>,
}

impl TileRenderer {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            buffer: None,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Changing the tile edge drops the buffer so the next tile reallocates
    pub fn set_tile_size(&mut self, tile_size: u32) {
        if tile_size != self.tile_size {
            self.buffer = None;
        }
        self.tile_size = tile_size;
    }

    /// Draw one tile. The returned buffer is only valid until the next call.
    pub fn render_tile(&mut self, component: &dyn Component, rect: TileRect) -> &RgbaImage {
        let buffer = self.reconfigure(rect.width(), rect.height());
        let mut canvas = Canvas::new(buffer);
        draw_clipped(component, rect.left, rect.top, &mut canvas);
        buffer
    }

    /// Draw the whole component into a freshly allocated buffer
    pub fn render_full(component: &dyn Component) -> RgbaImage {
        let mut image = RgbaImage::new(component.width(), component.height());
        draw_clipped(component, 0, 0, &mut Canvas::new(&mut image));
        image
    }

    /// Start address of the current buffer, if one is allocated
    pub fn buffer_ptr(&self) -> Option<*const u8> {
        self.buffer.as_ref().map(|buffer| buffer.as_raw().as_ptr())
    }

    /// Resize the buffer to exactly `width x height`, fully transparent,
    /// reusing the existing allocation.
    fn reconfigure(&mut self, width: u32, height: u32) -> &mut RgbaImage {
        let full = self.tile_size as usize * self.tile_size as usize * 4;
        let mut pixels = match self.buffer.take() {
            Some(image) => image.into_raw(),
            None => Vec::with_capacity(full),
        };

        pixels.clear();
        pixels.resize(width as usize * height as usize * 4, 0);

        let image = RgbaImage::from_raw(width, height, pixels)
            .unwrap_or_else(|| RgbaImage::new(width, height));
        self.buffer.insert(image)
    }
}

impl Default for TileRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE)
    }
}

fn draw_clipped(component: &dyn Component, left: u32, top: u32, canvas: &mut Canvas<'_>) {
    let (left, top) = (i64::from(left), i64::from(top));
    canvas.translate(-left, -top);
    component.draw(canvas);
    canvas.translate(left, top);
}
