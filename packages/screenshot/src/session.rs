//! Capture session: the entry point for taking screenshots
//!
//! A [`ScreenshotSession`] owns the render thread, the attachment simulator and
//! the tile renderer. Anything that touches a component runs on the render
//! thread; calls from other threads block until their job is done.

use crate::album::{Album, DirectoryAlbum};
use crate::attachment::AttachmentSimulator;
use crate::component::{Component, Screen};
use crate::config::ScreenshotConfig;
use crate::hierarchy::{issues_document, metadata_document, HierarchyDumper, LayoutHierarchyDumper};
use crate::record::{validate_name, RecordBuilder, Tiling, DEFAULT_MAX_PIXELS};
use crate::render_thread::RenderThread;
use crate::renderer::{TileGrid, TileRenderer};
use crate::test_context::{TestContext, ThreadNameTestContext};
use crate::{Result, ScreenshotError};
use image::RgbaImage;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const RENDER_THREAD_NAME: &str = "screenshot-render";

/// Render-thread state shared by every capture of a session
#[derive(Debug)]
struct CaptureEngine {
    attachments: AttachmentSimulator,
    renderer: TileRenderer,
}

impl CaptureEngine {
    /// Attach, check the budget, and render + store every tile
    fn store_tiles(
        &mut self,
        component: &Arc<dyn Component>,
        name: &str,
        max_pixels: i64,
        album: &dyn Album,
    ) -> Result<Tiling> {
        let (width, height) = measured_size(component.as_ref())?;

        let attachment = self.attachments.scoped(component)?;
        check_pixel_budget(width, height, max_pixels)?;

        let grid = TileGrid::new(width, height, self.renderer.tile_size());
        let mut tiling = Tiling::new(grid.columns(), grid.rows());

        for rect in grid.iter() {
            let tile = self.renderer.render_tile(component.as_ref(), rect);
            let id = album.write_tile(name, rect.column, rect.row, tile)?;
            debug!("Stored tile ({}, {}) of {} as {}", rect.column, rect.row, name, id);
            tiling.set_at(rect.column, rect.row, id);
        }

        attachment.release()?;
        Ok(tiling)
    }

    /// Same budget as tiling; the bitmap is allocated in one piece
    fn render_bitmap(&mut self, component: &Arc<dyn Component>, max_pixels: i64) -> Result<RgbaImage> {
        let (width, height) = measured_size(component.as_ref())?;

        let attachment = self.attachments.scoped(component)?;
        check_pixel_budget(width, height, max_pixels)?;
        let image = TileRenderer::render_full(component.as_ref());
        attachment.release()?;
        Ok(image)
    }
}

fn measured_size(component: &dyn Component) -> Result<(u32, u32)> {
    let (width, height) = (component.width(), component.height());
    if width == 0 || height == 0 {
        return Err(ScreenshotError::NotMeasured { width, height });
    }
    Ok((width, height))
}

fn check_pixel_budget(width: u32, height: u32, max_pixels: i64) -> Result<()> {
    if max_pixels <= 0 {
        return Ok(());
    }
    if u64::from(width) * u64::from(height) > max_pixels as u64 {
        return Err(ScreenshotError::SizeLimitExceeded {
            width,
            height,
            max_pixels,
        });
    }
    Ok(())
}

/// Everything the render thread needs to finalize one record
struct CapturePlan {
    component: Arc<dyn Component>,
    name: String,
    max_pixels: i64,
    fail_on_size_limit: bool,
    render_tiles: bool,
    include_accessibility_info: bool,
}

/// Render-thread results handed back to the caller
struct CaptureOutcome {
    tiling: Option<Tiling>,
    error: Option<String>,
    view_hierarchy: Value,
    ax_hierarchy: Option<Value>,
    ax_issues: Option<Value>,
}

struct Shared {
    engine: Mutex<CaptureEngine>,
    /// Mirrors the renderer's tile size so callers can read it without the engine
    tile_size: AtomicU32,
    album: Arc<dyn Album>,
    dumper: Arc<dyn HierarchyDumper>,
    test_context: Arc<dyn TestContext>,
    config: ScreenshotConfig,
}

impl Shared {
    /// Engine state is only touched on the render thread; the lock never
    /// contends. A panic mid-capture leaves it consistent because attachment
    /// is released on unwind, so poisoning is ignored.
    fn engine(&self) -> MutexGuard<'_, CaptureEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Render-thread half of `record()`
    fn capture(&self, plan: &CapturePlan) -> Result<CaptureOutcome> {
        let mut tiling = None;
        let mut error = None;

        if plan.render_tiles {
            let stored = self.engine().store_tiles(
                &plan.component,
                &plan.name,
                plan.max_pixels,
                self.album.as_ref(),
            );

            match stored {
                Ok(stored) => tiling = Some(stored),
                Err(e @ ScreenshotError::SizeLimitExceeded { .. }) if !plan.fail_on_size_limit => {
                    warn!("Screenshot {} not captured: {}", plan.name, e);
                    error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let component = plan.component.as_ref();
        let view_hierarchy = self.dumper.dump_hierarchy(component)?;

        let ax_hierarchy = if plan.include_accessibility_info {
            self.dumper.dump_accessibility_tree(component)?
        } else {
            None
        };
        let ax_issues = ax_hierarchy
            .as_ref()
            .map(|tree| self.dumper.dump_accessibility_issues(tree))
            .transpose()?;

        Ok(CaptureOutcome {
            tiling,
            error,
            view_hierarchy,
            ax_hierarchy,
            ax_issues,
        })
    }
}

/// Entry point for taking screenshots.
///
/// Cheap to clone; clones share the render thread, album and caches.
#[derive(Clone)]
pub struct ScreenshotSession {
    render_thread: Arc<RenderThread>,
    shared: Arc<Shared>,
}

impl ScreenshotSession {
    pub fn builder(album: Arc<dyn Album>) -> SessionBuilder {
        SessionBuilder::new(album)
    }

    /// Session backed by an on-disk album, configured from
    /// `screenshot.config.json` in `root` when present.
    ///
    /// Screenshots land in `<albumDir or root/screenshots>/<albumName>/`.
    pub fn create(root: &Path) -> Result<Self> {
        let config = ScreenshotConfig::load(root)?;
        let album_root = config
            .album_dir
            .clone()
            .unwrap_or_else(|| root.join("screenshots"));
        let album = DirectoryAlbum::new(album_root, &config.album_name)?;

        Self::builder(Arc::new(album)).config(config).build()
    }

    /// The largest number of pixels captured unless a record overrides it
    pub fn max_pixels_default() -> i64 {
        DEFAULT_MAX_PIXELS
    }

    pub fn config(&self) -> &ScreenshotConfig {
        &self.shared.config
    }

    pub fn album(&self) -> &Arc<dyn Album> {
        &self.shared.album
    }

    pub fn is_render_thread(&self) -> bool {
        self.render_thread.is_current()
    }

    /// Run `f` on the render thread, blocking until it completes
    pub fn run_on_render_thread<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.render_thread.run(f)
    }

    pub fn tile_size(&self) -> u32 {
        self.shared.tile_size.load(Ordering::Acquire)
    }

    pub fn set_tile_size(&self, tile_size: u32) -> Result<()> {
        if tile_size == 0 {
            return Err(ScreenshotError::Config("tile size must be positive".to_string()));
        }

        let shared = Arc::clone(&self.shared);
        self.render_thread.run(move || {
            shared.engine().renderer.set_tile_size(tile_size);
            shared.tile_size.store(tile_size, Ordering::Release);
            Ok(())
        })
    }

    /// Snap a screenshot of an already measured and laid out component,
    /// named after the current test unless renamed.
    pub fn snap(&self, component: Arc<dyn Component>) -> RecordBuilder {
        self.new_record(Some(component))
    }

    /// Snap a screenshot of a whole screen through its root component
    pub fn snap_screen(&self, screen: Arc<dyn Screen>) -> Result<RecordBuilder> {
        let root = self.render_thread.run(move || Ok(screen.root_component()))?;
        if root.is_none() {
            warn!("Screen has no root component to capture");
        }
        Ok(self.new_record(root))
    }

    pub fn flush(&self) -> Result<()> {
        self.shared.album.flush()?;
        Ok(())
    }

    fn new_record(&self, component: Option<Arc<dyn Component>>) -> RecordBuilder {
        let mut record = RecordBuilder::new(self.clone(), component, self.shared.config.max_pixels);
        record.set_detected_test(
            self.shared.test_context.current_test_class(),
            self.shared.test_context.current_test_name(),
        );
        record
    }

    /// Finalize a record: tiles, hierarchy documents, then the album record
    pub(crate) fn record(&self, record: &mut RecordBuilder) -> Result<()> {
        // Derived names never went through set_name
        let name = record.name();
        validate_name(&name)?;

        let component = record
            .component()
            .cloned()
            .ok_or(ScreenshotError::MissingComponent)?;

        let plan = CapturePlan {
            component,
            name: name.clone(),
            max_pixels: record.max_pixels(),
            fail_on_size_limit: record.fail_on_size_limit(),
            render_tiles: record.error().is_none(),
            include_accessibility_info: record.include_accessibility_info(),
        };

        let shared = Arc::clone(&self.shared);
        let outcome = self.render_thread.run(move || shared.capture(&plan))?;

        if let Some(tiling) = outcome.tiling {
            record.apply_tiling(tiling);
        }
        if let Some(error) = outcome.error {
            record.apply_error(error);
        }

        let album = self.shared.album.as_ref();
        let document = metadata_document(outcome.view_hierarchy, outcome.ax_hierarchy.as_ref());
        album.write_view_hierarchy(&name, &serde_json::to_string_pretty(&document)?)?;

        if let Some(issues) = outcome.ax_issues {
            let document = issues_document(issues);
            album.write_ax_issues(&name, &serde_json::to_string_pretty(&document)?)?;
        }

        record.check_state()?;
        album.add_record(&record.to_metadata())?;

        info!(
            "Recorded screenshot {} ({}x{} tiles)",
            name,
            record.tiling().width(),
            record.tiling().height()
        );
        Ok(())
    }

    pub(crate) fn bitmap(&self, record: &RecordBuilder) -> Result<RgbaImage> {
        validate_name(&record.name())?;

        let component = record
            .component()
            .cloned()
            .ok_or(ScreenshotError::MissingComponent)?;
        let max_pixels = record.max_pixels();

        let shared = Arc::clone(&self.shared);
        self.render_thread.run(move || {
            let mut engine = shared.engine();
            engine.render_bitmap(&component, max_pixels)
        })
    }
}

/// Configures and starts a [`ScreenshotSession`]
pub struct SessionBuilder {
    album: Arc<dyn Album>,
    dumper: Arc<dyn HierarchyDumper>,
    test_context: Arc<dyn TestContext>,
    config: ScreenshotConfig,
    thread_name: String,
}

impl SessionBuilder {
    fn new(album: Arc<dyn Album>) -> Self {
        Self {
            album,
            dumper: Arc::new(LayoutHierarchyDumper::new()),
            test_context: Arc::new(ThreadNameTestContext),
            config: ScreenshotConfig::default(),
            thread_name: RENDER_THREAD_NAME.to_string(),
        }
    }

    pub fn config(mut self, config: ScreenshotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dumper(mut self, dumper: Arc<dyn HierarchyDumper>) -> Self {
        self.dumper = dumper;
        self
    }

    pub fn test_context(mut self, test_context: Arc<dyn TestContext>) -> Self {
        self.test_context = test_context;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Validate the config, clean the album and start the render thread
    pub fn build(self) -> Result<ScreenshotSession> {
        self.config.validate()?;
        self.album.cleanup()?;

        let render_thread = RenderThread::spawn(&self.thread_name)?;
        let engine = CaptureEngine {
            attachments: AttachmentSimulator::new(),
            renderer: TileRenderer::new(self.config.tile_size),
        };

        info!(
            "Started screenshot session (tile size {}, max pixels {})",
            self.config.tile_size, self.config.max_pixels
        );

        Ok(ScreenshotSession {
            render_thread: Arc::new(render_thread),
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                tile_size: AtomicU32::new(self.config.tile_size),
                album: self.album,
                dumper: self.dumper,
                test_context: self.test_context,
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_budget() {
        assert!(check_pixel_budget(10_000, 1_000, DEFAULT_MAX_PIXELS).is_ok());
        assert!(matches!(
            check_pixel_budget(10_000, 10_001, DEFAULT_MAX_PIXELS),
            Err(ScreenshotError::SizeLimitExceeded {
                width: 10_000,
                height: 10_001,
                ..
            })
        ));
        assert!(check_pixel_budget(10_000, 10_001, 0).is_ok());
        assert!(check_pixel_budget(u32::MAX, u32::MAX, -1).is_ok());
    }

    #[test]
    fn test_max_pixels_default() {
        assert_eq!(ScreenshotSession::max_pixels_default(), 10_000_000);
    }
}
