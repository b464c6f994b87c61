//! Shared fake component tree for integration tests
#![allow(dead_code)]

use image::Rgba;
use image::RgbaImage;
use paperclip_screenshot::{
    AccessibilityInfo, Album, AlbumError, AttachInfo, Canvas, Component, ComponentId,
    FixedTestContext, HostError, MemoryAlbum, RecordMetadata, ScreenshotConfig,
    ScreenshotSession, Visibility,
};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

pub const RENDER_THREAD: &str = "screenshot-render";

/// A laid-out view that paints a solid background and its children
pub struct FakeView {
    id: ComponentId,
    class: String,
    width: u32,
    height: u32,
    left: i32,
    top: i32,
    color: Option<Rgba<u8>>,
    children: Vec<Arc<FakeView>>,
    really_attached: bool,
    panic_on_draw: bool,
    refuse_attach: bool,
    accessibility: Option<AccessibilityInfo>,

    attached: AtomicBool,
    pub attaches: AtomicUsize,
    pub detaches: AtomicUsize,
    pub draws: AtomicUsize,
    pub drawn_detached: AtomicBool,
    pub drawn_off_render_thread: AtomicBool,
}

impl FakeView {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: ComponentId::next(),
            class: "FakeView".to_string(),
            width,
            height,
            left: 0,
            top: 0,
            color: None,
            children: Vec::new(),
            really_attached: false,
            panic_on_draw: false,
            refuse_attach: false,
            accessibility: None,
            attached: AtomicBool::new(false),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            draws: AtomicUsize::new(0),
            drawn_detached: AtomicBool::new(false),
            drawn_off_render_thread: AtomicBool::new(false),
        }
    }

    pub fn class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn color(mut self, color: Rgba<u8>) -> Self {
        self.color = Some(color);
        self
    }

    pub fn at(mut self, left: i32, top: i32) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn child(mut self, child: FakeView) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn really_attached(mut self) -> Self {
        self.really_attached = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_draw = true;
        self
    }

    /// Fail the attach notification like a host without a usable window
    pub fn refusing_attach(mut self) -> Self {
        self.refuse_attach = true;
        self
    }

    pub fn accessibility(mut self, role: &str, label: Option<&str>) -> Self {
        self.accessibility = Some(AccessibilityInfo {
            role: role.to_string(),
            label: label.map(str::to_string),
            focusable: true,
        });
        self
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl Component for FakeView {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn left(&self) -> i32 {
        self.left
    }

    fn top(&self) -> i32 {
        self.top
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn has_window(&self) -> bool {
        self.really_attached
    }

    fn dispatch_attached_to_window(
        &self,
        info: &Arc<AttachInfo>,
        visibility: Visibility,
    ) -> Result<(), HostError> {
        assert_eq!(visibility, Visibility::Visible);
        assert!(info.has_window_focus());
        if self.refuse_attach {
            return Err(HostError::new(format!("{} refused to attach", self.class)));
        }
        self.attached.store(true, Ordering::SeqCst);
        self.attaches.fetch_add(1, Ordering::SeqCst);
        for child in &self.children {
            child.dispatch_attached_to_window(info, visibility)?;
        }
        Ok(())
    }

    fn dispatch_detached_from_window(&self) -> Result<(), HostError> {
        self.attached.store(false, Ordering::SeqCst);
        self.detaches.fetch_add(1, Ordering::SeqCst);
        for child in &self.children {
            child.dispatch_detached_from_window()?;
        }
        Ok(())
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        if self.panic_on_draw {
            panic!("draw failed for {}", self.class);
        }

        self.draws.fetch_add(1, Ordering::SeqCst);
        if !self.really_attached && !self.is_attached() {
            self.drawn_detached.store(true, Ordering::SeqCst);
        }
        if thread::current().name() != Some(RENDER_THREAD) {
            self.drawn_off_render_thread.store(true, Ordering::SeqCst);
        }

        if let Some(color) = self.color {
            canvas.fill_rect(0, 0, self.width, self.height, color);
        }

        for child in &self.children {
            let (dx, dy) = (i64::from(child.left), i64::from(child.top));
            canvas.translate(dx, dy);
            child.draw(canvas);
            canvas.translate(-dx, -dy);
        }
    }

    fn children(&self) -> Vec<Arc<dyn Component>> {
        self.children
            .iter()
            .map(|child| child.clone() as Arc<dyn Component>)
            .collect()
    }

    fn accessibility(&self) -> Option<AccessibilityInfo> {
        self.accessibility.clone()
    }
}

/// Memory album whose tile writes start failing after `fail_after` successes
pub struct FailingAlbum {
    pub inner: MemoryAlbum,
    fail_after: usize,
    tile_writes: AtomicUsize,
}

impl FailingAlbum {
    pub fn new(fail_after: usize) -> Self {
        Self {
            inner: MemoryAlbum::new(),
            fail_after,
            tile_writes: AtomicUsize::new(0),
        }
    }

    pub fn tile_writes(&self) -> usize {
        self.tile_writes.load(Ordering::SeqCst)
    }
}

impl Album for FailingAlbum {
    fn cleanup(&self) -> Result<(), AlbumError> {
        self.inner.cleanup()
    }

    fn write_tile(
        &self,
        name: &str,
        tile_x: u32,
        tile_y: u32,
        pixels: &RgbaImage,
    ) -> Result<String, AlbumError> {
        if self.tile_writes.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            return Err(AlbumError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        self.inner.write_tile(name, tile_x, tile_y, pixels)
    }

    fn write_view_hierarchy(&self, name: &str, document: &str) -> Result<(), AlbumError> {
        self.inner.write_view_hierarchy(name, document)
    }

    fn write_ax_issues(&self, name: &str, document: &str) -> Result<(), AlbumError> {
        self.inner.write_ax_issues(name, document)
    }

    fn add_record(&self, record: &RecordMetadata) -> Result<(), AlbumError> {
        self.inner.add_record(record)
    }

    fn flush(&self) -> Result<(), AlbumError> {
        self.inner.flush()
    }
}

/// A session over `album` that names records `CardTest_testRender`
pub fn session(album: Arc<dyn Album>) -> ScreenshotSession {
    session_with(album, ScreenshotConfig::default())
}

pub fn session_with(album: Arc<dyn Album>, config: ScreenshotConfig) -> ScreenshotSession {
    session_for_test(album, config, "CardTest", "testRender")
}

pub fn session_for_test(
    album: Arc<dyn Album>,
    config: ScreenshotConfig,
    test_class: &str,
    test_name: &str,
) -> ScreenshotSession {
    ScreenshotSession::builder(album)
        .config(config)
        .test_context(Arc::new(FixedTestContext::new(test_class, test_name)))
        .build()
        .expect("Failed to start session")
}
