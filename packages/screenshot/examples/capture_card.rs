//! Example: Capture a card component into an on-disk album

use image::Rgba;
use paperclip_screenshot::{
    AccessibilityInfo, AttachInfo, Canvas, Component, ComponentId, HostError, ScreenshotSession,
    Visibility,
};
use std::sync::Arc;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

/// A solid rectangle with optional children, laid out at a fixed offset
struct Block {
    id: ComponentId,
    class: &'static str,
    left: i32,
    top: i32,
    width: u32,
    height: u32,
    color: Rgba<u8>,
    label: Option<&'static str>,
    children: Vec<Arc<Block>>,
}

impl Block {
    fn new(class: &'static str, left: i32, top: i32, width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            id: ComponentId::next(),
            class,
            left,
            top,
            width,
            height,
            color: Rgba(color),
            label: None,
            children: Vec::new(),
        }
    }

    fn labeled(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    fn with_child(mut self, child: Block) -> Self {
        self.children.push(Arc::new(child));
        self
    }
}

impl Component for Block {
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
        self.class
    }

    fn dispatch_attached_to_window(
        &self,
        info: &Arc<AttachInfo>,
        visibility: Visibility,
    ) -> Result<(), HostError> {
        for child in &self.children {
            child.dispatch_attached_to_window(info, visibility)?;
        }
        Ok(())
    }

    fn dispatch_detached_from_window(&self) -> Result<(), HostError> {
        for child in &self.children {
            child.dispatch_detached_from_window()?;
        }
        Ok(())
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        canvas.fill_rect(0, 0, self.width, self.height, self.color);
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
        self.label.map(|label| AccessibilityInfo {
            role: "button".to_string(),
            label: Some(label.to_string()),
            focusable: true,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Create temporary directory for output
    let temp_dir = tempdir()?;
    println!("Output directory: {}", temp_dir.path().display());

    let session = ScreenshotSession::create(temp_dir.path())?;

    // A card wider than one tile, with a button straddling the tile edge
    let card = Arc::new(
        Block::new("Card", 0, 0, 720, 400, [245, 245, 245, 255])
            .with_child(Block::new("Header", 0, 0, 720, 64, [51, 102, 255, 255]))
            .with_child(
                Block::new("Button", 460, 320, 120, 48, [20, 160, 90, 255]).labeled("Pay now"),
            ),
    );

    let mut record = session.snap(card);
    record
        .set_name("checkout_card")?
        .set_description("Checkout card, default state")?
        .set_group("cards")?
        .record()?;

    let tiling = record.tiling();
    println!(
        "\n✨ Captured {} as {}x{} tiles:",
        record.name(),
        tiling.width(),
        tiling.height()
    );
    for (x, y, id) in tiling.iter() {
        println!("  - ({x}, {y}) → {}", id.unwrap_or("<missing>"));
    }

    // Also render a single bitmap of a small component
    let mut thumbnail = session.snap(Arc::new(Block::new("Badge", 0, 0, 32, 32, [255, 80, 0, 255])));
    let bitmap = thumbnail.set_name("badge")?.bitmap()?;
    println!("\nRendered badge bitmap: {}x{}", bitmap.width(), bitmap.height());

    session.flush()?;
    println!(
        "\n📁 All files saved to: {}",
        temp_dir.path().join("screenshots").join("default").display()
    );

    Ok(())
}
