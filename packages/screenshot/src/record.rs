//! Per-capture record: identity, options and result state
//!
//! ## Lifecycle
//!
//! ```text
//! Unconfigured -> Configuring -> Finalizing -> Committed | Failed
//!       \______________\_______-> BitmapMaterialized
//! ```
//!
//! Configuration calls are only accepted before finalization. `record()` and
//! `bitmap()` are mutually exclusive: whichever runs first decides the record's
//! fate.

use crate::album::RecordMetadata;
use crate::component::Component;
use crate::session::ScreenshotSession;
use crate::{Result, ScreenshotError};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The largest amount of pixels captured by default
pub const DEFAULT_MAX_PIXELS: i64 = 10_000_000;

/// Grid of stored tile identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tiling {
    width: u32,
    height: u32,
    cells: Vec<Option<String>>,
}

impl Tiling {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width as usize * height as usize],
        }
    }

    /// Number of tile columns
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of tile rows
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get_at(&self, x: u32, y: u32) -> Option<&str> {
        self.index(x, y)
            .and_then(|index| self.cells[index].as_deref())
    }

    /// Store a tile id. Out-of-range coordinates are a programming error.
    pub fn set_at(&mut self, x: u32, y: u32, id: impl Into<String>) {
        let index = self
            .index(x, y)
            .unwrap_or_else(|| panic!("tile ({x}, {y}) outside {}x{} tiling", self.width, self.height));
        self.cells[index] = Some(id.into());
    }

    /// First empty cell in row-major order
    pub fn first_missing(&self) -> Option<(u32, u32)> {
        self.cells
            .iter()
            .position(Option::is_none)
            .map(|index| (index as u32 % self.width, index as u32 / self.width))
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    /// Cells in row-major order as `(x, y, id)`
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, Option<&str>)> + '_ {
        self.cells.iter().enumerate().map(move |(index, id)| {
            (
                index as u32 % self.width,
                index as u32 / self.width,
                id.as_deref(),
            )
        })
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

/// Where a record is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    Unconfigured,
    Configuring,
    Finalizing,
    Committed,
    Failed,
    BitmapMaterialized,
}

impl RecordState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecordState::Committed | RecordState::Failed | RecordState::BitmapMaterialized
        )
    }
}

/// A builder for all the metadata associated with a screenshot.
///
/// Get one from [`ScreenshotSession::snap`] or
/// [`ScreenshotSession::snap_screen`] and commit it with [`RecordBuilder::record`].
pub struct RecordBuilder {
    session: ScreenshotSession,
    component: Option<Arc<dyn Component>>,
    name: Option<String>,
    test_class: Option<String>,
    test_name: Option<String>,
    description: Option<String>,
    group: Option<String>,
    extras: BTreeMap<String, String>,
    include_accessibility_info: bool,
    max_pixels: i64,
    fail_on_size_limit: bool,
    tiling: Tiling,
    error: Option<String>,
    state: RecordState,
}

impl RecordBuilder {
    pub(crate) fn new(
        session: ScreenshotSession,
        component: Option<Arc<dyn Component>>,
        max_pixels: i64,
    ) -> Self {
        Self {
            session,
            component,
            name: None,
            test_class: None,
            test_name: None,
            description: None,
            group: None,
            extras: BTreeMap::new(),
            include_accessibility_info: true,
            max_pixels,
            fail_on_size_limit: true,
            tiling: Tiling::default(),
            error: None,
            state: RecordState::Unconfigured,
        }
    }

    /// The explicit name, or `<testClass>_<testName>` when none was set
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "{}_{}",
                self.test_class.as_deref().unwrap_or("unknown"),
                self.test_name.as_deref().unwrap_or("unknown")
            ),
        }
    }

    pub fn has_explicit_name(&self) -> bool {
        self.name.is_some()
    }

    /// Set a name for the screenshot.
    ///
    /// Required when a single test takes more than one screenshot. Names are
    /// printable Latin-1 without path separators and can only be set once.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        let name = name.into();

        if let Some(existing) = &self.name {
            return Err(ScreenshotError::InvalidName {
                name,
                reason: format!("name is already set to {existing:?}"),
            });
        }

        validate_name(&name)?;
        self.name = Some(name);
        Ok(self.touch())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.description = Some(description.into());
        Ok(self.touch())
    }

    /// Attach free-form debugging metadata
    pub fn add_extra(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.extras.insert(key.into(), value.into());
        Ok(self.touch())
    }

    /// Group similar screenshots to make them easier to compare
    pub fn set_group(&mut self, group: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.group = Some(group.into());
        Ok(self.touch())
    }

    pub fn set_include_accessibility_info(&mut self, include: bool) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.include_accessibility_info = include;
        Ok(self.touch())
    }

    /// Maximum pixels this screenshot may produce; `<= 0` disables the limit
    pub fn set_max_pixels(&mut self, max_pixels: i64) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.max_pixels = max_pixels;
        Ok(self.touch())
    }

    /// When false, exceeding the pixel budget is recorded on the record and
    /// `record()` returns normally
    pub fn set_fail_on_size_limit(&mut self, fail: bool) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.fail_on_size_limit = fail;
        Ok(self.touch())
    }

    /// Mark the capture as failed before it is recorded; tiling is skipped
    pub fn set_error(&mut self, error: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.error = Some(error.into());
        Ok(self.touch())
    }

    pub fn set_test_class(&mut self, test_class: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.test_class = Some(test_class.into());
        Ok(self.touch())
    }

    pub fn set_test_name(&mut self, test_name: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.test_name = Some(test_name.into());
        Ok(self.touch())
    }

    /// Finish the recording: render, store tiles and metadata.
    ///
    /// Can be called once. Fails if [`RecordBuilder::bitmap`] was called.
    pub fn record(&mut self) -> Result<()> {
        match self.state {
            RecordState::Unconfigured | RecordState::Configuring => {}
            RecordState::BitmapMaterialized => {
                return Err(ScreenshotError::InvalidState(
                    "can't call record() after bitmap()".to_string(),
                ))
            }
            _ => {
                return Err(ScreenshotError::InvalidState(
                    "record() has already been called".to_string(),
                ))
            }
        }

        self.state = RecordState::Finalizing;
        let session = self.session.clone();
        match session.record(self) {
            Ok(()) => {
                self.state = if self.error.is_some() {
                    RecordState::Failed
                } else {
                    RecordState::Committed
                };
                Ok(())
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e.to_string());
                }
                self.state = RecordState::Failed;
                Err(e)
            }
        }
    }

    /// Render the whole component into a single bitmap instead of storing it.
    ///
    /// You cannot call this after `record()`, nor `record()` after this.
    pub fn bitmap(&mut self) -> Result<RgbaImage> {
        match self.state {
            RecordState::Unconfigured
            | RecordState::Configuring
            | RecordState::BitmapMaterialized => {}
            _ => {
                return Err(ScreenshotError::InvalidState(
                    "can't call bitmap() after record()".to_string(),
                ))
            }
        }

        let image = self.session.bitmap(self)?;
        self.state = RecordState::BitmapMaterialized;
        Ok(image)
    }

    /// Sanity check that the record is ready to be persisted
    pub fn check_state(&self) -> Result<()> {
        if self.error.is_some() {
            return Ok(());
        }
        match self.tiling.first_missing() {
            Some((x, y)) => Err(ScreenshotError::IncompleteTiling { x, y }),
            None => Ok(()),
        }
    }

    pub fn component(&self) -> Option<&Arc<dyn Component>> {
        self.component.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }

    pub fn test_class(&self) -> Option<&str> {
        self.test_class.as_deref()
    }

    pub fn test_name(&self) -> Option<&str> {
        self.test_name.as_deref()
    }

    pub fn include_accessibility_info(&self) -> bool {
        self.include_accessibility_info
    }

    pub fn max_pixels(&self) -> i64 {
        self.max_pixels
    }

    pub fn fail_on_size_limit(&self) -> bool {
        self.fail_on_size_limit
    }

    pub fn tiling(&self) -> &Tiling {
        &self.tiling
    }

    /// Any error encountered while creating the screenshot
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn to_metadata(&self) -> RecordMetadata {
        RecordMetadata {
            name: self.name(),
            description: self.description.clone(),
            test_class: self.test_class.clone(),
            test_name: self.test_name.clone(),
            group: self.group.clone(),
            extras: self.extras.clone(),
            tiling: self.tiling.clone(),
            error: self.error.clone(),
            captured_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub(crate) fn apply_tiling(&mut self, tiling: Tiling) {
        self.tiling = tiling;
    }

    pub(crate) fn apply_error(&mut self, error: String) {
        self.error = Some(error);
    }

    pub(crate) fn set_detected_test(&mut self, test_class: Option<String>, test_name: Option<String>) {
        self.test_class = test_class;
        self.test_name = test_name;
    }

    fn ensure_configurable(&self) -> Result<()> {
        match self.state {
            RecordState::Unconfigured | RecordState::Configuring => Ok(()),
            RecordState::BitmapMaterialized => Err(ScreenshotError::InvalidState(
                "bitmap() has already been called".to_string(),
            )),
            _ => Err(ScreenshotError::InvalidState(
                "record has already been finalized".to_string(),
            )),
        }
    }

    fn touch(&mut self) -> &mut Self {
        self.state = RecordState::Configuring;
        self
    }
}

/// Names end up in file names, so keep them to printable Latin-1 without
/// path separators.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ScreenshotError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("screenshot names cannot be empty"));
    }
    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        return Err(invalid("screenshot names cannot contain a path separator"));
    }
    if name.chars().any(|c| u32::from(c) > 0xFF) {
        return Err(invalid("screenshot names must have only latin characters"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("screenshot names must be printable"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["simple", "with spaces", "Caf\u{e9}_menu", "a-b.c_1", "(x)"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "a/b", "\u{3b1}lpha", "emoji\u{1f600}", "tab\tname", "new\nline"] {
            let err = validate_name(name).unwrap_err();
            assert!(
                matches!(err, ScreenshotError::InvalidName { .. }),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_tiling_tracks_missing_cells() {
        let mut tiling = Tiling::new(2, 2);
        assert_eq!(tiling.first_missing(), Some((0, 0)));

        tiling.set_at(0, 0, "a");
        tiling.set_at(1, 0, "b");
        tiling.set_at(0, 1, "c");
        assert_eq!(tiling.first_missing(), Some((1, 1)));
        assert!(!tiling.is_complete());

        tiling.set_at(1, 1, "d");
        assert!(tiling.is_complete());
        assert_eq!(tiling.get_at(1, 0), Some("b"));
        assert_eq!(tiling.get_at(2, 0), None);

        let ids: Vec<_> = tiling.iter().map(|(x, y, id)| (x, y, id.map(str::to_string))).collect();
        assert_eq!(ids[1], (1, 0, Some("b".to_string())));
        assert_eq!(ids[2], (0, 1, Some("c".to_string())));
    }

    #[test]
    #[should_panic]
    fn test_tiling_rejects_out_of_range() {
        let mut tiling = Tiling::new(1, 1);
        tiling.set_at(1, 0, "x");
    }

    #[test]
    fn test_empty_tiling_is_complete() {
        assert!(Tiling::default().is_complete());
    }

    #[test]
    fn test_terminal_states() {
        assert!(RecordState::Committed.is_terminal());
        assert!(RecordState::Failed.is_terminal());
        assert!(RecordState::BitmapMaterialized.is_terminal());
        assert!(!RecordState::Finalizing.is_terminal());
        assert!(!RecordState::Configuring.is_terminal());
    }
}
