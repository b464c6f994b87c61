//! Simulated window attachment
//!
//! Most hosts refuse to run a component's per-frame draw machinery until the
//! component believes it lives in a window. [`AttachmentSimulator`] builds the
//! minimal [`AttachInfo`] a host's attach path expects and dispatches the
//! attach/detach notifications directly, without opening a window session.
//!
//! ## Adapter layer
//!
//! The window session, window handle and callback sink are small traits that
//! cover only what a host calls during attach and draw. The stubs shipped here
//! answer with inert values. [`HOST_ADAPTER_VERSION`] is bumped whenever that
//! surface changes.
//!
//! ## Idempotence
//!
//! A component that is genuinely attached, or already attached by the
//! simulator, gets a no-op [`Detacher`]. Releasing a detacher more than once is
//! safe.

use crate::component::{Component, ComponentId, DisplayInfo, Visibility};
use crate::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Version of the stand-in surface handed to hosts through [`AttachInfo`]
pub const HOST_ADAPTER_VERSION: u32 = 1;

static NEXT_WINDOW_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a (simulated) window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowToken(u64);

impl WindowToken {
    fn next() -> Self {
        Self(NEXT_WINDOW_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Window-manager session a host may query while attached
pub trait WindowSession: Send + Sync + fmt::Debug {
    /// Some vendor builds query this during relayout
    fn cover_state_switch(&self) -> bool;

    fn finish_drawing(&self, window: WindowToken);
}

/// Identity handle of the window a component is attached to
pub trait WindowHandle: Send + Sync + fmt::Debug {
    fn as_binder(&self) -> WindowToken;
}

/// Callback sink for feedback requested by attached components
pub trait AttachCallbacks: Send + Sync + fmt::Debug {
    fn playback_sound_effect(&self, effect: u32);

    fn perform_haptic_feedback(&self, effect: u32, always: bool) -> bool;
}

#[derive(Debug, Default)]
pub struct StubWindowSession;

impl WindowSession for StubWindowSession {
    fn cover_state_switch(&self) -> bool {
        false
    }

    fn finish_drawing(&self, _window: WindowToken) {}
}

#[derive(Debug)]
pub struct StubWindow {
    token: WindowToken,
}

impl StubWindow {
    pub fn new() -> Self {
        Self {
            token: WindowToken::next(),
        }
    }
}

impl Default for StubWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHandle for StubWindow {
    fn as_binder(&self) -> WindowToken {
        self.token
    }
}

#[derive(Debug, Default)]
pub struct StubCallbacks;

impl AttachCallbacks for StubCallbacks {
    fn playback_sound_effect(&self, _effect: u32) {}

    fn perform_haptic_feedback(&self, _effect: u32, _always: bool) -> bool {
        false
    }
}

/// Fabricated "attached to a window" context.
///
/// Built once per simulator and shared by every capture; never mutated after
/// construction.
#[derive(Debug)]
pub struct AttachInfo {
    adapter_version: u32,
    session: Box<dyn WindowSession>,
    window: Box<dyn WindowHandle>,
    callbacks: Box<dyn AttachCallbacks>,
    display: DisplayInfo,
    has_window_focus: bool,
    window_visibility: Visibility,
    in_touch_mode: bool,
    hardware_accelerated: bool,
}

impl AttachInfo {
    pub fn new(display: DisplayInfo) -> Self {
        Self {
            adapter_version: HOST_ADAPTER_VERSION,
            session: Box::new(StubWindowSession),
            window: Box::new(StubWindow::new()),
            callbacks: Box::new(StubCallbacks),
            display,
            has_window_focus: true,
            window_visibility: Visibility::Visible,
            in_touch_mode: false,
            hardware_accelerated: false,
        }
    }

    pub fn adapter_version(&self) -> u32 {
        self.adapter_version
    }

    pub fn session(&self) -> &dyn WindowSession {
        self.session.as_ref()
    }

    pub fn window(&self) -> &dyn WindowHandle {
        self.window.as_ref()
    }

    pub fn window_token(&self) -> WindowToken {
        self.window.as_binder()
    }

    pub fn callbacks(&self) -> &dyn AttachCallbacks {
        self.callbacks.as_ref()
    }

    pub fn display(&self) -> &DisplayInfo {
        &self.display
    }

    pub fn has_window_focus(&self) -> bool {
        self.has_window_focus
    }

    pub fn window_visibility(&self) -> Visibility {
        self.window_visibility
    }

    pub fn in_touch_mode(&self) -> bool {
        self.in_touch_mode
    }

    pub fn hardware_accelerated(&self) -> bool {
        self.hardware_accelerated
    }
}

/// Components that currently have a simulated attachment outstanding
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    attached: HashSet<ComponentId>,
}

impl AttachmentRegistry {
    pub fn contains(&self, id: ComponentId) -> bool {
        self.attached.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    fn insert(&mut self, id: ComponentId) -> bool {
        self.attached.insert(id)
    }

    fn remove(&mut self, id: ComponentId) -> bool {
        self.attached.remove(&id)
    }
}

/// Capability to undo one attach. Hand it back to
/// [`AttachmentSimulator::release`].
#[must_use]
pub struct Detacher {
    target: Option<Arc<dyn Component>>,
}

impl Detacher {
    fn noop() -> Self {
        Self { target: None }
    }

    fn real(component: Arc<dyn Component>) -> Self {
        Self {
            target: Some(component),
        }
    }

    /// True if releasing this detacher does nothing
    pub fn is_noop(&self) -> bool {
        self.target.is_none()
    }
}

impl fmt::Debug for Detacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detacher")
            .field("target", &self.target.as_ref().map(|c| c.id()))
            .finish()
    }
}

/// Attaches components to a fake window. Confined to the render thread.
#[derive(Debug, Default)]
pub struct AttachmentSimulator {
    registry: AttachmentRegistry,
    attach_info: Option<Arc<AttachInfo>>,
}

impl AttachmentSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &AttachmentRegistry {
        &self.registry
    }

    /// The shared attach context, once the first real attach has built it
    pub fn cached_attach_info(&self) -> Option<&Arc<AttachInfo>> {
        self.attach_info.as_ref()
    }

    /// Dispatch "attached to window" to the component.
    ///
    /// Returns a no-op detacher if the component is really attached or already
    /// attached by this simulator.
    pub fn attach(&mut self, component: &Arc<dyn Component>) -> Result<Detacher> {
        let id = component.id();

        if component.has_window() {
            info!(
                component = id.as_u64(),
                "Skipping window attach since the component is really attached"
            );
            return Ok(Detacher::noop());
        }

        if self.registry.contains(id) {
            debug!(component = id.as_u64(), "Component already attached by simulator");
            return Ok(Detacher::noop());
        }

        let info = self.attach_info(component.as_ref())?;

        self.registry.insert(id);
        if let Err(e) = component.dispatch_attached_to_window(&info, Visibility::Visible) {
            self.registry.remove(id);
            return Err(e.into());
        }

        debug!(component = id.as_u64(), "Dispatched simulated attach");
        Ok(Detacher::real(Arc::clone(component)))
    }

    /// Dispatch "detached from window" for a real detacher. Later calls with
    /// the same detacher are no-ops.
    pub fn release(&mut self, detacher: &mut Detacher) -> Result<()> {
        let Some(component) = detacher.target.take() else {
            return Ok(());
        };

        let result = component.dispatch_detached_from_window();
        self.registry.remove(component.id());
        debug!(component = component.id().as_u64(), "Dispatched simulated detach");

        result.map_err(Into::into)
    }

    /// Attach for the lifetime of the returned guard
    pub fn scoped(&mut self, component: &Arc<dyn Component>) -> Result<AttachGuard<'_>> {
        let detacher = self.attach(component)?;
        Ok(AttachGuard {
            simulator: self,
            detacher,
        })
    }

    fn attach_info(&mut self, component: &dyn Component) -> Result<Arc<AttachInfo>> {
        if let Some(info) = &self.attach_info {
            return Ok(Arc::clone(info));
        }

        let info = Arc::new(AttachInfo::new(component.display()?));
        self.attach_info = Some(Arc::clone(&info));
        Ok(info)
    }
}

/// Scoped attachment; releases on drop, including unwinding.
pub struct AttachGuard<'a> {
    simulator: &'a mut AttachmentSimulator,
    detacher: Detacher,
}

impl AttachGuard<'_> {
    pub fn is_noop(&self) -> bool {
        self.detacher.is_noop()
    }

    /// Release now and surface any detach failure
    pub fn release(mut self) -> Result<()> {
        self.simulator.release(&mut self.detacher)
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.simulator.release(&mut self.detacher) {
            warn!("Failed to detach component: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Canvas, HostError};
    use crate::ScreenshotError;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct Probe {
        id: Option<ComponentId>,
        really_attached: bool,
        broken_display: bool,
        attaches: AtomicUsize,
        detaches: AtomicUsize,
        saw_focus: AtomicBool,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                id: Some(ComponentId::next()),
                ..Default::default()
            }
        }
    }

    impl Component for Probe {
        fn id(&self) -> ComponentId {
            self.id.unwrap_or_else(|| ComponentId::from_raw(0))
        }

        fn width(&self) -> u32 {
            10
        }

        fn height(&self) -> u32 {
            10
        }

        fn class_name(&self) -> &str {
            "Probe"
        }

        fn has_window(&self) -> bool {
            self.really_attached
        }

        fn display(&self) -> std::result::Result<DisplayInfo, HostError> {
            if self.broken_display {
                return Err(HostError::new("no display"));
            }
            Ok(DisplayInfo::default())
        }

        fn dispatch_attached_to_window(
            &self,
            info: &Arc<AttachInfo>,
            _visibility: Visibility,
        ) -> std::result::Result<(), HostError> {
            assert!(!info.session().cover_state_switch());
            self.saw_focus.store(info.has_window_focus(), Ordering::SeqCst);
            self.attaches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn dispatch_detached_from_window(&self) -> std::result::Result<(), HostError> {
            self.detaches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn draw(&self, _canvas: &mut Canvas<'_>) {}
    }

    fn as_component(probe: &Arc<Probe>) -> Arc<dyn Component> {
        probe.clone()
    }

    #[test]
    fn test_attach_twice_is_noop_the_second_time() {
        let probe = Arc::new(Probe::new());
        let component = as_component(&probe);
        let mut simulator = AttachmentSimulator::new();

        let mut first = simulator.attach(&component).unwrap();
        let mut second = simulator.attach(&component).unwrap();

        assert!(!first.is_noop());
        assert!(second.is_noop());
        assert_eq!(probe.attaches.load(Ordering::SeqCst), 1);
        assert!(probe.saw_focus.load(Ordering::SeqCst));

        simulator.release(&mut second).unwrap();
        assert!(simulator.registry().contains(component.id()));
        simulator.release(&mut first).unwrap();
        assert!(simulator.registry().is_empty());
        assert_eq!(probe.detaches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_detach_cycles_leave_registry_empty() {
        let probe = Arc::new(Probe::new());
        let component = as_component(&probe);
        let mut simulator = AttachmentSimulator::new();

        for _ in 0..2 {
            let mut detacher = simulator.attach(&component).unwrap();
            assert!(!detacher.is_noop());
            simulator.release(&mut detacher).unwrap();
        }

        assert!(simulator.registry().is_empty());
        assert_eq!(probe.attaches.load(Ordering::SeqCst), 2);
        assert_eq!(probe.detaches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let probe = Arc::new(Probe::new());
        let component = as_component(&probe);
        let mut simulator = AttachmentSimulator::new();

        let mut detacher = simulator.attach(&component).unwrap();
        simulator.release(&mut detacher).unwrap();
        simulator.release(&mut detacher).unwrap();

        assert_eq!(probe.detaches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_really_attached_component_is_skipped() {
        let probe = Arc::new(Probe {
            really_attached: true,
            ..Probe::new()
        });
        let component = as_component(&probe);
        let mut simulator = AttachmentSimulator::new();

        let mut detacher = simulator.attach(&component).unwrap();
        assert!(detacher.is_noop());
        simulator.release(&mut detacher).unwrap();

        assert_eq!(probe.attaches.load(Ordering::SeqCst), 0);
        assert_eq!(probe.detaches.load(Ordering::SeqCst), 0);
        assert!(simulator.cached_attach_info().is_none());
    }

    #[test]
    fn test_attach_info_is_shared() {
        let a = as_component(&Arc::new(Probe::new()));
        let b = as_component(&Arc::new(Probe::new()));
        let mut simulator = AttachmentSimulator::new();

        let mut da = simulator.attach(&a).unwrap();
        let first = Arc::clone(simulator.cached_attach_info().unwrap());
        let mut db = simulator.attach(&b).unwrap();
        let second = Arc::clone(simulator.cached_attach_info().unwrap());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.adapter_version(), HOST_ADAPTER_VERSION);
        assert_eq!(simulator.registry().len(), 2);

        simulator.release(&mut da).unwrap();
        simulator.release(&mut db).unwrap();
    }

    #[test]
    fn test_attach_failure_is_fatal_and_leaves_no_state() {
        let probe = Arc::new(Probe {
            broken_display: true,
            ..Probe::new()
        });
        let component = as_component(&probe);
        let mut simulator = AttachmentSimulator::new();

        let err = simulator.attach(&component).unwrap_err();
        assert!(matches!(err, ScreenshotError::Attachment(_)));
        assert!(simulator.registry().is_empty());
        assert_eq!(probe.attaches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scoped_guard_releases_on_drop() {
        let probe = Arc::new(Probe::new());
        let component = as_component(&probe);
        let mut simulator = AttachmentSimulator::new();

        {
            let guard = simulator.scoped(&component).unwrap();
            assert!(!guard.is_noop());
        }

        assert!(simulator.registry().is_empty());
        assert_eq!(probe.detaches.load(Ordering::SeqCst), 1);
    }
}
