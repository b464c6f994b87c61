//! Detecting which test is taking a screenshot

use std::thread;

/// Source of the running test's identity, used for default screenshot names
pub trait TestContext: Send + Sync {
    fn current_test_class(&self) -> Option<String>;

    fn current_test_name(&self) -> Option<String>;
}

/// Reads the test identity from the current thread's name.
///
/// The Rust test harness names each test thread after the test's path, so
/// `widgets::button::renders_label` yields class `widgets::button` and name
/// `renders_label`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadNameTestContext;

impl ThreadNameTestContext {
    fn split() -> (Option<String>, Option<String>) {
        let current = thread::current();
        match current.name() {
            None | Some("main") => (None, None),
            Some(path) => match path.rsplit_once("::") {
                Some((class, name)) => (Some(class.to_string()), Some(name.to_string())),
                None => (None, Some(path.to_string())),
            },
        }
    }
}

impl TestContext for ThreadNameTestContext {
    fn current_test_class(&self) -> Option<String> {
        Self::split().0
    }

    fn current_test_name(&self) -> Option<String> {
        Self::split().1
    }
}

/// Fixed identity, for harnesses that know the test up front
#[derive(Debug, Default, Clone)]
pub struct FixedTestContext {
    test_class: Option<String>,
    test_name: Option<String>,
}

impl FixedTestContext {
    pub fn new(test_class: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            test_class: Some(test_class.into()),
            test_name: Some(test_name.into()),
        }
    }
}

impl TestContext for FixedTestContext {
    fn current_test_class(&self) -> Option<String> {
        self.test_class.clone()
    }

    fn current_test_name(&self) -> Option<String> {
        self.test_name.clone()
    }
}
