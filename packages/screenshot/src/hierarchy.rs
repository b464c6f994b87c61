//! Structural and accessibility hierarchy dumps

use crate::component::Component;
use crate::Result;
use serde_json::{json, Value};

/// Version of the hierarchy document. Bump whenever its structure changes in
/// a way that makes comparing old and new documents invalid.
pub const METADATA_VERSION: u32 = 1;

/// Turns a component subtree into structured documents
pub trait HierarchyDumper: Send + Sync {
    fn dump_hierarchy(&self, component: &dyn Component) -> Result<Value>;

    /// Accessibility tree, if the dumper supports one
    fn dump_accessibility_tree(&self, _component: &dyn Component) -> Result<Option<Value>> {
        Ok(None)
    }

    fn dump_accessibility_issues(&self, tree: &Value) -> Result<Value>;
}

/// Default dumper walking [`Component::children`]
#[derive(Debug, Clone)]
pub struct LayoutHierarchyDumper {
    min_touch_target: u64,
}

impl LayoutHierarchyDumper {
    pub fn new() -> Self {
        Self {
            min_touch_target: 48,
        }
    }

    pub fn with_min_touch_target(mut self, size: u32) -> Self {
        self.min_touch_target = u64::from(size);
        self
    }

    fn collect_issues(&self, node: &Value, issues: &mut Vec<Value>) {
        let focusable = node["focusable"].as_bool().unwrap_or(false);
        let class = node["class"].clone();

        if focusable {
            let has_label = node["label"]
                .as_str()
                .map(|label| !label.trim().is_empty())
                .unwrap_or(false);
            if !has_label {
                issues.push(json!({
                    "type": "missing_label",
                    "class": class,
                    "message": "Focusable element has no accessibility label",
                }));
            }

            let width = node["width"].as_u64().unwrap_or(0);
            let height = node["height"].as_u64().unwrap_or(0);
            if width < self.min_touch_target || height < self.min_touch_target {
                issues.push(json!({
                    "type": "small_touch_target",
                    "class": class,
                    "message": format!(
                        "Touch target is {width}x{height}, expected at least {0}x{0}",
                        self.min_touch_target
                    ),
                }));
            }
        }

        if let Some(children) = node["children"].as_array() {
            for child in children {
                self.collect_issues(child, issues);
            }
        }
    }
}

impl Default for LayoutHierarchyDumper {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyDumper for LayoutHierarchyDumper {
    fn dump_hierarchy(&self, component: &dyn Component) -> Result<Value> {
        Ok(dump_node(component))
    }

    fn dump_accessibility_tree(&self, component: &dyn Component) -> Result<Option<Value>> {
        Ok(Some(dump_ax_node(component)))
    }

    fn dump_accessibility_issues(&self, tree: &Value) -> Result<Value> {
        let mut issues = Vec::new();
        self.collect_issues(tree, &mut issues);
        Ok(Value::Array(issues))
    }
}

fn dump_node(component: &dyn Component) -> Value {
    let children: Vec<Value> = component
        .children()
        .iter()
        .map(|child| dump_node(child.as_ref()))
        .collect();

    json!({
        "class": component.class_name(),
        "left": component.left(),
        "top": component.top(),
        "width": component.width(),
        "height": component.height(),
        "children": children,
    })
}

fn dump_ax_node(component: &dyn Component) -> Value {
    let info = component.accessibility();
    let children: Vec<Value> = component
        .children()
        .iter()
        .map(|child| dump_ax_node(child.as_ref()))
        .collect();

    json!({
        "class": component.class_name(),
        "role": info.as_ref().map(|i| i.role.clone()),
        "label": info.as_ref().and_then(|i| i.label.clone()),
        "focusable": info.as_ref().map(|i| i.focusable).unwrap_or(false),
        "width": component.width(),
        "height": component.height(),
        "children": children,
    })
}

/// Hierarchy document written next to the tiles
pub(crate) fn metadata_document(view_hierarchy: Value, ax_hierarchy: Option<&Value>) -> Value {
    json!({
        "viewHierarchy": view_hierarchy,
        "version": METADATA_VERSION,
        "axHierarchy": ax_hierarchy.cloned().unwrap_or(Value::Null),
    })
}

pub(crate) fn issues_document(issues: Value) -> Value {
    json!({ "axIssues": issues })
}
