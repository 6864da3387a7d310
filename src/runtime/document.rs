//! Read-side view of a live document tree

use super::selector::parse_selector_list;
use super::EvalError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Layout box in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Area of the overlap between two boxes
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let width = self.right().min(other.right()) - self.left().max(other.left());
        let height = self.bottom().min(other.bottom()) - self.top().max(other.top());
        if width <= 0.0 || height <= 0.0 {
            0.0
        } else {
            width * height
        }
    }
}

/// Page-level facts consulted by `@if` conditions and layout predicates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageState {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub scroll_y: f64,
    pub minutes_since_midnight: u32,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            viewport_width: 1280.0,
            viewport_height: 800.0,
            scroll_y: 0.0,
            minutes_since_midnight: 0,
        }
    }
}

impl PageState {
    pub fn viewport(&self) -> Rect {
        Rect::new(0.0, 0.0, self.viewport_width, self.viewport_height)
    }
}

/// Read-only access to a document tree.
///
/// Roots are container nodes (`#document`, `#shadow-root`) rather than
/// elements; they are never returned by queries. The provided methods build
/// traversal and selector queries on top of the required accessors.
pub trait Document {
    fn host(&self) -> &str;
    fn page(&self) -> PageState;

    /// Main document followed by every accessible frame document
    fn roots(&self) -> Vec<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn shadow_root(&self, node: NodeId) -> Option<NodeId>;

    /// Lowercase tag name; containers start with `#`
    fn tag_name(&self, node: NodeId) -> String;
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Text of the node and all its light-tree descendants
    fn text_content(&self, node: NodeId) -> String;

    /// Text directly owned by the node
    fn own_text(&self, node: NodeId) -> String {
        self.text_content(node)
    }

    fn rect(&self, node: NodeId) -> Rect;
    fn computed_style(&self, node: NodeId, property: &str) -> String;

    /// Attached and not hidden by `display: none` on itself or an ancestor
    fn is_rendered(&self, node: NodeId) -> bool;

    fn media_playing(&self, _node: NodeId) -> bool {
        false
    }

    fn is_element(&self, node: NodeId) -> bool {
        !self.tag_name(node).starts_with('#')
    }

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool, EvalError> {
        let list = parse_selector_list(selector)?;
        Ok(list.matches(self, node))
    }

    fn element_parent(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|p| self.is_element(*p))
    }

    fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.element_children(self.parent(node)?);
        let index = siblings.iter().position(|s| *s == node)?;
        siblings.get(index + 1).copied()
    }

    fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.element_children(self.parent(node)?);
        let index = siblings.iter().position(|s| *s == node)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    /// Light-tree descendants in document order, excluding `node`
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }
        out
    }

    /// Descendant elements including the contents of nested shadow roots
    fn deep_descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if self.is_element(current) {
                out.push(current);
            }
            stack.extend(self.children(current).into_iter().rev());
            if let Some(shadow) = self.shadow_root(current) {
                stack.extend(self.children(shadow).into_iter().rev());
            }
        }
        out
    }

    /// Elements under `root` (shadow roots included) matching `selector`
    fn query_all(&self, root: NodeId, selector: &str) -> Result<Vec<NodeId>, EvalError> {
        let list = parse_selector_list(selector)?;
        Ok(self
            .deep_descendants(root)
            .into_iter()
            .filter(|node| list.matches(self, *node))
            .collect())
    }
}
