//! In-memory document built from a JSON snapshot
//!
//! Used by the `run` command and the tests. Relocated nodes are moved into
//! an inert container that is never returned by [`Document::roots`].

use super::actions::{ActionExecutor, Effect};
use super::document::{Document, NodeId, PageState, Rect};
use super::domain::parse_clock;
use crate::error::{CompilerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DOCUMENT_TAG: &str = "#document";
const SHADOW_TAG: &str = "#shadow-root";
const INERT_TAG: &str = "#inert";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        let page = PageState::default();
        Self {
            width: page.viewport_width,
            height: page.viewport_height,
        }
    }
}

/// Serialized form of a page: host, page state and element tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub scroll_y: f64,
    /// Local wall-clock time as `HH:MM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub root: NodeSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<FrameSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub root: NodeSpec,
    /// Cross-origin frames are not accessible and are never evaluated
    #[serde(default = "default_accessible")]
    pub accessible: bool,
}

fn default_accessible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Vec<NodeSpec>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub playing: bool,
}

impl NodeSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    rect: Rect,
    style: BTreeMap<String, String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    shadow: Option<NodeId>,
    /// Set on shadow-root containers
    shadow_host: Option<NodeId>,
    playing: bool,
    clicks_blocked: bool,
}

impl Node {
    fn container(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            text: String::new(),
            rect: Rect::default(),
            style: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
            shadow: None,
            shadow_host: None,
            playing: false,
            clicks_blocked: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    host: String,
    page: PageState,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    inaccessible_frames: Vec<NodeId>,
    inert: NodeId,
    applied: Vec<(NodeId, Effect)>,
}

impl MemoryDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(json).map_err(|e| CompilerError::InvalidFormat {
                message: format!("Invalid document snapshot: {}", e),
            })?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let minutes = snapshot
            .time
            .as_deref()
            .and_then(parse_clock)
            .unwrap_or(0);

        let mut document = Self {
            host: snapshot.host.to_lowercase(),
            page: PageState {
                viewport_width: snapshot.viewport.width,
                viewport_height: snapshot.viewport.height,
                scroll_y: snapshot.scroll_y,
                minutes_since_midnight: minutes,
            },
            nodes: Vec::new(),
            roots: Vec::new(),
            inaccessible_frames: Vec::new(),
            inert: NodeId(0),
            applied: Vec::new(),
        };

        let main = document.push_node(Node::container(DOCUMENT_TAG));
        document.build(&snapshot.root, main);
        document.roots.push(main);

        for frame in &snapshot.frames {
            let root = document.push_node(Node::container(DOCUMENT_TAG));
            document.build(&frame.root, root);
            if frame.accessible {
                document.roots.push(root);
            } else {
                document.inaccessible_frames.push(root);
            }
        }

        document.inert = document.push_node(Node::container(INERT_TAG));
        document
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn build(&mut self, spec: &NodeSpec, parent: NodeId) -> NodeId {
        let id = self.push_node(Node {
            tag: spec.tag.to_lowercase(),
            attributes: spec.attributes.clone(),
            text: spec.text.clone(),
            rect: spec.rect.unwrap_or_default(),
            style: spec.style.clone(),
            children: Vec::new(),
            parent: Some(parent),
            shadow: None,
            shadow_host: None,
            playing: spec.playing,
            clicks_blocked: false,
        });
        self.nodes[parent.0].children.push(id);

        for child in &spec.children {
            self.build(child, id);
        }

        if let Some(shadow_children) = &spec.shadow {
            let mut container = Node::container(SHADOW_TAG);
            container.shadow_host = Some(id);
            let shadow = self.push_node(container);
            self.nodes[id.0].shadow = Some(shadow);
            for child in shadow_children {
                self.build(child, shadow);
            }
        }

        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Insert a new subtree as the last child of `parent`
    pub fn append(&mut self, parent: NodeId, spec: &NodeSpec) -> Option<NodeId> {
        self.node(parent)?;
        Some(self.build(spec, parent))
    }

    /// First element in any root matching `selector`
    pub fn find_first(&self, selector: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .find_map(|root| self.query_all(*root, selector).ok()?.first().copied())
    }

    /// Moved into the inert container, directly or through an ancestor
    pub fn is_relocated(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.inert {
                return true;
            }
            current = self
                .node(node)
                .and_then(|n| n.parent.or(n.shadow_host));
        }
        false
    }

    pub fn clicks_blocked(&self, id: NodeId) -> bool {
        self.node(id).map_or(false, |n| n.clicks_blocked)
    }

    /// Every effect applied so far, in order
    pub fn applied(&self) -> &[(NodeId, Effect)] {
        &self.applied
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.rect = rect;
        }
    }

    pub fn set_scroll(&mut self, scroll_y: f64) {
        self.page.scroll_y = scroll_y;
    }

    /// Current state as a snapshot; relocated nodes are left out
    pub fn to_snapshot(&self) -> Snapshot {
        let spec_of = |root: NodeId| {
            self.node(root)
                .and_then(|n| n.children.first().copied())
                .map(|top| self.spec(top))
                .unwrap_or_default()
        };

        let mut frames = Vec::new();
        for root in self.roots.iter().skip(1) {
            frames.push(FrameSpec {
                root: spec_of(*root),
                accessible: true,
            });
        }
        for root in &self.inaccessible_frames {
            frames.push(FrameSpec {
                root: spec_of(*root),
                accessible: false,
            });
        }

        let minutes = self.page.minutes_since_midnight;
        Snapshot {
            host: self.host.clone(),
            viewport: Viewport {
                width: self.page.viewport_width,
                height: self.page.viewport_height,
            },
            scroll_y: self.page.scroll_y,
            time: (minutes > 0).then(|| format!("{:02}:{:02}", minutes / 60, minutes % 60)),
            root: self.roots.first().map(|r| spec_of(*r)).unwrap_or_default(),
            frames,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_snapshot()).map_err(|e| {
            CompilerError::InvalidFormat {
                message: format!("Cannot serialize document: {}", e),
            }
        })
    }

    fn spec(&self, id: NodeId) -> NodeSpec {
        let Some(node) = self.node(id) else {
            return NodeSpec::default();
        };
        NodeSpec {
            tag: node.tag.clone(),
            attributes: node.attributes.clone(),
            text: node.text.clone(),
            rect: (node.rect != Rect::default()).then_some(node.rect),
            style: node.style.clone(),
            children: node.children.iter().map(|c| self.spec(*c)).collect(),
            shadow: node
                .shadow
                .and_then(|s| self.node(s))
                .map(|s| s.children.iter().map(|c| self.spec(*c)).collect()),
            playing: node.playing,
        }
    }

    fn relocate(&mut self, id: NodeId) -> bool {
        if id.0 >= self.nodes.len() || self.is_relocated(id) || !self.is_element(id) {
            return false;
        }
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        self.nodes[id.0].parent = Some(self.inert);
        let inert = self.inert;
        self.nodes[inert.0].children.push(id);
        true
    }
}

impl Document for MemoryDocument {
    fn host(&self) -> &str {
        &self.host
    }

    fn page(&self) -> PageState {
        self.page
    }

    fn roots(&self) -> Vec<NodeId> {
        self.roots.clone()
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.shadow
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.node(node).map(|n| n.tag.clone()).unwrap_or_default()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node)?.attributes.get(name).cloned()
    }

    fn text_content(&self, node: NodeId) -> String {
        let Some(n) = self.node(node) else {
            return String::new();
        };
        let mut text = n.text.clone();
        for child in &n.children {
            text.push_str(&self.text_content(*child));
        }
        text
    }

    fn own_text(&self, node: NodeId) -> String {
        self.node(node).map(|n| n.text.clone()).unwrap_or_default()
    }

    fn rect(&self, node: NodeId) -> Rect {
        self.node(node).map(|n| n.rect).unwrap_or_default()
    }

    fn computed_style(&self, node: NodeId, property: &str) -> String {
        if let Some(value) = self.node(node).and_then(|n| n.style.get(property)) {
            return value.clone();
        }
        match property {
            "display" => "block",
            "position" => "static",
            "z-index" => "auto",
            "opacity" => "1",
            "visibility" => "visible",
            _ => "",
        }
        .to_string()
    }

    fn is_rendered(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.node(id) else {
                return false;
            };
            match n.tag.as_str() {
                DOCUMENT_TAG => return true,
                INERT_TAG => return false,
                _ => {}
            }
            if n.style.get("display").map(String::as_str) == Some("none") {
                return false;
            }
            current = n.parent.or(n.shadow_host);
        }
        false
    }

    fn media_playing(&self, node: NodeId) -> bool {
        self.node(node).map_or(false, |n| n.playing)
    }
}

impl ActionExecutor for MemoryDocument {
    fn apply(&mut self, target: NodeId, effect: &Effect) -> bool {
        if target.0 >= self.nodes.len() {
            return false;
        }

        let applied = match effect {
            Effect::Style { properties } => {
                let node = &mut self.nodes[target.0];
                for (name, value) in properties {
                    node.style.insert(name.clone(), value.clone());
                }
                true
            }
            Effect::Relocate => self.relocate(target),
            Effect::SetAttribute { name, value } => {
                self.nodes[target.0]
                    .attributes
                    .insert(name.clone(), value.clone());
                true
            }
            Effect::RemoveAttribute { name } => {
                self.nodes[target.0].attributes.remove(name).is_some()
            }
            Effect::SetText { text } => {
                self.nodes[target.0].text = text.clone();
                true
            }
            Effect::BlockClicks => {
                self.nodes[target.0].clicks_blocked = true;
                true
            }
        };

        if applied {
            self.applied.push((target, effect.clone()));
        }
        applied
    }
}
