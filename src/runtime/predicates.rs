//! Named predicate library for pseudo-selectors evaluated at run time

use super::compare::z_index;
use super::document::{Document, NodeId, Rect};
use crate::ast::PseudoArg;
use regex::{Regex, RegexBuilder};
use std::cell::RefCell;
use std::collections::HashMap;

/// Standard banner sizes recognized by `:common-dimensions`
pub const COMMON_DIMENSIONS: &[(f64, f64)] = &[
    (728.0, 90.0),
    (300.0, 250.0),
    (160.0, 600.0),
    (300.0, 600.0),
    (970.0, 250.0),
    (320.0, 50.0),
    (320.0, 100.0),
    (468.0, 60.0),
    (234.0, 60.0),
    (120.0, 600.0),
    (250.0, 250.0),
    (336.0, 280.0),
    (180.0, 150.0),
    (970.0, 90.0),
    (200.0, 200.0),
];

const AD_NETWORKS: &str = r"(?i)doubleclick|googlesyndication|googleadservices|taboola|outbrain|criteo|amazon-adsystem|advertising\.com|adnxs\.com";
const AD_ATTRIBUTES: &[&str] = &[
    "data-ad",
    "data-google-query-id",
    "data-ad-slot",
    "data-ad-unit",
    "data-adunit",
];
const SPONSOR_LABELS: &[&str] = &[
    "sponsored",
    "promoted",
    "advertisement",
    "ad",
    "partner",
    "featured",
    "推廣",
    "広告",
    "스폰서",
    "реклама",
    "publicité",
    "werbung",
];
const COUNTDOWN_PATTERNS: &[&str] = &[
    r"(?i)skip\s+(?:ad\s+)?in\s+\d+",
    r"(?i)\d+\s+seconds?",
    r"\d{1,2}:\d{2}",
    r"(?i)wait\s+\d+",
    r"(?i)\d+\s*s(?:ec)?$",
];

/// State that predicates carry across passes, keyed by element
#[derive(Debug, Clone, Default)]
pub struct PredicateMemory {
    /// Milliseconds since the engine started
    pub now_ms: u64,
    first_seen: HashMap<NodeId, u64>,
    positions: HashMap<NodeId, f64>,
    offscreen_at_first: HashMap<NodeId, bool>,
}

impl PredicateMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `node` was first evaluated, recording now if it is new
    pub fn first_seen(&mut self, node: NodeId) -> u64 {
        *self.first_seen.entry(node).or_insert(self.now_ms)
    }

    /// Previously recorded top edge, recording `top` if there is none
    pub fn previous_top(&mut self, node: NodeId, top: f64) -> Option<f64> {
        match self.positions.get(&node) {
            Some(previous) => Some(*previous),
            None => {
                self.positions.insert(node, top);
                None
            }
        }
    }

    /// Whether `node` was off-screen the first time it was seen
    pub fn started_offscreen(&mut self, node: NodeId, offscreen_now: bool) -> bool {
        *self.offscreen_at_first.entry(node).or_insert(offscreen_now)
    }

    pub fn tracked(&self) -> usize {
        self.first_seen
            .len()
            .max(self.positions.len())
            .max(self.offscreen_at_first.len())
    }

    pub fn clear(&mut self) {
        self.first_seen.clear();
        self.positions.clear();
        self.offscreen_at_first.clear();
    }
}

/// Evaluates named predicates such as `:has-text(..)` or `:sticky`.
///
/// Returning `None` means the name is unknown; the engine treats that as a
/// match.
pub trait PredicateLibrary {
    fn evaluate(
        &self,
        doc: &dyn Document,
        node: NodeId,
        name: &str,
        args: &[PseudoArg],
        memory: &mut PredicateMemory,
    ) -> Option<bool>;
}

/// Layout, text and content heuristics for the built-in predicate names
#[derive(Debug, Default)]
pub struct StandardPredicates {
    regex_cache: RefCell<HashMap<String, Option<Regex>>>,
}

impl StandardPredicates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `pattern` once; invalid patterns are cached as `None`
    fn regex(&self, pattern: &str, flags: &str) -> Option<Regex> {
        let key = format!("/{}/{}", pattern, flags);
        if let Some(cached) = self.regex_cache.borrow().get(&key) {
            return cached.clone();
        }

        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build();
        let compiled = match compiled {
            Ok(regex) => Some(regex),
            Err(e) => {
                log::debug!("Invalid predicate pattern {}: {}", key, e);
                None
            }
        };

        self.regex_cache.borrow_mut().insert(key, compiled.clone());
        compiled
    }

    /// Regex arguments match as patterns, text arguments as case-insensitive
    /// substrings
    fn text_matches(&self, haystack: &str, matcher: &PseudoArg) -> bool {
        match matcher {
            PseudoArg::Regex { pattern, flags } => self
                .regex(pattern, flags)
                .map_or(false, |regex| regex.is_match(haystack)),
            PseudoArg::Text(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        }
    }

    fn label_matches(&self, doc: &dyn Document, node: NodeId, args: &[PseudoArg]) -> bool {
        let label = args
            .first()
            .cloned()
            .unwrap_or_else(|| PseudoArg::text("Sponsored"));
        self.text_matches(doc.text_content(node).trim(), &label)
    }

    fn promoted_content(&self, doc: &dyn Document, node: NodeId, args: &[PseudoArg]) -> bool {
        let text = doc.text_content(node).trim().to_lowercase();
        if SPONSOR_LABELS.iter().any(|label| text == *label) {
            return true;
        }
        if !args.is_empty() && self.label_matches(doc, node, args) {
            return true;
        }
        if doc.attribute(node, "data-sponsored").is_some()
            || doc.attribute(node, "data-promoted").is_some()
        {
            return true;
        }
        let class = doc.attribute(node, "class").unwrap_or_default().to_lowercase();
        self.regex("native.*ad|sponsored.*content|promoted.*post|ad.*native", "")
            .map_or(false, |regex| regex.is_match(&class))
    }

    fn distraction_score(&self, doc: &dyn Document, node: NodeId) -> u32 {
        let mut score = 0;
        let rect = doc.rect(node);
        let page = doc.page();

        if is_common_dimension(&rect) {
            score += 20;
        }

        let network_attrs = ["src", "href", "data-src", "data-href", "action"];
        let hits_network = |target: NodeId| {
            network_attrs.iter().any(|attr| {
                doc.attribute(target, attr).map_or(false, |value| {
                    self.regex(AD_NETWORKS, "")
                        .map_or(false, |regex| regex.is_match(&value))
                })
            })
        };
        let embedded = doc
            .descendants(node)
            .into_iter()
            .filter(|d| matches!(doc.tag_name(*d).as_str(), "img" | "iframe" | "script"));
        if hits_network(node) || embedded.clone().any(hits_network) {
            score += 30;
        }

        let in_ad_zone = rect.left() < 10.0
            || rect.right() > page.viewport_width - 300.0
            || rect.top() < 100.0
            || rect.bottom() > page.viewport_height - 100.0;
        if in_ad_zone && rect.width > 100.0 && rect.height > 50.0 {
            score += 15;
        }

        let class = doc.attribute(node, "class").unwrap_or_default();
        let first_class = class.split_whitespace().next().unwrap_or_default();
        if first_class.len() >= 8
            && first_class
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            score += 10;
        }

        if AD_ATTRIBUTES
            .iter()
            .any(|attr| doc.attribute(node, attr).is_some())
        {
            score += 10;
        }

        if embedded.filter(|d| doc.tag_name(*d) == "iframe").count() >= 2 {
            score += 5;
        }

        let id_class = format!("{} {}", doc.attribute(node, "id").unwrap_or_default(), class);
        if self
            .regex("ad|banner|sponsor|promo|advert", "i")
            .map_or(false, |regex| regex.is_match(&id_class))
        {
            score += 5;
        }

        score
    }
}

impl PredicateLibrary for StandardPredicates {
    fn evaluate(
        &self,
        doc: &dyn Document,
        node: NodeId,
        name: &str,
        args: &[PseudoArg],
        memory: &mut PredicateMemory,
    ) -> Option<bool> {
        let text_arg = |index: usize, default: &str| -> String {
            match args.get(index) {
                Some(PseudoArg::Text(t)) => t.trim().to_string(),
                Some(PseudoArg::Regex { pattern, .. }) => pattern.clone(),
                None => default.to_string(),
            }
        };

        let result = match name {
            "has" | "has-child" => match nested_selector(args) {
                Some(selector) => doc
                    .query_all(node, &selector)
                    .map_or(false, |found| !found.is_empty()),
                None => false,
            },
            "text" | "has-text" => match args.first() {
                Some(matcher) => self.text_matches(doc.text_content(node).trim(), matcher),
                None => false,
            },
            "smart-container" | "native-ad" => self.label_matches(doc, node, args),
            "promoted-content" => self.promoted_content(doc, node, args),
            "size" => size_matches(&doc.rect(node), &text_arg(0, "*x*")),
            "position" => {
                let position = text_arg(0, "fixed");
                doc.computed_style(node, "position") == position
                    && location_matches(&doc.rect(node), doc, args.get(1).map(|_| text_arg(1, "")))
            }
            "zindex" => {
                let bound = text_arg(0, ">0");
                let (op, value) = split_op(&bound);
                let value = value.parse::<i64>().unwrap_or(0);
                compare_ordered(z_index(doc, node) as f64, op.unwrap_or(">"), value as f64)
            }
            "visible" => doc.is_rendered(node),
            "viewport" => in_viewport(&doc.rect(node), doc),
            "style" => style_matches(doc, node, args, &text_arg),
            "shadow" => match doc.shadow_root(node) {
                Some(shadow) => doc
                    .query_all(shadow, &text_arg(0, "*"))
                    .map_or(false, |found| !found.is_empty()),
                None => false,
            },
            "aspect-ratio" => {
                let rect = doc.rect(node);
                let tolerance = text_arg(1, "0.1").parse::<f64>().unwrap_or(0.1);
                match parse_ratio(&text_arg(0, "16:9")) {
                    Some(target) if rect.width > 0.0 && rect.height > 0.0 => {
                        (rect.width / rect.height - target).abs() <= tolerance
                    }
                    _ => false,
                }
            }
            "common-dimensions" => is_common_dimension(&doc.rect(node)),
            "layout-shift" => {
                let threshold = text_arg(0, "0.1").parse::<f64>().unwrap_or(0.1);
                let top = doc.rect(node).top();
                match memory.previous_top(node, top) {
                    Some(previous) => {
                        let viewport = doc.page().viewport_height.max(1.0);
                        (top - previous).abs() / viewport > threshold
                    }
                    None => false,
                }
            }
            "sticky" => matches!(
                doc.computed_style(node, "position").as_str(),
                "fixed" | "sticky"
            ),
            "auto-play" => {
                let is_media = |n: NodeId| matches!(doc.tag_name(n).as_str(), "video" | "audio");
                let media = if is_media(node) {
                    Some(node)
                } else {
                    doc.descendants(node).into_iter().find(|d| is_media(*d))
                };
                media.map_or(false, |m| {
                    doc.attribute(m, "autoplay").is_some() || doc.media_playing(m)
                })
            }
            "opens-popup" => {
                let onclick = doc.attribute(node, "onclick").unwrap_or_default();
                let scripted = self
                    .regex(r"window\.open|popup|newwindow", "i")
                    .map_or(false, |r| r.is_match(&onclick));
                let target = doc.attribute(node, "target").unwrap_or_default().to_lowercase();
                scripted
                    || (matches!(target.as_str(), "_blank" | "_new")
                        && doc.tag_name(node) == "a"
                        && self
                            .regex("popup|window", "i")
                            .map_or(false, |r| {
                                r.is_match(&doc.attribute(node, "href").unwrap_or_default())
                            }))
            }
            "lazy-loaded" => {
                let delay = text_arg(0, "2000").parse::<u64>().unwrap_or(2000);
                memory.first_seen(node) > delay
            }
            "scroll-triggered" => {
                let visible = in_viewport(&doc.rect(node), doc);
                memory.started_offscreen(node, !visible) && visible
            }
            "contains-image" => {
                let pattern = text_arg(0, "");
                match self.regex(&pattern, "i") {
                    Some(regex) => doc.descendants(node).into_iter().any(|d| {
                        let tag = doc.tag_name(d);
                        let source = match tag.as_str() {
                            "img" => doc
                                .attribute(d, "src")
                                .or_else(|| doc.attribute(d, "srcset")),
                            "source" => doc
                                .parent(d)
                                .filter(|p| doc.tag_name(*p) == "picture")
                                .and_then(|_| {
                                    doc.attribute(d, "srcset").or_else(|| doc.attribute(d, "src"))
                                }),
                            "video" => doc.attribute(d, "poster"),
                            _ => None,
                        };
                        source.map_or(false, |s| regex.is_match(&s))
                    }),
                    None => false,
                }
            }
            "external-domain" => {
                if doc.tag_name(node) != "a" {
                    false
                } else {
                    match doc.attribute(node, "href").as_deref().and_then(url_host) {
                        Some(link_host) => {
                            let host = doc.host().to_lowercase();
                            link_host != host && !link_host.ends_with(&format!(".{}", host))
                        }
                        None => false,
                    }
                }
            }
            "distraction-score" => {
                let threshold = text_arg(0, "50").parse::<u32>().unwrap_or(50);
                self.distraction_score(doc, node) >= threshold
            }
            "overlay-modal" => {
                let position = doc.computed_style(node, "position");
                let page = doc.page();
                let rect = doc.rect(node);
                let viewport_area = (page.viewport_width * page.viewport_height).max(1.0);
                matches!(position.as_str(), "fixed" | "absolute")
                    && z_index(doc, node) >= 1000
                    && rect.area() / viewport_area > 0.8
            }
            "countdown-timer" => {
                let text = doc.text_content(node);
                let text = text.trim();
                COUNTDOWN_PATTERNS
                    .iter()
                    .filter_map(|p| self.regex(p, ""))
                    .any(|regex| regex.is_match(text))
            }
            "empty-after-block" => doc.element_children(node).into_iter().all(|child| {
                doc.computed_style(child, "display") == "none"
                    || doc.computed_style(child, "visibility") == "hidden"
            }),
            "sibling-match" => {
                let selector = text_arg(0, "");
                let direction = text_arg(1, "any");
                let check = |sibling: Option<NodeId>| {
                    sibling.map_or(false, |s| doc.matches(s, &selector).unwrap_or(false))
                };
                match direction.as_str() {
                    "next" => check(doc.next_element_sibling(node)),
                    "prev" => check(doc.previous_element_sibling(node)),
                    _ => {
                        check(doc.next_element_sibling(node))
                            || check(doc.previous_element_sibling(node))
                    }
                }
            }
            "nth-parent" => true,
            _ => return None,
        };

        Some(result)
    }
}

fn style_matches(
    doc: &dyn Document,
    node: NodeId,
    args: &[PseudoArg],
    text_arg: &dyn Fn(usize, &str) -> String,
) -> bool {
    let first = text_arg(0, "");
    let (property, value) = match first.split_once(':') {
        Some((property, value)) => (property.trim().to_string(), value.trim().to_string()),
        None => (first, if args.len() > 1 { text_arg(1, "") } else { String::new() }),
    };
    if property.is_empty() {
        return true;
    }

    let actual = doc.computed_style(node, &property);
    if value.is_empty() {
        return !actual.is_empty();
    }
    actual == value || actual.contains(&value)
}

/// Selector list for `:has(..)`; regex arguments contribute their pattern
fn nested_selector(args: &[PseudoArg]) -> Option<String> {
    let parts: Vec<&str> = args
        .iter()
        .map(|arg| match arg {
            PseudoArg::Text(text) => text.trim(),
            PseudoArg::Regex { pattern, .. } => pattern.trim(),
        })
        .filter(|part| !part.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn split_op(text: &str) -> (Option<&'static str>, &str) {
    for op in [">=", "<=", ">", "<", "="] {
        if let Some(rest) = text.strip_prefix(op) {
            return (Some(op), rest.trim());
        }
    }
    (None, text.trim())
}

fn compare_ordered(actual: f64, op: &str, expected: f64) -> bool {
    match op {
        ">" => actual > expected,
        "<" => actual < expected,
        ">=" => actual >= expected,
        "<=" => actual <= expected,
        _ => (actual - expected).abs() < f64::EPSILON,
    }
}

/// `[op]WxH` where either side may be `*`; `=` allows 10px of slack
pub fn size_matches(rect: &Rect, spec: &str) -> bool {
    let Some((width, height)) = spec.trim().to_lowercase().split_once('x').map(|(w, h)| {
        (w.to_string(), h.to_string())
    }) else {
        return true;
    };

    let side = |bound: &str, actual: f64| -> bool {
        let (op, value) = split_op(bound);
        if value == "*" {
            return true;
        }
        match value.parse::<f64>() {
            Ok(expected) => match op.unwrap_or("=") {
                "=" => (actual - expected).abs() < 10.0,
                other => compare_ordered(actual, other, expected),
            },
            Err(_) => true,
        }
    };

    side(&width, rect.width) && side(&height, rect.height)
}

fn location_matches(rect: &Rect, doc: &dyn Document, location: Option<String>) -> bool {
    let Some(location) = location.filter(|l| !l.is_empty()) else {
        return true;
    };
    let page = doc.page();
    let top = rect.top() < 200.0;
    let bottom = rect.bottom() > page.viewport_height - 200.0;
    let left = rect.left() < 200.0;
    let right = rect.right() > page.viewport_width - 200.0;

    match location.as_str() {
        "top-left" => top && left,
        "top-right" => top && right,
        "bottom-left" => bottom && left,
        "bottom-right" => bottom && right,
        "corner" => (top || bottom) && (left || right),
        "fullscreen" => {
            rect.width > page.viewport_width * 0.8 && rect.height > page.viewport_height * 0.8
        }
        _ => true,
    }
}

fn in_viewport(rect: &Rect, doc: &dyn Document) -> bool {
    let page = doc.page();
    rect.top() < page.viewport_height
        && rect.bottom() > 0.0
        && rect.left() < page.viewport_width
        && rect.right() > 0.0
}

fn is_common_dimension(rect: &Rect) -> bool {
    let (w, h) = (rect.width.round(), rect.height.round());
    COMMON_DIMENSIONS
        .iter()
        .any(|(sw, sh)| (w - sw).abs() <= 5.0 && (h - sh).abs() <= 5.0)
}

fn parse_ratio(text: &str) -> Option<f64> {
    let (w, h) = text.split_once(':')?;
    let w = w.trim().parse::<f64>().ok()?;
    let h = h.trim().parse::<f64>().ok()?;
    if h == 0.0 {
        None
    } else {
        Some(w / h)
    }
}

/// Host of an absolute `http(s)://` or protocol-relative URL
fn url_host(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("//"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::memory::MemoryDocument;

    fn doc() -> MemoryDocument {
        MemoryDocument::from_json(
            r#"{
                "host": "news.example",
                "viewport": {"width": 1000, "height": 800},
                "root": {"tag": "body", "children": [
                    {"tag": "div", "attributes": {"class": "banner", "data-ad-slot": "1"},
                     "rect": {"x": 0, "y": 0, "width": 728, "height": 90},
                     "children": [
                        {"tag": "iframe", "attributes": {"src": "https://ads.doubleclick.net/x"}},
                        {"tag": "iframe", "attributes": {"src": "https://ads.doubleclick.net/y"}}
                     ]},
                    {"tag": "article", "text": " Sponsored ", "rect": {"x": 200, "y": 300, "width": 400, "height": 300}},
                    {"tag": "div", "attributes": {"class": "modal"},
                     "rect": {"x": 0, "y": 0, "width": 1000, "height": 800},
                     "style": {"position": "fixed", "z-index": "2000"},
                     "text": "Skip ad in 5"},
                    {"tag": "a", "attributes": {"href": "https://other.test/page", "target": "_blank"}},
                    {"tag": "a", "attributes": {"href": "https://cdn.news.example/x"}},
                    {"tag": "section", "children": [
                        {"tag": "video", "attributes": {"autoplay": ""}}
                    ]},
                    {"tag": "div", "attributes": {"class": "holder"}, "children": [
                        {"tag": "span", "style": {"display": "none"}}
                    ]}
                ]}
            }"#,
        )
        .unwrap()
    }

    fn check(doc: &MemoryDocument, selector: &str, name: &str, args: &[PseudoArg]) -> Option<bool> {
        let node = doc.find_first(selector).unwrap();
        let mut memory = PredicateMemory::new();
        StandardPredicates::new().evaluate(doc, node, name, args, &mut memory)
    }

    #[test]
    fn test_text_predicates() {
        let doc = doc();
        assert_eq!(check(&doc, "article", "has-text", &[PseudoArg::text("sponsored")]), Some(true));
        let regex = PseudoArg::Regex {
            pattern: "^spons".to_string(),
            flags: "i".to_string(),
        };
        assert_eq!(check(&doc, "article", "text", &[regex]), Some(true));
        assert_eq!(check(&doc, "article", "text", &[PseudoArg::text("Weather")]), Some(false));
        assert_eq!(check(&doc, "article", "smart-container", &[]), Some(true));
        assert_eq!(check(&doc, "article", "promoted-content", &[]), Some(true));
    }

    #[test]
    fn test_has_predicates_query_descendants() {
        let doc = doc();
        let list = [PseudoArg::text("video"), PseudoArg::text("img")];
        assert_eq!(check(&doc, "section", "has-child", &list), Some(true));
        assert_eq!(check(&doc, ".holder", "has-child", &list), Some(false));

        let regex = PseudoArg::Regex {
            pattern: "iframe".to_string(),
            flags: String::new(),
        };
        assert_eq!(check(&doc, ".banner", "has", &[regex.clone()]), Some(true));
        assert_eq!(check(&doc, "article", "has", &[regex]), Some(false));
        assert_eq!(check(&doc, ".banner", "has", &[]), Some(false));
        assert_eq!(check(&doc, ".banner", "has-child", &[PseudoArg::text("[[")]), Some(false));
    }

    #[test]
    fn test_unknown_predicate_is_none() {
        let doc = doc();
        assert_eq!(check(&doc, "article", "made-up", &[]), None);
        assert_eq!(check(&doc, "article", "nth-parent", &[PseudoArg::text("2")]), Some(true));
    }

    #[test]
    fn test_geometry_predicates() {
        let doc = doc();
        assert_eq!(check(&doc, ".banner", "size", &[PseudoArg::text("728x90")]), Some(true));
        assert_eq!(check(&doc, ".banner", "size", &[PseudoArg::text(">700x*")]), Some(true));
        assert_eq!(check(&doc, ".banner", "size", &[PseudoArg::text("<700x*")]), Some(false));
        assert_eq!(check(&doc, ".banner", "common-dimensions", &[]), Some(true));
        assert_eq!(check(&doc, "article", "common-dimensions", &[]), Some(false));
        assert_eq!(
            check(&doc, "article", "aspect-ratio", &[PseudoArg::text("4:3")]),
            Some(true)
        );
        assert_eq!(check(&doc, "article", "viewport", &[]), Some(true));
    }

    #[test]
    fn test_overlay_and_position() {
        let doc = doc();
        assert_eq!(check(&doc, ".modal", "overlay-modal", &[]), Some(true));
        assert_eq!(check(&doc, ".modal", "sticky", &[]), Some(true));
        assert_eq!(check(&doc, ".modal", "zindex", &[PseudoArg::text(">1000")]), Some(true));
        assert_eq!(
            check(
                &doc,
                ".modal",
                "position",
                &[PseudoArg::text("fixed"), PseudoArg::text("fullscreen")]
            ),
            Some(true)
        );
        assert_eq!(check(&doc, ".modal", "countdown-timer", &[]), Some(true));
        assert_eq!(check(&doc, "article", "overlay-modal", &[]), Some(false));
    }

    #[test]
    fn test_distraction_score() {
        let doc = doc();
        // dimensions 20, network 30, zone 15, attribute 10, iframes 5, class 5
        assert_eq!(
            check(&doc, ".banner", "distraction-score", &[PseudoArg::text("85")]),
            Some(true)
        );
        assert_eq!(check(&doc, "article", "distraction-score", &[]), Some(false));
    }

    #[test]
    fn test_link_predicates() {
        let doc = doc();
        assert_eq!(check(&doc, "a[href*='other']", "external-domain", &[]), Some(true));
        assert_eq!(check(&doc, "a[href*='cdn']", "external-domain", &[]), Some(false));
        assert_eq!(check(&doc, "a[href*='other']", "opens-popup", &[]), Some(false));
    }

    #[test]
    fn test_structure_predicates() {
        let doc = doc();
        assert_eq!(check(&doc, "section", "auto-play", &[]), Some(true));
        assert_eq!(check(&doc, ".holder", "empty-after-block", &[]), Some(true));
        assert_eq!(check(&doc, "section", "empty-after-block", &[]), Some(false));
        assert_eq!(
            check(&doc, "article", "sibling-match", &[PseudoArg::text(".banner"), PseudoArg::text("prev")]),
            Some(true)
        );
        assert_eq!(
            check(&doc, "article", "sibling-match", &[PseudoArg::text(".banner"), PseudoArg::text("next")]),
            Some(false)
        );
        assert_eq!(check(&doc, "article", "style", &[PseudoArg::text("position: static")]), Some(true));
    }

    #[test]
    fn test_memory_backed_predicates() {
        let doc = doc();
        let node = doc.find_first("article").unwrap();
        let predicates = StandardPredicates::new();
        let mut memory = PredicateMemory::new();

        let lazy = [PseudoArg::text("1000")];
        memory.now_ms = 5000;
        assert_eq!(predicates.evaluate(&doc, node, "lazy-loaded", &lazy, &mut memory), Some(true));

        assert_eq!(predicates.evaluate(&doc, node, "layout-shift", &[], &mut memory), Some(false));
        assert_eq!(predicates.evaluate(&doc, node, "layout-shift", &[], &mut memory), Some(false));
        assert_eq!(memory.tracked(), 1);

        // seen on-screen first, so never scroll-triggered
        assert_eq!(predicates.evaluate(&doc, node, "scroll-triggered", &[], &mut memory), Some(false));
    }

    #[test]
    fn test_invalid_regex_is_non_match() {
        let doc = doc();
        let broken = PseudoArg::Regex {
            pattern: "([".to_string(),
            flags: String::new(),
        };
        assert_eq!(check(&doc, "article", "text", &[broken]), Some(false));
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://User@Shop.test:8080/a?b"), Some("shop.test".to_string()));
        assert_eq!(url_host("//cdn.test/x"), Some("cdn.test".to_string()));
        assert_eq!(url_host("/relative"), None);
    }
}
