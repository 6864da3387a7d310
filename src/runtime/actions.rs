//! Builtin action primitives
//!
//! Each builtin is translated into one or more [`Effect`]s handed to the
//! page's [`ActionExecutor`]. How an effect lands on the tree is up to the
//! executor; the engine only needs to know whether something happened.

use super::compare::z_index;
use super::document::{Document, NodeId};
use crate::types::ActionKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query parameters stripped by `clean-url`
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
];

const ZERO_WIDTH: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// One primitive mutation of the live tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "kebab-case")]
pub enum Effect {
    /// Set inline style properties with `!important`
    Style { properties: Vec<(String, String)> },
    /// Move the node into the inert container
    Relocate,
    SetAttribute { name: String, value: String },
    RemoveAttribute { name: String },
    /// Replace the node's own text
    SetText { text: String },
    /// Swallow click events in the capture phase
    BlockClicks,
}

impl Effect {
    pub fn style(properties: &[(&str, &str)]) -> Self {
        Effect::Style {
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Applies effects to the tree. Returns false when the effect could not be
/// applied, e.g. because the target is gone.
pub trait ActionExecutor {
    fn apply(&mut self, target: NodeId, effect: &Effect) -> bool;
}

/// Effect scheduled to land after a delay
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred {
    pub delay: Duration,
    pub target: NodeId,
    pub effect: Effect,
}

/// Run builtin `kind` on `node`. Delayed parts are pushed onto `deferred`.
/// Returns whether the action executed.
pub fn perform<P>(
    page: &mut P,
    node: NodeId,
    kind: ActionKind,
    args: &[String],
    deferred: &mut Vec<Deferred>,
) -> bool
where
    P: Document + ActionExecutor + ?Sized,
{
    let arg = args
        .first()
        .map(String::as_str)
        .or_else(|| kind.default_arg())
        .unwrap_or_default()
        .to_string();

    match kind {
        ActionKind::Hide => page.apply(node, &Effect::style(&[("display", "none")])),
        ActionKind::Remove => page.apply(node, &Effect::Relocate),
        ActionKind::Collapse => page.apply(
            node,
            &Effect::style(&[
                ("height", "0"),
                ("overflow", "hidden"),
                ("padding", "0"),
                ("margin", "0"),
            ]),
        ),
        ActionKind::Blur => page.apply(
            node,
            &Effect::style(&[("filter", format!("blur({})", arg).as_str())]),
        ),
        ActionKind::Opacity => page.apply(node, &Effect::style(&[("opacity", arg.as_str())])),
        ActionKind::RemoveParent => {
            let levels = arg.parse::<usize>().unwrap_or(1);
            let mut target = node;
            for _ in 0..levels {
                match page.element_parent(target) {
                    Some(parent) => target = parent,
                    None => break,
                }
            }
            page.apply(target, &Effect::Relocate)
        }
        ActionKind::CleanUrl => clean_url(page, node),
        ActionKind::CleanText => clean_text(page, node),
        ActionKind::Block => {
            let mut blocked = false;
            for name in ["src", "srcset", "href"] {
                if page.attribute(node, name).is_some() {
                    blocked |= page.apply(
                        node,
                        &Effect::RemoveAttribute {
                            name: name.to_string(),
                        },
                    );
                }
            }
            blocked
        }
        ActionKind::Delay => {
            let ms = arg.parse::<u64>().unwrap_or(0);
            if ms == 0 {
                page.apply(node, &Effect::Relocate)
            } else {
                deferred.push(Deferred {
                    delay: Duration::from_millis(ms),
                    target: node,
                    effect: Effect::Relocate,
                });
                true
            }
        }
        ActionKind::FadeOut => {
            let ms = arg.parse::<u64>().unwrap_or(300);
            let transition = format!("opacity {}ms", ms);
            let started = page.apply(
                node,
                &Effect::style(&[("transition", transition.as_str()), ("opacity", "0")]),
            );
            if started {
                deferred.push(Deferred {
                    delay: Duration::from_millis(ms),
                    target: node,
                    effect: Effect::style(&[("display", "none")]),
                });
            }
            started
        }
        ActionKind::RedirectLink => {
            if page.tag_name(node) != "a" || arg.is_empty() {
                return false;
            }
            page.apply(
                node,
                &Effect::SetAttribute {
                    name: "href".to_string(),
                    value: arg,
                },
            )
        }
        ActionKind::PreventClick => page.apply(node, &Effect::BlockClicks),
        ActionKind::ReduceZindex => {
            let amount = arg.parse::<i64>().unwrap_or(10000);
            let lowered = (z_index(page, node) - amount).to_string();
            page.apply(node, &Effect::style(&[("z-index", lowered.as_str())]))
        }
        ActionKind::CollapseContainer => {
            let parent = page.element_parent(node);
            if !page.apply(node, &Effect::Relocate) {
                return false;
            }
            if let Some(parent) = parent {
                let visible_left = page
                    .element_children(parent)
                    .into_iter()
                    .any(|child| page.is_rendered(child));
                if !visible_left {
                    page.apply(parent, &Effect::style(&[("display", "none")]));
                }
            }
            true
        }
        ActionKind::Speed => match ActionKind::from_name(&arg) {
            Some(ActionKind::Speed) | None => {
                log::debug!("speed() cannot wrap '{}'", arg);
                false
            }
            Some(inner) => perform(page, node, inner, &[], deferred),
        },
    }
}

fn clean_url<P>(page: &mut P, node: NodeId) -> bool
where
    P: Document + ActionExecutor + ?Sized,
{
    if page.tag_name(node) != "a" {
        return false;
    }
    let Some(href) = page.attribute(node, "href") else {
        return false;
    };

    let cleaned = strip_tracking_params(&href);
    if cleaned == href {
        return true;
    }
    page.apply(
        node,
        &Effect::SetAttribute {
            name: "href".to_string(),
            value: cleaned,
        },
    )
}

/// Remove [`TRACKING_PARAMS`] from a URL's query string, keeping the order
/// of everything else.
pub fn strip_tracking_params(url: &str) -> String {
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url, None),
    };
    let Some((base, query)) = without_fragment.split_once('?') else {
        return url.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            !TRACKING_PARAMS.contains(&key)
        })
        .collect();

    let mut cleaned = base.to_string();
    if !kept.is_empty() {
        cleaned.push('?');
        cleaned.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        cleaned.push('#');
        cleaned.push_str(fragment);
    }
    cleaned
}

fn clean_text<P>(page: &mut P, node: NodeId) -> bool
where
    P: Document + ActionExecutor + ?Sized,
{
    let mut targets = vec![node];
    targets.extend(page.descendants(node));

    for target in targets {
        let text = page.own_text(target);
        if text.contains(ZERO_WIDTH) {
            let cleaned: String = text.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();
            page.apply(target, &Effect::SetText { text: cleaned });
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::memory::MemoryDocument;

    fn page() -> MemoryDocument {
        MemoryDocument::from_json(
            r#"{
                "host": "example.com",
                "root": {"tag": "body", "children": [
                    {"tag": "section", "attributes": {"class": "wrap"}, "children": [
                        {"tag": "div", "attributes": {"class": "ad"}, "children": [
                            {"tag": "a", "attributes": {"href": "https://shop.test/p?id=4&utm_source=x&gclid=abc#top"}, "text": "Bu\u200by"}
                        ]}
                    ]},
                    {"tag": "img", "attributes": {"src": "/t.gif", "srcset": "/t2.gif 2x"}, "style": {"z-index": "99999"}}
                ]}
            }"#,
        )
        .unwrap()
    }

    fn run(page: &mut MemoryDocument, selector: &str, kind: ActionKind, args: &[&str]) -> bool {
        let node = page.find_first(selector).unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut deferred = Vec::new();
        perform(page, node, kind, &args, &mut deferred)
    }

    #[test]
    fn test_strip_tracking_params() {
        assert_eq!(
            strip_tracking_params("https://a.test/x?utm_source=n&id=2&fbclid=q#frag"),
            "https://a.test/x?id=2#frag"
        );
        assert_eq!(
            strip_tracking_params("https://a.test/x?utm_medium=email"),
            "https://a.test/x"
        );
        assert_eq!(strip_tracking_params("/plain"), "/plain");
    }

    #[test]
    fn test_hide_sets_display_none() {
        let mut page = page();
        assert!(run(&mut page, ".ad", ActionKind::Hide, &[]));
        let node = page.find_first(".ad").unwrap();
        assert_eq!(page.computed_style(node, "display"), "none");
        assert!(!page.is_rendered(node));
    }

    #[test]
    fn test_remove_parent_walks_up() {
        let mut page = page();
        let section = page.find_first("section").unwrap();
        assert!(run(&mut page, "a", ActionKind::RemoveParent, &["2"]));
        assert!(page.is_relocated(section));
    }

    #[test]
    fn test_clean_url_and_text() {
        let mut page = page();
        assert!(run(&mut page, "a", ActionKind::CleanUrl, &[]));
        let link = page.find_first("a").unwrap();
        assert_eq!(
            page.attribute(link, "href").as_deref(),
            Some("https://shop.test/p?id=4#top")
        );

        assert!(run(&mut page, ".ad", ActionKind::CleanText, &[]));
        assert_eq!(page.text_content(link), "Buy");
    }

    #[test]
    fn test_block_strips_sources() {
        let mut page = page();
        assert!(run(&mut page, "img", ActionKind::Block, &[]));
        let img = page.find_first("img").unwrap();
        assert_eq!(page.attribute(img, "src"), None);
        assert_eq!(page.attribute(img, "srcset"), None);
    }

    #[test]
    fn test_reduce_zindex() {
        let mut page = page();
        assert!(run(&mut page, "img", ActionKind::ReduceZindex, &[]));
        let img = page.find_first("img").unwrap();
        assert_eq!(page.computed_style(img, "z-index"), "89999");
    }

    #[test]
    fn test_collapse_container_hides_empty_parent() {
        let mut page = page();
        let section = page.find_first("section").unwrap();
        assert!(run(&mut page, ".ad", ActionKind::CollapseContainer, &[]));
        assert_eq!(page.computed_style(section, "display"), "none");
    }

    #[test]
    fn test_delay_and_fade_out_defer() {
        let mut page = page();
        let node = page.find_first(".ad").unwrap();
        let mut deferred = Vec::new();
        assert!(perform(&mut page, node, ActionKind::Delay, &["500".into()], &mut deferred));
        assert!(!page.is_relocated(node));
        assert!(perform(&mut page, node, ActionKind::FadeOut, &[], &mut deferred));
        assert_eq!(page.computed_style(node, "opacity"), "0");
        assert_eq!(deferred.len(), 2);
        assert_eq!(deferred[1].delay, Duration::from_millis(300));
    }

    #[test]
    fn test_redirect_only_on_links() {
        let mut page = page();
        assert!(!run(&mut page, "img", ActionKind::RedirectLink, &["https://safe.test"]));
        assert!(!run(&mut page, "a", ActionKind::RedirectLink, &[]));
        assert!(run(&mut page, "a", ActionKind::RedirectLink, &["https://safe.test"]));
    }

    #[test]
    fn test_speed_wraps_builtin() {
        let mut page = page();
        assert!(run(&mut page, ".ad", ActionKind::Speed, &["hide"]));
        assert!(!run(&mut page, ".ad", ActionKind::Speed, &["speed"]));
        assert!(!run(&mut page, ".ad", ActionKind::Speed, &["teleport"]));
    }
}
