//! Property accessors and comparators behind `@property <op> value` guards

use super::document::{Document, NodeId};
use crate::ast::CompareOp;
use regex::Regex;
use std::fmt;

/// Attributes readable by name in comparisons, besides `data-*` and `aria-*`
pub const COMPARABLE_ATTRIBUTES: &[&str] = &[
    "id",
    "class",
    "href",
    "src",
    "rel",
    "alt",
    "title",
    "type",
    "name",
    "value",
    "placeholder",
    "target",
    "role",
];

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl PropertyValue {
    /// Numeric view; text counts when it parses as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Text(t) => t.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::Text(t) => write!(f, "{}", t),
        }
    }
}

/// Read `property` from `node`. Unknown properties read as empty text.
pub fn property_value<D: Document + ?Sized>(doc: &D, node: NodeId, property: &str) -> PropertyValue {
    let rect = || doc.rect(node);

    match property {
        "width" => PropertyValue::Number(rect().width),
        "height" => PropertyValue::Number(rect().height),
        "top" => PropertyValue::Number(rect().top()),
        "left" => PropertyValue::Number(rect().left()),
        "right" => PropertyValue::Number(rect().right()),
        "bottom" => PropertyValue::Number(rect().bottom()),
        "text" => PropertyValue::Text(doc.text_content(node)),
        "children" => PropertyValue::Number(doc.element_children(node).len() as f64),
        "opacity" => PropertyValue::Number(
            doc.computed_style(node, "opacity")
                .trim()
                .parse::<f64>()
                .unwrap_or(1.0),
        ),
        "zindex" | "z-index" => PropertyValue::Number(z_index(doc, node) as f64),
        "tag" => PropertyValue::Text(doc.tag_name(node)),
        other if COMPARABLE_ATTRIBUTES.contains(&other)
            || other.starts_with("data-")
            || other.starts_with("aria-") =>
        {
            PropertyValue::Text(doc.attribute(node, other).unwrap_or_default())
        }
        _ => PropertyValue::Text(String::new()),
    }
}

/// Computed `z-index` as an integer; `auto` and garbage read as 0
pub fn z_index<D: Document + ?Sized>(doc: &D, node: NodeId) -> i64 {
    doc.computed_style(node, "z-index")
        .trim()
        .parse::<i64>()
        .unwrap_or(0)
}

/// Apply a comparison operator.
///
/// Ordering operators compare numerically when both sides read as numbers
/// and lexicographically otherwise. The string methods never match an empty
/// needle, and an invalid `matches` pattern is a non-match.
pub fn compare(left: &PropertyValue, op: CompareOp, right: &str) -> bool {
    let right_number = right.trim().parse::<f64>().ok();
    let numeric = left.as_number().zip(right_number);
    let text = left.to_string();

    match op {
        CompareOp::Less
        | CompareOp::Greater
        | CompareOp::LessEqual
        | CompareOp::GreaterEqual => {
            let ordering = match numeric {
                Some((l, r)) => l.partial_cmp(&r),
                None => Some(text.as_str().cmp(right)),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CompareOp::Less => ordering.is_lt(),
                CompareOp::Greater => ordering.is_gt(),
                CompareOp::LessEqual => ordering.is_le(),
                _ => ordering.is_ge(),
            }
        }
        CompareOp::Equal => match numeric {
            Some((l, r)) => (l - r).abs() < f64::EPSILON,
            None => text == right,
        },
        CompareOp::Contains => !right.is_empty() && text.contains(right),
        CompareOp::StartsWith => !right.is_empty() && text.starts_with(right),
        CompareOp::EndsWith => !right.is_empty() && text.ends_with(right),
        CompareOp::Matches => {
            if right.is_empty() {
                return false;
            }
            match Regex::new(right) {
                Ok(regex) => regex.is_match(&text),
                Err(e) => {
                    log::debug!("Invalid pattern '{}' in matches(): {}", right, e);
                    false
                }
            }
        }
    }
}
