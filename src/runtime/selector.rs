//! CSS selector parsing and matching against a [`Document`]
//!
//! Supports type, universal, class, id and attribute selectors
//! (`= ^= $= *= ~= |=`, with the `i` flag), the descendant, child and
//! sibling combinators, and the pseudo-classes `:not()`, `:has()`,
//! `:first-child`, `:last-child`, `:only-child`, `:empty` and
//! `:nth-child()`. User-action states (`:hover`, `:focus`, ...) never match.
//! Anything else is an [`EvalError::InvalidSelector`].

use super::document::{Document, NodeId};
use super::EvalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace
    Descendant,
    /// `>`
    Child,
    /// `+`
    NextSibling,
    /// `~`
    SubsequentSibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeOp {
    Equals,
    Prefix,
    Suffix,
    Substring,
    Includes,
    DashMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSelector {
    pub name: String,
    pub test: Option<(AttributeOp, String)>,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PseudoClass {
    Not(SelectorList),
    Has(Vec<RelativeSelector>),
    FirstChild,
    LastChild,
    OnlyChild,
    Empty,
    NthChild { a: i64, b: i64 },
    /// Interaction states that a snapshot never has
    Never,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
    pub pseudos: Vec<PseudoClass>,
}

/// Compounds stored right to left: `parts[0]` is the subject, and
/// `parts[i].1` is the combinator joining `parts[i]` to `parts[i - 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSelector {
    pub parts: Vec<(Compound, Option<Combinator>)>,
}

/// `:has()` argument: a complex selector anchored at the `:has` subject
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeSelector {
    pub leading: Combinator,
    pub selector: ComplexSelector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(pub Vec<ComplexSelector>);

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub fn parse_selector_list(text: &str) -> Result<SelectorList, EvalError> {
    let mut parser = SelectorParser::new(text);
    let list = parser.parse_list()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(list)
}

struct SelectorParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    position: usize,
}

impl<'a> SelectorParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            position: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> EvalError {
        EvalError::InvalidSelector {
            selector: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.position += 1;
        }
        ch
    }

    fn expect(&mut self, expected: char) -> Result<(), EvalError> {
        if self.bump() == Some(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        while self.peek().map_or(false, char::is_whitespace) {
            self.position += 1;
        }
        self.position > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, EvalError> {
        let mut selectors = vec![self.parse_complex()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.bump();
                selectors.push(self.parse_complex()?);
            } else {
                break;
            }
        }
        Ok(SelectorList(selectors))
    }

    fn parse_relative_list(&mut self) -> Result<Vec<RelativeSelector>, EvalError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            let leading = match self.peek() {
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                _ => Combinator::Descendant,
            };
            if leading != Combinator::Descendant {
                self.bump();
            }
            selectors.push(RelativeSelector {
                leading,
                selector: self.parse_complex()?,
            });
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.bump();
            } else {
                break;
            }
        }
        Ok(selectors)
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, EvalError> {
        self.skip_whitespace();
        // Left to right: (compound, combinator that follows it)
        let mut left_to_right: Vec<(Compound, Option<Combinator>)> = Vec::new();

        loop {
            let compound = self.parse_compound()?;
            let spaced = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => Some(Combinator::Child),
                Some('+') => Some(Combinator::NextSibling),
                Some('~') => Some(Combinator::SubsequentSibling),
                Some(c) if spaced && c != ',' && c != ')' => Some(Combinator::Descendant),
                _ => None,
            };

            match combinator {
                Some(Combinator::Descendant) => left_to_right.push((compound, combinator)),
                Some(explicit) => {
                    self.bump();
                    self.skip_whitespace();
                    left_to_right.push((compound, Some(explicit)));
                }
                None => {
                    left_to_right.push((compound, None));
                    break;
                }
            }
        }

        // Each compound's trailing combinator links it to the part on its right
        let parts = left_to_right.into_iter().rev().collect();

        Ok(ComplexSelector { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, EvalError> {
        let mut compound = Compound::default();
        let mut empty = true;

        loop {
            match self.peek() {
                Some('*') if empty => {
                    self.bump();
                }
                Some(c) if empty && is_ident_start(c) => {
                    compound.tag = Some(self.parse_ident()?.to_lowercase());
                }
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    compound.attributes.push(self.parse_attribute()?);
                }
                Some(':') => {
                    compound.pseudos.push(self.parse_pseudo()?);
                }
                _ => break,
            }
            empty = false;
        }

        if empty {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, EvalError> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                if let Some(escaped) = self.bump() {
                    ident.push(escaped);
                }
            } else if is_ident_char(c) {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            Err(self.error("expected an identifier"))
        } else {
            Ok(ident)
        }
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector, EvalError> {
        self.expect('[')?;
        self.skip_whitespace();
        let name = self.parse_ident()?.to_lowercase();
        self.skip_whitespace();

        let op = match (self.peek(), self.peek_next()) {
            (Some(']'), _) => None,
            (Some('='), _) => Some((AttributeOp::Equals, 1)),
            (Some('^'), Some('=')) => Some((AttributeOp::Prefix, 2)),
            (Some('$'), Some('=')) => Some((AttributeOp::Suffix, 2)),
            (Some('*'), Some('=')) => Some((AttributeOp::Substring, 2)),
            (Some('~'), Some('=')) => Some((AttributeOp::Includes, 2)),
            (Some('|'), Some('=')) => Some((AttributeOp::DashMatch, 2)),
            _ => return Err(self.error("unsupported attribute operator")),
        };

        let mut selector = AttributeSelector {
            name,
            test: None,
            case_insensitive: false,
        };

        if let Some((op, width)) = op {
            self.position += width;
            self.skip_whitespace();
            let value = match self.peek() {
                Some(q @ ('"' | '\'')) => {
                    self.bump();
                    let mut value = String::new();
                    loop {
                        match self.bump() {
                            Some(c) if c == q => break,
                            Some('\\') => {
                                if let Some(escaped) = self.bump() {
                                    value.push(escaped);
                                }
                            }
                            Some(c) => value.push(c),
                            None => return Err(self.error("unterminated string")),
                        }
                    }
                    value
                }
                _ => self.parse_ident()?,
            };
            self.skip_whitespace();
            if matches!(self.peek(), Some('i' | 'I')) {
                self.bump();
                selector.case_insensitive = true;
                self.skip_whitespace();
            } else if matches!(self.peek(), Some('s' | 'S')) {
                self.bump();
                self.skip_whitespace();
            }
            selector.test = Some((op, value));
        }

        self.expect(']')?;
        Ok(selector)
    }

    fn parse_pseudo(&mut self) -> Result<PseudoClass, EvalError> {
        self.expect(':')?;
        if self.peek() == Some(':') {
            return Err(self.error("pseudo-elements never match elements"));
        }
        let name = self.parse_ident()?.to_lowercase();

        let pseudo = match name.as_str() {
            "not" => {
                self.expect('(')?;
                let list = self.parse_list()?;
                self.skip_whitespace();
                self.expect(')')?;
                PseudoClass::Not(list)
            }
            "has" => {
                self.expect('(')?;
                let relative = self.parse_relative_list()?;
                self.skip_whitespace();
                self.expect(')')?;
                PseudoClass::Has(relative)
            }
            "nth-child" => {
                self.expect('(')?;
                let mut argument = String::new();
                while let Some(c) = self.peek() {
                    if c == ')' {
                        break;
                    }
                    argument.push(c);
                    self.bump();
                }
                self.expect(')')?;
                let (a, b) = parse_nth(&argument)
                    .ok_or_else(|| self.error(format!("bad :nth-child argument '{}'", argument)))?;
                PseudoClass::NthChild { a, b }
            }
            "first-child" => PseudoClass::FirstChild,
            "last-child" => PseudoClass::LastChild,
            "only-child" => PseudoClass::OnlyChild,
            "empty" => PseudoClass::Empty,
            "hover" | "focus" | "active" | "visited" | "focus-within" | "focus-visible" => {
                PseudoClass::Never
            }
            other => return Err(self.error(format!("unsupported pseudo-class ':{}'", other))),
        };
        Ok(pseudo)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// `an+b` micro-syntax: `odd`, `even`, `3`, `2n`, `-n+3`, `2n+1`
fn parse_nth(argument: &str) -> Option<(i64, i64)> {
    let text: String = argument.chars().filter(|c| !c.is_whitespace()).collect();
    match text.to_lowercase().as_str() {
        "odd" => return Some((2, 1)),
        "even" => return Some((2, 0)),
        _ => {}
    }

    let lower = text.to_lowercase();
    match lower.find('n') {
        None => lower.parse::<i64>().ok().map(|b| (0, b)),
        Some(index) => {
            let a = match &lower[..index] {
                "" | "+" => 1,
                "-" => -1,
                digits => digits.parse::<i64>().ok()?,
            };
            let rest = &lower[index + 1..];
            let b = if rest.is_empty() {
                0
            } else {
                rest.trim_start_matches('+').parse::<i64>().ok()?
            };
            Some((a, b))
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

impl SelectorList {
    pub fn matches<D: Document + ?Sized>(&self, doc: &D, node: NodeId) -> bool {
        doc.is_element(node) && self.0.iter().any(|s| s.match_at(doc, node, 0, None))
    }
}

impl ComplexSelector {
    fn match_at<D: Document + ?Sized>(
        &self,
        doc: &D,
        node: NodeId,
        index: usize,
        anchor: Option<(NodeId, Combinator)>,
    ) -> bool {
        let Some((compound, _)) = self.parts.get(index) else {
            return false;
        };
        if !compound.matches(doc, node) {
            return false;
        }

        let Some((_, link)) = self.parts.get(index + 1) else {
            return match anchor {
                None => true,
                Some((anchor, combinator)) => related(doc, node, anchor, combinator),
            };
        };

        match link.unwrap_or(Combinator::Descendant) {
            Combinator::Child => doc
                .element_parent(node)
                .map_or(false, |parent| self.match_at(doc, parent, index + 1, anchor)),
            Combinator::Descendant => {
                let mut current = doc.element_parent(node);
                while let Some(ancestor) = current {
                    if self.match_at(doc, ancestor, index + 1, anchor) {
                        return true;
                    }
                    current = doc.element_parent(ancestor);
                }
                false
            }
            Combinator::NextSibling => doc
                .previous_element_sibling(node)
                .map_or(false, |prev| self.match_at(doc, prev, index + 1, anchor)),
            Combinator::SubsequentSibling => {
                let mut current = doc.previous_element_sibling(node);
                while let Some(sibling) = current {
                    if self.match_at(doc, sibling, index + 1, anchor) {
                        return true;
                    }
                    current = doc.previous_element_sibling(sibling);
                }
                false
            }
        }
    }
}

/// Whether `node` stands in `combinator` relation to `anchor`
fn related<D: Document + ?Sized>(
    doc: &D,
    node: NodeId,
    anchor: NodeId,
    combinator: Combinator,
) -> bool {
    match combinator {
        Combinator::Child => doc.parent(node) == Some(anchor),
        Combinator::Descendant => {
            let mut current = doc.parent(node);
            while let Some(ancestor) = current {
                if ancestor == anchor {
                    return true;
                }
                current = doc.parent(ancestor);
            }
            false
        }
        Combinator::NextSibling => doc.previous_element_sibling(node) == Some(anchor),
        Combinator::SubsequentSibling => {
            let mut current = doc.previous_element_sibling(node);
            while let Some(sibling) = current {
                if sibling == anchor {
                    return true;
                }
                current = doc.previous_element_sibling(sibling);
            }
            false
        }
    }
}

impl RelativeSelector {
    fn matches_from<D: Document + ?Sized>(&self, doc: &D, anchor: NodeId) -> bool {
        let candidates = match self.leading {
            Combinator::Child | Combinator::Descendant => doc.descendants(anchor),
            Combinator::NextSibling | Combinator::SubsequentSibling => {
                let mut scope = Vec::new();
                let mut current = doc.next_element_sibling(anchor);
                while let Some(sibling) = current {
                    scope.push(sibling);
                    scope.extend(doc.descendants(sibling));
                    current = doc.next_element_sibling(sibling);
                }
                scope
            }
        };

        candidates.into_iter().any(|candidate| {
            doc.is_element(candidate)
                && self
                    .selector
                    .match_at(doc, candidate, 0, Some((anchor, self.leading)))
        })
    }
}

impl Compound {
    fn matches<D: Document + ?Sized>(&self, doc: &D, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if !doc.tag_name(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if let Some(id) = &self.id {
            if doc.attribute(node, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let class_attr = doc.attribute(node, "class").unwrap_or_default();
            let classes: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }

        if !self
            .attributes
            .iter()
            .all(|attribute| attribute.matches(doc, node))
        {
            return false;
        }

        self.pseudos.iter().all(|pseudo| pseudo.matches(doc, node))
    }
}

impl AttributeSelector {
    fn matches<D: Document + ?Sized>(&self, doc: &D, node: NodeId) -> bool {
        let Some(actual) = doc.attribute(node, &self.name) else {
            return false;
        };
        let Some((op, expected)) = &self.test else {
            return true;
        };

        let (actual, expected) = if self.case_insensitive {
            (actual.to_lowercase(), expected.to_lowercase())
        } else {
            (actual, expected.clone())
        };

        match op {
            AttributeOp::Equals => actual == expected,
            AttributeOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttributeOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttributeOp::Substring => !expected.is_empty() && actual.contains(&expected),
            AttributeOp::Includes => actual.split_whitespace().any(|word| word == expected),
            AttributeOp::DashMatch => {
                actual == expected || actual.starts_with(&format!("{}-", expected))
            }
        }
    }
}

impl PseudoClass {
    fn matches<D: Document + ?Sized>(&self, doc: &D, node: NodeId) -> bool {
        match self {
            PseudoClass::Not(list) => !list.matches(doc, node),
            PseudoClass::Has(relative) => relative.iter().any(|r| r.matches_from(doc, node)),
            PseudoClass::FirstChild => doc.previous_element_sibling(node).is_none(),
            PseudoClass::LastChild => doc.next_element_sibling(node).is_none(),
            PseudoClass::OnlyChild => {
                doc.previous_element_sibling(node).is_none()
                    && doc.next_element_sibling(node).is_none()
            }
            PseudoClass::Empty => doc.children(node).is_empty() && doc.own_text(node).is_empty(),
            PseudoClass::NthChild { a, b } => {
                let Some(parent) = doc.parent(node) else {
                    return false;
                };
                let siblings = doc.element_children(parent);
                let Some(position) = siblings.iter().position(|s| *s == node) else {
                    return false;
                };
                let index = position as i64 + 1;
                if *a == 0 {
                    index == *b
                } else {
                    let n = (index - b) / a;
                    n >= 0 && (index - b) % a == 0
                }
            }
            PseudoClass::Never => false,
        }
    }
}
