//! Compiled output schema shared by the code generator and the runtime

use crate::ast::{CompareOp, PseudoArg};
use crate::runtime::domain::domain_matches;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STYLESHEET_HEADER: &str = "/* veilc compiled stylesheet */";

pub const HIDE_DECLARATION: &str = "display: none !important";
pub const COLLAPSE_DECLARATION: &str =
    "height: 0 !important; overflow: hidden !important; padding: 0 !important; margin: 0 !important";

/// Statically applied rule: a CSS selector and the declarations it receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeRule {
    pub domains: Vec<String>,
    pub selector: String,
    pub declaration: String,
}

impl DeclarativeRule {
    pub fn hide(domains: Vec<String>, selector: impl Into<String>) -> Self {
        Self {
            domains,
            selector: selector.into(),
            declaration: HIDE_DECLARATION.to_string(),
        }
    }
}

/// Rule interpreted by the evaluation engine against the live tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRule {
    pub domains: Vec<String>,
    /// Narrowing selector used to find candidates
    pub css_selector: Option<String>,
    /// Residual filter applied to each candidate
    pub expression: Option<CompiledExpr>,
    pub action: CompiledAction,
    /// Page-level condition from an enclosing `@if` block
    pub condition: Option<RuleCondition>,
}

/// `@if(kind op value)`, e.g. `scroll > 500`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub kind: String,
    pub op: String,
    pub value: String,
}

impl RuleCondition {
    pub fn always() -> Self {
        Self {
            kind: "always".to_string(),
            op: "=".to_string(),
            value: "true".to_string(),
        }
    }

    /// Split the raw condition text on whitespace; anything that does not
    /// have three parts becomes an always-true condition.
    pub fn parse(text: &str) -> Self {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() >= 3 {
            Self {
                kind: parts[0].to_string(),
                op: parts[1].to_string(),
                value: parts[2].to_string(),
            }
        } else {
            Self::always()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CompiledExpr {
    Selector {
        css: String,
    },
    Predicate {
        name: String,
        args: Vec<PseudoArg>,
    },
    Comparison {
        property: String,
        operator: CompareOp,
        value: CompareValue,
    },
    And {
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
    },
    Or {
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
    },
    Not {
        operand: Box<CompiledExpr>,
    },
}

impl CompiledExpr {
    pub fn and(left: CompiledExpr, right: CompiledExpr) -> Self {
        CompiledExpr::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareValue {
    Number(f64),
    Text(String),
    /// Name looked up in the function-call scope, falling back to itself
    Reference(String),
}

/// Built-in action primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Hide,
    Remove,
    Collapse,
    Blur,
    Opacity,
    RemoveParent,
    CleanUrl,
    CleanText,
    Block,
    Delay,
    FadeOut,
    RedirectLink,
    PreventClick,
    ReduceZindex,
    CollapseContainer,
    Speed,
}

/// Statistics bucket an executed action is counted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatCategory {
    Core,
    Cleaner,
    Privacy,
}

impl ActionKind {
    /// Look up a builtin by name. Matching ignores case and dashes, so
    /// `removeParent`, `remove-parent` and `removeparent` are the same action.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        let kind = match normalized.as_str() {
            "hide" => ActionKind::Hide,
            "remove" => ActionKind::Remove,
            "collapse" => ActionKind::Collapse,
            "blur" => ActionKind::Blur,
            "opacity" => ActionKind::Opacity,
            "removeparent" => ActionKind::RemoveParent,
            "cleanurl" => ActionKind::CleanUrl,
            "cleantext" => ActionKind::CleanText,
            "block" => ActionKind::Block,
            "delay" => ActionKind::Delay,
            "fadeout" => ActionKind::FadeOut,
            "redirectlink" => ActionKind::RedirectLink,
            "preventclick" => ActionKind::PreventClick,
            "reducezindex" => ActionKind::ReduceZindex,
            "collapsecontainer" => ActionKind::CollapseContainer,
            "speed" => ActionKind::Speed,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Hide => "hide",
            ActionKind::Remove => "remove",
            ActionKind::Collapse => "collapse",
            ActionKind::Blur => "blur",
            ActionKind::Opacity => "opacity",
            ActionKind::RemoveParent => "remove-parent",
            ActionKind::CleanUrl => "clean-url",
            ActionKind::CleanText => "clean-text",
            ActionKind::Block => "block",
            ActionKind::Delay => "delay",
            ActionKind::FadeOut => "fade-out",
            ActionKind::RedirectLink => "redirect-link",
            ActionKind::PreventClick => "prevent-click",
            ActionKind::ReduceZindex => "reduce-zindex",
            ActionKind::CollapseContainer => "collapse-container",
            ActionKind::Speed => "speed",
        }
    }

    /// Argument used when the script supplies none
    pub fn default_arg(self) -> Option<&'static str> {
        match self {
            ActionKind::Blur => Some("10px"),
            ActionKind::Opacity => Some("0"),
            ActionKind::RemoveParent => Some("1"),
            ActionKind::Delay => Some("0"),
            ActionKind::FadeOut => Some("300"),
            ActionKind::ReduceZindex => Some("10000"),
            ActionKind::Speed => Some("remove"),
            _ => None,
        }
    }

    pub fn category(self) -> StatCategory {
        match self {
            ActionKind::Remove
            | ActionKind::RemoveParent
            | ActionKind::Delay
            | ActionKind::CollapseContainer
            | ActionKind::Speed => StatCategory::Core,
            ActionKind::Hide
            | ActionKind::Collapse
            | ActionKind::Blur
            | ActionKind::Opacity
            | ActionKind::FadeOut
            | ActionKind::ReduceZindex
            | ActionKind::CleanText => StatCategory::Cleaner,
            ActionKind::CleanUrl
            | ActionKind::RedirectLink
            | ActionKind::PreventClick
            | ActionKind::Block => StatCategory::Privacy,
        }
    }

    /// Stylesheet declaration for actions expressible as pure style
    pub fn declaration(self, args: &[String]) -> Option<String> {
        let arg = |kind: ActionKind| {
            args.first()
                .map(String::as_str)
                .or_else(|| kind.default_arg())
                .unwrap_or_default()
                .to_string()
        };

        match self {
            ActionKind::Hide => Some(HIDE_DECLARATION.to_string()),
            ActionKind::Collapse => Some(COLLAPSE_DECLARATION.to_string()),
            ActionKind::Blur => Some(format!("filter: blur({}) !important", arg(self))),
            ActionKind::Opacity => Some(format!("opacity: {} !important", arg(self))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CompiledAction {
    Builtin {
        kind: ActionKind,
        args: Vec<String>,
    },
    /// Rule-function call, or an unknown action name resolved at evaluation time
    Call {
        name: String,
        args: Vec<String>,
    },
    Block {
        actions: Vec<CompiledAction>,
    },
    Guarded {
        action: Box<CompiledAction>,
        condition: CompiledExpr,
    },
}

impl CompiledAction {
    pub fn builtin(kind: ActionKind) -> Self {
        CompiledAction::Builtin {
            kind,
            args: Vec::new(),
        }
    }

    /// Declaration text when the action is pure style (hide, collapse, blur,
    /// opacity, or a block made only of those)
    pub fn declaration(&self) -> Option<String> {
        match self {
            CompiledAction::Builtin { kind, args } => kind.declaration(args),
            CompiledAction::Block { actions } => {
                let parts = actions
                    .iter()
                    .map(CompiledAction::declaration)
                    .collect::<Option<Vec<_>>>()?;
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("; "))
                }
            }
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, CompiledAction::Call { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub params: Vec<String>,
    pub actions: Vec<CompiledAction>,
}

/// Complete compiler output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledRules {
    pub declarative_rules: Vec<DeclarativeRule>,
    pub dynamic_rules: Vec<DynamicRule>,
    pub stylesheet: String,
    pub functions: BTreeMap<String, CompiledFunction>,
}

impl CompiledRules {
    /// Stylesheet containing only the rules whose domain list matches `host`
    pub fn stylesheet_for_host(&self, host: &str) -> String {
        let rules: Vec<&DeclarativeRule> = self
            .declarative_rules
            .iter()
            .filter(|rule| domain_matches(&rule.domains, host))
            .collect();
        render_stylesheet(&rules)
    }

    /// Fold user-stored selectors into the declarative path as global hide
    /// rules and re-render the stylesheet.
    pub fn merge_custom_selectors(&mut self, selectors: &[String]) -> usize {
        let mut added = 0;
        for selector in selectors {
            let selector = selector.trim();
            if selector.is_empty() {
                continue;
            }
            let exists = self.declarative_rules.iter().any(|rule| {
                rule.selector == selector
                    && rule.declaration == HIDE_DECLARATION
                    && rule.domains.iter().any(|d| d == "*")
            });
            if !exists {
                self.declarative_rules
                    .push(DeclarativeRule::hide(vec!["*".to_string()], selector));
                added += 1;
            }
        }

        let all: Vec<&DeclarativeRule> = self.declarative_rules.iter().collect();
        self.stylesheet = render_stylesheet(&all);
        added
    }

    pub fn rule_count(&self) -> usize {
        self.declarative_rules.len() + self.dynamic_rules.len()
    }
}

/// Group rules by declaration (first-appearance order) and render one block
/// per group with de-duplicated selectors.
pub fn render_stylesheet(rules: &[&DeclarativeRule]) -> String {
    if rules.is_empty() {
        return String::new();
    }

    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for rule in rules {
        match groups
            .iter()
            .position(|(declaration, _)| *declaration == rule.declaration)
        {
            Some(index) => {
                let selectors = &mut groups[index].1;
                if !selectors.contains(&rule.selector.as_str()) {
                    selectors.push(rule.selector.as_str());
                }
            }
            None => groups.push((rule.declaration.as_str(), vec![rule.selector.as_str()])),
        }
    }

    let mut css = format!("{}\n\n", STYLESHEET_HEADER);
    for (declaration, selectors) in groups {
        css.push_str(&selectors.join(",\n"));
        css.push_str(" {\n");
        for part in declaration.split("; ") {
            css.push_str("  ");
            css.push_str(part.trim_end_matches(';'));
            css.push_str(";\n");
        }
        css.push_str("}\n\n");
    }
    css
}
