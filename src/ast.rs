//! Abstract Syntax Tree types for Veil rule scripts

use crate::symbols::SymbolTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed source unit together with the symbols it declared
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Statement>,
    pub symbols: SymbolTable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `$name = value`
    VariableDeclaration {
        name: String,
        value: String,
        line: usize,
    },

    /// `@domain(a.com, *.b.org, !c.net) { ... }`
    Domain {
        domains: Vec<String>,
        body: Vec<Statement>,
    },

    /// `@global { ... }`
    Global { body: Vec<Statement> },

    /// `@group("name") { ... }`
    Group { name: String, body: Vec<Statement> },

    /// `@if(scroll > 500) { ... }`
    Condition {
        condition: String,
        body: Vec<Statement>,
    },

    /// `fn name(params) { actions }`
    Function(FunctionDef),

    /// `@import("path")`
    Import { path: String, line: usize },

    Rule(Rule),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<ActionNode>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selector: Expr,
    pub action: ActionNode,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Literal,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Selector expression. Every node is side-effect-free, so structural
/// equality is semantic equality for deduplication.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Selector {
        kind: SelectorKind,
        value: String,
    },
    Pseudo {
        name: String,
        args: Vec<PseudoArg>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Comparison {
        property: String,
        operator: CompareOp,
        value: Operand,
    },
}

impl Expr {
    pub fn literal(value: impl Into<String>) -> Self {
        Expr::Selector {
            kind: SelectorKind::Literal,
            value: value.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expr::Selector {
            kind: SelectorKind::Variable,
            value: name.into(),
        }
    }

    pub fn pseudo(name: impl Into<String>, args: Vec<PseudoArg>) -> Self {
        Expr::Pseudo {
            name: name.into(),
            args,
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Not(Box::new(operand))
    }

    /// Flatten a left- or right-nested AND chain into its conjuncts
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Logical {
                op: LogicalOp::And,
                left,
                right,
            } => {
                let mut parts = left.conjuncts();
                parts.extend(right.conjuncts());
                parts
            }
            other => vec![other],
        }
    }
}

/// Pseudo-selector argument: raw text, or a regex literal kept intact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PseudoArg {
    Regex { pattern: String, flags: String },
    Text(String),
}

impl PseudoArg {
    pub fn text(value: impl Into<String>) -> Self {
        PseudoArg::Text(value.into())
    }

    /// Text form of the argument; regexes render as `/pattern/flags`
    pub fn as_text(&self) -> String {
        match self {
            PseudoArg::Text(t) => t.clone(),
            PseudoArg::Regex { pattern, flags } => format!("/{}/{}", pattern, flags),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "matches")]
    Matches,
}

impl CompareOp {
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(CompareOp::Contains),
            "startsWith" => Some(CompareOp::StartsWith),
            "endsWith" => Some(CompareOp::EndsWith),
            "matches" => Some(CompareOp::Matches),
            _ => None,
        }
    }

    pub fn is_method(self) -> bool {
        matches!(
            self,
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith | CompareOp::Matches
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::Greater => ">",
            CompareOp::LessEqual => "<=",
            CompareOp::GreaterEqual => ">=",
            CompareOp::Equal => "==",
            CompareOp::Contains => "contains",
            CompareOp::StartsWith => "startsWith",
            CompareOp::EndsWith => "endsWith",
            CompareOp::Matches => "matches",
        }
    }
}

/// Right-hand side of a property comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Text(String),
    /// Bare identifier, resolved against function scope at evaluation time
    Reference(String),
    /// `$name`, resolved through the symbol table at compile time
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub args: Vec<String>,
    /// Name was written as `$var` and resolves through the symbol table
    pub is_variable: bool,
    pub line: usize,
}

impl Action {
    pub fn new(name: impl Into<String>, args: Vec<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            args,
            is_variable: false,
            line,
        }
    }

    /// Implicit action for rules written without one
    pub fn default_hide(line: usize) -> Self {
        Self::new("hide", Vec::new(), line)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionNode {
    Single(Action),
    Block(Vec<Action>),
    Guarded {
        action: Box<ActionNode>,
        condition: Expr,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Selector {
                kind: SelectorKind::Literal,
                value,
            } => write!(f, "{}", value),
            Expr::Selector {
                kind: SelectorKind::Variable,
                value,
            } => write!(f, "${}", value),
            Expr::Pseudo { name, args } => {
                write!(f, ":{}", name)?;
                if !args.is_empty() {
                    let rendered: Vec<String> = args
                        .iter()
                        .map(|arg| match arg {
                            PseudoArg::Text(t) => format!("{:?}", t),
                            regex => regex.as_text(),
                        })
                        .collect();
                    write!(f, "({})", rendered.join(", "))?;
                }
                Ok(())
            }
            Expr::Logical { op, left, right } => {
                let glyph = match op {
                    LogicalOp::And => "&&",
                    LogicalOp::Or => "||",
                };
                write!(f, "({} {} {})", left, glyph, right)
            }
            Expr::Not(inner) => write!(f, "!{}", inner),
            Expr::Comparison {
                property,
                operator,
                value,
            } => {
                if operator.is_method() {
                    write!(f, "@{}.{}({})", property, operator.as_str(), value)
                } else {
                    write!(f, "@{} {} {}", property, operator.as_str(), value)
                }
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Text(t) => write!(f, "{:?}", t),
            Operand::Reference(r) => write!(f, "{}", r),
            Operand::Variable(v) => write!(f, "${}", v),
        }
    }
}
