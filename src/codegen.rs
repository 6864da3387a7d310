//! Rule code generation
//!
//! Every rule is partitioned between the declarative fast path (a CSS
//! selector plus declarations, applied by the stylesheet) and a dynamic rule
//! record interpreted by the evaluation engine. Mixed rules get both: the
//! extractable part of the selector narrows the dynamic candidates and, when
//! safe, hides them immediately through a fallback declaration.

use crate::ast::*;
use crate::error::{CompilerError, Result};
use crate::optimizer::ExpressionOptimizer;
use crate::symbols::SymbolTable;
use crate::types::*;
use std::collections::BTreeMap;

pub struct CodeGenerator {
    file: String,
    symbols: SymbolTable,
    optimizer: ExpressionOptimizer,
    optimize: bool,
    domains: Vec<String>,
    condition: Option<RuleCondition>,
    declarative_rules: Vec<DeclarativeRule>,
    dynamic_rules: Vec<DynamicRule>,
    functions: BTreeMap<String, CompiledFunction>,
}

impl CodeGenerator {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            symbols: SymbolTable::new(),
            optimizer: ExpressionOptimizer::new(),
            optimize: true,
            domains: vec!["*".to_string()],
            condition: None,
            declarative_rules: Vec::new(),
            dynamic_rules: Vec::new(),
            functions: BTreeMap::new(),
        }
    }

    /// Skip the expression optimizer (optimization level 0)
    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }

    pub fn generate(&mut self, program: &Program) -> Result<CompiledRules> {
        self.symbols = program.symbols.clone();
        self.compile_statements(&program.body)?;

        let declarative_rules = std::mem::take(&mut self.declarative_rules);
        let rules: Vec<&DeclarativeRule> = declarative_rules.iter().collect();
        let stylesheet = render_stylesheet(&rules);

        log::debug!(
            "Generated {} declarative and {} dynamic rules, {} functions ({} optimizer rewrites)",
            declarative_rules.len(),
            self.dynamic_rules.len(),
            self.functions.len(),
            self.optimizer.rewrite_count()
        );

        Ok(CompiledRules {
            declarative_rules,
            dynamic_rules: std::mem::take(&mut self.dynamic_rules),
            stylesheet,
            functions: std::mem::take(&mut self.functions),
        })
    }

    pub fn optimizations_applied(&self) -> usize {
        self.optimizer.rewrite_count()
    }

    fn compile_statements(&mut self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            match statement {
                Statement::VariableDeclaration { .. } => {}
                Statement::Domain { domains, body } => {
                    self.with_domains(domains.clone(), body)?;
                }
                Statement::Global { body } => {
                    self.with_domains(vec!["*".to_string()], body)?;
                }
                Statement::Group { name, body } => {
                    log::debug!("Compiling group '{}'", name);
                    self.compile_statements(body)?;
                }
                Statement::Condition { condition, body } => {
                    let saved = self.condition.replace(RuleCondition::parse(condition));
                    let result = self.compile_statements(body);
                    self.condition = saved;
                    result?;
                }
                Statement::Function(def) => self.compile_function(def)?,
                Statement::Import { path, line } => {
                    log::warn!(
                        "Skipping @import(\"{}\") at {}:{}: imports need a file context",
                        path,
                        self.file,
                        line
                    );
                }
                Statement::Rule(rule) => self.compile_rule(rule)?,
            }
        }
        Ok(())
    }

    fn with_domains(&mut self, domains: Vec<String>, body: &[Statement]) -> Result<()> {
        let saved = std::mem::replace(&mut self.domains, domains);
        let result = self.compile_statements(body);
        self.domains = saved;
        result
    }

    fn compile_function(&mut self, def: &FunctionDef) -> Result<()> {
        let actions = def
            .body
            .iter()
            .map(|node| self.compile_action(node, def.line))
            .collect::<Result<Vec<_>>>()?;

        self.functions.insert(
            def.name.clone(),
            CompiledFunction {
                params: def.params.clone(),
                actions,
            },
        );
        Ok(())
    }

    fn compile_rule(&mut self, rule: &Rule) -> Result<()> {
        let selector = self.optimize_expr(&rule.selector);
        let action = self.compile_action(&rule.action, rule.line)?;

        if let Some(condition) = self.condition.clone() {
            let (css_selector, expression) = self.split_selector(&selector, rule.line)?;
            self.dynamic_rules.push(DynamicRule {
                domains: self.domains.clone(),
                css_selector,
                expression,
                action,
                condition: Some(condition),
            });
            return Ok(());
        }

        if let (Some(selector), Some(declaration)) = (extract_css(&selector), action.declaration()) {
            self.declarative_rules.push(DeclarativeRule {
                domains: self.domains.clone(),
                selector,
                declaration,
            });
            return Ok(());
        }

        let (css_selector, expression) = self.split_selector(&selector, rule.line)?;
        if let Some(css) = &css_selector {
            if !css.contains(":has(") && !action.is_call() {
                self.declarative_rules
                    .push(DeclarativeRule::hide(self.domains.clone(), css.clone()));
            }
        }

        self.dynamic_rules.push(DynamicRule {
            domains: self.domains.clone(),
            css_selector,
            expression,
            action,
            condition: None,
        });
        Ok(())
    }

    fn optimize_expr(&mut self, expr: &Expr) -> Expr {
        if self.optimize {
            self.optimizer.optimize(expr)
        } else {
            expr.clone()
        }
    }

    /// Extractable conjuncts of the top-level AND chain become the narrowing
    /// selector; the rest form the residual expression.
    fn split_selector(
        &self,
        expr: &Expr,
        line: usize,
    ) -> Result<(Option<String>, Option<CompiledExpr>)> {
        let mut css: Option<String> = None;
        let mut residual = Vec::new();

        for conjunct in expr.conjuncts() {
            match (extract_css(conjunct), &css) {
                (Some(part), None) => css = Some(part),
                (Some(part), Some(existing)) => match combine_compound(existing, &part) {
                    Some(combined) => css = Some(combined),
                    None => residual.push(conjunct),
                },
                (None, _) => residual.push(conjunct),
            }
        }

        let expression = residual
            .into_iter()
            .map(|e| self.compile_expr(e, line))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .reduce(CompiledExpr::and);

        Ok((css, expression))
    }

    fn compile_expr(&self, expr: &Expr, line: usize) -> Result<CompiledExpr> {
        match expr {
            Expr::Selector {
                kind: SelectorKind::Literal,
                value,
            } => Ok(CompiledExpr::Selector { css: value.clone() }),
            Expr::Selector {
                kind: SelectorKind::Variable,
                value,
            } => Ok(CompiledExpr::Selector {
                css: self.resolve_variable(value, line)?,
            }),
            Expr::Pseudo { name, args } => match has_selector(name, args) {
                Some(css) => Ok(CompiledExpr::Selector { css }),
                None => Ok(CompiledExpr::Predicate {
                    name: name.clone(),
                    args: args.clone(),
                }),
            },
            Expr::Logical { op, left, right } => {
                let left = Box::new(self.compile_expr(left, line)?);
                let right = Box::new(self.compile_expr(right, line)?);
                Ok(match op {
                    LogicalOp::And => CompiledExpr::And { left, right },
                    LogicalOp::Or => CompiledExpr::Or { left, right },
                })
            }
            Expr::Not(operand) => Ok(CompiledExpr::Not {
                operand: Box::new(self.compile_expr(operand, line)?),
            }),
            Expr::Comparison {
                property,
                operator,
                value,
            } => {
                let value = match value {
                    Operand::Number(n) => CompareValue::Number(*n),
                    Operand::Text(t) => CompareValue::Text(t.clone()),
                    Operand::Reference(r) => CompareValue::Reference(r.clone()),
                    Operand::Variable(name) => {
                        let resolved = self.resolve_variable(name, line)?;
                        match resolved.parse::<f64>() {
                            Ok(n) => CompareValue::Number(n),
                            Err(_) => CompareValue::Text(resolved),
                        }
                    }
                };
                Ok(CompiledExpr::Comparison {
                    property: property.clone(),
                    operator: *operator,
                    value,
                })
            }
        }
    }

    fn compile_action(&mut self, node: &ActionNode, line: usize) -> Result<CompiledAction> {
        match node {
            ActionNode::Single(action) => self.compile_single_action(action),
            ActionNode::Block(actions) => Ok(CompiledAction::Block {
                actions: actions
                    .iter()
                    .map(|a| self.compile_single_action(a))
                    .collect::<Result<Vec<_>>>()?,
            }),
            ActionNode::Guarded { action, condition } => {
                let action = Box::new(self.compile_action(action, line)?);
                let condition = self.optimize_expr(condition);
                Ok(CompiledAction::Guarded {
                    action,
                    condition: self.compile_expr(&condition, line)?,
                })
            }
        }
    }

    fn compile_single_action(&self, action: &Action) -> Result<CompiledAction> {
        let (name, args) = if action.is_variable {
            let value = self.resolve_variable(&action.name, action.line)?;
            let (name, mut embedded) = split_call(&value);
            // Explicit arguments win over ones baked into the variable
            if !action.args.is_empty() {
                embedded = action.args.clone();
            }
            (name, embedded)
        } else {
            (action.name.clone(), action.args.clone())
        };

        if self.symbols.has_function(&name) {
            return Ok(CompiledAction::Call { name, args });
        }

        match ActionKind::from_name(&name) {
            Some(kind) => Ok(CompiledAction::Builtin { kind, args }),
            None => {
                log::debug!(
                    "Action '{}' at {}:{} is not a builtin; deferring to evaluation",
                    name,
                    self.file,
                    action.line
                );
                Ok(CompiledAction::Call { name, args })
            }
        }
    }

    fn resolve_variable(&self, name: &str, line: usize) -> Result<String> {
        self.symbols
            .variable(name)
            .map(str::to_string)
            .ok_or_else(|| {
                CompilerError::semantic(&self.file, line, format!("Undefined variable: ${}", name))
            })
    }
}

/// `blur(5px)` → (`blur`, [`5px`]); a bare name has no arguments
fn split_call(text: &str) -> (String, Vec<String>) {
    let text = text.trim();
    match (text.find('('), text.strip_suffix(')')) {
        (Some(open), Some(inner)) => {
            let args = inner[open + 1..]
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            (text[..open].trim().to_string(), args)
        }
        _ => (text.to_string(), Vec::new()),
    }
}

/// `:has(a, b)` / `:has-child(a, b)` with textual arguments compile to CSS
fn has_selector(name: &str, args: &[PseudoArg]) -> Option<String> {
    if name != "has" && name != "has-child" {
        return None;
    }
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            PseudoArg::Text(inner) if !inner.trim().is_empty() => parts.push(inner.trim()),
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| format!(":has({})", parts.join(", ")))
}

/// CSS text equivalent to `expr`, when one exists
pub fn extract_css(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Selector {
            kind: SelectorKind::Literal,
            value,
        } => {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        Expr::Selector {
            kind: SelectorKind::Variable,
            ..
        } => None,
        Expr::Pseudo { name, args } => has_selector(name, args),
        Expr::Not(operand) => match operand.as_ref() {
            Expr::Selector {
                kind: SelectorKind::Literal,
                value,
            } if !value.trim().is_empty() && !has_top_level_comma(value) => {
                Some(format!(":not({})", value.trim()))
            }
            _ => None,
        },
        Expr::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => combine_compound(&extract_css(left)?, &extract_css(right)?),
        Expr::Logical {
            op: LogicalOp::Or,
            left,
            right,
        } => Some(format!("{}, {}", extract_css(left)?, extract_css(right)?)),
        Expr::Comparison { .. } => None,
    }
}

/// Whether an expression needs the evaluation engine regardless of how its
/// parts combine. `extract_css(e).is_some()` implies `!requires_dynamic(e)`.
pub fn requires_dynamic(expr: &Expr) -> bool {
    match expr {
        Expr::Selector {
            kind: SelectorKind::Literal,
            value,
        } => value.trim().is_empty(),
        Expr::Selector {
            kind: SelectorKind::Variable,
            ..
        } => true,
        Expr::Pseudo { name, args } => has_selector(name, args).is_none(),
        Expr::Comparison { .. } => true,
        Expr::Not(operand) => match operand.as_ref() {
            Expr::Selector {
                kind: SelectorKind::Literal,
                value,
            } => value.trim().is_empty() || has_top_level_comma(value),
            _ => true,
        },
        Expr::Logical { left, right, .. } => requires_dynamic(left) || requires_dynamic(right),
    }
}

/// Concatenate two selectors into one compound that matches their
/// intersection. Fails for selector lists, for two selectors that both
/// contain combinators, and for two type selectors in one compound.
pub fn combine_compound(a: &str, b: &str) -> Option<String> {
    let (a, b) = (a.trim(), b.trim());
    if has_top_level_comma(a) || has_top_level_comma(b) {
        return None;
    }

    let (base, suffix) = match (has_combinator(a), has_combinator(b)) {
        (true, true) => return None,
        (false, true) => (b, a),
        _ => (a, b),
    };

    if starts_with_type(suffix) {
        let start = last_compound_start(base);
        if starts_with_type(&base[start..]) {
            return None;
        }
        Some(format!("{}{}{}", &base[..start], suffix, &base[start..]))
    } else {
        Some(format!("{}{}", base, suffix))
    }
}

fn starts_with_type(selector: &str) -> bool {
    selector
        .chars()
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '*')
}

/// Walk `selector` outside of brackets, parentheses and quotes
fn for_each_top_level(selector: &str, mut visit: impl FnMut(usize, char) -> bool) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (index, c) in selector.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                continue;
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                continue;
            }
            None => {}
        }
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                if !visit(index, c) {
                    return;
                }
            }
            _ => {}
        }
    }
}

fn has_top_level_comma(selector: &str) -> bool {
    let mut found = false;
    for_each_top_level(selector, |_, c| {
        found = c == ',';
        !found
    });
    found
}

fn is_combinator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '>' | '+' | '~')
}

fn has_combinator(selector: &str) -> bool {
    let mut found = false;
    for_each_top_level(selector, |_, c| {
        found = is_combinator(c);
        !found
    });
    found
}

/// Byte index where the last compound of `selector` begins
fn last_compound_start(selector: &str) -> usize {
    let mut start = 0;
    for_each_top_level(selector, |index, c| {
        if is_combinator(c) {
            start = index + c.len_utf8();
        }
        true
    });
    start
}
