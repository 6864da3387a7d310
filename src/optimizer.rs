//! Selector expression optimizer
//!
//! A bottom-up rewrite over [`Expr`]: double negations cancel, identical
//! conjuncts collapse, and conjunctions are commuted so the cheaper side is
//! evaluated first. The output is a fixed point: optimizing it again yields
//! the same tree.

use crate::ast::{Expr, LogicalOp, SelectorKind};

/// Relative evaluation cost of a named pseudo-selector
pub fn pseudo_cost(name: &str) -> u32 {
    match name {
        "has" | "has-child" => 3,
        "visible" | "viewport" => 10,
        "has-text" => 8,
        "aspect-ratio" | "common-dimensions" | "sticky" | "empty-after-block" => 5,
        "layout-shift" => 15,
        "auto-play" => 7,
        "opens-popup" | "promoted-content" => 10,
        "lazy-loaded" | "contains-image" | "countdown-timer" => 6,
        "scroll-triggered" => 12,
        "external-domain" | "sibling-match" => 4,
        "distraction-score" => 20,
        "overlay-modal" => 8,
        _ => 5,
    }
}

/// Estimated cost of evaluating an expression against one element
pub fn cost(expr: &Expr) -> u32 {
    match expr {
        Expr::Selector {
            kind: SelectorKind::Literal | SelectorKind::Variable,
            ..
        } => 1,
        Expr::Pseudo { name, .. } => pseudo_cost(name),
        Expr::Comparison { .. } => 4,
        Expr::Logical { left, right, .. } => cost(left) + cost(right),
        Expr::Not(operand) => cost(operand) + 1,
    }
}

#[derive(Debug, Default)]
pub struct ExpressionOptimizer {
    optimizations_applied: Vec<String>,
}

impl ExpressionOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn optimize(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Logical { op, left, right } => {
                let left = self.optimize(left);
                let right = self.optimize(right);

                if *op == LogicalOp::And {
                    if left == right {
                        self.record(format!("dedup {}", left));
                        return left;
                    }
                    if cost(&left) > cost(&right) {
                        self.record(format!("commute {} && {}", left, right));
                        return Expr::and(right, left);
                    }
                }

                Expr::Logical {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            Expr::Not(operand) => match self.optimize(operand) {
                Expr::Not(inner) => {
                    self.record(format!("double negation !!{}", inner));
                    *inner
                }
                optimized => Expr::negate(optimized),
            },
            leaf => leaf.clone(),
        }
    }

    fn record(&mut self, description: String) {
        log::debug!("Optimizer: {}", description);
        self.optimizations_applied.push(description);
    }

    /// Descriptions of the rewrites performed so far
    pub fn applied(&self) -> &[String] {
        &self.optimizations_applied
    }

    pub fn rewrite_count(&self) -> usize {
        self.optimizations_applied.len()
    }
}
