//! Rule evaluation engine
//!
//! Interprets compiled dynamic rules against a live [`Document`]. Each pass
//! walks every root (main document, then accessible frames), finds the
//! candidates for each rule, filters them through the residual expression
//! and runs the rule's action on elements not yet processed. An element is
//! only marked processed once an action actually executed on it, so failed
//! guards are retried on later passes.

pub mod actions;
pub mod compare;
pub mod document;
pub mod domain;
pub mod memory;
pub mod predicates;
pub mod scheduler;
pub mod selector;

pub use actions::{ActionExecutor, Deferred, Effect};
pub use document::{Document, NodeId, PageState, Rect};
pub use memory::{MemoryDocument, NodeSpec, Snapshot};
pub use predicates::{PredicateLibrary, PredicateMemory, StandardPredicates};
pub use scheduler::PassScheduler;

use crate::ast::PseudoArg;
use crate::types::{CompareValue, CompiledAction, CompiledExpr, CompiledRules, DynamicRule, StatCategory};
use compare::{compare, property_value};
use domain::{condition_holds, domain_matches};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Nested rule-function calls allowed before a rule is abandoned
pub const MAX_CALL_DEPTH: usize = 32;

/// Faults contained to the rule that raised them
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Call to '{name}' exceeded the nesting limit of {limit}")]
    RecursionLimit { name: String, limit: usize },
}

/// Outcome of one evaluation pass. Rule counters are per root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub rules_evaluated: usize,
    pub rules_skipped: usize,
    pub rules_failed: usize,
    pub candidates: usize,
    pub actions_executed: usize,
}

/// Cumulative executed actions by category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub core: usize,
    pub cleaner: usize,
    pub privacy: usize,
    pub passes: usize,
}

impl EngineStats {
    pub fn total(&self) -> usize {
        self.core + self.cleaner + self.privacy
    }

    fn record(&mut self, category: StatCategory) {
        match category {
            StatCategory::Core => self.core += 1,
            StatCategory::Cleaner => self.cleaner += 1,
            StatCategory::Privacy => self.privacy += 1,
        }
    }
}

/// Parameter bindings of the rule function being executed
type Scope = HashMap<String, String>;

pub struct Engine {
    rules: Arc<CompiledRules>,
    predicates: Box<dyn PredicateLibrary>,
    processed: HashSet<NodeId>,
    match_cache: HashMap<(NodeId, String), bool>,
    memory: PredicateMemory,
    scheduler: PassScheduler,
    deferred: Vec<(Instant, Deferred)>,
    stats: EngineStats,
    started: Instant,
    pass_time: Instant,
}

impl Engine {
    pub fn new(rules: CompiledRules, now: Instant) -> Self {
        Self {
            rules: Arc::new(rules),
            predicates: Box::new(StandardPredicates::new()),
            processed: HashSet::new(),
            match_cache: HashMap::new(),
            memory: PredicateMemory::new(),
            scheduler: PassScheduler::default(),
            deferred: Vec::new(),
            stats: EngineStats::default(),
            started: now,
            pass_time: now,
        }
    }

    pub fn with_predicates(mut self, predicates: Box<dyn PredicateLibrary>) -> Self {
        self.predicates = predicates;
        self
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.scheduler = PassScheduler::new(window);
        self
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    /// Declarative stylesheet for `host`
    pub fn stylesheet(&self, host: &str) -> String {
        self.rules.stylesheet_for_host(host)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn is_processed(&self, node: NodeId) -> bool {
        self.processed.contains(&node)
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do
    pub fn next_wakeup(&self) -> Option<Instant> {
        let deferred = self.deferred.iter().map(|(due, _)| *due).min();
        match (deferred, self.scheduler.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Change notification. Runs a pass immediately the first time, and
    /// otherwise schedules one for [`tick`](Self::tick).
    pub fn notify<P>(&mut self, page: &mut P, now: Instant) -> Option<PassReport>
    where
        P: Document + ActionExecutor,
    {
        if self.scheduler.notify(now) {
            Some(self.run_pass(page, now))
        } else {
            None
        }
    }

    /// Land due deferred effects and run the scheduled pass if it is due
    pub fn tick<P>(&mut self, page: &mut P, now: Instant) -> Option<PassReport>
    where
        P: Document + ActionExecutor,
    {
        self.flush_deferred(page, now);
        if self.scheduler.poll(now) {
            Some(self.run_pass(page, now))
        } else {
            None
        }
    }

    /// Forget every processed element and all predicate memory
    pub fn restart(&mut self, now: Instant) {
        self.processed.clear();
        self.match_cache.clear();
        self.memory.clear();
        self.scheduler.reset();
        self.deferred.clear();
        self.started = now;
        log::debug!("Engine restarted");
    }

    pub fn run_pass<P>(&mut self, page: &mut P, now: Instant) -> PassReport
    where
        P: Document + ActionExecutor,
    {
        self.flush_deferred(page, now);
        self.match_cache.clear();
        self.pass_time = now;
        self.memory.now_ms = now.saturating_duration_since(self.started).as_millis() as u64;

        let rules = Arc::clone(&self.rules);
        let host = page.host().to_string();
        let state = page.page();
        let mut report = PassReport::default();

        for root in page.roots() {
            for rule in &rules.dynamic_rules {
                if !domain_matches(&rule.domains, &host)
                    || !condition_holds(rule.condition.as_ref(), &state)
                {
                    report.rules_skipped += 1;
                    continue;
                }

                report.rules_evaluated += 1;
                if let Err(e) = self.run_rule(page, root, rule, &mut report) {
                    log::warn!(
                        "Skipping rule '{}' for this pass: {}",
                        rule.css_selector.as_deref().unwrap_or("*"),
                        e
                    );
                    report.rules_failed += 1;
                }
            }
        }

        self.stats.passes += 1;
        log::debug!(
            "Pass {}: {} rules, {} candidates, {} actions",
            self.stats.passes,
            report.rules_evaluated,
            report.candidates,
            report.actions_executed
        );
        report
    }

    fn run_rule<P>(
        &mut self,
        page: &mut P,
        root: NodeId,
        rule: &DynamicRule,
        report: &mut PassReport,
    ) -> Result<(), EvalError>
    where
        P: Document + ActionExecutor,
    {
        let candidates = match &rule.css_selector {
            Some(css) => page.query_all(root, css)?,
            None => page.deep_descendants(root),
        };

        let scope = Scope::new();
        let mut matched = Vec::new();
        for node in candidates {
            if self.processed.contains(&node) {
                continue;
            }
            let keep = match &rule.expression {
                Some(expr) => self.eval_expr(&*page, node, expr, &scope),
                None => true,
            };
            if keep {
                matched.push(node);
            }
        }
        report.candidates += matched.len();

        for node in matched {
            // Effects that landed before a failure still count
            let mut executed = 0;
            let outcome = self.execute(page, node, &rule.action, &scope, 0, &mut executed);
            if executed > 0 {
                self.processed.insert(node);
                report.actions_executed += executed;
            }
            outcome?;
        }
        Ok(())
    }

    fn eval_expr(
        &mut self,
        page: &dyn Document,
        node: NodeId,
        expr: &CompiledExpr,
        scope: &Scope,
    ) -> bool {
        match expr {
            CompiledExpr::And { left, right } => {
                self.eval_expr(page, node, left, scope) && self.eval_expr(page, node, right, scope)
            }
            CompiledExpr::Or { left, right } => {
                self.eval_expr(page, node, left, scope) || self.eval_expr(page, node, right, scope)
            }
            CompiledExpr::Not { operand } => !self.eval_expr(page, node, operand, scope),
            CompiledExpr::Selector { css } => {
                let key = (node, css.clone());
                if let Some(hit) = self.match_cache.get(&key) {
                    return *hit;
                }
                let result = page.matches(node, css).unwrap_or_else(|e| {
                    log::debug!("{}", e);
                    false
                });
                self.match_cache.insert(key, result);
                result
            }
            CompiledExpr::Predicate { name, args } => {
                let args: Vec<PseudoArg> = args
                    .iter()
                    .map(|arg| match arg {
                        PseudoArg::Text(text) => PseudoArg::Text(resolve(text, scope)),
                        regex => regex.clone(),
                    })
                    .collect();
                match self
                    .predicates
                    .evaluate(page, node, name, &args, &mut self.memory)
                {
                    Some(result) => result,
                    None => {
                        log::debug!("Unknown predicate ':{}' treated as a match", name);
                        true
                    }
                }
            }
            CompiledExpr::Comparison {
                property,
                operator,
                value,
            } => {
                let right = match value {
                    CompareValue::Number(n) => n.to_string(),
                    CompareValue::Text(t) => t.clone(),
                    CompareValue::Reference(name) => resolve(name, scope),
                };
                compare(&property_value(page, node, property), *operator, &right)
            }
        }
    }

    /// Adds the number of actions that executed to `executed`
    fn execute<P>(
        &mut self,
        page: &mut P,
        node: NodeId,
        action: &CompiledAction,
        scope: &Scope,
        depth: usize,
        executed: &mut usize,
    ) -> Result<(), EvalError>
    where
        P: Document + ActionExecutor,
    {
        match action {
            CompiledAction::Builtin { kind, args } => {
                let args: Vec<String> = args.iter().map(|a| resolve(a, scope)).collect();
                let mut deferred = Vec::new();
                let performed = actions::perform(page, node, *kind, &args, &mut deferred);
                let now = self.pass_time;
                self.deferred
                    .extend(deferred.into_iter().map(|d| (now + d.delay, d)));
                if performed {
                    self.stats.record(kind.category());
                    *executed += 1;
                }
                Ok(())
            }
            CompiledAction::Call { name, args } => {
                let rules = Arc::clone(&self.rules);
                let Some(function) = rules.functions.get(name) else {
                    log::debug!("No builtin or function named '{}'", name);
                    return Ok(());
                };
                if depth >= MAX_CALL_DEPTH {
                    return Err(EvalError::RecursionLimit {
                        name: name.clone(),
                        limit: MAX_CALL_DEPTH,
                    });
                }

                let mut inner = scope.clone();
                for (index, param) in function.params.iter().enumerate() {
                    let value = args
                        .get(index)
                        .map(|arg| resolve(arg, scope))
                        .unwrap_or_default();
                    inner.insert(param.clone(), value);
                }

                for action in &function.actions {
                    self.execute(page, node, action, &inner, depth + 1, executed)?;
                }
                Ok(())
            }
            CompiledAction::Block { actions } => {
                for action in actions {
                    self.execute(page, node, action, scope, depth, executed)?;
                }
                Ok(())
            }
            CompiledAction::Guarded { action, condition } => {
                if self.eval_expr(&*page, node, condition, scope) {
                    self.execute(page, node, action, scope, depth, executed)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn flush_deferred<P>(&mut self, page: &mut P, now: Instant)
    where
        P: Document + ActionExecutor,
    {
        if self.deferred.is_empty() {
            return;
        }
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.deferred = pending;
        for (_, deferred) in due {
            page.apply(deferred.target, &deferred.effect);
        }
    }
}

/// A bare name bound in `scope` resolves to its value
fn resolve(text: &str, scope: &Scope) -> String {
    scope
        .get(text)
        .cloned()
        .unwrap_or_else(|| text.to_string())
}
