
use proptest::prelude::*;
use strategies::{arb_css_expr, arb_expr, arb_host, arb_tree, document_from};
use veilc::ast::{Expr, LogicalOp, PseudoArg, SelectorKind};
use veilc::codegen::{extract_css, requires_dynamic};
use veilc::optimizer::{cost, ExpressionOptimizer};
use veilc::runtime::domain::domain_matches;
use veilc::runtime::selector::parse_selector_list;
use veilc::runtime::{Document, MemoryDocument, NodeId};

fn optimize(expr: &Expr) -> Expr {
    ExpressionOptimizer::new().optimize(expr)
}

/// Every AND node has its cheaper operand on the left
fn and_nodes_ordered(expr: &Expr) -> bool {
    match expr {
        Expr::Logical { op, left, right } => {
            let here = *op != LogicalOp::And || cost(left) <= cost(right);
            here && and_nodes_ordered(left) && and_nodes_ordered(right)
        }
        Expr::Not(operand) => and_nodes_ordered(operand),
        _ => true,
    }
}

/// Direct evaluation of an extractable expression, leaf by leaf
fn evaluate(doc: &MemoryDocument, node: NodeId, expr: &Expr) -> bool {
    let literal = |selector: &str| doc.matches(node, selector).unwrap();
    match expr {
        Expr::Selector {
            kind: SelectorKind::Literal,
            value,
        } => literal(value),
        Expr::Not(operand) => !evaluate(doc, node, operand),
        Expr::Pseudo { name, args } if name == "has" => {
            let inner = match &args[..] {
                [PseudoArg::Text(inner)] => inner.clone(),
                other => panic!("unexpected :has arguments {:?}", other),
            };
            doc.descendants(node)
                .into_iter()
                .filter(|d| doc.is_element(*d))
                .any(|d| doc.matches(d, &inner).unwrap())
        }
        Expr::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => evaluate(doc, node, left) && evaluate(doc, node, right),
        Expr::Logical {
            op: LogicalOp::Or,
            left,
            right,
        } => evaluate(doc, node, left) || evaluate(doc, node, right),
        other => panic!("not an extractable expression: {}", other),
    }
}

// ---------------------------------------------------------------------------
// Optimizer invariants
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn optimizer_is_idempotent(expr in arb_expr()) {
        let once = optimize(&expr);
        let twice = optimize(&once);
        prop_assert_eq!(&once, &twice, "optimizing twice changed {}", expr);
    }

    #[test]
    fn optimizer_orders_conjunctions_by_cost(expr in arb_expr()) {
        let optimized = optimize(&expr);
        prop_assert!(and_nodes_ordered(&optimized), "unordered conjunction in {}", optimized);
    }

    #[test]
    fn optimizer_collapses_duplicate_conjuncts(expr in arb_expr()) {
        let doubled = Expr::and(expr.clone(), expr.clone());
        prop_assert_eq!(optimize(&doubled), optimize(&expr));
    }

    #[test]
    fn optimizer_cancels_double_negation(expr in arb_expr()) {
        let doubled = Expr::negate(Expr::negate(expr.clone()));
        prop_assert_eq!(optimize(&doubled), optimize(&expr));
    }

    #[test]
    fn optimizer_never_raises_cost(expr in arb_expr()) {
        prop_assert!(cost(&optimize(&expr)) <= cost(&expr));
    }
}

// ---------------------------------------------------------------------------
// CSS extraction soundness
//
// Whatever the compiler lifts into the stylesheet must select exactly the
// elements a full evaluation of the expression would.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn extraction_implies_static(expr in arb_expr()) {
        if extract_css(&expr).is_some() {
            prop_assert!(!requires_dynamic(&expr), "{} extracted but requires evaluation", expr);
        }
    }

    #[test]
    fn extracted_css_matches_evaluation(expr in arb_css_expr(), tree in arb_tree()) {
        let Some(css) = extract_css(&expr) else {
            return Ok(());
        };
        let list = parse_selector_list(&css);
        prop_assert!(list.is_ok(), "extracted {:?} does not parse", css);
        let list = list.unwrap();

        let doc = document_from(tree);
        for root in doc.roots() {
            for node in doc.deep_descendants(root) {
                prop_assert_eq!(
                    list.matches(&doc, node),
                    evaluate(&doc, node, &expr),
                    "{:?} disagrees with {} on <{}>",
                    css,
                    expr,
                    doc.tag_name(node)
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Domain matching
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn wildcard_matches_every_host(host in arb_host()) {
        prop_assert!(domain_matches(&["*".to_string()], &host));
        prop_assert!(domain_matches(&[], &host));
    }

    #[test]
    fn domain_matches_itself_and_subdomains(host in arb_host()) {
        let domains = vec![host.clone()];
        prop_assert!(domain_matches(&domains, &host));
        let www_host = format!("www.{}", host);
        let not_host = format!("not{}", host);
        prop_assert!(domain_matches(&domains, &www_host));
        prop_assert!(domain_matches(&domains, &host.to_uppercase()));
        prop_assert!(!domain_matches(&domains, &not_host));
    }

    #[test]
    fn wildcard_beats_exclusion(host in arb_host()) {
        let domains = vec!["*".to_string(), format!("!{}", host)];
        prop_assert!(domain_matches(&domains, &host));
        let m_host = format!("m.{}", host);
        prop_assert!(domain_matches(&domains, &m_host));
    }

    #[test]
    fn exclusion_rejects_matching_subdomains(host in arb_host()) {
        let domains = vec![host.clone(), format!("!m.{}", host)];
        let www_host = format!("www.{}", host);
        let m_host = format!("m.{}", host);
        prop_assert!(domain_matches(&domains, &www_host));
        prop_assert!(!domain_matches(&domains, &m_host));
    }
}
