use std::fs;
use std::time::Instant;
use tempfile::TempDir;
use veilc::ast::PseudoArg;
use veilc::runtime::{Engine, MemoryDocument};
use veilc::*;

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn page(json: &str) -> MemoryDocument {
    MemoryDocument::from_json(json).unwrap()
}

#[test]
fn pure_style_rule_is_declarative_only() {
    let rules = compile_source(".ad -> hide", "rules.veil").unwrap();

    assert_eq!(
        rules.declarative_rules,
        vec![DeclarativeRule::hide(vec!["*".to_string()], ".ad")]
    );
    assert!(rules.dynamic_rules.is_empty());
    assert!(rules.functions.is_empty());
}

#[test]
fn mixed_rule_gets_dynamic_record_and_fallback() {
    let rules = compile_source(".card && :has-text(\"Sponsored\") -> remove", "rules.veil").unwrap();

    assert_eq!(rules.dynamic_rules.len(), 1);
    let rule = &rules.dynamic_rules[0];
    assert_eq!(rule.css_selector.as_deref(), Some(".card"));
    assert_eq!(
        rule.expression,
        Some(CompiledExpr::Predicate {
            name: "has-text".to_string(),
            args: vec![PseudoArg::text("Sponsored")],
        })
    );
    assert_eq!(rule.action, CompiledAction::builtin(ActionKind::Remove));
    assert!(rule.condition.is_none());

    assert_eq!(
        rules.declarative_rules,
        vec![DeclarativeRule::hide(vec!["*".to_string()], ".card")]
    );
}

#[test]
fn compiled_json_drives_the_engine() {
    let rules = compile_source(".popup -> remove when @width > 400", "rules.veil").unwrap();
    let rules = from_json(&to_json(&rules).unwrap()).unwrap();

    let now = Instant::now();
    let mut engine = Engine::new(rules, now);
    let mut page = page(
        r#"{"host": "example.com", "root": {"tag": "body", "children": [
            {"tag": "div", "attributes": {"class": "popup", "id": "wide"},
             "rect": {"x": 0, "y": 0, "width": 640, "height": 100}},
            {"tag": "div", "attributes": {"class": "popup", "id": "narrow"},
             "rect": {"x": 0, "y": 0, "width": 320, "height": 100}}
        ]}}"#,
    );
    let wide = page.find_first("#wide").unwrap();
    let narrow = page.find_first("#narrow").unwrap();

    let report = engine.notify(&mut page, now).unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.actions_executed, 1);
    assert!(page.is_relocated(wide));
    assert!(!page.is_relocated(narrow));
    assert!(!engine.is_processed(narrow));
}

#[test]
fn imported_function_runs_from_compiled_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, "lib/functions.veil", "fn boxout(n) { removeparent(n) }");
    let main = write(
        &dir,
        "main.veil",
        "@import(\"lib/functions.veil\")\n.trigger -> boxout(2)",
    );
    let output = dir.path().join("main.json");

    let stats = compile_file(&main, &output.to_string_lossy()).unwrap();
    assert_eq!(stats.import_count, 1);
    assert_eq!(stats.function_count, 1);

    let rules = from_json(&fs::read_to_string(&output).unwrap()).unwrap();
    assert!(rules.functions.contains_key("boxout"));

    let now = Instant::now();
    let mut engine = Engine::new(rules, now);
    let mut page = page(
        r#"{"host": "example.com", "root": {"tag": "body", "children": [
            {"tag": "aside", "attributes": {"id": "box"}, "children": [
                {"tag": "div", "children": [{"tag": "a", "attributes": {"class": "trigger"}}]}
            ]}
        ]}}"#,
    );
    let outer = page.find_first("#box").unwrap();

    let report = engine.run_pass(&mut page, now);
    assert_eq!(report.actions_executed, 1);
    assert!(page.is_relocated(outer));

    let again = engine.run_pass(&mut page, now);
    assert_eq!(again.actions_executed, 0);
}

#[test]
fn stylesheet_follows_domain_scopes() {
    let rules = compile_source(
        "@domain(example.com, !forum.example.com) { .sidebar-ad }\n@global { .cookie-banner -> collapse }",
        "rules.veil",
    )
    .unwrap();

    let news = rules.stylesheet_for_host("news.example.com");
    assert!(news.contains(".sidebar-ad"));
    assert!(news.contains(".cookie-banner"));

    let forum = rules.stylesheet_for_host("forum.example.com");
    assert!(!forum.contains(".sidebar-ad"));

    let other = rules.stylesheet_for_host("other.org");
    assert!(!other.contains(".sidebar-ad"));
    assert!(other.contains("height: 0 !important"));
}

#[test]
fn stored_rules_merge_into_stylesheet() {
    let dir = TempDir::new().unwrap();
    let mut store = JsonRuleStore::open(dir.path().join("custom.json")).unwrap();
    store.add(StoredRule::new(".newsletter-popup")).unwrap();
    store
        .add(StoredRule::new(".promo-rail").with_domain("shop.example"))
        .unwrap();

    let options = CompilerOptions {
        custom_selectors: store.enabled_selectors("blog.example.com").unwrap(),
        ..CompilerOptions::default()
    };
    let (rules, stats) = compile_source_with_options(".ad", "rules.veil", options).unwrap();

    assert_eq!(stats.custom_rule_count, 1);
    assert!(rules.stylesheet.contains(".newsletter-popup"));
    assert!(!rules.stylesheet.contains(".promo-rail"));
}

#[test]
fn defined_variables_feed_selectors() {
    let mut options = CompilerOptions::default();
    options
        .custom_variables
        .insert("tracker".to_string(), "img[width=\"1\"]".to_string());

    let (rules, _) = compile_source_with_options(
        "$ads = .sponsored\n$ads -> hide\n$tracker -> hide",
        "rules.veil",
        options,
    )
    .unwrap();

    let resolved: Vec<_> = rules
        .dynamic_rules
        .iter()
        .map(|rule| rule.expression.clone())
        .collect();
    assert_eq!(
        resolved,
        vec![
            Some(CompiledExpr::Selector {
                css: ".sponsored".to_string()
            }),
            Some(CompiledExpr::Selector {
                css: "img[width=\"1\"]".to_string()
            }),
        ]
    );
}

#[test]
fn compile_errors_are_reported_with_location() {
    let err = compile_source("$nope -> hide", "rules.veil").unwrap_err();
    assert!(matches!(err, CompilerError::Semantic { line: 1, .. }));

    let err = compile_source("@global {\n.a\n", "rules.veil").unwrap_err();
    assert!(matches!(err, CompilerError::Syntax { .. }));
}

#[test]
fn circular_imports_fail() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.veil", "@import(\"b.veil\")\n.a");
    write(&dir, "b.veil", "@import(\"a.veil\")\n.b");
    let a = dir.path().join("a.veil");

    let source = fs::read_to_string(&a).unwrap();
    let err = compile_source(&source, &a.to_string_lossy()).unwrap_err();
    assert!(matches!(err, CompilerError::Import { .. }));
}
