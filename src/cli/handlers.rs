// FILE: src/cli/handlers.rs
use crate::{
    cli::OutputFormat,
    compile_source_with_options, from_json, to_json,
    runtime::{Document, Engine, MemoryDocument, PassReport, PassScheduler, Snapshot},
    store::{JsonRuleStore, RuleStore, StoredRule},
    CompilationStats, CompiledRules, CompilerError, CompilerOptions, Result,
};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

fn required<'a>(matches: &'a clap::ArgMatches, name: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| CompilerError::InvalidFormat {
            message: format!("Missing required argument <{}>", name),
        })
}

fn write_output(path: &str, content: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

fn read_source(path: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| CompilerError::FileNotFound {
        path: format!("{}: {}", path, e),
    })
}

fn watch_paths(paths: &[&str]) -> Result<(RecommendedWatcher, Receiver<Event>)> {
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if let Err(e) = tx.send(event) {
                    eprintln!("Watch error: {}", e);
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| {
        CompilerError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to create file watcher: {}", e),
        ))
    })?;

    for path in paths {
        watcher
            .watch(Path::new(path), RecursiveMode::NonRecursive)
            .map_err(|e| {
                CompilerError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to watch {}: {}", path, e),
                ))
            })?;
    }

    Ok((watcher, rx))
}

// --- COMPILE ---
struct CompileJob {
    input: String,
    output: String,
    css: Option<String>,
    format: OutputFormat,
    host: Option<String>,
}

pub fn handle_compile_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = required(matches, "input")?;
    let format = matches
        .get_one::<OutputFormat>("format")
        .cloned()
        .unwrap_or(OutputFormat::Json);
    let output_path = matches
        .get_one::<String>("output")
        .cloned()
        .unwrap_or_else(|| default_output_path(input_path, &format, cli.output_directory()));

    let job = CompileJob {
        input: input_path.clone(),
        output: output_path,
        css: matches.get_one::<String>("css").cloned(),
        format,
        host: cli.host(matches),
    };
    let options = cli.build_compiler_options(matches)?;

    if matches.get_flag("watch") {
        watch_and_compile(&job, options)
    } else {
        compile_single_file(&job, options, matches.get_flag("stats"))
    }
}

fn default_output_path(input_path: &str, format: &OutputFormat, output_dir: Option<&str>) -> String {
    let extension = match format {
        OutputFormat::Json => "json",
        OutputFormat::Css => "css",
        OutputFormat::Debug => "debug",
    };
    let path = Path::new(input_path).with_extension(extension);
    let path = match (output_dir, path.file_name()) {
        (Some(dir), Some(name)) => PathBuf::from(dir).join(name),
        _ => path,
    };
    path.to_string_lossy().into_owned()
}

fn run_compile(job: &CompileJob, options: CompilerOptions) -> Result<(CompiledRules, CompilationStats)> {
    let start = Instant::now();
    let source = read_source(&job.input)?;
    let (rules, mut stats) = compile_source_with_options(&source, &job.input, options)?;

    let stylesheet = match &job.host {
        Some(host) => rules.stylesheet_for_host(host),
        None => rules.stylesheet.clone(),
    };
    let output = match job.format {
        OutputFormat::Json => to_json(&rules)?,
        OutputFormat::Css => stylesheet.clone(),
        OutputFormat::Debug => format!("{:#?}\n", rules),
    };

    write_output(&job.output, &output)?;
    if let Some(css_path) = &job.css {
        write_output(css_path, &stylesheet)?;
    }

    stats.output_size = output.len() as u64;
    stats.compile_time_ms = start.elapsed().as_millis() as u64;
    Ok((rules, stats))
}

fn compile_single_file(job: &CompileJob, options: CompilerOptions, show_stats: bool) -> Result<()> {
    println!("🔨 Compiling {} -> {}", job.input, job.output);

    let (rules, stats) = run_compile(job, options)?;

    println!("✅ Compilation successful!");
    println!(
        "   Rules: {} declarative, {} dynamic",
        stats.declarative_rule_count, stats.dynamic_rule_count
    );
    println!("   Output: {} bytes", stats.output_size);
    println!("   Time: {}ms", stats.compile_time_ms);
    if let Some(css_path) = &job.css {
        println!("   Stylesheet: {}", css_path);
    }
    if let Some(host) = &job.host {
        let applicable = rules
            .dynamic_rules
            .iter()
            .filter(|rule| crate::runtime::domain::domain_matches(&rule.domains, host))
            .count();
        println!("   Dynamic rules for {}: {}", host, applicable);
    }

    if show_stats {
        print_detailed_stats(&stats);
    }

    Ok(())
}

fn watch_and_compile(job: &CompileJob, options: CompilerOptions) -> Result<()> {
    println!("👀 Watching {} for changes...", job.input);
    let (_watcher, rx) = watch_paths(&[job.input.as_str()])?;

    match run_compile(job, options.clone()) {
        Ok(_) => println!("✅ Initial compilation successful"),
        Err(e) => eprintln!("❌ Initial compilation failed: {}", e),
    }

    loop {
        match rx.recv() {
            Ok(_event) => {
                println!("🔄 File changed, recompiling...");
                match run_compile(job, options.clone()) {
                    Ok((_, stats)) => {
                        println!(
                            "✅ Recompiled successfully ({} bytes, {}ms)",
                            stats.output_size, stats.compile_time_ms
                        );
                    }
                    Err(e) => eprintln!("❌ Compilation failed: {}", e),
                }
            }
            Err(e) => {
                eprintln!("Watch error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

fn print_detailed_stats(stats: &CompilationStats) {
    println!("\n📊 Detailed Compilation Statistics:");
    println!("   Source size: {} bytes", stats.source_size);
    println!("   Output size: {} bytes", stats.output_size);
    println!("   Compile time: {}ms", stats.compile_time_ms);
    println!("\n   Rule breakdown:");
    println!("     Declarative: {}", stats.declarative_rule_count);
    println!("     Dynamic: {}", stats.dynamic_rule_count);
    println!("     Functions: {}", stats.function_count);
    println!("     Variables: {}", stats.variable_count);
    println!("     Optimizer rewrites: {}", stats.optimizations_applied);
    if stats.import_count > 0 {
        println!("     Imports: {}", stats.import_count);
    }
    if stats.custom_rule_count > 0 {
        println!("     Stored rules: {}", stats.custom_rule_count);
    }
}

// --- CHECK ---
pub fn handle_check_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = required(matches, "input")?;
    let recursive = matches.get_flag("recursive");
    let options = CompilerOptions {
        debug_mode: true,
        ..cli.base_options()
    };

    if recursive && Path::new(input_path).is_dir() {
        check_directory_recursive(input_path, &options)
    } else {
        check_single_file(input_path, &options)
    }
}

fn check_single_file(input_path: &str, options: &CompilerOptions) -> Result<()> {
    println!("🔍 Checking {}", input_path);
    let result = read_source(input_path)
        .and_then(|source| compile_source_with_options(&source, input_path, options.clone()));
    match result {
        Ok((rules, _)) => {
            println!("✅ {} - No issues found ({} rules)", input_path, rules.rule_count());
            Ok(())
        }
        Err(e) => {
            println!("❌ {} - {}", input_path, e);
            Err(e)
        }
    }
}

fn check_directory_recursive(dir_path: &str, options: &CompilerOptions) -> Result<()> {
    let mut total_files = 0;
    let mut error_files = 0;

    for entry in walkdir::WalkDir::new(dir_path) {
        let entry = entry.map_err(|e| {
            CompilerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Directory traversal error: {}", e),
            ))
        })?;
        if entry.file_type().is_file() && entry.path().extension().map_or(false, |ext| ext == "veil") {
            total_files += 1;
            let path = entry.path().to_string_lossy();
            if check_single_file(&path, options).is_err() {
                error_files += 1;
            }
        }
    }

    println!("\n📊 Check Summary:");
    println!("   Total files: {}", total_files);
    println!("   Files with errors: {}", error_files);
    if total_files > 0 {
        println!(
            "   Success rate: {:.1}%",
            (total_files - error_files) as f64 / total_files as f64 * 100.0
        );
    }

    if error_files > 0 {
        Err(CompilerError::Semantic {
            file: dir_path.to_string(),
            line: 0,
            message: format!("{} files have errors", error_files),
        })
    } else {
        Ok(())
    }
}

// --- RUN ---
pub fn handle_run_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let rules_path = required(matches, "rules")?;
    let document_path = required(matches, "document")?;
    let host = cli.host(matches);
    let output_path = matches.get_one::<String>("output");
    let options = cli.base_options();

    let (mut engine, mut page) =
        load_session(rules_path, document_path, host.as_deref(), &options, cli.debounce())?;
    run_to_settled(&mut engine, &mut page);
    if let Some(path) = output_path {
        write_output(path, &page.to_json()?)?;
        println!("   Snapshot: {}", path);
    }

    if !matches.get_flag("watch") {
        return Ok(());
    }

    println!("👀 Watching {} and {} for changes...", rules_path, document_path);
    let (_watcher, rx) = watch_paths(&[rules_path.as_str(), document_path.as_str()])?;
    let mut scheduler = PassScheduler::new(cli.debounce());
    scheduler.notify(Instant::now());

    loop {
        let wakeup = [scheduler.next_due(), engine.next_wakeup()]
            .into_iter()
            .flatten()
            .min();
        let received = match wakeup {
            Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let now = Instant::now();
        let reload = match received {
            Ok(_event) => scheduler.notify(now),
            Err(RecvTimeoutError::Timeout) => scheduler.poll(now),
            Err(RecvTimeoutError::Disconnected) => {
                eprintln!("Watch error: channel closed");
                break;
            }
        };

        if reload {
            println!("🔄 Change detected, re-evaluating...");
            match load_session(rules_path, document_path, host.as_deref(), &options, cli.debounce()) {
                Ok((next_engine, next_page)) => {
                    engine = next_engine;
                    page = next_page;
                    run_to_settled(&mut engine, &mut page);
                    if let Some(path) = output_path {
                        if let Err(e) = page.to_json().and_then(|json| write_output(path, &json)) {
                            eprintln!("❌ Failed to write snapshot: {}", e);
                        }
                    }
                }
                Err(e) => eprintln!("❌ Reload failed: {}", e),
            }
        } else if let Some(report) = engine.tick(&mut page, now) {
            print_report(&report);
        }
    }

    Ok(())
}

fn load_rules(path: &str, options: &CompilerOptions) -> Result<CompiledRules> {
    let content = read_source(path)?;
    if path.ends_with(".json") {
        from_json(&content)
    } else {
        compile_source_with_options(&content, path, options.clone()).map(|(rules, _)| rules)
    }
}

fn load_document(path: &str, host: Option<&str>) -> Result<MemoryDocument> {
    let content = read_source(path)?;
    let mut snapshot: Snapshot =
        serde_json::from_str(&content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid document snapshot {}: {}", path, e),
        })?;
    if let Some(host) = host {
        snapshot.host = host.to_string();
    }
    Ok(MemoryDocument::from_snapshot(snapshot))
}

fn load_session(
    rules_path: &str,
    document_path: &str,
    host: Option<&str>,
    options: &CompilerOptions,
    debounce: Duration,
) -> Result<(Engine, MemoryDocument)> {
    let rules = load_rules(rules_path, options)?;
    let page = load_document(document_path, host)?;
    let engine = Engine::new(rules, Instant::now()).with_debounce(debounce);
    Ok((engine, page))
}

/// Run the initial pass, then wait out deferred effects
fn run_to_settled(engine: &mut Engine, page: &mut MemoryDocument) {
    let host = page.host().to_string();
    println!(
        "▶️  Evaluating {} dynamic rules on {}",
        engine.rules().dynamic_rules.len(),
        host
    );
    println!("   Stylesheet: {} bytes", engine.stylesheet(&host).len());

    if let Some(report) = engine.notify(page, Instant::now()) {
        print_report(&report);
    }
    while let Some(at) = engine.next_wakeup() {
        std::thread::sleep(at.saturating_duration_since(Instant::now()));
        if let Some(report) = engine.tick(page, Instant::now()) {
            print_report(&report);
        }
    }

    for (node, effect) in page.applied() {
        let effect = serde_json::to_string(effect).unwrap_or_else(|_| format!("{:?}", effect));
        println!("   <{}#{}> {}", page.tag_name(*node), node.0, effect);
    }

    let stats = engine.stats();
    println!(
        "✅ {} actions (core {}, cleaner {}, privacy {}) over {} passes",
        stats.total(),
        stats.core,
        stats.cleaner,
        stats.privacy,
        stats.passes
    );
}

fn print_report(report: &PassReport) {
    println!(
        "   Pass: {} rules evaluated, {} skipped, {} failed, {} candidates, {} actions",
        report.rules_evaluated,
        report.rules_skipped,
        report.rules_failed,
        report.candidates,
        report.actions_executed
    );
}

// --- RULES ---
pub fn handle_rules_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let store_path = cli.store_path(matches).ok_or_else(|| {
        CompilerError::store("No rule store given. Use --store FILE or set store_path in the config file.")
    })?;
    let mut store = JsonRuleStore::open(&store_path)?;

    match matches.subcommand() {
        Some(("list", _)) => {
            let rules = store.list()?;
            if rules.is_empty() {
                println!("No stored rules in {}", store_path);
            }
            for rule in rules {
                println!(
                    "{} [{}] {} {}{}",
                    rule.id,
                    if rule.enabled { "on" } else { "off" },
                    rule.domain,
                    rule.selector,
                    if rule.reason.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", rule.reason)
                    }
                );
            }
        }
        Some(("add", sub)) => {
            let selector = required(sub, "selector")?;
            let mut rule = StoredRule::new(selector.as_str());
            if let Some(domain) = sub.get_one::<String>("domain") {
                rule = rule.with_domain(domain.as_str());
            }
            if let Some(reason) = sub.get_one::<String>("reason") {
                rule = rule.with_reason(reason.as_str());
            }
            let id = rule.id.clone();
            store.add(rule)?;
            println!("✅ Added rule {}", id);
        }
        Some(("remove", sub)) => {
            let id = required(sub, "id")?;
            if !store.remove(id)? {
                return Err(CompilerError::store(format!("No rule with id {}", id)));
            }
            println!("✅ Removed rule {}", id);
        }
        Some((toggle @ ("enable" | "disable"), sub)) => {
            let id = required(sub, "id")?;
            if !store.set_enabled(id, toggle == "enable")? {
                return Err(CompilerError::store(format!("No rule with id {}", id)));
            }
            println!("✅ Rule {} {}d", id, toggle);
        }
        Some(("clear", _)) => {
            store.clear()?;
            println!("✅ Cleared {}", store_path);
        }
        _ => println!("No rules action specified. Use --help for usage information."),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path("rules/main.veil", &OutputFormat::Json, None),
            "rules/main.json"
        );
        assert_eq!(
            default_output_path("rules/main.veil", &OutputFormat::Css, Some("dist")),
            PathBuf::from("dist").join("main.css").to_string_lossy().into_owned()
        );
    }

    #[test]
    fn test_run_compile_writes_outputs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("main.veil");
        fs::write(
            &input,
            "@domain(example.com) { .promo -> hide }\n.ad -> hide\n.card:has-text(\"Ad\")",
        )
        .unwrap();
        let job = CompileJob {
            input: input.to_string_lossy().into_owned(),
            output: dir.path().join("out/main.json").to_string_lossy().into_owned(),
            css: Some(dir.path().join("out/main.css").to_string_lossy().into_owned()),
            format: OutputFormat::Json,
            host: Some("other.org".to_string()),
        };

        let (rules, stats) = run_compile(&job, CompilerOptions::default()).unwrap();
        assert_eq!(stats.dynamic_rule_count, 1);
        assert!(rules.stylesheet.contains(".promo"));

        let css = fs::read_to_string(dir.path().join("out/main.css")).unwrap();
        assert!(css.contains(".ad"));
        assert!(!css.contains(".promo"));

        let json = fs::read_to_string(dir.path().join("out/main.json")).unwrap();
        assert_eq!(from_json(&json).unwrap(), rules);
    }

    #[test]
    fn test_load_session_with_host_override() {
        let dir = TempDir::new().unwrap();
        let rules = dir.path().join("rules.veil");
        fs::write(&rules, ".ad:visible -> remove").unwrap();
        let document = dir.path().join("page.json");
        fs::write(
            &document,
            r#"{"host": "example.com", "root": {"tag": "body", "children": [
                {"tag": "div", "attributes": {"class": "ad"},
                 "rect": {"x": 0, "y": 0, "width": 300, "height": 250}}
            ]}}"#,
        )
        .unwrap();

        let (mut engine, mut page) = load_session(
            &rules.to_string_lossy(),
            &document.to_string_lossy(),
            Some("news.example.org"),
            &CompilerOptions::default(),
            Duration::from_millis(16),
        )
        .unwrap();
        assert_eq!(page.host(), "news.example.org");

        let report = engine.notify(&mut page, Instant::now()).unwrap();
        assert_eq!(report.actions_executed, 1);
    }

    #[test]
    fn test_load_document_rejects_bad_json() {
        let dir = TempDir::new().unwrap();
        let document = dir.path().join("page.json");
        fs::write(&document, "[]").unwrap();
        let err = load_document(&document.to_string_lossy(), None).unwrap_err();
        assert!(matches!(err, CompilerError::InvalidFormat { .. }));
    }
}
