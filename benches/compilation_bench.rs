//! Compilation and evaluation performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use std::time::Instant;
use tempfile::TempDir;
use veilc::runtime::memory::Viewport;
use veilc::runtime::{Engine, MemoryDocument, NodeSpec, Snapshot};
use veilc::*;

const MIXED_RULES: &str = r#"
$ads = .ad-slot
$promo = [data-promoted]

@global {
    .ad -> hide
    .banner && .top -> collapse
    $ads && :visible -> remove
}

@domain(example.com, news.example.org) {
    .card && :has-text("Sponsored") -> remove
    .sidebar:sticky { blur(4px); opacity(0.4) }
    .video:auto-play -> remove when @width > 300
}

@if(scroll > 400) {
    .newsletter:overlay-modal -> remove
}

fn boxout(n) { removeparent(n) }
$promo -> boxout(2)
a.tracked -> cleanurl
"#;

fn bench_simple_compilation(c: &mut Criterion) {
    c.bench_function("simple_compilation", |b| {
        b.iter(|| compile_source(black_box(".ad -> hide"), "simple.veil").unwrap())
    });
}

fn bench_mixed_compilation(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let input_path = temp_dir.path().join("mixed.veil");
    let output_path = temp_dir.path().join("mixed.json");
    fs::write(&input_path, MIXED_RULES).unwrap();

    c.bench_function("mixed_compilation", |b| {
        b.iter(|| {
            compile_file(
                black_box(input_path.to_str().unwrap()),
                black_box(output_path.to_str().unwrap()),
            )
            .unwrap()
        })
    });
}

fn bench_large_file_compilation(c: &mut Criterion) {
    let mut content = String::new();
    for i in 0..1000 {
        content.push_str(&format!(".ad-{} -> hide\n", i));
        content.push_str(&format!(".card-{} && :has-text(\"promo {}\") -> remove\n", i, i));
    }

    c.bench_function("large_file_compilation", |b| {
        b.iter(|| compile_source(black_box(&content), "large.veil").unwrap())
    });
}

fn bench_optimization_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimization_levels");

    for opt_level in 0..=1 {
        group.bench_with_input(
            format!("opt_level_{}", opt_level),
            &opt_level,
            |b, &opt_level| {
                let options = CompilerOptions {
                    optimization_level: opt_level,
                    ..Default::default()
                };

                b.iter(|| {
                    compile_source_with_options(
                        black_box(MIXED_RULES),
                        "mixed.veil",
                        black_box(options.clone()),
                    )
                    .unwrap()
                })
            },
        );
    }

    group.finish();
}

fn bench_evaluation_pass(c: &mut Criterion) {
    let rules = compile_source(MIXED_RULES, "mixed.veil").unwrap();

    let mut body = NodeSpec::new("body");
    for i in 0..200 {
        let class = match i % 4 {
            0 => "card",
            1 => "ad-slot",
            2 => "sidebar",
            _ => "story",
        };
        body = body.child(
            NodeSpec::new("div")
                .attr("class", class)
                .text(if i % 3 == 0 { "Sponsored" } else { "News" })
                .child(
                    NodeSpec::new("a")
                        .attr("class", "tracked")
                        .attr("href", "https://example.com/?utm_source=x"),
                ),
        );
    }
    let snapshot = Snapshot {
        host: "example.com".to_string(),
        viewport: Viewport::default(),
        scroll_y: 0.0,
        time: None,
        root: body,
        frames: Vec::new(),
    };

    c.bench_function("evaluation_pass", |b| {
        b.iter(|| {
            let now = Instant::now();
            let mut page = MemoryDocument::from_snapshot(snapshot.clone());
            let mut engine = Engine::new(rules.clone(), now);
            black_box(engine.run_pass(&mut page, now))
        })
    });
}

criterion_group!(
    benches,
    bench_simple_compilation,
    bench_mixed_compilation,
    bench_large_file_compilation,
    bench_optimization_levels,
    bench_evaluation_pass
);

criterion_main!(benches);
