//! Veil Rule-Script Compiler
//!
//! Compiles Veil rule scripts, a small language for describing page
//! elements to neutralize, into two targets: a stylesheet for everything
//! plain CSS can express, and dynamic rule records for everything else.
//! The [`runtime`] module evaluates the dynamic records against a live
//! document.
//!
//! # Basic Usage
//!
//! ```rust
//! use veilc::{compile_source, Result};
//!
//! fn main() -> Result<()> {
//!     let rules = compile_source(".ad-banner -> hide", "inline.veil")?;
//!     assert!(rules.stylesheet.contains(".ad-banner"));
//!     Ok(())
//! }
//! ```
//!
//! # Compilation Pipeline
//!
//! 1. **Lexer** - Tokenize the source, classifying selectors, pseudos and actions
//! 2. **Parser** - Build the AST, substituting variables and resolving `@import`
//! 3. **Optimizer** - Canonicalize and reorder selector expressions by cost
//! 4. **Code Generator** - Split rules into declarative CSS and dynamic records

pub mod ast;
pub mod cli;
pub mod codegen;
pub mod error;
pub mod imports;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod runtime;
pub mod store;
pub mod symbols;
pub mod types;

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

pub use codegen::CodeGenerator;
pub use error::{CompilerError, Result};
pub use imports::ImportResolver;
pub use lexer::{Lexer, Token, TokenType};
pub use optimizer::ExpressionOptimizer;
pub use parser::Parser;
pub use runtime::Engine;
pub use store::{JsonRuleStore, RuleStore, StoredRule};
pub use symbols::SymbolTable;
pub use types::*;
pub use cli::EnhancedCli;

/// Compiler version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Compilation options and settings
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Enable debug mode with extra logging
    pub debug_mode: bool,

    /// Optimization level (0 = none, 1+ = expression optimizer)
    pub optimization_level: u8,

    /// Variables injected before the source is parsed. Source declarations win.
    pub custom_variables: HashMap<String, String>,

    /// Stored custom selectors merged into the declarative rules as `hide`
    pub custom_selectors: Vec<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            debug_mode: false,
            optimization_level: 1,
            custom_variables: HashMap::new(),
            custom_selectors: Vec::new(),
        }
    }
}

/// Compilation statistics and metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationStats {
    /// Source size in bytes
    pub source_size: u64,

    /// Size of the written output in bytes
    pub output_size: u64,

    /// Number of declarative rules emitted
    pub declarative_rule_count: usize,

    /// Number of dynamic rule records emitted
    pub dynamic_rule_count: usize,

    /// Number of rule functions compiled
    pub function_count: usize,

    /// Number of variables in scope after parsing
    pub variable_count: usize,

    /// Number of imported files
    pub import_count: usize,

    /// Number of stored custom selectors merged in
    pub custom_rule_count: usize,

    /// Number of optimizer rewrites applied
    pub optimizations_applied: usize,

    /// Compilation time in milliseconds
    pub compile_time_ms: u64,
}

/// Main compiler entry point with default options
pub fn compile_file(input_path: &str, output_path: &str) -> Result<CompilationStats> {
    compile_file_with_options(input_path, output_path, CompilerOptions::default())
}

/// Compile a rule script and write the result.
///
/// A `.css` output path receives the stylesheet alone; anything else gets
/// the full compiled rule set as JSON.
pub fn compile_file_with_options(
    input_path: &str,
    output_path: &str,
    options: CompilerOptions,
) -> Result<CompilationStats> {
    use std::fs;
    use std::time::Instant;

    let start_time = Instant::now();

    if options.debug_mode {
        log::info!("{} v{}", NAME, VERSION);
        log::info!("Compiling '{}' to '{}'...", input_path, output_path);
        log::debug!("Compiler options: {:?}", options);
    }

    let source = fs::read_to_string(input_path).map_err(|e| CompilerError::FileNotFound {
        path: format!("{}: {}", input_path, e),
    })?;

    let (rules, mut stats) = compile_source_with_options(&source, input_path, options.clone())?;

    let output = if is_css_path(output_path) {
        rules.stylesheet.clone()
    } else {
        to_json(&rules)?
    };

    stats.source_size = source.len() as u64;
    stats.output_size = output.len() as u64;
    stats.compile_time_ms = start_time.elapsed().as_millis() as u64;

    fs::write(output_path, output)?;

    if options.debug_mode {
        log::info!("Compilation successful!");
        log::info!(
            "{} declarative, {} dynamic rules",
            stats.declarative_rule_count,
            stats.dynamic_rule_count
        );
        log::info!("Compile time: {}ms", stats.compile_time_ms);
        log::debug!("Full stats: {:?}", stats);
    }

    Ok(stats)
}

/// Compile rule-script source with default options
pub fn compile_source(source: &str, filename: &str) -> Result<CompiledRules> {
    let (rules, _stats) = compile_source_with_options(source, filename, CompilerOptions::default())?;
    Ok(rules)
}

/// Compile rule-script source with custom options.
///
/// When `filename` names an existing file, `@import` paths resolve
/// relative to it. Otherwise imports are skipped with a warning.
pub fn compile_source_with_options(
    source: &str,
    filename: &str,
    options: CompilerOptions,
) -> Result<(CompiledRules, CompilationStats)> {
    let start_time = std::time::Instant::now();
    let mut stats = CompilationStats {
        source_size: source.len() as u64,
        ..CompilationStats::default()
    };

    for name in options.custom_variables.keys() {
        if !is_valid_variable_name(name) {
            return Err(CompilerError::semantic(
                filename,
                0,
                format!("Invalid custom variable name '{}'", name),
            ));
        }
    }
    let symbols = SymbolTable::with_variables(&options.custom_variables);

    // Phase 1: Lexing, parsing and import resolution
    log::debug!("Phase 1: Parsing {} ({} bytes)", filename, source.len());
    let path = Path::new(filename);
    let program = if path.is_file() {
        let mut resolver = ImportResolver::new();
        let program = resolver.resolve_source(source, path, symbols)?;
        stats.import_count = resolver.imported_files().len();
        program
    } else {
        parser::parse_source(source, filename, symbols)?
    };
    stats.variable_count = program.symbols.variable_count();
    log::debug!(
        "Phase 1 complete. {} statements, {} imports",
        program.body.len(),
        stats.import_count
    );

    // Phase 2: Optimization and code generation
    log::debug!("Phase 2: Generating rules...");
    let mut generator =
        CodeGenerator::new(filename).with_optimization(options.optimization_level > 0);
    let mut rules = generator.generate(&program)?;
    stats.optimizations_applied = generator.optimizations_applied();

    if !options.custom_selectors.is_empty() {
        stats.custom_rule_count = rules.merge_custom_selectors(&options.custom_selectors);
        log::debug!("Merged {} stored custom rules", stats.custom_rule_count);
    }

    stats.declarative_rule_count = rules.declarative_rules.len();
    stats.dynamic_rule_count = rules.dynamic_rules.len();
    stats.function_count = rules.functions.len();
    stats.output_size = rules.stylesheet.len() as u64;
    stats.compile_time_ms = start_time.elapsed().as_millis() as u64;

    log::debug!(
        "Phase 2 complete. {} declarative, {} dynamic, {} functions",
        stats.declarative_rule_count,
        stats.dynamic_rule_count,
        stats.function_count
    );

    Ok((rules, stats))
}

/// Serialize compiled rules the way `compile` writes them
pub fn to_json(rules: &CompiledRules) -> Result<String> {
    serde_json::to_string_pretty(rules).map_err(|e| CompilerError::InvalidFormat {
        message: format!("Failed to serialize compiled rules: {}", e),
    })
}

/// Read compiled rules previously written by [`to_json`]
pub fn from_json(json: &str) -> Result<CompiledRules> {
    serde_json::from_str(json).map_err(|e| CompilerError::InvalidFormat {
        message: format!("Invalid compiled rules: {}", e),
    })
}

fn is_css_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("css"))
}

fn is_valid_variable_name(name: &str) -> bool {
    let name = name.strip_prefix('$').unwrap_or(name);
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
