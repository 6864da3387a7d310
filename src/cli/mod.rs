// FILE: src/cli/mod.rs

mod config;
mod handlers;

use crate::error::{CompilerError, Result};
use crate::store::{JsonRuleStore, RuleStore};
use crate::CompilerOptions;
use clap::{Arg, ArgAction, Command, ValueEnum};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, ValueEnum)]
pub enum OptimizationLevel {
    None,
    Basic,
    Aggressive,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Css,
    Debug,
}

pub struct EnhancedCli {
    config: config::ConfigFile,
    start_time: Instant,
}

impl Default for EnhancedCli {
    fn default() -> Self {
        Self::new()
    }
}

impl EnhancedCli {
    pub fn new() -> Self {
        Self {
            config: config::ConfigFile::default(),
            start_time: Instant::now(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        let matches = self.build_cli().get_matches();

        self.setup_logging(matches.get_count("verbose"))?;

        if let Some(config_path) = matches.get_one::<String>("config") {
            self.config = config::load(config_path)?;
        }

        let result = match matches.subcommand() {
            Some(("compile", sub_matches)) => handlers::handle_compile_command(self, sub_matches),
            Some(("check", sub_matches)) => handlers::handle_check_command(self, sub_matches),
            Some(("run", sub_matches)) => handlers::handle_run_command(self, sub_matches),
            Some(("rules", sub_matches)) => handlers::handle_rules_command(self, sub_matches),
            _ => {
                println!("No subcommand specified. Use --help for usage information.");
                Ok(())
            }
        };

        log::debug!("Finished in {}ms", self.start_time.elapsed().as_millis());
        result
    }

    fn build_cli(&self) -> Command {
        Command::new(crate::NAME)
            .version(crate::VERSION)
            .about(crate::DESCRIPTION)
            .author("Veil Development Team")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Increase verbosity (can be used multiple times)")
                    .action(ArgAction::Count),
            )
            .subcommand(
                Command::new("compile")
                    .about("Compile a rule script to stylesheet and dynamic rules")
                    .arg(Arg::new("input").help("Input rule script").required(true).index(1))
                    .arg(Arg::new("output").short('o').long("output").value_name("FILE").help("Output file"))
                    .arg(Arg::new("css").long("css").value_name("FILE").help("Also write the stylesheet to FILE"))
                    .arg(Arg::new("format").short('f').long("format").value_parser(clap::value_parser!(OutputFormat)).default_value("json").help("Output format"))
                    .arg(Arg::new("optimization").short('O').long("optimization").value_parser(clap::value_parser!(OptimizationLevel)).help("Optimization level"))
                    .arg(Arg::new("debug").short('d').long("debug").help("Enable debug mode with extra logging").action(ArgAction::SetTrue))
                    .arg(Arg::new("define").short('D').long("define").value_name("VAR=VALUE").help("Define custom variable").action(ArgAction::Append))
                    .arg(Arg::new("store").long("store").value_name("FILE").help("Merge enabled rules from a custom rule store"))
                    .arg(Arg::new("host").long("host").value_name("HOST").help("Only emit stylesheet rules that apply to HOST"))
                    .arg(Arg::new("stats").long("stats").help("Show detailed compilation statistics").action(ArgAction::SetTrue))
                    .arg(Arg::new("watch").short('w').long("watch").help("Watch for file changes and recompile").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("check")
                    .about("Check rule scripts for syntax and semantic errors")
                    .arg(Arg::new("input").help("Input rule script or directory").required(true).index(1))
                    .arg(Arg::new("recursive").short('r').long("recursive").help("Check all rule scripts in directory recursively").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("run")
                    .about("Evaluate rules against a document snapshot")
                    .arg(Arg::new("rules").help("Rule script or compiled rules JSON").required(true).index(1))
                    .arg(Arg::new("document").help("Document snapshot JSON").required(true).index(2))
                    .arg(Arg::new("host").long("host").value_name("HOST").help("Override the snapshot host"))
                    .arg(Arg::new("output").short('o').long("output").value_name("FILE").help("Write the resulting snapshot to FILE"))
                    .arg(Arg::new("watch").short('w').long("watch").help("Re-run when the rules or document change").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("rules")
                    .about("Manage stored custom rules")
                    .arg(Arg::new("store").long("store").value_name("FILE").help("Rule store file"))
                    .subcommand_required(true)
                    .subcommand(Command::new("list").about("List stored rules"))
                    .subcommand(
                        Command::new("add")
                            .about("Add a selector to hide")
                            .arg(Arg::new("selector").help("CSS selector").required(true).index(1))
                            .arg(Arg::new("domain").long("domain").value_name("DOMAIN").default_value("*").help("Domain the rule applies to"))
                            .arg(Arg::new("reason").long("reason").value_name("TEXT").help("Why the rule was added")),
                    )
                    .subcommand(Command::new("remove").about("Remove a rule").arg(Arg::new("id").required(true).index(1)))
                    .subcommand(Command::new("enable").about("Enable a rule").arg(Arg::new("id").required(true).index(1)))
                    .subcommand(Command::new("disable").about("Disable a rule").arg(Arg::new("id").required(true).index(1)))
                    .subcommand(Command::new("clear").about("Remove every rule")),
            )
    }

    fn setup_logging(&self, verbose_count: u8) -> Result<()> {
        let log_level = match verbose_count {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_secs()
            .init();
        Ok(())
    }

    /// Options taken from the config file alone
    pub fn base_options(&self) -> CompilerOptions {
        let mut options = CompilerOptions::default();
        if let Some(level) = self.config.optimization_level {
            options.optimization_level = level;
        }
        if let Some(config_vars) = &self.config.custom_variables {
            options.custom_variables.extend(config_vars.clone());
        }
        options
    }

    pub fn build_compiler_options(&self, matches: &clap::ArgMatches) -> Result<CompilerOptions> {
        let mut options = self.base_options();
        if let Some(opt_level) = matches.get_one::<OptimizationLevel>("optimization") {
            options.optimization_level = match opt_level {
                OptimizationLevel::None => 0,
                OptimizationLevel::Basic => 1,
                OptimizationLevel::Aggressive => 2,
            };
        }
        options.debug_mode = matches.get_flag("debug");
        if let Some(defines) = matches.get_many::<String>("define") {
            for define in defines {
                let (key, value) = parse_define(define)?;
                options.custom_variables.insert(key, value);
            }
        }
        if let Some(store_path) = self.store_path(matches) {
            let store = JsonRuleStore::open(&store_path)?;
            let host = self.host(matches).unwrap_or_default();
            options.custom_selectors = store.enabled_selectors(&host)?;
            log::info!(
                "Merging {} stored rules from {}",
                options.custom_selectors.len(),
                store_path
            );
        }
        Ok(options)
    }

    /// `--host` falling back to the config file
    pub fn host(&self, matches: &clap::ArgMatches) -> Option<String> {
        matches
            .get_one::<String>("host")
            .cloned()
            .or_else(|| self.config.host.clone())
    }

    /// `--store` falling back to the config file
    pub fn store_path(&self, matches: &clap::ArgMatches) -> Option<String> {
        matches
            .get_one::<String>("store")
            .cloned()
            .or_else(|| self.config.store_path.clone())
    }

    pub fn debounce(&self) -> Duration {
        self.config
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::runtime::scheduler::DEFAULT_WINDOW)
    }

    pub fn output_directory(&self) -> Option<&str> {
        self.config.output_directory.as_deref()
    }
}

fn parse_define(define: &str) -> Result<(String, String)> {
    match define.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(CompilerError::InvalidFormat {
            message: format!("Invalid variable definition: {}. Use VAR=VALUE format.", define),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define() {
        assert_eq!(
            parse_define("ads=.sponsored").unwrap(),
            ("ads".to_string(), ".sponsored".to_string())
        );
        assert_eq!(
            parse_define("sel=a[href=x]").unwrap(),
            ("sel".to_string(), "a[href=x]".to_string())
        );
        assert!(parse_define("novalue").is_err());
        assert!(parse_define("=x").is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        EnhancedCli::new().build_cli().debug_assert();
    }

    #[test]
    fn test_compile_options_from_args() {
        let cli = EnhancedCli::new();
        let matches = cli
            .build_cli()
            .try_get_matches_from(["veilc", "compile", "rules.veil", "-O", "none", "-D", "x=.y"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let options = cli.build_compiler_options(sub).unwrap();
        assert_eq!(options.optimization_level, 0);
        assert_eq!(options.custom_variables.get("x").map(String::as_str), Some(".y"));
        assert!(options.custom_selectors.is_empty());
    }
}
