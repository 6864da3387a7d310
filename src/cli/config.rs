// FILE: src/cli/config.rs

use crate::error::{CompilerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub optimization_level: Option<u8>,
    pub custom_variables: Option<HashMap<String, String>>,
    /// Host used for domain filtering when `--host` is not given
    pub host: Option<String>,
    /// Custom rule store merged into compiled output
    pub store_path: Option<String>,
    /// Coalescing window for `run --watch` passes
    pub debounce_ms: Option<u64>,
    pub output_directory: Option<String>,
}

pub fn load(config_path: &str) -> Result<ConfigFile> {
    let config_content = fs::read_to_string(config_path).map_err(|e| {
        CompilerError::FileNotFound {
            path: format!("Config file {}: {}", config_path, e),
        }
    })?;

    let config = parse(config_path, &config_content)?;
    log::info!("Loaded configuration from {}", config_path);
    Ok(config)
}

fn parse(config_path: &str, content: &str) -> Result<ConfigFile> {
    if config_path.ends_with(".json") {
        serde_json::from_str(content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid JSON config: {}", e),
        })
    } else if config_path.ends_with(".toml") {
        toml::from_str(content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid TOML config: {}", e),
        })
    } else {
        Err(CompilerError::InvalidFormat {
            message: "Config file must be .json or .toml format".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_config() {
        let config = parse(
            "veil.toml",
            r#"
optimization_level = 0
host = "news.example.com"
debounce_ms = 50

[custom_variables]
ads = ".sponsored"
"#,
        )
        .unwrap();
        assert_eq!(config.optimization_level, Some(0));
        assert_eq!(config.host.as_deref(), Some("news.example.com"));
        assert_eq!(config.debounce_ms, Some(50));
        assert_eq!(
            config.custom_variables.unwrap().get("ads").map(String::as_str),
            Some(".sponsored")
        );
    }

    #[test]
    fn test_parse_json_config() {
        let config = parse("veil.json", r#"{"store_path": "rules.json"}"#).unwrap();
        assert_eq!(config.store_path.as_deref(), Some("rules.json"));
        assert!(config.host.is_none());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        assert!(matches!(
            parse("veil.yaml", ""),
            Err(CompilerError::InvalidFormat { .. })
        ));
    }
}
