//! Persistent custom rule storage
//!
//! Custom rules are plain selectors added by hand outside any rule script.
//! Enabled selectors for a host are merged into that host's stylesheet.

use crate::error::{CompilerError, Result};
use crate::runtime::domain::domain_matches;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRule {
    pub id: String,
    pub selector: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_source() -> String {
    "manual".to_string()
}

fn default_domain() -> String {
    "*".to_string()
}

fn default_enabled() -> bool {
    true
}

impl StoredRule {
    /// A new enabled rule stamped with the current time
    pub fn new(selector: impl Into<String>) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::at(selector, created_at)
    }

    pub fn at(selector: impl Into<String>, created_at: u64) -> Self {
        let selector = selector.into();
        let digest = md5::compute(format!("{}{}", selector, created_at));
        Self {
            id: hex::encode(digest.0),
            selector,
            reason: String::new(),
            source: default_source(),
            domain: default_domain(),
            created_at,
            enabled: true,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn applies_to(&self, host: &str) -> bool {
        domain_matches(std::slice::from_ref(&self.domain), host)
    }
}

pub trait RuleStore {
    fn list(&self) -> Result<Vec<StoredRule>>;

    /// Add a rule. A selector already in the store is rejected.
    fn add(&mut self, rule: StoredRule) -> Result<()>;

    /// Returns false when no rule has this id
    fn remove(&mut self, id: &str) -> Result<bool>;

    fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<bool>;

    fn enabled_selectors(&self, host: &str) -> Result<Vec<String>>;

    fn clear(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    rules: Vec<StoredRule>,
}

/// Rule store backed by a single JSON file, rewritten on every change
#[derive(Debug)]
pub struct JsonRuleStore {
    path: PathBuf,
    rules: Vec<StoredRule>,
}

impl JsonRuleStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rules = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                let file: StoreFile =
                    serde_json::from_str(&content).map_err(|e| CompilerError::InvalidFormat {
                        message: format!("Rule store {}: {}", path.display(), e),
                    })?;
                file.rules
            }
        } else {
            Vec::new()
        };

        log::debug!("Opened rule store {} ({} rules)", path.display(), rules.len());
        Ok(Self { path, rules })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = StoreFile {
            rules: self.rules.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CompilerError::store(format!("Failed to serialize rules: {}", e)))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl RuleStore for JsonRuleStore {
    fn list(&self) -> Result<Vec<StoredRule>> {
        Ok(self.rules.clone())
    }

    fn add(&mut self, rule: StoredRule) -> Result<()> {
        let selector = rule.selector.trim();
        if selector.is_empty() {
            return Err(CompilerError::store("Selector cannot be empty"));
        }
        if self.rules.iter().any(|r| r.selector == selector) {
            return Err(CompilerError::store(format!(
                "Rule for '{}' already exists",
                selector
            )));
        }

        let rule = StoredRule {
            selector: selector.to_string(),
            ..rule
        };
        log::info!("Added custom rule {} ({})", rule.id, rule.selector);
        self.rules.push(rule);
        self.save()
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        if self.rules.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<bool> {
        match self.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                self.save()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn enabled_selectors(&self, host: &str) -> Result<Vec<String>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.enabled && r.applies_to(host))
            .map(|r| r.selector.clone())
            .collect())
    }

    fn clear(&mut self) -> Result<()> {
        self.rules.clear();
        self.save()
    }
}
