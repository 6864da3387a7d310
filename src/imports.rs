//! `@import` resolution
//!
//! Imported files are parsed and spliced in place of the import statement,
//! inside whatever block encloses it. Paths are relative to the importing
//! file. Symbols from an import only fill gaps: the importing file's own
//! declarations win.

use crate::ast::{Program, Statement};
use crate::error::{CompilerError, Result};
use crate::parser::parse_source;
use crate::symbols::SymbolTable;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_IMPORT_DEPTH: usize = 16;

#[derive(Debug, Default)]
pub struct ImportResolver {
    stack: Vec<PathBuf>,
    imported_files: Vec<PathBuf>,
}

impl ImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` (read from `path`) and resolve its imports
    pub fn resolve_source(
        &mut self,
        source: &str,
        path: &Path,
        symbols: SymbolTable,
    ) -> Result<Program> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.stack.push(canonical.clone());
        let result = self.parse_and_splice(source, &canonical, symbols);
        self.stack.pop();
        result
    }

    /// Read, parse and resolve the file at `path`
    pub fn load(&mut self, path: &Path, symbols: SymbolTable) -> Result<Program> {
        let canonical = path.canonicalize().map_err(|_| CompilerError::FileNotFound {
            path: path.display().to_string(),
        })?;

        if self.stack.contains(&canonical) {
            let mut chain: Vec<String> = self
                .stack
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(canonical.display().to_string());
            return Err(CompilerError::import(format!(
                "Circular import: {}",
                chain.join(" -> ")
            )));
        }

        if self.stack.len() >= MAX_IMPORT_DEPTH {
            return Err(CompilerError::import(format!(
                "Import depth limit ({}) exceeded at {}",
                MAX_IMPORT_DEPTH,
                canonical.display()
            )));
        }

        let source = fs::read_to_string(&canonical)?;
        self.imported_files.push(canonical.clone());

        self.stack.push(canonical.clone());
        let result = self.parse_and_splice(&source, &canonical, symbols);
        self.stack.pop();
        result
    }

    /// Every file pulled in through an import, in load order
    pub fn imported_files(&self) -> &[PathBuf] {
        &self.imported_files
    }

    fn parse_and_splice(
        &mut self,
        source: &str,
        path: &Path,
        symbols: SymbolTable,
    ) -> Result<Program> {
        let file = path.display().to_string();
        let Program { body, mut symbols } = parse_source(source, &file, symbols)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let body = self.splice(body, &base, &mut symbols)?;
        Ok(Program { body, symbols })
    }

    fn splice(
        &mut self,
        body: Vec<Statement>,
        base: &Path,
        symbols: &mut SymbolTable,
    ) -> Result<Vec<Statement>> {
        let mut spliced = Vec::with_capacity(body.len());

        for statement in body {
            match statement {
                Statement::Import { path, line } => {
                    let target = base.join(&path);
                    if !target.exists() {
                        return Err(CompilerError::import(format!(
                            "Cannot resolve '{}' imported at line {}: {} does not exist",
                            path,
                            line,
                            target.display()
                        )));
                    }
                    log::debug!("Importing {} (line {})", target.display(), line);
                    let imported = self.load(&target, symbols.clone())?;
                    symbols.merge_missing(&imported.symbols);
                    spliced.extend(imported.body);
                }
                Statement::Domain { domains, body } => spliced.push(Statement::Domain {
                    domains,
                    body: self.splice(body, base, symbols)?,
                }),
                Statement::Global { body } => spliced.push(Statement::Global {
                    body: self.splice(body, base, symbols)?,
                }),
                Statement::Group { name, body } => spliced.push(Statement::Group {
                    name,
                    body: self.splice(body, base, symbols)?,
                }),
                Statement::Condition { condition, body } => spliced.push(Statement::Condition {
                    condition,
                    body: self.splice(body, base, symbols)?,
                }),
                other => spliced.push(other),
            }
        }

        Ok(spliced)
    }
}
