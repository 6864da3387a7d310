//! Symbol table shared by the parser and the code generator
//!
//! Variables hold already-resolved literal text: references to earlier
//! variables are substituted when the declaration is parsed, so lookups never
//! recurse. Rule functions are recorded by name with their parameter list.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct VariableEntry {
    pub value: String,
    /// Declaration line; 0 for variables injected from the command line or config
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    variables: HashMap<String, VariableEntry>,
    functions: HashMap<String, Vec<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with externally supplied variables (`-D name=value`)
    pub fn with_variables<'a>(vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut table = Self::new();
        for (name, value) in vars {
            table.define_variable(name.trim_start_matches('$'), value.clone(), 0);
        }
        table
    }

    /// Define or redefine a variable. Later definitions win.
    pub fn define_variable(&mut self, name: &str, value: String, line: usize) {
        self.variables
            .insert(name.to_string(), VariableEntry { value, line });
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(|entry| entry.value.as_str())
    }

    pub fn variable_entry(&self, name: &str) -> Option<&VariableEntry> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn define_function(&mut self, name: &str, params: Vec<String>) {
        self.functions.insert(name.to_string(), params);
    }

    pub fn function_params(&self, name: &str) -> Option<&[String]> {
        self.functions.get(name).map(Vec::as_slice)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &String> {
        self.variables.keys()
    }

    /// Copy in every symbol of `other` not already defined here
    pub fn merge_missing(&mut self, other: &SymbolTable) {
        for (name, entry) in &other.variables {
            self.variables
                .entry(name.clone())
                .or_insert_with(|| entry.clone());
        }
        for (name, params) in &other.functions {
            self.functions
                .entry(name.clone())
                .or_insert_with(|| params.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_definition_wins() {
        let mut table = SymbolTable::new();
        table.define_variable("ads", ".ad".to_string(), 1);
        table.define_variable("ads", ".banner".to_string(), 4);
        assert_eq!(table.variable("ads"), Some(".banner"));
        assert_eq!(table.variable_entry("ads").map(|e| e.line), Some(4));
    }

    #[test]
    fn test_seeded_variables_strip_sigil() {
        let mut vars = HashMap::new();
        vars.insert("$color".to_string(), "red".to_string());
        let table = SymbolTable::with_variables(&vars);
        assert_eq!(table.variable("color"), Some("red"));
        assert_eq!(table.variable_entry("color").map(|e| e.line), Some(0));
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut main = SymbolTable::new();
        main.define_variable("x", "main".to_string(), 1);
        let mut imported = SymbolTable::new();
        imported.define_variable("x", "imported".to_string(), 1);
        imported.define_variable("y", "only-imported".to_string(), 2);
        imported.define_function("boxout", vec!["n".to_string()]);

        main.merge_missing(&imported);
        assert_eq!(main.variable("x"), Some("main"));
        assert_eq!(main.variable("y"), Some("only-imported"));
        assert_eq!(main.function_params("boxout"), Some(&["n".to_string()][..]));
    }
}
