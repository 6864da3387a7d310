//! Error types for the Veil compiler

use crate::lexer::TokenType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error in {file} at line {line}: expected {expected}, found {found}")]
    Syntax {
        file: String,
        line: usize,
        expected: String,
        found: String,
    },

    #[error("Semantic error in {file} at line {line}: {message}")]
    Semantic { file: String, line: usize, message: String },

    #[error("Import error: {message}")]
    Import { message: String },

    #[error("Rule store error: {message}")]
    Store { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },
}

pub type Result<T> = std::result::Result<T, CompilerError>;

impl CompilerError {
    pub fn syntax(
        file: impl Into<String>,
        line: usize,
        expected: impl Into<String>,
        found: &TokenType,
    ) -> Self {
        Self::Syntax {
            file: file.into(),
            line,
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub fn semantic(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Semantic {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::Import {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Source line the error points at, when it has one
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. } | Self::Semantic { line, .. } => Some(*line),
            _ => None,
        }
    }
}
