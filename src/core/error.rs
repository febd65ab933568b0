//! Error types for CodeKG

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CodeKG's Error
pub type Result<T> = std::result::Result<T, Error>;

/// CodeKG error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Repository not found: {path}")]
    RepoNotFound { path: PathBuf },

    #[error("Graph store not found at {path} (run `codekg build` first)")]
    StoreMissing { path: PathBuf },

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Index error: {message}")]
    Index { message: String },

    #[error("Embedding error: {0}")]
    Embed(#[from] anyhow::Error),

    #[error("Invalid query: {message}")]
    Query { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for an index error with a formatted message.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Shorthand for a query-parameter error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }
}
