//! Configuration management

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-repository artifact directory.
pub const CODEKG_DIR: &str = ".codekg";

/// Default embedding model identifier.
pub const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// Default vector table name.
pub const DEFAULT_TABLE: &str = "nodes";

/// Orchestrator configuration.
///
/// All paths default to locations under `<repo_root>/.codekg/`. The
/// `repo_root` is canonicalized on construction so every later path check
/// (snippet extraction in particular) compares against a stable absolute
/// root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the source tree to index.
    pub repo_root: PathBuf,
    /// Canonical graph file (SQLite).
    pub db_path: PathBuf,
    /// Vector index directory.
    pub index_dir: PathBuf,
    /// Embedding model identifier; determines the vector dimension.
    pub model_name: String,
    /// Vector table name.
    pub table_name: String,
}

/// Optional on-disk overrides, read from `<repo_root>/.codekg/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    db_path: Option<PathBuf>,
    index_dir: Option<PathBuf>,
    model_name: Option<String>,
    table_name: Option<String>,
}

impl Config {
    /// Create a configuration with defaults rooted at `<repo_root>/.codekg/`.
    pub fn new(repo_root: impl AsRef<Path>) -> Result<Self> {
        let repo_root = repo_root.as_ref();
        let repo_root = repo_root.canonicalize().map_err(|_| Error::RepoNotFound {
            path: repo_root.to_path_buf(),
        })?;

        let codekg = repo_root.join(CODEKG_DIR);
        Ok(Self {
            db_path: codekg.join("graph.db"),
            index_dir: codekg.join("index"),
            model_name: DEFAULT_MODEL.to_string(),
            table_name: DEFAULT_TABLE.to_string(),
            repo_root,
        })
    }

    /// Create a configuration, applying overrides from
    /// `<repo_root>/.codekg/config.toml` when the file exists.
    pub fn load(repo_root: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::new(repo_root)?;

        let path = config.repo_root.join(CODEKG_DIR).join("config.toml");
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: ConfigFile = toml::from_str(&content)?;
            if let Some(db_path) = file.db_path {
                config.db_path = config.resolve(db_path);
            }
            if let Some(index_dir) = file.index_dir {
                config.index_dir = config.resolve(index_dir);
            }
            if let Some(model_name) = file.model_name {
                config.model_name = model_name;
            }
            if let Some(table_name) = file.table_name {
                config.table_name = table_name;
            }
        }

        Ok(config)
    }

    /// Interpret a relative path from the config file against the repo root.
    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.repo_root.join(path)
        }
    }
}
