//! Embedder Implementations
//!
//! The semantic index is polymorphic over anything that can turn text into
//! fixed-dimension vectors. The default wraps a small MiniLM-family
//! sentence-embedding model via fastembed; `HashEmbedder` is a
//! deterministic, model-free implementation used by the test suite and
//! anywhere a network-free build is needed.
//!
//! @module semantic/embedder

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use xxhash_rust::xxh3::xxh3_64;

use crate::core::error::{Error, Result};

/// Text-to-vector capability.
///
/// Implementations must be pure with respect to their input: identical text
/// yields identical vectors within a run.
pub trait Embedder: Send + Sync {
    /// Vector dimension, when the implementation can report it. Callers
    /// fall back to 384 otherwise.
    fn dimension(&self) -> Option<usize>;

    /// Embed a batch of document texts.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a query; defaults to the document path.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| Error::index("embedder returned no vector for query"))
    }
}

// =============================================================================
// FASTEMBED
// =============================================================================

/// Default embedder backed by a local fastembed model.
pub struct FastEmbedder {
    model: TextEmbedding,
    dim: Option<usize>,
}

impl FastEmbedder {
    /// Load the model named by the configuration. Model files are fetched
    /// into fastembed's cache on first use.
    pub fn new(model_name: &str) -> Result<Self> {
        let model_id = resolve_model(model_name)?;

        let mut options = InitOptions::default();
        options.model_name = model_id.clone();
        options.show_download_progress = false;
        let model = TextEmbedding::try_new(options)?;

        let dim = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|info| info.model == model_id)
            .map(|info| info.dim);

        Ok(Self { model, dim })
    }
}

impl Embedder for FastEmbedder {
    fn dimension(&self) -> Option<usize> {
        self.dim
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.model.embed(texts.to_vec(), None)?)
    }
}

/// Map a configured model identifier onto a supported fastembed model.
fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    // Accept both bare names and hub-style "org/name" identifiers.
    let short = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    match short.as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        _ => Err(Error::index(format!("unknown embedding model '{name}'"))),
    }
}

// =============================================================================
// HASH EMBEDDER
// =============================================================================

/// Deterministic bag-of-tokens embedder: each lowercased token hashes to a
/// bucket, the bucket counts are L2-normalized. No model, no I/O, stable
/// across runs and platforms.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (xxh3_64(token.to_ascii_lowercase().as_bytes()) as usize) % self.dim;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> Option<usize> {
        Some(self.dim)
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_query("open a database connection").unwrap();
        let b = embedder.embed_query("open a database connection").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_embedder_token_overlap_is_closer() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed_query("database connection").unwrap();
        let close = embedder.embed_query("Open a database connection.").unwrap();
        let far = embedder.embed_query("tokenize the parser input").unwrap();

        let dist = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
        };
        assert!(dist(&query, &close) < dist(&query, &far));
    }

    #[test]
    fn test_hash_embedder_empty_text() {
        let embedder = HashEmbedder::new(8);
        let v = embedder.embed_query("").unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[test]
    fn test_resolve_model_names() {
        assert!(resolve_model("all-minilm-l6-v2").is_ok());
        assert!(resolve_model("sentence-transformers/all-MiniLM-L6-v2").is_ok());
        assert!(resolve_model("bge-small-en-v1.5").is_ok());
        assert!(resolve_model("made-up-model").is_err());
    }
}
