//! Embedding provider seam.
//!
//! A provider turns item text into a fixed-length vector, or fails for that
//! one item. Failures never abort a run: the item just stays out of inference.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::Item;
use crate::similarity::{item_text, tokenize};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("no embedding available for `{0}`")]
    Missing(String),

    #[error("embedding for `{item}` has {got} dimensions, expected {expected}")]
    Dimension {
        item: String,
        expected: usize,
        got: usize,
    },

    #[error("embedding provider failed for `{item}`: {message}")]
    Provider { item: String, message: String },
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, item_id: &str, text: &str) -> Result<Vec<f64>, EmbeddingError>;

    fn name(&self) -> &str;
}

/// Text an item is embedded from: title, summary and concept names.
pub fn embedding_text(item: &Item) -> String {
    item_text(item)
}

/// Vectors computed ahead of time, keyed by item id.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedEmbeddings {
    vectors: HashMap<String, Vec<f64>>,
}

impl PrecomputedEmbeddings {
    pub fn new(vectors: HashMap<String, Vec<f64>>) -> Self {
        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for PrecomputedEmbeddings {
    async fn embed(&self, item_id: &str, _text: &str) -> Result<Vec<f64>, EmbeddingError> {
        self.vectors
            .get(item_id)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| EmbeddingError::Missing(item_id.to_string()))
    }

    fn name(&self) -> &str {
        "precomputed"
    }
}

/// Offline signed feature hashing over word tokens, L2-normalized.
///
/// Deterministic across runs and platforms, so the whole pipeline can run
/// without a model service.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// `None` when the text has no usable tokens.
    pub fn embed_text(&self, text: &str) -> Option<Vec<f64>> {
        let mut vector = vec![0.0; self.dimensions];
        let mut any = false;
        for token in tokenize(text) {
            if token.chars().count() < 2 {
                continue;
            }
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            let slot = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
            any = true;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if !any || norm == 0.0 {
            return None;
        }
        for v in &mut vector {
            *v /= norm;
        }
        Some(vector)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, item_id: &str, text: &str) -> Result<Vec<f64>, EmbeddingError> {
        self.embed_text(text).ok_or_else(|| EmbeddingError::Provider {
            item: item_id.to_string(),
            message: "text has no tokens to hash".to_string(),
        })
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingReport {
    pub embedded: usize,
    pub reused: usize,
    /// Ids of items left without a vector.
    pub failed: Vec<String>,
    pub dimensions: Option<usize>,
}

/// Fill in missing item vectors. Items that already carry one are kept as is;
/// per-item failures are logged and skipped.
pub async fn attach_embeddings(
    items: &mut [Item],
    provider: &dyn EmbeddingProvider,
) -> EmbeddingReport {
    let mut report = EmbeddingReport {
        dimensions: items.iter().find_map(|i| i.embedding().map(<[f64]>::len)),
        ..EmbeddingReport::default()
    };

    for item in items.iter_mut() {
        if item.embedding().is_some() {
            report.reused += 1;
            continue;
        }
        let text = embedding_text(item);
        let result = provider.embed(&item.id, &text).await.and_then(|vector| {
            match report.dimensions {
                Some(expected) if expected != vector.len() => Err(EmbeddingError::Dimension {
                    item: item.id.clone(),
                    expected,
                    got: vector.len(),
                }),
                _ if vector.is_empty() => Err(EmbeddingError::Missing(item.id.clone())),
                _ => Ok(vector),
            }
        });
        match result {
            Ok(vector) => {
                report.dimensions.get_or_insert(vector.len());
                item.embedding = Some(vector);
                report.embedded += 1;
            }
            Err(err) => {
                warn!(item = %item.id, provider = provider.name(), error = %err, "embedding unavailable; item skipped by inference");
                report.failed.push(item.id.clone());
            }
        }
    }

    if report.failed.is_empty() {
        debug!(embedded = report.embedded, reused = report.reused, "embeddings attached");
    } else {
        info!(
            embedded = report.embedded,
            reused = report.reused,
            failed = report.failed.len(),
            provider = provider.name(),
            "embeddings attached with gaps"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[test]
    fn hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed_text("robotique et capteurs").unwrap();
        let b = e.embed_text("robotique et capteurs").unwrap();
        assert_eq!(a, b);
        let norm: f64 = a.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn shared_vocabulary_raises_similarity() {
        let e = HashingEmbedder::new(512);
        let a = e.embed_text("ethique de la surveillance algorithmique").unwrap();
        let b = e.embed_text("surveillance algorithmique et vie privee").unwrap();
        let c = e.embed_text("recette cuisine provencale").unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn empty_text_has_no_vector() {
        assert!(HashingEmbedder::default().embed_text("  , ! ").is_none());
    }
}
