//! Thin trait boundary over the vector store.
//!
//! The vector-store client library itself (e.g. a ChromaDB client) is an
//! external collaborator per the specification's scope — this crate only
//! depends on the operations the Pipeline and ConsistencyChecker need.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// A single stored vector keyed by `doc_id`.
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub doc_id: String,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the vector for `doc_id`.
    async fn upsert(&self, doc_id: &str, vector: &[f32]) -> Result<(), VectorStoreError>;

    /// Fetch the vector for `doc_id`, if present.
    async fn get(&self, doc_id: &str) -> Result<Option<Vec<f32>>, VectorStoreError>;

    /// Find the nearest stored vector to `query` by cosine similarity,
    /// returning `(doc_id, similarity)` when the store is non-empty.
    async fn nearest(&self, query: &[f32]) -> Result<Option<(String, f32)>, VectorStoreError>;

    /// Total number of stored vectors (used by the consistency checker's
    /// parity count against the relational Paper count).
    async fn count(&self) -> Result<u64, VectorStoreError>;

    /// All stored doc_ids (used for parity/orphan detection).
    async fn all_doc_ids(&self) -> Result<Vec<String>, VectorStoreError>;

    /// Remove the vector for `doc_id`, if present.
    async fn delete(&self, doc_id: &str) -> Result<(), VectorStoreError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Deterministic in-process implementation used by tests and by deployments
/// that don't need the real vector-store client. Not a production backend —
/// it holds every vector in memory with no persistence.
#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: tokio::sync::RwLock<std::collections::HashMap<String, Vec<f32>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, doc_id: &str, vector: &[f32]) -> Result<(), VectorStoreError> {
        self.vectors.write().await.insert(doc_id.to_string(), vector.to_vec());
        Ok(())
    }

    async fn get(&self, doc_id: &str) -> Result<Option<Vec<f32>>, VectorStoreError> {
        Ok(self.vectors.read().await.get(doc_id).cloned())
    }

    async fn nearest(&self, query: &[f32]) -> Result<Option<(String, f32)>, VectorStoreError> {
        let vectors = self.vectors.read().await;
        let best = vectors
            .iter()
            .map(|(doc_id, v)| (doc_id.clone(), cosine_similarity(query, v)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(best)
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        Ok(self.vectors.read().await.len() as u64)
    }

    async fn all_doc_ids(&self) -> Result<Vec<String>, VectorStoreError> {
        Ok(self.vectors.read().await.keys().cloned().collect())
    }

    async fn delete(&self, doc_id: &str) -> Result<(), VectorStoreError> {
        self.vectors.write().await.remove(doc_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn in_memory_store_roundtrips() {
        let store = InMemoryVectorStore::new();
        store.upsert("doc1", &[1.0, 0.0]).await.unwrap();
        assert_eq!(store.get("doc1").await.unwrap(), Some(vec![1.0, 0.0]));
        assert_eq!(store.count().await.unwrap(), 1);

        let (doc_id, sim) = store.nearest(&[1.0, 0.0]).await.unwrap().unwrap();
        assert_eq!(doc_id, "doc1");
        assert!(sim > 0.99);
    }
}
