use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::page_embeddings;

/// A single page's extracted text and its embedding vector, keyed by
/// `(doc_id, page_number)`.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = page_embeddings)]
pub struct PageEmbedding {
    pub id: i32,
    pub doc_id: String,
    pub page_number: i32,
    pub page_text: String,
    pub vector: Vec<u8>,
}

impl PageEmbedding {
    /// Decode the stored little-endian float32 bytes back into a vector.
    pub fn vector_f32(&self) -> Vec<f32> {
        self.vector
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = page_embeddings)]
pub struct NewPageEmbedding {
    pub doc_id: String,
    pub page_number: i32,
    pub page_text: String,
    pub vector: Vec<u8>,
}

impl NewPageEmbedding {
    pub fn new(doc_id: impl Into<String>, page_number: i32, page_text: impl Into<String>, vector: &[f32]) -> Self {
        Self {
            doc_id: doc_id.into(),
            page_number,
            page_text: page_text.into(),
            vector: vector_to_le_bytes(vector),
        }
    }
}

/// Serialize a float32 vector as raw little-endian bytes. Platform-endianness
/// is made explicit (always little-endian on the wire) rather than relying
/// on native byte order, so digests are reproducible across hosts.
pub fn vector_to_le_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_vector_bytes() {
        let v = vec![1.0_f32, -2.5, 0.0, 3.125];
        let bytes = vector_to_le_bytes(&v);
        let new = NewPageEmbedding::new("doc1", 1, "text", &v);
        assert_eq!(new.vector, bytes);
    }
}
