use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{content_hashes, file_hashes, sample_embedding_hashes};

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = file_hashes, primary_key(file_md5))]
pub struct FileHash {
    pub file_md5: String,
    pub file_size: i64,
    pub original_filename: String,
    pub doc_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = file_hashes)]
pub struct NewFileHash {
    pub file_md5: String,
    pub file_size: i64,
    pub original_filename: String,
    pub doc_id: String,
    pub created_at: String,
}

impl NewFileHash {
    pub fn new(file_md5: impl Into<String>, file_size: i64, original_filename: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            file_md5: file_md5.into(),
            file_size,
            original_filename: original_filename.into(),
            doc_id: doc_id.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = content_hashes, primary_key(content_digest))]
pub struct ContentHash {
    pub content_digest: String,
    pub pdf_title: Option<String>,
    pub pdf_author: Option<String>,
    pub pdf_creator: Option<String>,
    pub first_three_pages_text: String,
    pub page_count: i32,
    pub doc_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = content_hashes)]
pub struct NewContentHash {
    pub content_digest: String,
    pub pdf_title: Option<String>,
    pub pdf_author: Option<String>,
    pub pdf_creator: Option<String>,
    pub first_three_pages_text: String,
    pub page_count: i32,
    pub doc_id: String,
    pub created_at: String,
}

impl NewContentHash {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content_digest: impl Into<String>,
        pdf_title: Option<String>,
        pdf_author: Option<String>,
        pdf_creator: Option<String>,
        first_three_pages_text: impl Into<String>,
        page_count: i32,
        doc_id: impl Into<String>,
    ) -> Self {
        Self {
            content_digest: content_digest.into(),
            pdf_title,
            pdf_author,
            pdf_creator,
            first_three_pages_text: first_three_pages_text.into(),
            page_count,
            doc_id: doc_id.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = sample_embedding_hashes, primary_key(embedding_digest, strategy))]
pub struct SampleEmbeddingHash {
    pub embedding_digest: String,
    pub strategy: String,
    pub sample_text: String,
    pub vector_bytes: Vec<u8>,
    pub dimension: i32,
    pub model_name: String,
    pub doc_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sample_embedding_hashes)]
pub struct NewSampleEmbeddingHash {
    pub embedding_digest: String,
    pub strategy: String,
    pub sample_text: String,
    pub vector_bytes: Vec<u8>,
    pub dimension: i32,
    pub model_name: String,
    pub doc_id: String,
    pub created_at: String,
}

impl NewSampleEmbeddingHash {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embedding_digest: impl Into<String>,
        strategy: impl Into<String>,
        sample_text: impl Into<String>,
        vector_bytes: Vec<u8>,
        dimension: i32,
        model_name: impl Into<String>,
        doc_id: impl Into<String>,
    ) -> Self {
        Self {
            embedding_digest: embedding_digest.into(),
            strategy: strategy.into(),
            sample_text: sample_text.into(),
            vector_bytes,
            dimension,
            model_name: model_name.into(),
            doc_id: doc_id.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
