use diesel::prelude::*;

use crate::db::SqlitePool;
use crate::models::{ContentHash, FileHash, NewContentHash, NewFileHash, NewSampleEmbeddingHash, SampleEmbeddingHash};
use crate::repository::papers::db_pool_err;
use crate::schema::{content_hashes, file_hashes, sample_embedding_hashes};

#[derive(Clone)]
pub struct HashRepository {
    pool: SqlitePool,
}

impl HashRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn find_file_hash(&self, md5: &str) -> Result<Option<FileHash>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        file_hashes::table.find(md5).first(&mut conn).optional()
    }

    pub fn insert_file_hash(&self, row: &NewFileHash) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(file_hashes::table).values(row).execute(&mut conn)?;
        Ok(())
    }

    pub fn find_content_hash(&self, digest: &str) -> Result<Option<ContentHash>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        content_hashes::table.find(digest).first(&mut conn).optional()
    }

    pub fn insert_content_hash(&self, row: &NewContentHash) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(content_hashes::table).values(row).execute(&mut conn)?;
        Ok(())
    }

    pub fn find_sample_embedding_hash(&self, digest: &str, strategy: &str) -> Result<Option<SampleEmbeddingHash>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        sample_embedding_hashes::table
            .find((digest, strategy))
            .first(&mut conn)
            .optional()
    }

    pub fn insert_sample_embedding_hash(&self, row: &NewSampleEmbeddingHash) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(sample_embedding_hashes::table).values(row).execute(&mut conn)?;
        Ok(())
    }

    pub fn file_hashes_count(&self) -> Result<i64, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        file_hashes::table.count().get_result(&mut conn)
    }

    pub fn content_hashes_count(&self) -> Result<i64, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        content_hashes::table.count().get_result(&mut conn)
    }

    pub fn sample_embedding_hashes_count(&self) -> Result<i64, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        sample_embedding_hashes::table.count().get_result(&mut conn)
    }

    pub fn all_file_hash_doc_ids(&self) -> Result<Vec<(String, String)>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        file_hashes::table
            .select((file_hashes::file_md5, file_hashes::doc_id))
            .load(&mut conn)
    }

    pub fn all_content_hash_doc_ids(&self) -> Result<Vec<(String, String)>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        content_hashes::table
            .select((content_hashes::content_digest, content_hashes::doc_id))
            .load(&mut conn)
    }

    pub fn all_sample_embedding_hash_doc_ids(&self) -> Result<Vec<(String, String, String)>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        sample_embedding_hashes::table
            .select((sample_embedding_hashes::embedding_digest, sample_embedding_hashes::strategy, sample_embedding_hashes::doc_id))
            .load(&mut conn)
    }

    /// `(file_md5, doc_id, created_at)` for every row, used by the
    /// duplicate-detection cascade's "keep newest per paper" cleanup.
    pub fn all_file_hash_rows(&self) -> Result<Vec<(String, String, String)>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        file_hashes::table
            .select((file_hashes::file_md5, file_hashes::doc_id, file_hashes::created_at))
            .load(&mut conn)
    }

    pub fn all_content_hash_rows(&self) -> Result<Vec<(String, String, String)>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        content_hashes::table
            .select((content_hashes::content_digest, content_hashes::doc_id, content_hashes::created_at))
            .load(&mut conn)
    }

    pub fn all_sample_embedding_hash_rows(&self) -> Result<Vec<(String, String, String, String)>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        sample_embedding_hashes::table
            .select((
                sample_embedding_hashes::embedding_digest,
                sample_embedding_hashes::strategy,
                sample_embedding_hashes::doc_id,
                sample_embedding_hashes::created_at,
            ))
            .load(&mut conn)
    }

    pub fn delete_file_hash(&self, md5: &str) -> Result<usize, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::delete(file_hashes::table.find(md5)).execute(&mut conn)
    }

    pub fn delete_content_hash(&self, digest: &str) -> Result<usize, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::delete(content_hashes::table.find(digest)).execute(&mut conn)
    }

    pub fn delete_sample_embedding_hash(&self, digest: &str, strategy: &str) -> Result<usize, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::delete(sample_embedding_hashes::table.find((digest, strategy))).execute(&mut conn)
    }
}
