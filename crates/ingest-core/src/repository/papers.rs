use chrono::Utc;
use diesel::prelude::*;

use crate::db::SqlitePool;
use crate::models::{LayoutAnalysis, Metadata, NewLayoutAnalysis, NewMetadata, NewPageEmbedding, NewPaper, PageEmbedding, Paper};
use crate::schema::{layout_analyses, metadata, page_embeddings, papers};

#[derive(Clone)]
pub struct PaperRepository {
    pool: SqlitePool,
}

impl PaperRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn insert(&self, new_paper: &NewPaper) -> Result<Paper, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(papers::table)
            .values(new_paper)
            .execute(&mut conn)?;
        papers::table
            .filter(papers::doc_id.eq(&new_paper.doc_id))
            .first(&mut conn)
    }

    pub fn by_doc_id(&self, doc_id: &str) -> Result<Option<Paper>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        papers::table
            .filter(papers::doc_id.eq(doc_id))
            .first(&mut conn)
            .optional()
    }

    pub fn by_content_id(&self, content_id: &str) -> Result<Option<Paper>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        papers::table
            .filter(papers::content_id.eq(content_id))
            .first(&mut conn)
            .optional()
    }

    pub fn update_extracted_text(&self, doc_id: &str, text: &str) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::update(papers::table.filter(papers::doc_id.eq(doc_id)))
            .set((papers::extracted_text.eq(text), papers::updated_at.eq(Utc::now().to_rfc3339())))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn update_ocr_quality(&self, doc_id: &str, label: &str, completed: bool) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::update(papers::table.filter(papers::doc_id.eq(doc_id)))
            .set((
                papers::ocr_quality_label.eq(label),
                papers::ocr_quality_completed.eq(completed),
                papers::updated_at.eq(Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn update_content_id(&self, doc_id: &str, content_id: &str) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::update(papers::table.filter(papers::doc_id.eq(doc_id)))
            .set((papers::content_id.eq(content_id), papers::updated_at.eq(Utc::now().to_rfc3339())))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn mark_layout_completed(&self, doc_id: &str) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::update(papers::table.filter(papers::doc_id.eq(doc_id)))
            .set((papers::layout_completed.eq(true), papers::updated_at.eq(Utc::now().to_rfc3339())))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn mark_metadata_completed(&self, doc_id: &str, completed: bool) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::update(papers::table.filter(papers::doc_id.eq(doc_id)))
            .set((papers::metadata_llm_completed.eq(completed), papers::updated_at.eq(Utc::now().to_rfc3339())))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn insert_page_embeddings(&self, rows: &[NewPageEmbedding]) -> Result<usize, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(page_embeddings::table)
            .values(rows)
            .execute(&mut conn)
    }

    pub fn page_embeddings_for(&self, doc_id: &str) -> Result<Vec<PageEmbedding>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        page_embeddings::table
            .filter(page_embeddings::doc_id.eq(doc_id))
            .order(page_embeddings::page_number.asc())
            .load(&mut conn)
    }

    pub fn insert_metadata(&self, new_metadata: &NewMetadata) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(metadata::table)
            .values(new_metadata)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn metadata_for(&self, doc_id: &str) -> Result<Option<Metadata>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        metadata::table
            .filter(metadata::doc_id.eq(doc_id))
            .first(&mut conn)
            .optional()
    }

    pub fn insert_layout(&self, new_layout: &NewLayoutAnalysis) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(layout_analyses::table)
            .values(new_layout)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn layout_for(&self, doc_id: &str) -> Result<Option<LayoutAnalysis>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        layout_analyses::table
            .filter(layout_analyses::doc_id.eq(doc_id))
            .first(&mut conn)
            .optional()
    }

    pub fn count(&self) -> Result<i64, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        papers::table.count().get_result(&mut conn)
    }

    pub fn all_doc_ids(&self) -> Result<Vec<String>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        papers::table.select(papers::doc_id).load(&mut conn)
    }

    /// `(doc_id, content_id)` for every paper, used by the consistency
    /// checker to look for two rows sharing a content identity.
    pub fn all_doc_id_content_id_pairs(&self) -> Result<Vec<(String, Option<String>)>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        papers::table
            .select((papers::doc_id, papers::content_id))
            .load(&mut conn)
    }

    pub fn delete(&self, doc_id: &str) -> Result<usize, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::delete(papers::table.filter(papers::doc_id.eq(doc_id))).execute(&mut conn)
    }

    /// `doc_id`s of papers created before `cutoff_rfc3339`, used by the
    /// duplicate-detection cascade's "unused hash" cleanup sweep.
    pub fn doc_ids_created_before(&self, cutoff_rfc3339: &str) -> Result<Vec<String>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        papers::table
            .filter(papers::created_at.lt(cutoff_rfc3339))
            .select(papers::doc_id)
            .load(&mut conn)
    }
}

pub(crate) fn db_pool_err(e: diesel::r2d2::PoolError) -> diesel::result::Error {
    diesel::result::Error::QueryBuilderError(Box::new(e))
}
