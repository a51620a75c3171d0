use diesel::prelude::*;

use crate::db::SqlitePool;
use crate::models::{DetectionLog, NewDetectionLog};
use crate::repository::papers::db_pool_err;
use crate::schema::detection_logs;

#[derive(Clone)]
pub struct DetectionLogRepository {
    pool: SqlitePool,
}

impl DetectionLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn insert(&self, row: &NewDetectionLog) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(detection_logs::table).values(row).execute(&mut conn)?;
        Ok(())
    }

    pub fn recent(&self, limit: i64) -> Result<Vec<DetectionLog>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        detection_logs::table
            .order(detection_logs::created_at.desc())
            .limit(limit)
            .load(&mut conn)
    }

    pub fn count_by_result(&self, result: &str) -> Result<i64, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        detection_logs::table
            .filter(detection_logs::result.eq(result))
            .count()
            .get_result(&mut conn)
    }

    pub fn total_time_saved_secs(&self) -> Result<f64, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        let values: Vec<Option<f64>> = detection_logs::table
            .select(detection_logs::estimated_time_saved_secs)
            .load(&mut conn)?;
        Ok(values.into_iter().flatten().sum())
    }

    pub fn delete_older_than(&self, cutoff_rfc3339: &str) -> Result<usize, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::delete(detection_logs::table.filter(detection_logs::created_at.lt(cutoff_rfc3339))).execute(&mut conn)
    }

    pub fn find_by_matched_doc_id(&self, doc_id: &str) -> Result<Vec<DetectionLog>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        detection_logs::table
            .filter(detection_logs::matched_doc_id.eq(doc_id))
            .load(&mut conn)
    }

    /// Distinct `matched_doc_id`s of every duplicate-found log at or after
    /// `since_rfc3339`, used by the cascade's "unused hash" cleanup sweep to
    /// decide which old papers are still actively matched against.
    pub fn matched_doc_ids_since(&self, since_rfc3339: &str) -> Result<Vec<String>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        let ids: Vec<Option<String>> = detection_logs::table
            .filter(detection_logs::created_at.ge(since_rfc3339))
            .select(detection_logs::matched_doc_id)
            .distinct()
            .load(&mut conn)?;
        Ok(ids.into_iter().flatten().collect())
    }
}
