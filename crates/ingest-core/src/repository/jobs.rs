use diesel::prelude::*;

use crate::db::SqlitePool;
use crate::models::{Job, NewJob};
use crate::repository::papers::db_pool_err;
use crate::schema::jobs;

#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn insert(&self, new_job: &NewJob) -> Result<Job, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::insert_into(jobs::table).values(new_job).execute(&mut conn)?;
        jobs::table.filter(jobs::job_id.eq(&new_job.job_id)).first(&mut conn)
    }

    pub fn by_job_id(&self, job_id: &str) -> Result<Option<Job>, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        jobs::table.filter(jobs::job_id.eq(job_id)).first(&mut conn).optional()
    }

    pub fn save(&self, job: &Job) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::update(jobs::table.filter(jobs::job_id.eq(&job.job_id)))
            .set((
                jobs::status.eq(&job.status),
                jobs::current_step.eq(&job.current_step),
                jobs::progress_percent.eq(job.progress_percent),
                jobs::steps_completed.eq(&job.steps_completed),
                jobs::steps_failed.eq(&job.steps_failed),
                jobs::error_message.eq(&job.error_message),
                jobs::result_summary.eq(&job.result_summary),
                jobs::paper_id.eq(&job.paper_id),
                jobs::started_at.eq(&job.started_at),
                jobs::completed_at.eq(&job.completed_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn delete_older_than(&self, cutoff_rfc3339: &str) -> Result<usize, diesel::result::Error> {
        let mut conn = self.pool.get().map_err(db_pool_err)?;
        diesel::delete(jobs::table.filter(jobs::created_at.lt(cutoff_rfc3339))).execute(&mut conn)
    }
}
