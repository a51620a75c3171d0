pub mod detection;
pub mod hashes;
pub mod jobs;
pub mod papers;

pub use detection::DetectionLogRepository;
pub use hashes::HashRepository;
pub use jobs::JobRepository;
pub use papers::PaperRepository;

use crate::db::SqlitePool;

/// A bundle of repositories sharing one connection pool; constructed once at
/// application startup and handed to the components that need it.
#[derive(Clone)]
pub struct Repositories {
    pub papers: PaperRepository,
    pub hashes: HashRepository,
    pub detection_logs: DetectionLogRepository,
    pub jobs: JobRepository,
}

impl Repositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            papers: PaperRepository::new(pool.clone()),
            hashes: HashRepository::new(pool.clone()),
            detection_logs: DetectionLogRepository::new(pool.clone()),
            jobs: JobRepository::new(pool),
        }
    }
}
