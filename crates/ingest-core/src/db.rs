//! Connection pooling and schema setup for the relational store.

use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledSqlite = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Build a connection pool against `database_url` (a path or `sqlite://` URL)
/// and run any pending migrations.
pub fn connect(database_url: &str) -> Result<SqlitePool, anyhow::Error> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder().max_size(8).build(manager)?;

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;

    Ok(pool)
}

/// Test-only helper: a migrated pool backed by a fresh file in a temp
/// directory. A bare `:memory:` URL gives every pooled connection its own
/// independent database, so (mirroring the teacher's own sqlite test setup)
/// tests use a real temp file instead. The `TempDir` guard must outlive the
/// pool.
#[cfg(test)]
pub fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("test.sqlite3");
    let pool = connect(db_path.to_str().expect("utf8 path")).expect("connect test pool");
    (pool, dir)
}
