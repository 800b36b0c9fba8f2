mod article_repository;
mod models;
mod task_repository;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;

pub use article_repository::*;
pub use models::*;
pub use task_repository::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Sets sqlite up for multi-process polling: WAL plus a busy timeout so
/// concurrent conditional updates queue instead of erroring.
#[derive(Debug)]
struct ConnectionOptions;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionOptions
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(Clone, Debug)]
pub struct Database {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
}

impl Database {
    pub fn new(db_path: &str) -> Self {
        let manager = ConnectionManager::<SqliteConnection>::new(db_path);
        let pool = Pool::builder()
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .expect("Failed to create pool.");

        let db = Database {
            pool: Arc::new(pool),
        };
        db.run_migrations();
        db
    }

    pub fn get_conn(&self) -> PooledConnection<ConnectionManager<SqliteConnection>> {
        self.pool.get().expect("Failed to get connection")
    }

    fn run_migrations(&self) {
        let mut conn = self.get_conn();
        conn.run_pending_migrations(MIGRATIONS)
            .expect("Failed to run migrations");
    }

    /// In-memory database for tests; a single pooled connection so every
    /// borrow sees the same data.
    #[cfg(test)]
    pub fn new_test() -> Self {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("Failed to create test pool.");
        let db = Database {
            pool: Arc::new(pool),
        };
        db.run_migrations();
        db
    }
}
