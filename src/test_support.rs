//! Throwaway SQLite databases migrated to the current schema.
//!
//! Shared by the unit tests and, through a `#[path]` include, by `tests/`.
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::TempDir;

pub struct TestDb {
    db: DatabaseConnection,
    // Dropped last so the file outlives the pool.
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("permissions.db").display()
        );

        let db = Database::connect(&url)
            .await
            .expect("connect to test database");
        migration::Migrator::up(&db, None)
            .await
            .expect("apply migrations");

        Self { db, _dir: dir }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}
