//! Disposable `PostgreSQL` databases for repository tests.

use std::sync::Arc;

use crate::migrations::Migrator;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Server coordinates of the test `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };
        Self {
            host: var("TEST_DB_HOST", "localhost"),
            port: var("TEST_DB_PORT", "5433").parse().unwrap_or(5433),
            username: var("TEST_DB_USER", "accord_test"),
            password: var("TEST_DB_PASSWORD", "accord_test"),
        }
    }
}

impl TestDbConfig {
    /// URL of database `name` on the test server.
    #[must_use]
    pub fn url_for(&self, name: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{name}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// A freshly created, fully migrated database holding only the
/// `user` and `proposal` tables.
pub struct TestDatabase {
    pub conn: Arc<DatabaseConnection>,
    pub name: String,
    config: TestDbConfig,
}

impl TestDatabase {
    /// Create `accord_test_<random>` and migrate it.
    pub async fn create_unique(config: TestDbConfig) -> Result<Self, DbErr> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("accord_test_{}", &suffix[..8]);

        let admin = Database::connect(config.url_for("postgres")).await?;
        admin
            .execute_unprepared(&format!("CREATE DATABASE \"{name}\""))
            .await?;
        admin.close().await?;

        let conn = Database::connect(config.url_for(&name)).await?;
        Migrator::up(&conn, None).await?;
        info!(database = %name, "Created test database");

        Ok(Self {
            conn: Arc::new(conn),
            name,
            config,
        })
    }

    /// Drop the database. Other handles to `conn` must be gone by now.
    pub async fn drop_database(self) -> Result<(), DbErr> {
        if let Ok(conn) = Arc::try_unwrap(self.conn) {
            conn.close().await?;
        }

        let admin = Database::connect(self.config.url_for("postgres")).await?;
        admin
            .execute_unprepared(&format!(
                "DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)",
                self.name
            ))
            .await?;
        admin.close().await?;

        info!(database = %self.name, "Dropped test database");
        Ok(())
    }
}
