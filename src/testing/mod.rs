use std::path::Path;

use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};

use crate::auth::hash_password;
use crate::config::DatabaseConfig;
use crate::database::DatabaseManager;

/// A fresh, migrated in-memory database with seeding helpers.
///
/// The pool holds a single connection, so a test must drop any connection it
/// took with [`TestDb::conn`] before calling code that acquires from the pool.
pub struct TestDb {
    manager: DatabaseManager,
}

impl TestDb {
    pub async fn new() -> Self {
        let manager = DatabaseManager::in_memory()
            .await
            .expect("in-memory database");
        Self { manager }
    }

    /// A migrated file database under `dir` with a multi-connection pool, for
    /// tests that need real concurrent writers
    pub async fn file(dir: &Path, busy_timeout_ms: u64) -> Self {
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.join("protocols.db").display()),
            max_connections: 8,
            connection_timeout: 10,
            busy_timeout_ms,
            enable_query_logging: false,
        };
        let manager = DatabaseManager::connect(&config).await.expect("file database");
        manager.migrate().await.expect("migrate file database");
        Self { manager }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.manager.pool()
    }

    pub async fn conn(&self) -> PoolConnection<Sqlite> {
        self.pool().acquire().await.expect("connection")
    }

    pub async fn user(&self, username: &str) -> i64 {
        self.user_with_role(username, "user").await
    }

    pub async fn admin(&self, username: &str) -> i64 {
        self.user_with_role(username, "admin").await
    }

    async fn user_with_role(&self, username: &str, role: &str) -> i64 {
        let now = Utc::now();
        sqlx::query("INSERT INTO users (username, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
            .bind(username)
            .bind(hash_password("password123", crate::auth::password::BCRYPT_MIN_COST).expect("hash password"))
            .bind(role)
            .bind(now)
            .bind(now)
            .execute(self.pool())
            .await
            .expect("insert user")
            .last_insert_rowid()
    }

    pub async fn protocol(&self, name: &str) -> i64 {
        self.insert("protocols", name).await
    }

    pub async fn section(&self, name: &str) -> i64 {
        self.insert("sections", name).await
    }

    pub async fn task(&self, name: &str) -> i64 {
        self.insert("tasks", name).await
    }

    pub async fn subsection(&self, name: &str) -> i64 {
        self.insert("subsections", name).await
    }

    pub async fn sensor(&self, name: &str) -> i64 {
        self.insert("sensors", name).await
    }

    pub async fn domain(&self, name: &str) -> i64 {
        self.insert("domains", name).await
    }

    /// Attach a default association row, e.g. `link("task_sensors", "task_id", t, "sensor_id", s)`
    pub async fn link(&self, table: &str, owner_column: &str, owner: i64, attribute_column: &str, attribute: i64) {
        sqlx::query(&format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?)",
            table, owner_column, attribute_column
        ))
        .bind(owner)
        .bind(attribute)
        .execute(self.pool())
        .await
        .expect("insert link");
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.pool())
            .await
            .expect("count")
    }

    async fn insert(&self, table: &str, name: &str) -> i64 {
        let now = Utc::now();
        sqlx::query(&format!(
            "INSERT INTO {} (name, created_at, updated_at) VALUES (?, ?, ?)",
            table
        ))
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .expect("insert catalog row")
        .last_insert_rowid()
    }
}
