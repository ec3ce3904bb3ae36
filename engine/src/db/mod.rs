/// Database module for SQLite persistence
///
/// This module provides database operations for users, chat sessions, ordered
/// message turns, and task contexts. It uses sqlx with parameterized queries
/// and WAL mode for better concurrency.
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod sessions;
pub mod task_contexts;

/// Current time as epoch milliseconds.
///
/// Millisecond resolution keeps `updated_at` strictly increasing across
/// quick successive turn appends.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

// Re-export commonly used types
pub use sessions::{SessionLocks, SessionRepository};
pub use task_contexts::{TaskContext, TaskContextRepository};

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
    session_locks: SessionLocks,
}

impl Database {
    /// Create a new database connection
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode for better concurrency
    /// 3. Enforce foreign keys so session deletes cascade to messages
    ///    and task contexts
    /// 4. Run migrations to set up the schema
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        // Configure SQLite connection with WAL mode
        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        // Create connection pool
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self {
            pool,
            session_locks: SessionLocks::default(),
        };

        // Run migrations
        db.run_migrations().await?;

        Ok(db)
    }

    /// Create an in-memory database, used by tests and one-shot CLI runs.
    ///
    /// A single connection is required: every `:memory:` connection gets its
    /// own private database, so a larger pool would scatter tables across
    /// connections.
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let db = Self {
            pool,
            session_locks: SessionLocks::default(),
        };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// This executes the embedded SQL migration files. Migrations are
    /// idempotent and can be run multiple times safely.
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    ///
    /// This allows other modules to execute queries against the database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL to disk
    ///
    /// This should be called during graceful shutdown to ensure all
    /// pending writes are persisted to the database file.
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Close the database connection
    ///
    /// This flushes the WAL and closes all connections in the pool.
    /// Should be called during shutdown.
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");

        // Flush WAL before closing
        self.flush_wal().await?;

        // Close the pool
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }

    /// Create a session repository
    ///
    /// All repositories created from the same `Database` share one
    /// per-session lock table, so appends and rewinds against a session are
    /// serialized no matter which repository instance issued them.
    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone(), self.session_locks.clone())
    }

    /// Create a task context repository
    pub fn task_contexts(&self) -> TaskContextRepository {
        TaskContextRepository::new(self.pool.clone())
    }
}
