//! Database access for legatio-tracker
//!
//! SQLite holds the applicant completion flags when `database_path` is
//! configured.

pub mod flags;

pub use flags::SqliteFlagStore;

use legatio_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the file (and its parent directory) on first use.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create legatio-tracker tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS application_flags (
            application_id TEXT NOT NULL,
            flag TEXT NOT NULL,
            value INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (application_id, flag)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (application_flags)");

    Ok(())
}
