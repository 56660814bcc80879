//! Applicant completion flags
//!
//! Key-value rows keyed by (application_id, flag). A missing row reads as
//! false.

use crate::models::FlagName;
use crate::services::providers::FlagStore;
use async_trait::async_trait;
use chrono::Utc;
use legatio_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Read one flag (internal)
async fn get_flag(db: &Pool<Sqlite>, application_id: &str, flag: FlagName) -> Result<Option<bool>> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT value FROM application_flags WHERE application_id = ? AND flag = ?",
    )
    .bind(application_id)
    .bind(flag.as_str())
    .fetch_optional(db)
    .await
    .map_err(Error::Database)?;

    Ok(row.map(|(value,)| value != 0))
}

/// Write one flag (internal)
async fn set_flag(
    db: &Pool<Sqlite>,
    application_id: &str,
    flag: FlagName,
    value: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO application_flags (application_id, flag, value, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(application_id, flag)
         DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(application_id)
    .bind(flag.as_str())
    .bind(value as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Flag store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteFlagStore {
    db: Pool<Sqlite>,
}

impl SqliteFlagStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FlagStore for SqliteFlagStore {
    async fn get(&self, application_id: &str, flag: FlagName) -> Result<bool> {
        Ok(get_flag(&self.db, application_id, flag).await?.unwrap_or(false))
    }

    async fn set(&self, application_id: &str, flag: FlagName, value: bool) -> Result<()> {
        set_flag(&self.db, application_id, flag, value).await?;
        tracing::debug!(application_id, %flag, value, "Flag stored");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Pool<Sqlite>) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("flags.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_absent_flag_reads_false() {
        let (_dir, pool) = setup_test_db().await;
        let store = SqliteFlagStore::new(pool);

        assert!(!store.get("app-1", FlagName::BiometricDone).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_dir, pool) = setup_test_db().await;
        let store = SqliteFlagStore::new(pool);

        store.set("app-1", FlagName::PaymentDone, true).await.unwrap();
        assert!(store.get("app-1", FlagName::PaymentDone).await.unwrap());
        assert!(!store.get("app-1", FlagName::BiometricDone).await.unwrap());
        assert!(!store.get("app-2", FlagName::PaymentDone).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_updates_in_place() {
        let (_dir, pool) = setup_test_db().await;
        let store = SqliteFlagStore::new(pool.clone());

        store.set("app-1", FlagName::BiometricDone, true).await.unwrap();
        store.set("app-1", FlagName::BiometricDone, false).await.unwrap();
        assert!(!store.get("app-1", FlagName::BiometricDone).await.unwrap());

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM application_flags WHERE application_id = 'app-1'"
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "Should have exactly one row after update");
    }

    #[tokio::test]
    async fn test_flags_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("flags.db");

        {
            let pool = init_database_pool(&path).await.unwrap();
            SqliteFlagStore::new(pool.clone())
                .set("app-1", FlagName::PaymentDone, true)
                .await
                .unwrap();
            pool.close().await;
        }

        let pool = init_database_pool(&path).await.unwrap();
        assert!(SqliteFlagStore::new(pool)
            .get("app-1", FlagName::PaymentDone)
            .await
            .unwrap());
    }
}
