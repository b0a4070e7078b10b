//! Cache schema management.
//!
//! The cache holds nothing that cannot be refetched, so a schema bump drops
//! the old table rather than converting rows. The version lives in
//! SQLite's `user_version` pragma.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// Bump when the `cache_entries` layout or the entry encoding changes.
pub const SCHEMA_VERSION: i64 = 1;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Bring the schema on `pool` up to [`SCHEMA_VERSION`]. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if current == SCHEMA_VERSION {
        return Ok(());
    }

    if current != 0 {
        info!(from = current, to = SCHEMA_VERSION, "cache schema changed, discarding entries");
        sqlx::query("DROP TABLE IF EXISTS cache_entries")
            .execute(pool)
            .await?;
    }

    // `value` is the serialized `{data, timestamp}` entry.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // PRAGMA does not accept bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let pool = db::open_path(&tmp.path().join("cache.sqlite")).await.unwrap();
        migrate_pool(&pool).await.unwrap();
        sqlx::query("INSERT INTO cache_entries (key, value) VALUES ('k', 'v')")
            .execute(&pool)
            .await
            .unwrap();

        migrate_pool(&pool).await.unwrap();
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_outdated_schema_is_discarded() {
        let tmp = TempDir::new().unwrap();
        let pool = db::open_path(&tmp.path().join("cache.sqlite")).await.unwrap();
        sqlx::query("CREATE TABLE cache_entries (key TEXT, value TEXT, extra TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO cache_entries VALUES ('k', 'v', 'x')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION + 41))
            .execute(&pool)
            .await
            .unwrap();

        migrate_pool(&pool).await.unwrap();

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 0);
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
