use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::sync::atomic::{AtomicUsize, Ordering};

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Create an isolated in-memory SQLite database for testing
pub async fn create_test_database() -> Result<Pool<Sqlite>> {
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_name = format!("file:test_db_{}?mode=memory&cache=shared", counter);

    let pool = SqlitePoolOptions::new()
        .max_connections(1) // SQLite in-memory works best with single connection
        .connect(&db_name)
        .await?;

    setup_test_schema(&pool).await?;

    Ok(pool)
}

async fn setup_test_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            url TEXT NOT NULL,
            repository_type TEXT NOT NULL,
            branch TEXT,
            enabled BOOLEAN NOT NULL DEFAULT true,
            access_token TEXT,
            gitlab_namespace TEXT,
            gitlab_excluded_projects TEXT,
            gitlab_excluded_patterns TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_crawled DATETIME,
            last_indexed_revision TEXT,
            auto_crawl_enabled BOOLEAN NOT NULL DEFAULT false,
            cron_schedule TEXT,
            next_crawl_at DATETIME,
            crawl_frequency_hours INTEGER,
            max_crawl_duration_minutes INTEGER,
            last_crawl_duration_seconds INTEGER,
            crawl_state TEXT,
            last_processed_project TEXT,
            crawl_started_at DATETIME
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_isolated_databases() {
        let db1 = create_test_database().await.unwrap();
        let db2 = create_test_database().await.unwrap();

        sqlx::query(
            "INSERT INTO repositories (id, name, url, repository_type) VALUES ('1', 'repo-a', '/tmp/a', 'FILESYSTEM')",
        )
        .execute(&db1)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO repositories (id, name, url, repository_type) VALUES ('2', 'repo-b', '/tmp/b', 'FILESYSTEM')",
        )
        .execute(&db2)
        .await
        .unwrap();

        let count1: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repositories").fetch_one(&db1).await.unwrap();
        let count2: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repositories").fetch_one(&db2).await.unwrap();

        assert_eq!(count1, 1);
        assert_eq!(count2, 1);
    }
}
