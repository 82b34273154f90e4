use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the result table and its indexes. Safe to run repeatedly.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // One row per form; re-resolving a form overwrites its row.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS privacy_policy_link (
            domain TEXT NOT NULL,
            job_id TEXT NOT NULL,
            form_id TEXT NOT NULL,
            scope TEXT NOT NULL CHECK (scope IN ('FORM', 'PAGE', 'PARENT', 'UNKNOWN')),
            text TEXT,
            url TEXT,
            resolved_at INTEGER NOT NULL,
            UNIQUE(domain, job_id, form_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ppl_scope ON privacy_policy_link(scope)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Deletes every stored result (used by `run --fresh`).
pub async fn clear_results(pool: &SqlitePool) -> Result<u64> {
    let done = sqlx::query("DELETE FROM privacy_policy_link")
        .execute(pool)
        .await?;
    Ok(done.rows_affected())
}
