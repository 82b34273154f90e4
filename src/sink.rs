//! Result sinks: where resolved forms are written.
//!
//! Writes are upserts keyed by `(domain, job_id, form_id)`, so re-running
//! the resolver over the same crawl converges to one row per form.
//! [`SqliteSink`] serializes writers behind an async mutex; each call is
//! one transaction.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::models::{ResolvedForm, Scope, ScopeResult};

/// Destination for finished rows.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Inserts or replaces the rows. Writing an identical row again leaves
    /// the stored state unchanged.
    async fn upsert(&self, rows: &[ResolvedForm]) -> Result<()>;
}

/// SQLite-backed sink over the `privacy_policy_link` table.
pub struct SqliteSink {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteSink {
    /// Wraps a pool whose schema has already been created.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ResultSink for SqliteSink {
    async fn upsert(&self, rows: &[ResolvedForm]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for row in rows {
            // Only touch the row when the outcome changed, so an identical
            // rewrite keeps its original resolved_at.
            sqlx::query(
                r#"
                INSERT INTO privacy_policy_link
                    (domain, job_id, form_id, scope, text, url, resolved_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(domain, job_id, form_id) DO UPDATE SET
                    scope = excluded.scope,
                    text = excluded.text,
                    url = excluded.url,
                    resolved_at = excluded.resolved_at
                WHERE scope IS NOT excluded.scope
                   OR text IS NOT excluded.text
                   OR url IS NOT excluded.url
                "#,
            )
            .bind(&row.domain)
            .bind(&row.job_id)
            .bind(&row.form_id)
            .bind(row.result.scope.as_str())
            .bind(row.result.text.as_deref())
            .bind(row.result.url.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

type RowKey = (String, String, String);

/// In-memory sink used by `run --dry-run` and tests.
#[derive(Default)]
pub struct MemorySink {
    rows: RwLock<BTreeMap<RowKey, ScopeResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: &str, job_id: &str, form_id: &str) -> Option<ScopeResult> {
        let rows = self.rows.read().ok()?;
        rows.get(&(domain.to_string(), job_id.to_string(), form_id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored rows per scope.
    pub fn scope_counts(&self) -> BTreeMap<Scope, u64> {
        let mut counts = BTreeMap::new();
        if let Ok(rows) = self.rows.read() {
            for result in rows.values() {
                *counts.entry(result.scope).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn upsert(&self, rows: &[ResolvedForm]) -> Result<()> {
        let mut stored = self
            .rows
            .write()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?;
        for row in rows {
            stored.insert(
                (row.domain.clone(), row.job_id.clone(), row.form_id.clone()),
                row.result.clone(),
            );
        }
        Ok(())
    }
}
