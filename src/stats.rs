//! Result table statistics.
//!
//! Summarises what `pplink run` has written: rows per scope, how many
//! domains have results, and when the table was last touched. Used by
//! `pplink stats`.

use std::collections::BTreeMap;

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::Scope;

/// Counts read from the result table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SinkStats {
    pub rows: i64,
    pub domains: i64,
    pub scopes: BTreeMap<Scope, i64>,
    pub last_resolved_at: Option<i64>,
}

impl SinkStats {
    pub fn scope_count(&self, scope: Scope) -> i64 {
        self.scopes.get(&scope).copied().unwrap_or(0)
    }
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<SinkStats> {
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM privacy_policy_link")
        .fetch_one(pool)
        .await?;

    let domains: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT domain) FROM privacy_policy_link")
            .fetch_one(pool)
            .await?;

    let last_resolved_at: Option<i64> =
        sqlx::query_scalar("SELECT MAX(resolved_at) FROM privacy_policy_link")
            .fetch_one(pool)
            .await?;

    let scope_rows = sqlx::query(
        "SELECT scope, COUNT(*) AS n FROM privacy_policy_link GROUP BY scope",
    )
    .fetch_all(pool)
    .await?;

    let mut scopes = BTreeMap::new();
    for row in &scope_rows {
        let name: String = row.get("scope");
        scopes.insert(name.parse::<Scope>()?, row.get::<i64, _>("n"));
    }

    Ok(SinkStats {
        rows,
        domains,
        scopes,
        last_resolved_at,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Policy Link — Result Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Forms:       {}", stats.rows);
    println!("  Domains:     {}", stats.domains);
    println!(
        "  Last run:    {}",
        stats
            .last_resolved_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if stats.rows > 0 {
        println!();
        println!("  {:<10} {:>10} {:>8}", "SCOPE", "FORMS", "SHARE");
        println!("  {}", "-".repeat(30));
        for scope in Scope::ALL {
            let n = stats.scope_count(scope);
            println!(
                "  {:<10} {:>10} {:>7}%",
                scope.as_str(),
                n,
                (n * 100) / stats.rows
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now ("3 hours ago"), or as a date
/// once it is a month old.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 || delta >= 86400 * 30 {
        return chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| ts.to_string());
    }

    let (n, unit) = match delta {
        d if d < 60 => return "just now".to_string(),
        d if d < 3600 => (d / 60, "min"),
        d if d < 86400 => (d / 3600, "hour"),
        d => (d / 86400, "day"),
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
