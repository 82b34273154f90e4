//! The `pplink run` command.
//!
//! Opens the crawl store, picks the domains to resolve, warms the embedding
//! model up, runs the worker pools and prints a summary. With `--dry-run`
//! results go to an in-memory sink and the database is never opened.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::{self, Config};
use crate::db;
use crate::embedding::provider_factory;
use crate::migrate;
use crate::models::Scope;
use crate::orchestrator::{run_pipeline, warm_up, PipelineOptions, RunSummary};
use crate::progress::{ProgressMode, RunProgressEvent, RunProgressReporter};
use crate::sink::{MemorySink, ResultSink, SqliteSink};
use crate::store::{FsPageStore, PageStore};

/// Command-line options of `pplink run`.
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Restrict the run to these domains; empty means every domain.
    pub domains: Vec<String>,
    pub limit: Option<usize>,
    /// Clear previous results before resolving.
    pub fresh: bool,
    pub dry_run: bool,
    pub domain_workers: Option<usize>,
    pub scoring_workers: Option<usize>,
    pub threshold: Option<f32>,
    pub progress: ProgressMode,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            limit: None,
            fresh: false,
            dry_run: false,
            domain_workers: None,
            scoring_workers: None,
            threshold: None,
            progress: ProgressMode::Off,
        }
    }
}

/// Applies CLI overrides on top of the file configuration and re-validates.
pub fn apply_overrides(config: &Config, args: &RunArgs) -> Result<Config> {
    let mut config = config.clone();
    if let Some(n) = args.domain_workers {
        config.workers.domain_workers = n;
    }
    if let Some(n) = args.scoring_workers {
        config.workers.scoring_workers = n;
    }
    if let Some(t) = args.threshold {
        config.resolve.threshold = t;
    }
    config::validate(&config)?;
    Ok(config)
}

/// Domains to resolve, in store order. Requested domains must exist.
pub fn select_domains(
    store: &dyn PageStore,
    requested: &[String],
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let available = store.domains()?;
    let mut domains = if requested.is_empty() {
        available
    } else {
        for domain in requested {
            if !available.contains(domain) {
                bail!("Unknown domain: '{}' is not in the crawl store", domain);
            }
        }
        available
            .into_iter()
            .filter(|d| requested.contains(d))
            .collect()
    };
    if let Some(limit) = limit {
        domains.truncate(limit);
    }
    Ok(domains)
}

pub async fn run_resolve(config: &Config, args: RunArgs) -> Result<RunSummary> {
    let config = apply_overrides(config, &args)?;

    let store: Arc<dyn PageStore> = Arc::new(
        FsPageStore::new(&config.store.root).context("Failed to open crawl store")?,
    );
    let domains = select_domains(store.as_ref(), &args.domains, args.limit)?;
    info!(domains = domains.len(), root = %config.store.root.display(), "Domains selected");

    let progress: Arc<dyn RunProgressReporter> = Arc::from(args.progress.reporter());
    let factory = provider_factory(&config.embedding);

    if config.embedding.is_enabled() && !domains.is_empty() {
        let model = config
            .embedding
            .model
            .clone()
            .unwrap_or_else(|| config.embedding.provider.clone());
        progress.report(RunProgressEvent::WarmingUp { model });
        let warm_factory = Arc::clone(&factory);
        tokio::task::spawn_blocking(move || warm_up(&warm_factory))
            .await
            .context("Warm-up panicked")??;
    }

    let (sink, pool): (Arc<dyn ResultSink>, Option<sqlx::SqlitePool>) = if args.dry_run {
        (Arc::new(MemorySink::new()), None)
    } else {
        let pool = db::connect(&config).await?;
        migrate::create_schema(&pool).await?;
        if args.fresh {
            let cleared = migrate::clear_results(&pool).await?;
            info!(rows = cleared, "Cleared previous results");
        }
        (Arc::new(SqliteSink::new(pool.clone())), Some(pool))
    };

    let summary = run_pipeline(
        store,
        sink,
        factory,
        domains,
        PipelineOptions::from_config(&config),
        progress,
    )
    .await?;

    print_summary(&summary, args.dry_run);

    if let Some(pool) = pool {
        pool.close().await;
    }
    Ok(summary)
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    if dry_run {
        println!("run (dry-run)");
    } else {
        println!("run");
    }
    println!("  domains: {}", summary.domains);
    if summary.failed_domains > 0 {
        println!("  failed domains: {}", summary.failed_domains);
    }
    println!("  forms: {}", summary.forms);
    for scope in Scope::ALL {
        println!("    {:<8} {}", scope.as_str(), summary.scope_count(scope));
    }
    println!("  skipped jobs: {}", summary.skipped_jobs);
    println!("  skipped forms: {}", summary.skipped_forms);
    println!("  failed writes: {}", summary.failed_writes);
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageInfo;

    struct Domains(Vec<&'static str>);

    impl PageStore for Domains {
        fn domains(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|d| d.to_string()).collect())
        }
        fn jobs(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn page_info(&self, _: &str, _: &str) -> Result<PageInfo> {
            bail!("unused")
        }
        fn page_markup(&self, _: &str, _: &str) -> Result<String> {
            bail!("unused")
        }
        fn form_ids(&self, _: &str, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn form_markup(&self, _: &str, _: &str, _: &str) -> Result<String> {
            bail!("unused")
        }
    }

    #[test]
    fn test_select_domains() {
        let store = Domains(vec!["a.com", "b.com", "c.com"]);
        assert_eq!(select_domains(&store, &[], Some(2)).unwrap(), vec!["a.com", "b.com"]);
        assert_eq!(
            select_domains(&store, &["c.com".into(), "a.com".into()], None).unwrap(),
            vec!["a.com", "c.com"]
        );
        assert!(select_domains(&store, &["z.com".into()], None).is_err());
    }

    #[test]
    fn test_overrides_are_validated() {
        let config: Config = toml::from_str("[db]\npath = 'x'\n[store]\nroot = 'y'\n").unwrap();
        let args = RunArgs {
            threshold: Some(0.5),
            domain_workers: Some(2),
            ..Default::default()
        };
        let merged = apply_overrides(&config, &args).unwrap();
        assert_eq!(merged.resolve.threshold, 0.5);
        assert_eq!(merged.workers.domain_workers, 2);

        let bad = RunArgs {
            threshold: Some(1.5),
            ..Default::default()
        };
        assert!(apply_overrides(&config, &bad).is_err());
    }
}
