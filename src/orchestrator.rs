//! Worker orchestration for a resolver run.
//!
//! Two pools of OS threads share one bounded scoring queue:
//!
//! ```text
//!  domain queue ──▶ domain workers (N) ──ScoreRequest──▶ scoring queue ──▶ scoring workers (M)
//!                        │    ▲                                               │
//!                        │    └────────────── private reply channel ──────────┘
//!                        ▼
//!                   ResultSink::upsert (one call per domain)
//! ```
//!
//! Domain workers pull whole domains, run the scope fallback for every form
//! and write the domain's rows in one sink call. Once every domain worker has
//! been joined, one [`ScoreMessage::Shutdown`] per scoring worker is queued
//! behind any remaining requests, and the scoring workers are joined.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::ProviderFactory;
use crate::models::Scope;
use crate::progress::{RunProgressEvent, RunProgressReporter};
use crate::resolve::DomainResolver;
use crate::scorer::ScoreClient;
use crate::scoring_worker::{spawn_scoring_worker, ScoreMessage, WorkerStats};
use crate::sink::ResultSink;
use crate::store::PageStore;

/// Pool sizes and the acceptance threshold for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub domain_workers: usize,
    pub scoring_workers: usize,
    pub queue_capacity: usize,
    pub max_batch_requests: usize,
    pub threshold: f32,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            domain_workers: config.workers.domain_workers,
            scoring_workers: config.workers.scoring_workers,
            queue_capacity: config.workers.queue_capacity,
            max_batch_requests: config.workers.max_batch_requests,
            threshold: config.resolve.threshold,
        }
    }
}

/// Totals of a run, merged from every domain worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Domains whose rows were produced (written or not).
    pub domains: u64,
    /// Domains whose jobs could not be listed.
    pub failed_domains: u64,
    /// Rows written to the sink.
    pub forms: u64,
    pub skipped_jobs: u64,
    pub skipped_forms: u64,
    /// Rows dropped because the sink rejected them.
    pub failed_writes: u64,
    pub scopes: BTreeMap<Scope, u64>,
}

impl RunSummary {
    fn merge(&mut self, other: RunSummary) {
        self.domains += other.domains;
        self.failed_domains += other.failed_domains;
        self.forms += other.forms;
        self.skipped_jobs += other.skipped_jobs;
        self.skipped_forms += other.skipped_forms;
        self.failed_writes += other.failed_writes;
        for (scope, count) in other.scopes {
            *self.scopes.entry(scope).or_insert(0) += count;
        }
    }

    pub fn scope_count(&self, scope: Scope) -> u64 {
        self.scopes.get(&scope).copied().unwrap_or(0)
    }
}

/// Starts one scoring worker and stops it straight away, so the model is
/// downloaded and initialised once before the pool starts.
pub fn warm_up(factory: &ProviderFactory) -> Result<WorkerStats> {
    let (queue, receiver) = crossbeam_channel::bounded(1);
    let handle = spawn_scoring_worker(0, Arc::clone(factory), receiver, 1)?;
    queue
        .send(ScoreMessage::Shutdown)
        .map_err(|_| anyhow!("Warm-up worker exited early"))?;
    handle
        .join()
        .map_err(|_| anyhow!("Warm-up worker panicked"))
}

/// Resolves every form of `domains` and writes the rows to `sink`.
///
/// Must be called inside a Tokio runtime; the pools themselves run on
/// dedicated OS threads and reach the async sink through the runtime handle.
pub async fn run_pipeline(
    store: Arc<dyn PageStore>,
    sink: Arc<dyn ResultSink>,
    factory: ProviderFactory,
    domains: Vec<String>,
    options: PipelineOptions,
    progress: Arc<dyn RunProgressReporter>,
) -> Result<RunSummary> {
    let runtime = Handle::current();
    tokio::task::spawn_blocking(move || {
        run_pools(store, sink, factory, domains, options, progress, runtime)
    })
    .await
    .context("Worker pools panicked")?
}

struct Shared {
    store: Arc<dyn PageStore>,
    sink: Arc<dyn ResultSink>,
    progress: Arc<dyn RunProgressReporter>,
    runtime: Handle,
    total: u64,
    done: AtomicU64,
    forms: AtomicU64,
}

fn run_pools(
    store: Arc<dyn PageStore>,
    sink: Arc<dyn ResultSink>,
    factory: ProviderFactory,
    domains: Vec<String>,
    options: PipelineOptions,
    progress: Arc<dyn RunProgressReporter>,
    runtime: Handle,
) -> Result<RunSummary> {
    let total = domains.len();
    info!(
        domains = total,
        domain_workers = options.domain_workers,
        scoring_workers = options.scoring_workers,
        threshold = options.threshold,
        "Starting worker pools"
    );

    let (score_queue, score_receiver) =
        crossbeam_channel::bounded::<ScoreMessage>(options.queue_capacity.max(1));
    let mut scorers = Vec::with_capacity(options.scoring_workers);
    for index in 0..options.scoring_workers.max(1) {
        scorers.push(spawn_scoring_worker(
            index,
            Arc::clone(&factory),
            score_receiver.clone(),
            options.max_batch_requests,
        )?);
    }
    drop(score_receiver);

    let (domain_queue, domain_receiver) = crossbeam_channel::unbounded::<String>();
    for domain in domains {
        domain_queue
            .send(domain)
            .map_err(|_| anyhow!("Domain queue closed"))?;
    }
    drop(domain_queue);

    let shared = Arc::new(Shared {
        store,
        sink,
        progress,
        runtime,
        total: total as u64,
        done: AtomicU64::new(0),
        forms: AtomicU64::new(0),
    });

    let mut workers: Vec<JoinHandle<RunSummary>> = Vec::new();
    let mut spawn_error = None;
    for index in 0..options.domain_workers.max(1).min(total) {
        let shared = Arc::clone(&shared);
        let receiver = domain_receiver.clone();
        let client = ScoreClient::new(score_queue.clone(), options.threshold);
        let spawned = std::thread::Builder::new()
            .name(format!("pplink-domain-{index}"))
            .spawn(move || domain_worker(index, &shared, &client, receiver));
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                spawn_error = Some(anyhow!(e).context(format!("Failed to spawn domain worker {index}")));
                break;
            }
        }
    }
    drop(domain_receiver);

    let mut summary = RunSummary::default();
    let mut panicked = 0usize;
    for handle in workers {
        match handle.join() {
            Ok(partial) => summary.merge(partial),
            Err(_) => panicked += 1,
        }
    }

    // Every real request is already queued; sentinels go in behind them.
    for _ in 0..scorers.len() {
        let _ = score_queue.send(ScoreMessage::Shutdown);
    }
    drop(score_queue);

    for (index, handle) in scorers.into_iter().enumerate() {
        match handle.join() {
            Ok(stats) => info!(
                worker = index,
                batches = stats.batches,
                requests = stats.requests,
                embedded = stats.embedded_texts,
                "Scoring worker joined"
            ),
            Err(_) => warn!(worker = index, "Scoring worker panicked"),
        }
    }

    if let Some(e) = spawn_error {
        return Err(e);
    }
    if panicked > 0 {
        return Err(anyhow!("{panicked} domain worker(s) panicked"));
    }

    info!(
        domains = summary.domains,
        forms = summary.forms,
        failed_writes = summary.failed_writes,
        "Worker pools finished"
    );
    Ok(summary)
}

fn domain_worker(
    index: usize,
    shared: &Shared,
    client: &ScoreClient,
    domains: Receiver<String>,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for domain in domains.iter() {
        let mut resolver = DomainResolver::new(shared.store.as_ref(), domain.as_str(), client);
        let mut written = 0u64;

        match resolver.resolve_domain() {
            Ok(report) => {
                summary.domains += 1;
                summary.skipped_jobs += report.skipped_jobs;
                summary.skipped_forms += report.skipped_forms;

                let rows = report.rows.len() as u64;
                match shared.runtime.block_on(shared.sink.upsert(&report.rows)) {
                    Ok(()) => {
                        written = rows;
                        summary.forms += rows;
                        for row in &report.rows {
                            *summary.scopes.entry(row.result.scope).or_insert(0) += 1;
                        }
                    }
                    Err(e) => {
                        warn!(worker = index, domain = %domain, rows, error = %e, "Dropping rows: sink write failed");
                        summary.failed_writes += rows;
                    }
                }
            }
            Err(e) => {
                warn!(worker = index, domain = %domain, error = %e, "Skipping domain");
                summary.failed_domains += 1;
            }
        }

        let n = shared.done.fetch_add(1, Ordering::Relaxed) + 1;
        let forms = shared.forms.fetch_add(written, Ordering::Relaxed) + written;
        shared.progress.report(RunProgressEvent::Resolving {
            n,
            total: shared.total,
            forms,
        });
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DisabledProvider, EmbeddingProvider};

    #[test]
    fn test_summary_merge() {
        let mut a = RunSummary {
            domains: 1,
            forms: 2,
            ..Default::default()
        };
        a.scopes.insert(Scope::Form, 2);
        let mut b = RunSummary {
            domains: 2,
            forms: 1,
            failed_writes: 3,
            ..Default::default()
        };
        b.scopes.insert(Scope::Form, 1);
        b.scopes.insert(Scope::Unknown, 1);
        a.merge(b);
        assert_eq!(a.domains, 3);
        assert_eq!(a.forms, 3);
        assert_eq!(a.failed_writes, 3);
        assert_eq!(a.scope_count(Scope::Form), 3);
        assert_eq!(a.scope_count(Scope::Unknown), 1);
        assert_eq!(a.scope_count(Scope::Parent), 0);
    }

    #[test]
    fn test_warm_up_with_disabled_provider() {
        let factory: ProviderFactory =
            Arc::new(|_| Ok(Box::new(DisabledProvider) as Box<dyn EmbeddingProvider>));
        let stats = warm_up(&factory).unwrap();
        assert_eq!(stats.requests, 0);
    }

    #[test]
    fn test_warm_up_survives_factory_error() {
        let factory: ProviderFactory = Arc::new(|_| Err(anyhow!("no model")));
        assert!(warm_up(&factory).is_ok());
    }

    #[test]
    fn test_options_from_config() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "x.sqlite"
            [store]
            root = "crawl"
            [workers]
            domain_workers = 3
            [resolve]
            threshold = 0.6
            "#,
        )
        .unwrap();
        let options = PipelineOptions::from_config(&config);
        assert_eq!(options.domain_workers, 3);
        assert_eq!(options.scoring_workers, 1);
        assert_eq!(options.threshold, 0.6);
    }
}
