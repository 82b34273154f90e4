//! Scoring workers: the accelerator-bound side of the scoring queue.
//!
//! Each worker owns one [`EmbeddingProvider`], the embeddings of the seed
//! phrases, and a [`ScoreCache`]. It blocks for the first request on the
//! shared queue, drains whatever else is immediately available (up to
//! `max_batch_requests`), embeds only the texts it has not seen before in a
//! single provider call, and answers every request on its private reply
//! channel.
//!
//! Shutdown is cooperative: the orchestrator enqueues one
//! [`ScoreMessage::Shutdown`] per worker after all real requests. A worker
//! that observes a sentinel finishes the batch it has collected so far and
//! exits without draining further, so every worker consumes exactly one
//! sentinel.

use std::collections::{HashMap, HashSet};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use half::f16;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{cosine_similarity, DisabledProvider, EmbeddingProvider, ProviderFactory};
use crate::phrases::SEED_PHRASES;

/// Why a request could not be answered with semantic scores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("semantic scoring unavailable")]
    Unavailable,

    #[error("embedding provider failed: {0}")]
    Provider(String),

    #[error("scoring worker went away")]
    WorkerGone,
}

/// One semantic score per requested text, in request order.
pub type ScoreReply = Result<Vec<f32>, ScoreError>;

/// A batch of texts from one domain worker plus the channel to answer on.
pub struct ScoreRequest {
    pub texts: Vec<String>,
    pub reply: Sender<ScoreReply>,
}

/// Messages on the shared scoring queue.
pub enum ScoreMessage {
    Score(ScoreRequest),
    /// Stop sentinel; one is sent per worker.
    Shutdown,
}

/// Text → similarity memo, private to one worker. Never invalidated: a
/// fixed model gives a fixed score for a fixed text.
#[derive(Debug, Default)]
pub struct ScoreCache {
    scores: HashMap<String, f32>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, text: &str) -> Option<f32> {
        self.scores.get(text).copied()
    }

    pub fn insert(&mut self, text: String, score: f32) {
        self.scores.insert(text, score);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Distinct non-empty texts that are not cached yet, in first-seen order.
    pub fn missing<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut seen = HashSet::new();
        texts
            .into_iter()
            .filter(|t| !t.is_empty() && !self.scores.contains_key(*t))
            .filter(|t| seen.insert(*t))
            .map(str::to_string)
            .collect()
    }
}

/// Counters reported when a worker exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: u64,
    pub requests: u64,
    pub embedded_texts: u64,
    pub cache_size: usize,
}

pub struct ScoringWorker {
    index: usize,
    provider: Box<dyn EmbeddingProvider>,
    /// `None` when seed embeddings could not be computed; every request is
    /// then answered with [`ScoreError::Unavailable`].
    seeds: Option<Vec<Vec<f32>>>,
    cache: ScoreCache,
    max_batch_requests: usize,
    stats: WorkerStats,
}

impl ScoringWorker {
    /// Creates a worker and embeds the seed phrases with `provider`.
    pub fn new(
        index: usize,
        mut provider: Box<dyn EmbeddingProvider>,
        max_batch_requests: usize,
    ) -> Self {
        let phrases: Vec<String> = SEED_PHRASES.iter().map(|p| p.to_string()).collect();
        let seeds = match provider.embed(&phrases) {
            Ok(v) if v.len() == phrases.len() => Some(v),
            Ok(v) => {
                warn!(
                    worker = index,
                    expected = phrases.len(),
                    got = v.len(),
                    "Seed embedding count mismatch; using seed-phrase matching only"
                );
                None
            }
            Err(e) => {
                warn!(
                    worker = index,
                    error = %e,
                    "Seed embeddings unavailable; using seed-phrase matching only"
                );
                None
            }
        };

        Self {
            index,
            provider,
            seeds,
            cache: ScoreCache::new(),
            max_batch_requests: max_batch_requests.max(1),
            stats: WorkerStats::default(),
        }
    }

    pub fn is_semantic(&self) -> bool {
        self.seeds.is_some()
    }

    /// Serves `queue` until a sentinel is observed or every sender is gone.
    pub fn run(mut self, queue: Receiver<ScoreMessage>) -> WorkerStats {
        info!(
            worker = self.index,
            model = self.provider.model_name(),
            semantic = self.is_semantic(),
            "Scoring worker started"
        );

        loop {
            let (batch, stop) = self.next_batch(&queue);
            if !batch.is_empty() {
                self.score_batch(batch);
            }
            if stop {
                break;
            }
        }

        self.stats.cache_size = self.cache.len();
        info!(
            worker = self.index,
            batches = self.stats.batches,
            requests = self.stats.requests,
            embedded = self.stats.embedded_texts,
            cached = self.stats.cache_size,
            "Scoring worker stopped"
        );
        self.stats
    }

    /// Blocks for one message, then drains without blocking up to the batch
    /// cap. The flag is true when the worker should exit after this batch.
    fn next_batch(&self, queue: &Receiver<ScoreMessage>) -> (Vec<ScoreRequest>, bool) {
        let first = match queue.recv() {
            Ok(ScoreMessage::Score(request)) => request,
            Ok(ScoreMessage::Shutdown) | Err(_) => return (Vec::new(), true),
        };

        let mut batch = vec![first];
        while batch.len() < self.max_batch_requests {
            match queue.try_recv() {
                Ok(ScoreMessage::Score(request)) => batch.push(request),
                Ok(ScoreMessage::Shutdown) => return (batch, true),
                Err(_) => break,
            }
        }
        (batch, false)
    }

    /// Scores a batch of requests and replies to each of them.
    pub fn score_batch(&mut self, batch: Vec<ScoreRequest>) {
        self.stats.batches += 1;
        self.stats.requests += batch.len() as u64;

        let Some(seeds) = &self.seeds else {
            for request in batch {
                let _ = request.reply.send(Err(ScoreError::Unavailable));
            }
            return;
        };

        let novel = self
            .cache
            .missing(batch.iter().flat_map(|r| r.texts.iter().map(String::as_str)));

        let mut failure = None;
        if !novel.is_empty() {
            debug!(worker = self.index, requests = batch.len(), novel = novel.len(), "Embedding batch");
            match self.provider.embed(&novel) {
                Ok(vectors) if vectors.len() == novel.len() => {
                    self.stats.embedded_texts += novel.len() as u64;
                    for (text, vector) in novel.into_iter().zip(vectors) {
                        self.cache.insert(text, seed_similarity(seeds, &vector));
                    }
                }
                Ok(vectors) => {
                    failure = Some(ScoreError::Provider(format!(
                        "expected {} embeddings, got {}",
                        novel.len(),
                        vectors.len()
                    )));
                }
                Err(e) => failure = Some(ScoreError::Provider(e.to_string())),
            }
        }

        if let Some(err) = &failure {
            warn!(worker = self.index, error = %err, "Embedding batch failed");
        }

        for request in batch {
            let scores: Option<Vec<f32>> = request
                .texts
                .iter()
                .map(|t| if t.is_empty() { Some(0.0) } else { self.cache.get(t) })
                .collect();
            let reply = scores.ok_or_else(|| {
                failure
                    .clone()
                    .unwrap_or_else(|| ScoreError::Provider("score missing from cache".to_string()))
            });
            // The requester may have given up; nothing to do then.
            let _ = request.reply.send(reply);
        }
    }
}

/// Maximum cosine similarity against the seed set, clamped to `[0, 1]` and
/// rounded through half precision.
fn seed_similarity(seeds: &[Vec<f32>], vector: &[f32]) -> f32 {
    let best = seeds
        .iter()
        .map(|seed| cosine_similarity(seed, vector))
        .fold(0.0f32, f32::max)
        .clamp(0.0, 1.0);
    f16::from_f32(best).to_f32()
}

/// Starts a scoring worker on its own OS thread.
///
/// The provider is built on that thread. If construction fails the worker
/// still serves the queue, answering every request as unavailable, so that
/// domain workers never block on a dead consumer.
pub fn spawn_scoring_worker(
    index: usize,
    factory: ProviderFactory,
    queue: Receiver<ScoreMessage>,
    max_batch_requests: usize,
) -> Result<JoinHandle<WorkerStats>> {
    std::thread::Builder::new()
        .name(format!("pplink-scoring-{index}"))
        .spawn(move || {
            let provider = factory(index).unwrap_or_else(|e| {
                warn!(worker = index, error = %e, "Failed to create embedding provider");
                Box::new(DisabledProvider)
            });
            ScoringWorker::new(index, provider, max_batch_requests).run(queue)
        })
        .with_context(|| format!("Failed to spawn scoring worker {index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Maps texts containing "privacy" to the seed direction.
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        fail_after_seeds: bool,
    }

    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_after_seeds && n > 0 {
                bail!("device lost");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("privacy") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn worker(fail_after_seeds: bool) -> (ScoringWorker, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            calls: Arc::clone(&calls),
            fail_after_seeds,
        };
        (ScoringWorker::new(0, Box::new(provider), 16), calls)
    }

    fn request(texts: &[&str]) -> (ScoreRequest, Receiver<ScoreReply>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let req = ScoreRequest {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            reply: tx,
        };
        (req, rx)
    }

    #[test]
    fn test_cache_missing_dedups_and_skips_empty() {
        let mut cache = ScoreCache::new();
        cache.insert("known".into(), 0.5);
        let missing = cache.missing(["a", "known", "", "a", "b"]);
        assert_eq!(missing, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_batch_scores_in_order() {
        let (mut w, _) = worker(false);
        let (req, rx) = request(&["Privacy Center", "Careers", ""]);
        w.score_batch(vec![req]);
        let scores = rx.recv().unwrap().unwrap();
        assert_eq!(scores, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cached_texts_skip_provider() {
        let (mut w, calls) = worker(false);
        let (a, rx_a) = request(&["privacy", "about"]);
        let (b, rx_b) = request(&["about", "privacy"]);
        w.score_batch(vec![a, b]);
        // One call for seeds, one for the merged batch.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rx_a.recv().unwrap().unwrap(), vec![1.0, 0.0]);
        assert_eq!(rx_b.recv().unwrap().unwrap(), vec![0.0, 1.0]);

        let (c, rx_c) = request(&["about"]);
        w.score_batch(vec![c]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rx_c.recv().unwrap().unwrap(), vec![0.0]);
        assert_eq!(w.cache.len(), 2);
    }

    #[test]
    fn test_provider_failure_reported_per_request() {
        let (mut w, _) = worker(true);
        let (req, rx) = request(&["privacy"]);
        w.score_batch(vec![req]);
        assert!(matches!(rx.recv().unwrap(), Err(ScoreError::Provider(_))));
    }

    #[test]
    fn test_disabled_provider_is_unavailable() {
        let mut w = ScoringWorker::new(0, Box::new(DisabledProvider), 4);
        assert!(!w.is_semantic());
        let (req, rx) = request(&["privacy"]);
        w.score_batch(vec![req]);
        assert_eq!(rx.recv().unwrap(), Err(ScoreError::Unavailable));
    }

    #[test]
    fn test_run_drains_before_sentinel() {
        let (w, _) = worker(false);
        let (tx, rx) = crossbeam_channel::bounded(8);
        let mut replies = Vec::new();
        for text in ["privacy", "jobs", "press"] {
            let (req, reply_rx) = request(&[text]);
            tx.send(ScoreMessage::Score(req)).unwrap();
            replies.push(reply_rx);
        }
        tx.send(ScoreMessage::Shutdown).unwrap();

        let stats = w.run(rx);
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.batches, 1);
        for reply in replies {
            assert!(reply.recv().unwrap().is_ok());
        }
    }

    #[test]
    fn test_batch_cap_limits_drain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            calls,
            fail_after_seeds: false,
        };
        let w = ScoringWorker::new(0, Box::new(provider), 2);
        let (tx, rx) = crossbeam_channel::bounded(8);
        for text in ["a", "b", "c"] {
            let (req, _reply) = request(&[text]);
            tx.send(ScoreMessage::Score(req)).unwrap();
        }
        tx.send(ScoreMessage::Shutdown).unwrap();
        let stats = w.run(rx);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.requests, 3);
    }

    #[test]
    fn test_seed_similarity_clamps_negative() {
        let seeds = vec![vec![1.0, 0.0]];
        assert_eq!(seed_similarity(&seeds, &[-1.0, 0.0]), 0.0);
        let s = seed_similarity(&seeds, &[0.8, 0.6]);
        assert!((s - 0.8).abs() < 1e-3);
    }
}
