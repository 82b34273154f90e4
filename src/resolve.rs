//! Scope fallback for the forms of one domain.
//!
//! A [`DomainResolver`] is owned by exactly one domain worker for the
//! duration of one domain. For every form it tries, in order, the form's own
//! markup, its page, then each ancestor page nearest first, and stops at the
//! first scope whose winner reaches the threshold. Page metadata and page
//! outcomes are memoized per resolver, so sibling forms and shared ancestors
//! are parsed and scored once.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::domain::registrable_domain;
use crate::extract::extract_candidates;
use crate::models::{Candidate, FormSource, PageInfo, ResolvedForm, Scope, ScopeResult};
use crate::policy::select_winner;
use crate::scorer::ScoreClient;
use crate::store::PageStore;

/// Rows produced for one domain plus what had to be skipped.
#[derive(Debug, Default)]
pub struct DomainReport {
    pub rows: Vec<ResolvedForm>,
    pub skipped_jobs: u64,
    pub skipped_forms: u64,
}

type OutcomeKey = (String, Option<String>);

pub struct DomainResolver<'a> {
    store: &'a dyn PageStore,
    domain: String,
    scorer: &'a ScoreClient,
    /// `None` records a job whose metadata could not be loaded.
    pages: HashMap<String, Option<PageInfo>>,
    /// Page winner keyed by `(job id, anchor domain)`.
    outcomes: HashMap<OutcomeKey, Option<Candidate>>,
}

impl<'a> DomainResolver<'a> {
    pub fn new(store: &'a dyn PageStore, domain: impl Into<String>, scorer: &'a ScoreClient) -> Self {
        Self {
            store,
            domain: domain.into(),
            scorer,
            pages: HashMap::new(),
            outcomes: HashMap::new(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resolves every form of every job of the domain, in enumeration order.
    ///
    /// Only a failure to list the domain's jobs is an error; unreadable jobs
    /// and forms are skipped and counted.
    pub fn resolve_domain(&mut self) -> Result<DomainReport> {
        let jobs = self
            .store
            .jobs(&self.domain)
            .with_context(|| format!("Failed to list jobs of {}", self.domain))?;

        let mut report = DomainReport::default();

        for job_id in jobs {
            let form_ids = match self.store.form_ids(&self.domain, &job_id) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(domain = %self.domain, job = %job_id, error = %e, "Skipping job: cannot list forms");
                    report.skipped_jobs += 1;
                    continue;
                }
            };
            if form_ids.is_empty() {
                continue;
            }

            let Some(page) = self.page_info(&job_id) else {
                report.skipped_jobs += 1;
                continue;
            };

            for form_id in form_ids {
                let markup = match self.store.form_markup(&self.domain, &job_id, &form_id) {
                    Ok(markup) => markup,
                    Err(e) => {
                        warn!(domain = %self.domain, job = %job_id, form = %form_id, error = %e, "Skipping unreadable form");
                        report.skipped_forms += 1;
                        continue;
                    }
                };

                let form = FormSource { form_id, markup };
                let result = self.resolve_form(&job_id, &page, &form);
                debug!(domain = %self.domain, job = %job_id, form = %form.form_id, scope = %result.scope, "Form resolved");

                report.rows.push(ResolvedForm {
                    domain: self.domain.clone(),
                    job_id: job_id.clone(),
                    form_id: form.form_id,
                    result,
                });
            }
        }

        Ok(report)
    }

    /// Runs the `FORM → PAGE → PARENT… → UNKNOWN` fallback for one form.
    ///
    /// Same-site preference is always judged against the form's own page,
    /// including at ancestor scopes. Ancestors whose metadata is missing are
    /// passed over.
    pub fn resolve_form(&mut self, job_id: &str, page: &PageInfo, form: &FormSource) -> ScopeResult {
        let anchor = registrable_domain(&page.url);

        let candidates = extract_candidates(&form.markup, &page.url);
        if let Some(winner) = self.scope_winner(candidates, anchor.as_deref()) {
            return ScopeResult::found(Scope::Form, winner);
        }

        if let Some(winner) = self.page_winner(job_id, anchor.as_deref()) {
            return ScopeResult::found(Scope::Page, winner);
        }

        for parent_id in &page.parent_ids {
            if let Some(winner) = self.page_winner(parent_id, anchor.as_deref()) {
                return ScopeResult::found(Scope::Parent, winner);
            }
        }

        ScopeResult::unknown()
    }

    /// Page metadata of a job, loaded once. A failed load is logged once and
    /// remembered as missing.
    fn page_info(&mut self, job_id: &str) -> Option<PageInfo> {
        if let Some(cached) = self.pages.get(job_id) {
            return cached.clone();
        }
        let info = match self.store.page_info(&self.domain, job_id) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(domain = %self.domain, job = %job_id, error = %e, "Page metadata unavailable");
                None
            }
        };
        self.pages.insert(job_id.to_string(), info.clone());
        info
    }

    /// Winning link of a whole page, memoized per anchor domain.
    fn page_winner(&mut self, job_id: &str, anchor: Option<&str>) -> Option<Candidate> {
        let key = (job_id.to_string(), anchor.map(str::to_string));
        if let Some(cached) = self.outcomes.get(&key) {
            return cached.clone();
        }

        let winner = match self.page_info(job_id) {
            Some(info) => match self.store.page_markup(&self.domain, job_id) {
                Ok(markup) => {
                    let candidates = extract_candidates(&markup, &info.url);
                    self.scope_winner(candidates, anchor)
                }
                Err(e) => {
                    warn!(domain = %self.domain, job = %job_id, error = %e, "Page markup unavailable");
                    None
                }
            },
            None => None,
        };

        self.outcomes.insert(key, winner.clone());
        winner
    }

    fn scope_winner(&self, mut candidates: Vec<Candidate>, anchor: Option<&str>) -> Option<Candidate> {
        if candidates.is_empty() {
            return None;
        }
        let scores = self.scorer.score(&candidates);
        let winner = select_winner(&candidates, &scores, anchor, self.scorer.threshold())?;
        Some(candidates.swap_remove(winner.index))
    }
}
