//! Read-only access to crawled pages and their forms.
//!
//! The [`PageStore`] trait is the only view the resolver has of the crawl.
//! [`FsPageStore`] reads the crawler's on-disk layout:
//!
//! ```text
//! <root>/<domain>/<job>/job.json      navigationHistory + parents
//! <root>/<domain>/<job>/page.html     page markup
//! <root>/<domain>/<job>/form-*.json   {"element": {"outerHTML": ...}}
//! ```
//!
//! `job.json` lists parents nearest-last; [`PageInfo::parent_ids`] is
//! always nearest-first, so the store reverses it on load.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::PageInfo;

/// Crawl data for a set of domains.
pub trait PageStore: Send + Sync {
    /// All domains in the crawl, sorted.
    fn domains(&self) -> Result<Vec<String>>;
    /// Job ids of a domain, sorted.
    fn jobs(&self, domain: &str) -> Result<Vec<String>>;
    /// Page URL and ancestor chain (nearest first) of a job.
    fn page_info(&self, domain: &str, job_id: &str) -> Result<PageInfo>;
    /// Raw page markup of a job.
    fn page_markup(&self, domain: &str, job_id: &str) -> Result<String>;
    /// Form ids of a job, sorted.
    fn form_ids(&self, domain: &str, job_id: &str) -> Result<Vec<String>>;
    /// Raw markup of one form.
    fn form_markup(&self, domain: &str, job_id: &str, form_id: &str) -> Result<String>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobFile {
    #[serde(default)]
    navigation_history: Vec<Option<String>>,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Deserialize)]
struct FormFile {
    element: FormElement,
}

#[derive(Deserialize)]
struct FormElement {
    #[serde(rename = "outerHTML")]
    outer_html: String,
}

/// Filesystem-backed [`PageStore`].
pub struct FsPageStore {
    root: PathBuf,
    form_matcher: GlobMatcher,
}

impl FsPageStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("Crawl root does not exist: {}", root.display());
        }
        Ok(Self {
            root,
            form_matcher: Glob::new("form-*.json")?.compile_matcher(),
        })
    }

    fn job_dir(&self, domain: &str, job_id: &str) -> PathBuf {
        self.root.join(domain).join(job_id)
    }
}

/// Names of the immediate sub-directories of `dir`, sorted.
fn child_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if entry.file_type().is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(names)
}

impl PageStore for FsPageStore {
    fn domains(&self) -> Result<Vec<String>> {
        child_dirs(&self.root)
    }

    fn jobs(&self, domain: &str) -> Result<Vec<String>> {
        child_dirs(&self.root.join(domain))
    }

    fn page_info(&self, domain: &str, job_id: &str) -> Result<PageInfo> {
        let path = self.job_dir(domain, job_id).join("job.json");
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let job: JobFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let url = job
            .navigation_history
            .into_iter()
            .rev()
            .flatten()
            .find(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No page URL in {}", path.display()))?;

        let mut parent_ids = job.parents;
        parent_ids.reverse();

        Ok(PageInfo { url, parent_ids })
    }

    fn page_markup(&self, domain: &str, job_id: &str) -> Result<String> {
        let path = self.job_dir(domain, job_id).join("page.html");
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn form_ids(&self, domain: &str, job_id: &str) -> Result<Vec<String>> {
        let dir = self.job_dir(domain, job_id);
        let mut ids = Vec::new();
        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.form_matcher.is_match(&name) {
                ids.push(name);
            }
        }
        Ok(ids)
    }

    fn form_markup(&self, domain: &str, job_id: &str, form_id: &str) -> Result<String> {
        let path = self.job_dir(domain, job_id).join(form_id);
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let form: FormFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(form.element.outer_html)
    }
}
