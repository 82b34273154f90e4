//! Core data models used throughout the resolver.
//!
//! These types represent the link candidates, page metadata, and per-form
//! results that flow from the page store through scoring into the sink.

use std::fmt;
use std::str::FromStr;

/// A `(link text, absolute URL)` pair extracted from one markup fragment.
///
/// Ordering is lexicographic on `(text, url)`; extraction returns candidates
/// in this order so that ties in scoring resolve deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Candidate {
    pub text: String,
    pub url: String,
}

impl Candidate {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// Level at which a privacy-policy link was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Form,
    Page,
    Parent,
    Unknown,
}

impl Scope {
    /// Stored representation in the sink.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Form => "FORM",
            Scope::Page => "PAGE",
            Scope::Parent => "PARENT",
            Scope::Unknown => "UNKNOWN",
        }
    }

    pub const ALL: [Scope; 4] = [Scope::Form, Scope::Page, Scope::Parent, Scope::Unknown];
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FORM" => Ok(Scope::Form),
            "PAGE" => Ok(Scope::Page),
            "PARENT" => Ok(Scope::Parent),
            "UNKNOWN" => Ok(Scope::Unknown),
            other => anyhow::bail!("Unknown scope: '{}'", other),
        }
    }
}

/// The single outcome recorded for a form.
///
/// `text` and `url` are both set for every scope except [`Scope::Unknown`],
/// which carries neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeResult {
    pub scope: Scope,
    pub text: Option<String>,
    pub url: Option<String>,
}

impl ScopeResult {
    pub fn found(scope: Scope, candidate: Candidate) -> Self {
        Self {
            scope,
            text: Some(candidate.text),
            url: Some(candidate.url),
        }
    }

    pub fn unknown() -> Self {
        Self {
            scope: Scope::Unknown,
            text: None,
            url: None,
        }
    }
}

/// Crawl metadata for one page visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Final URL of the visit; base for resolving relative hrefs.
    pub url: String,
    /// Ancestor job ids, **nearest ancestor first**.
    pub parent_ids: Vec<String>,
}

/// Raw markup of one form discovered on a page.
#[derive(Debug, Clone)]
pub struct FormSource {
    pub form_id: String,
    pub markup: String,
}

/// A finished row for the result sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedForm {
    pub domain: String,
    pub job_id: String,
    pub form_id: String,
    pub result: ScopeResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_roundtrip_names() {
        for scope in Scope::ALL {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
        assert!("parent".parse::<Scope>().is_err());
    }

    #[test]
    fn test_candidate_order_is_text_then_url() {
        let mut v = vec![
            Candidate::new("b", "https://a.com/"),
            Candidate::new("a", "https://z.com/"),
            Candidate::new("a", "https://b.com/"),
        ];
        v.sort();
        assert_eq!(v[0], Candidate::new("a", "https://b.com/"));
        assert_eq!(v[2], Candidate::new("b", "https://a.com/"));
    }

    #[test]
    fn test_unknown_has_no_link() {
        let r = ScopeResult::unknown();
        assert_eq!(r.scope, Scope::Unknown);
        assert!(r.text.is_none() && r.url.is_none());
    }
}
