//! Link candidate extraction from raw form or page markup.
//!
//! Every `<a>` element with a non-empty `href` becomes a [`Candidate`] once
//! its href is resolved against the page URL with WHATWG URL rules. Only
//! `http`/`https` results survive. Hrefs that fail to resolve are dropped
//! silently since the remaining anchors usually still carry the answer.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use crate::models::Candidate;

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href]").expect("BUG: hardcoded CSS selector 'a[href]' is invalid")
});

/// Extracts the deduplicated candidates of `markup`, sorted by `(text, url)`.
///
/// Returns an empty list when `base_url` itself does not parse, because no
/// href can then be resolved to an absolute URL.
pub fn extract_candidates(markup: &str, base_url: &str) -> Vec<Candidate> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(markup);
    let mut unique = BTreeSet::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.trim().is_empty() {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let text = anchor.text().collect::<String>().trim().to_string();
        unique.insert(Candidate::new(text, String::from(resolved)));
    }

    unique.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.com/account/signup";

    #[test]
    fn test_relative_href() {
        let c = extract_candidates(r#"<a href="/privacy">Privacy Policy</a>"#, BASE);
        assert_eq!(c, vec![Candidate::new("Privacy Policy", "https://example.com/privacy")]);
    }

    #[test]
    fn test_path_relative_and_protocol_relative() {
        let markup = r#"
            <a href="terms.html">Terms</a>
            <a href="//cdn.example.net/pp">CDN</a>
        "#;
        let c = extract_candidates(markup, BASE);
        assert_eq!(
            c,
            vec![
                Candidate::new("CDN", "https://cdn.example.net/pp"),
                Candidate::new("Terms", "https://example.com/account/terms.html"),
            ]
        );
    }

    #[test]
    fn test_query_and_fragment_preserved() {
        let c = extract_candidates(r#"<a href="/legal?doc=privacy#top">Legal</a>"#, BASE);
        assert_eq!(c[0].url, "https://example.com/legal?doc=privacy#top");
    }

    #[test]
    fn test_non_http_schemes_dropped() {
        let markup = r#"
            <a href="mailto:dpo@example.com">Email</a>
            <a href="javascript:void(0)">Open</a>
            <a href="tel:+15555555">Call</a>
            <a href="ftp://example.com/file">FTP</a>
        "#;
        assert!(extract_candidates(markup, BASE).is_empty());
    }

    #[test]
    fn test_empty_and_missing_href_skipped() {
        let markup = r#"<a href="">Empty</a><a href="   ">Blank</a><a name="x">Named</a>"#;
        assert!(extract_candidates(markup, BASE).is_empty());
    }

    #[test]
    fn test_empty_text_retained() {
        let c = extract_candidates(r#"<a href="/privacy-policy"><img src="x.png"></a>"#, BASE);
        assert_eq!(c, vec![Candidate::new("", "https://example.com/privacy-policy")]);
    }

    #[test]
    fn test_text_is_trimmed_and_nested() {
        let c = extract_candidates("<a href=\"/p\">\n  <span>Privacy</span> Notice \n</a>", BASE);
        assert_eq!(c[0].text, "Privacy Notice");
    }

    #[test]
    fn test_malformed_href_skipped() {
        let markup = r#"<a href="http://[::1">Broken</a><a href="/ok">Ok</a>"#;
        let c = extract_candidates(markup, BASE);
        assert_eq!(c, vec![Candidate::new("Ok", "https://example.com/ok")]);
    }

    #[test]
    fn test_dedup_on_text_and_url() {
        let markup = r#"
            <a href="/privacy">Privacy</a>
            <a href="https://example.com/privacy">Privacy</a>
            <a href="/privacy">Privacy Policy</a>
        "#;
        let c = extract_candidates(markup, BASE);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_bad_base_yields_nothing() {
        assert!(extract_candidates(r#"<a href="/x">x</a>"#, "not a url").is_empty());
    }

    #[test]
    fn test_form_fragment() {
        let markup = r#"<form action="/s"><input name="e"><a href="/pp">Privacy Policy</a></form>"#;
        assert_eq!(extract_candidates(markup, BASE).len(), 1);
    }
}
