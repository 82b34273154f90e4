//! Registrable-domain comparison for the same-site preference.
//!
//! The registrable domain is the public suffix plus one label
//! (`shop.example.co.uk` → `example.co.uk`), looked up in the Public Suffix
//! List including its private section, so tenants of shared hosts such as
//! `github.io` are separate sites. Hosts under an unlisted TLD fall back to
//! the last label as suffix. IP hosts compare by their full address.

use url::{Host, Url};

/// Returns the registrable domain of `url`, lowercased, or `None` when the
/// URL does not parse or has no host.
pub fn registrable_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.host()? {
        Host::Domain(host) => Some(registrable_from_host(host)),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

fn registrable_from_host(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    // A bare suffix (`com`, `github.io`) has no registrable part.
    psl::domain_str(&host).map(str::to_string).unwrap_or(host)
}

/// True when both URLs share a registrable domain. Unparseable URLs are
/// never the same site.
pub fn same_site(anchor: Option<&str>, url: &str) -> bool {
    match (anchor, registrable_domain(url)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_domains() {
        assert_eq!(
            registrable_domain("https://www.example.com/a").as_deref(),
            Some("example.com")
        );
        assert_eq!(
            registrable_domain("http://example.com").as_deref(),
            Some("example.com")
        );
        assert_eq!(
            registrable_domain("https://a.b.c.example.org/").as_deref(),
            Some("example.org")
        );
    }

    #[test]
    fn test_country_second_level() {
        assert_eq!(
            registrable_domain("https://shop.example.co.uk/").as_deref(),
            Some("example.co.uk")
        );
        assert_eq!(
            registrable_domain("https://www.gov.au.example.com.au/").as_deref(),
            Some("example.com.au")
        );
        // Not a country code: `co` is an ordinary label.
        assert_eq!(
            registrable_domain("https://login.co.example.io/").as_deref(),
            Some("example.io")
        );
    }

    #[test]
    fn test_private_suffix_tenants() {
        assert_eq!(
            registrable_domain("https://alice.github.io/signup").as_deref(),
            Some("alice.github.io")
        );
        assert_eq!(
            registrable_domain("https://www.shop.herokuapp.com/").as_deref(),
            Some("shop.herokuapp.com")
        );
        let anchor = registrable_domain("https://alice.github.io/signup");
        assert!(same_site(anchor.as_deref(), "https://alice.github.io/privacy"));
        assert!(!same_site(anchor.as_deref(), "https://bob.github.io/privacy"));
        assert!(!same_site(
            registrable_domain("https://a.blogspot.com/").as_deref(),
            "https://b.blogspot.com/privacy"
        ));
    }

    #[test]
    fn test_listed_country_suffixes() {
        assert_eq!(
            registrable_domain("https://www.impots.gouv.fr/").as_deref(),
            Some("impots.gouv.fr")
        );
        assert_eq!(
            registrable_domain("https://www.england.nhs.uk/").as_deref(),
            Some("england.nhs.uk")
        );
        assert!(!same_site(
            registrable_domain("https://www.impots.gouv.fr/").as_deref(),
            "https://www.interieur.gouv.fr/privacy"
        ));
    }

    #[test]
    fn test_unlisted_tld_and_bare_suffix() {
        assert_eq!(
            registrable_domain("https://www.shop.test/").as_deref(),
            Some("shop.test")
        );
        assert_eq!(registrable_domain("http://localhost:8080/").as_deref(), Some("localhost"));
        assert_eq!(registrable_domain("https://github.io/").as_deref(), Some("github.io"));
    }

    #[test]
    fn test_case_and_trailing_dot() {
        assert_eq!(
            registrable_domain("https://WWW.Example.COM./x").as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn test_ip_hosts() {
        assert_eq!(
            registrable_domain("http://192.168.0.1/privacy").as_deref(),
            Some("192.168.0.1")
        );
    }

    #[test]
    fn test_no_host() {
        assert_eq!(registrable_domain("not a url"), None);
        assert_eq!(registrable_domain("mailto:x@example.com"), None);
    }

    #[test]
    fn test_same_site() {
        let anchor = registrable_domain("https://example.com/signup");
        assert!(same_site(anchor.as_deref(), "https://www.example.com/privacy"));
        assert!(!same_site(anchor.as_deref(), "https://vendor.com/pp"));
        assert!(!same_site(None, "https://example.com/"));
    }
}
