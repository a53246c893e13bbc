//! URL resolution, classification, and canonicalization.
//!
//! Resolution follows redirects (HTTP and `refresh` directives) with a
//! metadata-only probe and never fails: a network or HTTP error yields a
//! synthetic result carrying the input URL and the sentinel status 499, so
//! callers branch on status instead of handling errors. Successes are
//! cached indefinitely, failures for a day.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use url::Url;

use crate::fetch::{PageFetcher, MAX_REDIRECT_HOPS};

/// Non-standard status recorded for URLs that could not be resolved
pub const RESOLVE_FAILED_STATUS: u16 = 499;

/// How long failed resolutions stay cached, to avoid hammering broken sites
const FAILED_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Query parameters stripped before a URL is stored or compared
const TRACKING_PARAMS: [&str; 5] = [
    "utm_campaign",
    "utm_content",
    "utm_medium",
    "utm_source",
    "utm_term",
];

/// Well-known silo and shortener domains that don't accept webmentions.
/// Operator exclusions and registered silo domains are added on top.
const DEFAULT_DENY_DOMAINS: [&str; 14] = [
    "facebook.com",
    "fb.com",
    "twitter.com",
    "t.co",
    "x.com",
    "instagram.com",
    "plus.google.com",
    "youtube.com",
    "youtu.be",
    "linkedin.com",
    "pinterest.com",
    "medium.com",
    "tumblr.com",
    "flickr.com",
];

/// Final result of resolving a URL
#[derive(Debug, Clone)]
pub struct Resolved {
    pub url: String,
    pub content_type: String,
    pub status: u16,
}

impl Resolved {
    pub fn failed(&self) -> bool {
        self.status == RESOLVE_FAILED_STATUS
    }

    pub fn is_html(&self) -> bool {
        self.content_type.starts_with("text/html")
    }
}

/// A URL's domain plus whether it is worth sending a webmention to
#[derive(Debug, Clone)]
pub struct Classified {
    pub domain: Option<String>,
    pub eligible: bool,
}

/// Domains we never fetch or mention, with automatic subdomain matching
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    domains: HashSet<String>,
}

impl DenyList {
    pub fn new(extra: impl IntoIterator<Item = String>) -> Self {
        let mut domains: HashSet<String> = DEFAULT_DENY_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .collect();
        domains.extend(extra.into_iter().map(|d| d.to_lowercase()));
        Self { domains }
    }

    /// True if the domain or its two-label parent is denied
    pub fn contains(&self, domain: &str) -> bool {
        if self.domains.contains(domain) {
            return true;
        }
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() > 2 {
            return self.domains.contains(&labels[labels.len() - 2..].join("."));
        }
        false
    }
}

struct CacheEntry {
    resolved: Resolved,
    expires: Option<Instant>,
}

/// Redirect resolver with a shared in-process cache
pub struct UrlResolver {
    fetcher: Arc<dyn PageFetcher>,
    deny: Arc<DenyList>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl UrlResolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, deny: Arc<DenyList>) -> Self {
        Self {
            fetcher,
            deny,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve redirects for `url`, including `refresh` directives, up to
    /// a fixed hop bound. Never fails; check `Resolved::failed`.
    pub async fn resolve(&self, url: &str, use_cache: bool) -> Resolved {
        if use_cache {
            if let Some(cached) = self.cache_get(url) {
                return cached;
            }
        }

        let resolved = self.resolve_uncached(url).await;

        if use_cache {
            let expires = if resolved.failed() {
                Some(Instant::now() + FAILED_CACHE_TTL)
            } else {
                None
            };
            self.cache.lock().unwrap().insert(
                url.to_string(),
                CacheEntry {
                    resolved: resolved.clone(),
                    expires,
                },
            );
        }
        resolved
    }

    async fn resolve_uncached(&self, url: &str) -> Resolved {
        let mut current = ensure_scheme(url);

        for _ in 0..MAX_REDIRECT_HOPS {
            let head = match self.fetcher.head(&current).await {
                Ok(head) => head,
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "Couldn't resolve URL");
                    return failed_result(url);
                }
            };

            if head.status >= 400 {
                tracing::warn!(url = %url, status = head.status, "Couldn't resolve URL");
                return failed_result(url);
            }

            // a refresh directive restarts resolution at its target
            if let Some(next) = head.refresh.as_deref().and_then(refresh_url) {
                current = ensure_scheme(&next);
                continue;
            }

            let content_type = head
                .content_type
                .clone()
                .unwrap_or_else(|| guess_content_type(&head.url));
            return Resolved {
                url: head.url,
                content_type,
                status: head.status,
            };
        }

        tracing::warn!(url = %url, "Too many redirect hops resolving URL");
        failed_result(url)
    }

    /// Classify a URL's domain and decide webmention eligibility
    pub fn classify(&self, url: &str) -> Classified {
        match domain_from_url(url) {
            Some(domain) => {
                let eligible = !self.deny.contains(&domain);
                Classified {
                    domain: Some(domain),
                    eligible,
                }
            }
            None => {
                tracing::warn!(url = %url, "Dropping bad URL");
                Classified {
                    domain: None,
                    eligible: false,
                }
            }
        }
    }

    fn cache_get(&self, url: &str) -> Option<Resolved> {
        let mut cache = self.cache.lock().unwrap();
        let expired = cache
            .get(url)?
            .expires
            .is_some_and(|expires| expires <= Instant::now());
        if expired {
            cache.remove(url);
            return None;
        }
        cache.get(url).map(|entry| entry.resolved.clone())
    }
}

fn failed_result(url: &str) -> Resolved {
    Resolved {
        url: url.to_string(),
        content_type: guess_content_type(url),
        status: RESOLVE_FAILED_STATUS,
    }
}

/// Extract the target of a `refresh: <secs>; url=<target>` directive
fn refresh_url(refresh: &str) -> Option<String> {
    refresh.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("url=")
            .map(|u| u.trim().to_string())
    })
}

fn guess_content_type(url: &str) -> String {
    let path = Url::parse(&ensure_scheme(url))
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    mime_guess::from_path(&path)
        .first_raw()
        .unwrap_or("text/html")
        .to_string()
}

/// Default a scheme-less URL to http
pub fn ensure_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// Lowercased registrable host of a URL, with any `www.` prefix dropped
pub fn domain_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(&ensure_scheme(url)).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Strip transient tracking query parameters (utm_*), preserving the order
/// of everything that survives. Idempotent.
pub fn canonicalize(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(name, _)| !TRACKING_PARAMS.contains(&name.as_ref()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        parsed.set_query(Some(&query));
    }
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeFetcher;

    fn resolver(fetcher: Arc<FakeFetcher>) -> UrlResolver {
        UrlResolver::new(fetcher, Arc::new(DenyList::new(vec!["fa.ke".to_string()])))
    }

    #[test]
    fn canonicalize_strips_exactly_the_tracking_params() {
        assert_eq!(
            canonicalize("http://foo.com/post?utm_source=x&utm_medium=y&id=7"),
            "http://foo.com/post?id=7"
        );
        // non-utm params and order survive
        assert_eq!(
            canonicalize("http://foo.com/post?b=2&a=1"),
            "http://foo.com/post?b=2&a=1"
        );
        // utm_ prefixed params outside the fixed set survive
        assert_eq!(
            canonicalize("http://foo.com/post?utm_surprise=1"),
            "http://foo.com/post?utm_surprise=1"
        );
        // query removed entirely when nothing survives
        assert_eq!(
            canonicalize("http://foo.com/post?utm_source=x"),
            "http://foo.com/post"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        for url in [
            "http://foo.com/post?utm_source=x&id=7",
            "http://foo.com/post?a=one+two&b=%C3%A9",
            "http://foo.com/post#frag",
            "http://foo.com/post?a",
        ] {
            let once = canonicalize(url);
            assert_eq!(canonicalize(&once), once, "not idempotent for {}", url);
        }
    }

    #[test]
    fn deny_list_matches_subdomains_via_parent() {
        let deny = DenyList::new(vec!["fa.ke".to_string()]);
        assert!(deny.contains("fa.ke"));
        assert!(deny.contains("mobile.fa.ke"));
        assert!(deny.contains("facebook.com"));
        assert!(deny.contains("www.facebook.com"));
        assert!(!deny.contains("foo.com"));
    }

    #[test]
    fn classify_flags_denied_domains() {
        let r = resolver(Arc::new(FakeFetcher::new()));
        let c = r.classify("http://fa.ke/post/123");
        assert_eq!(c.domain.as_deref(), Some("fa.ke"));
        assert!(!c.eligible);

        let c = r.classify("http://foo.com/bar");
        assert!(c.eligible);
    }

    #[test]
    fn domain_is_lowercased_and_unprefixed() {
        assert_eq!(domain_from_url("http://FoO.cOm/Bar").as_deref(), Some("foo.com"));
        assert_eq!(domain_from_url("http://www.foo.com/").as_deref(), Some("foo.com"));
        assert_eq!(domain_from_url("foo.com/bar").as_deref(), Some("foo.com"));
    }

    #[tokio::test]
    async fn resolve_follows_head_redirects() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.redirect("http://will/redirect", "http://foo.com/");
        let r = resolver(fetcher);

        let resolved = r.resolve("http://will/redirect", true).await;
        assert!(!resolved.failed());
        assert_eq!(resolved.url, "http://foo.com/");
    }

    #[tokio::test]
    async fn resolve_follows_refresh_directives() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.refresh("http://will/redirect", "http://foo.com/");
        let r = resolver(fetcher);

        let resolved = r.resolve("http://will/redirect", true).await;
        assert_eq!(resolved.url, "http://foo.com/");
    }

    #[tokio::test]
    async fn resolve_failure_returns_input_with_sentinel_status() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.head_status("http://gone.com/x", 410);
        let r = resolver(fetcher);

        let resolved = r.resolve("http://gone.com/x", true).await;
        assert!(resolved.failed());
        assert_eq!(resolved.status, RESOLVE_FAILED_STATUS);
        assert_eq!(resolved.url, "http://gone.com/x");
    }

    #[tokio::test]
    async fn failed_resolutions_are_cached_to_spare_broken_sites() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.head_status("http://gone.com/x", 410);
        let r = resolver(fetcher.clone());

        r.resolve("http://gone.com/x", true).await;
        let heads = fetcher.head_count();
        let again = r.resolve("http://gone.com/x", true).await;

        assert!(again.failed());
        assert_eq!(fetcher.head_count(), heads);
    }

    #[tokio::test]
    async fn resolve_caches_successes() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.redirect("http://a.com/", "http://b.com/");
        let r = resolver(fetcher.clone());

        let first = r.resolve("http://a.com/", true).await;
        let heads_after_first = fetcher.head_count();
        let second = r.resolve("http://a.com/", true).await;

        assert_eq!(first.url, second.url);
        assert_eq!(fetcher.head_count(), heads_after_first);
    }

    #[tokio::test]
    async fn resolve_bounds_refresh_loops() {
        let fetcher = Arc::new(FakeFetcher::new());
        // two pages that refresh to each other forever
        fetcher.refresh("http://a.com/", "http://b.com/");
        fetcher.refresh("http://b.com/", "http://a.com/");
        let r = resolver(fetcher);

        let resolved = r.resolve("http://a.com/", false).await;
        assert!(resolved.failed());
    }

    #[test]
    fn refresh_header_parsing() {
        assert_eq!(
            refresh_url("0; url=http://foo.com/").as_deref(),
            Some("http://foo.com/")
        );
        assert_eq!(refresh_url("30"), None);
    }
}
