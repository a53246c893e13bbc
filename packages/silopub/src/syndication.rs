//! Syndication index: the mapping between original page URLs and their
//! silo-side copies, with on-demand discovery by fetching the original.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::fetch::PageFetcher;
use crate::mf2::{find_entry, ContentParser, ParsedPage};
use crate::resolver::{canonicalize, UrlResolver};
use crate::storage::Storage;
use crate::types::{Account, AccountId, SyndicationLink};

pub struct SyndicationIndex {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn ContentParser>,
    resolver: Arc<UrlResolver>,
}

impl SyndicationIndex {
    pub fn new(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn ContentParser>,
        resolver: Arc<UrlResolver>,
    ) -> Self {
        Self {
            storage,
            fetcher,
            parser,
            resolver,
        }
    }

    /// Previously recorded syndication URLs for an original page
    pub async fn lookup(&self, account_id: AccountId, original: &str) -> Result<Vec<String>> {
        self.storage
            .syndication_urls(account_id, &canonicalize(original))
            .await
    }

    /// Fetch `url` and record any syndication URLs it declares, returning
    /// the union with whatever was already known.
    ///
    /// Never fails: silo and deny-listed URLs are skipped without a fetch,
    /// and fetch or parse trouble just returns the stored mapping.
    pub async fn discover(&self, account: &Account, url: &str) -> Vec<String> {
        let canonical = canonicalize(url);
        let mut known = match self.lookup(account.id, &canonical).await {
            Ok(urls) => urls,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "Syndication lookup failed");
                Vec::new()
            }
        };

        let classified = self.resolver.classify(url);
        if !classified.eligible {
            tracing::debug!(url = %url, "Skipping syndication discovery for ineligible URL");
            return known;
        }

        let page = match self.fetcher.get(url).await {
            Ok(page) if page.ok() => page,
            Ok(page) => {
                tracing::info!(url = %url, status = page.status, "Target fetch failed, using stored mapping");
                return known;
            }
            Err(err) => {
                tracing::info!(url = %url, error = %err, "Target fetch failed, using stored mapping");
                return known;
            }
        };

        let parsed = match self.parser.parse(&page.html(), &page.url) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::info!(url = %url, error = %err, "Target page did not parse");
                return known;
            }
        };

        let mut seen: HashSet<String> = known.iter().cloned().collect();
        for discovered in extract_syndication_urls(&parsed) {
            let discovered = canonicalize(&discovered);
            if !seen.insert(discovered.clone()) {
                continue;
            }
            let link = SyndicationLink::new(account.id, canonical.clone(), discovered.clone());
            if let Err(err) = self.storage.add_syndication_link(&link).await {
                tracing::warn!(url = %url, error = %err, "Failed to record syndication link");
            }
            tracing::debug!(
                original = %canonical,
                syndicated = %discovered,
                account = %account.id,
                "Recorded syndication link"
            );
            known.push(discovered);
        }
        known
    }
}

/// Syndication URLs declared by a page, most specific source first:
/// per-item syndication properties (citation wrappers included), then
/// page-level rel=syndication links.
fn extract_syndication_urls(parsed: &ParsedPage) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(entry) = find_entry(&parsed.items) {
        urls.extend(entry.prop_urls("syndication"));
    }
    if let Some(rels) = parsed.rels.get("syndication") {
        urls.extend(rels.iter().cloned());
    }
    urls
}
