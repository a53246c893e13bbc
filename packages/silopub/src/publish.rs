//! The publish pipeline: validate the request, resolve the account, gate
//! on the idempotency ledger, fetch and interpret the source page, expand
//! targets with syndication URLs, and dispatch creation to the silo.
//!
//! Steps run strictly in sequence. Failures before the ledger gate record
//! nothing; failures after it mark the reserved attempt failed. Only the
//! final dispatch step's errors terminate the pipeline; discovery and
//! resolution trouble along the way degrades gracefully.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use url::Url;

use crate::content;
use crate::error::PublishError;
use crate::fetch::PageFetcher;
use crate::ledger::{AttemptOutcome, IdempotencyLedger, Reservation};
use crate::mf2::{find_entry, ContentParser};
use crate::notify::Notifier;
use crate::registry::{resolve_account, SiloRegistry};
use crate::resolver::{domain_from_url, UrlResolver};
use crate::silo::{on_silo_domain, Activity, SiloAdapter, SiloError};
use crate::storage::Storage;
use crate::syndication::SyndicationIndex;
use crate::types::{
    Account, Creation, PublishKind, PublishMode, PublishOutcome, PublishRequest,
};

pub struct Publisher {
    registry: Arc<SiloRegistry>,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn ContentParser>,
    resolver: Arc<UrlResolver>,
    syndication: SyndicationIndex,
    ledger: IdempotencyLedger,
    notifier: Arc<dyn Notifier>,
    /// Base URL of this deployment, used for backlinks and error messages
    endpoint: String,
}

/// A failure after the ledger gate, with whatever context is worth
/// recording on the failed attempt.
struct StepFailure {
    error: PublishError,
    kind: Option<PublishKind>,
    html: Option<String>,
}

impl From<PublishError> for StepFailure {
    fn from(error: PublishError) -> Self {
        Self {
            error,
            kind: None,
            html: None,
        }
    }
}

/// Everything a successful dispatch produced
struct DispatchDone {
    /// Kind derived from the page
    activity_kind: PublishKind,
    /// Kind recorded on the attempt: the silo's override if it gave one,
    /// or `preview` for previews
    recorded_kind: PublishKind,
    html: String,
    creation: Option<Creation>,
    description: Option<String>,
    include_link: bool,
}

impl Publisher {
    pub fn new(
        registry: Arc<SiloRegistry>,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn ContentParser>,
        resolver: Arc<UrlResolver>,
        notifier: Arc<dyn Notifier>,
        endpoint: impl Into<String>,
    ) -> Self {
        let syndication = SyndicationIndex::new(
            storage.clone(),
            fetcher.clone(),
            parser.clone(),
            resolver.clone(),
        );
        let ledger = IdempotencyLedger::new(storage.clone());
        Self {
            registry,
            storage,
            fetcher,
            parser,
            resolver,
            syndication,
            ledger,
            notifier,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run one publish request to completion
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome, PublishError> {
        tracing::info!(
            source = %request.source,
            target = %request.target,
            mode = ?request.mode,
            "Publish request"
        );

        let silo = self.registry.parse_target(&request.target, &self.endpoint)?;

        let domain = domain_from_url(&request.source).ok_or_else(|| PublishError::BadSourceUrl {
            url: request.source.clone(),
        })?;
        self.reject_silo_source(&domain)?;

        let account = resolve_account(
            self.storage.as_ref(),
            silo.as_ref(),
            &domain,
            request.expected_account,
        )
        .await?;

        if is_home_page(&request.source, &account.domain_urls) {
            return Err(PublishError::SourceIsHomePage);
        }

        // Idempotency gate, keyed by the URL exactly as submitted. Happens
        // before any network fetch.
        let reservation = self
            .ledger
            .check_and_reserve(&request.source, account.id, request.mode.is_preview())
            .await
            .map_err(PublishError::Internal)?;
        let attempt_id = match reservation {
            Reservation::AlreadyPublished => return Err(PublishError::AlreadyPublished),
            Reservation::Allowed { attempt_id } => attempt_id,
        };

        match self.run_reserved(request, silo.as_ref(), &account).await {
            Ok(done) => {
                self.finish_quietly(
                    attempt_id,
                    AttemptOutcome::Complete {
                        kind: done.recorded_kind,
                        html: done.html,
                        published: done.creation.clone(),
                    },
                )
                .await;

                tracing::info!(attempt = %attempt_id, kind = %done.recorded_kind, "Publish complete");
                Ok(match done.creation {
                    Some(creation) => PublishOutcome::Published {
                        attempt_id,
                        account,
                        kind: done.recorded_kind,
                        creation,
                    },
                    None => PublishOutcome::Previewed {
                        attempt_id,
                        account,
                        kind: done.activity_kind,
                        description: done.description.unwrap_or_default(),
                        include_link: done.include_link,
                    },
                })
            }
            Err(failure) => {
                self.finish_quietly(
                    attempt_id,
                    AttemptOutcome::Failed {
                        kind: failure.kind,
                        html: failure.html,
                        error: failure.error.to_string(),
                    },
                )
                .await;

                tracing::info!(attempt = %attempt_id, error = %failure.error, "Publish failed");
                Err(failure.error)
            }
        }
    }

    /// Steps that run once an attempt has been reserved
    async fn run_reserved(
        &self,
        request: &PublishRequest,
        silo: &dyn SiloAdapter,
        account: &Account,
    ) -> Result<DispatchDone, StepFailure> {
        // Resolve the submitted URL, to catch redirects that land on a silo
        // or on the account's own home page.
        let resolved = self.resolver.resolve(&request.source, true).await;
        let fetch_url = if resolved.failed() {
            request.source.clone()
        } else {
            if resolved.url != request.source {
                tracing::debug!(from = %request.source, to = %resolved.url, "Source URL resolved");
            }
            resolved.url.clone()
        };

        if let Some(domain) = domain_from_url(&fetch_url) {
            self.reject_silo_source(&domain)?;
        }
        if !resolved.failed() && is_home_page(&fetch_url, &account.domain_urls) {
            return Err(PublishError::SourceIsHomePage.into());
        }

        let page = match self.fetcher.get(&fetch_url).await {
            Ok(page) if page.ok() => page,
            Ok(page) => {
                tracing::warn!(url = %fetch_url, status = page.status, "Source fetch failed");
                return Err(PublishError::SourceFetchFailed { url: fetch_url }.into());
            }
            Err(err) => {
                tracing::warn!(url = %fetch_url, error = %err, "Source fetch failed");
                return Err(PublishError::SourceFetchFailed { url: fetch_url }.into());
            }
        };
        let html = page.html();

        // Publishing via webmention requires the page to consent by linking
        // back to this service's publish endpoint for the silo.
        if request.mode == PublishMode::Webmention {
            let backlink = format!("{}/publish/{}", self.endpoint, silo.short_name());
            if !html.contains(&backlink) {
                return Err(StepFailure {
                    error: PublishError::MissingBacklink { url: backlink },
                    kind: None,
                    html: Some(html),
                });
            }
        }

        let no_mf2 = || PublishError::NoContent(format!("No microformats2 data found in {}", page.url));
        let parsed = match self.parser.parse(&html, &page.url) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(url = %page.url, error = %err, "Source page did not parse");
                return Err(StepFailure {
                    error: no_mf2(),
                    kind: None,
                    html: Some(html),
                });
            }
        };
        let Some(item) = find_entry(&parsed.items) else {
            return Err(StepFailure {
                error: no_mf2(),
                kind: None,
                html: Some(html),
            });
        };

        let (kind, rsvp) = content::detect_kind(item);
        let ignore_formatting = content::ignore_formatting(item, request.ignore_formatting);
        let include_link = !content::omit_link(item, request.omit_link);

        let text = match content::extract_content(item, ignore_formatting) {
            Some(text) => text,
            None if matches!(kind, PublishKind::Post | PublishKind::Comment) => {
                return Err(StepFailure {
                    error: PublishError::NoContent(format!(
                        "Could not find content in {}. Either the post has no text, or no content was found in its microformats2 markup.",
                        page.url
                    )),
                    kind: Some(kind),
                    html: Some(html),
                });
            }
            None => String::new(),
        };

        let targets = self.expand_targets(account, item).await;
        if kind.requires_target() && !targets.iter().any(|t| on_silo_domain(t, silo.domain())) {
            return Err(StepFailure {
                error: PublishError::NoMatchingTarget {
                    domain: silo.domain().to_string(),
                    verb: kind.verb_phrase(),
                },
                kind: Some(kind),
                html: Some(html),
            });
        }

        let activity = Activity {
            kind,
            rsvp,
            content: text,
            url: request.source.clone(),
            targets,
        };
        tracing::debug!(kind = %kind, targets = activity.targets.len(), "Dispatching to silo");

        match request.mode {
            PublishMode::Preview => {
                match silo.preview_create(account, &activity, include_link).await {
                    Ok(description) => Ok(DispatchDone {
                        activity_kind: kind,
                        recorded_kind: PublishKind::Preview,
                        html,
                        creation: None,
                        description: Some(description),
                        include_link,
                    }),
                    Err(err) => Err(self.silo_failure(err, silo, account, kind, html).await),
                }
            }
            PublishMode::Webmention | PublishMode::Interactive => {
                match silo.create(account, &activity, include_link).await {
                    Ok(creation) => Ok(DispatchDone {
                        activity_kind: kind,
                        recorded_kind: creation.kind.unwrap_or(kind),
                        html,
                        creation: Some(creation),
                        description: None,
                        include_link,
                    }),
                    Err(err) => Err(self.silo_failure(err, silo, account, kind, html).await),
                }
            }
        }
    }

    /// Expand each target reference with discovered syndication URLs,
    /// original URL first, deduplicated across references. Discovery for
    /// the URLs of one reference runs concurrently; output order is
    /// preserved either way.
    async fn expand_targets(&self, account: &Account, item: &crate::mf2::Mf2Item) -> Vec<String> {
        let mut targets = Vec::new();
        let mut seen = HashSet::new();
        for target_ref in content::target_refs(item) {
            let discoveries = join_all(
                target_ref
                    .urls
                    .iter()
                    .map(|url| self.syndication.discover(account, url)),
            )
            .await;
            for (url, discovered) in target_ref.urls.iter().zip(discoveries) {
                if seen.insert(url.clone()) {
                    targets.push(url.clone());
                }
                for syndicated in discovered {
                    if seen.insert(syndicated.clone()) {
                        targets.push(syndicated);
                    }
                }
            }
        }
        targets
    }

    /// Map a silo adapter failure, notifying the operator about anything
    /// that was the silo's fault rather than the page's.
    async fn silo_failure(
        &self,
        err: SiloError,
        silo: &dyn SiloAdapter,
        account: &Account,
        kind: PublishKind,
        html: String,
    ) -> StepFailure {
        let error = match err {
            SiloError::UnsupportedKind(kind) => PublishError::UnimplementedKind(kind),
            SiloError::Http { status, message } => {
                self.notifier
                    .notify(
                        &format!("Publish to {} failed for {}", silo.name(), account.name),
                        &format!("{} ({})", message, status),
                    )
                    .await;
                PublishError::Silo { status, message }
            }
            SiloError::Other(err) => {
                tracing::error!(silo = %silo.short_name(), error = %err, "Unexpected silo failure");
                self.notifier
                    .notify(
                        &format!("Publish to {} failed for {}", silo.name(), account.name),
                        &format!("{:#}", err),
                    )
                    .await;
                PublishError::Internal(err)
            }
        };
        StepFailure {
            error,
            kind: Some(kind),
            html: Some(html),
        }
    }

    fn reject_silo_source(&self, domain: &str) -> Result<(), PublishError> {
        if let Some(adapter) = self.registry.for_domain(domain) {
            return Err(PublishError::SourceIsOwnSilo {
                silo: adapter.name().to_string(),
            });
        }
        Ok(())
    }

    async fn finish_quietly(&self, attempt_id: crate::types::AttemptId, outcome: AttemptOutcome) {
        if let Err(err) = self.ledger.finish(attempt_id, outcome).await {
            tracing::warn!(attempt = %attempt_id, error = %err, "Failed to record attempt outcome");
        }
    }
}

/// Whether `source` is one of the account's registered home URLs. Scheme,
/// fragment, and a trailing slash are ignored; any query string means it
/// is not the home page.
fn is_home_page(source: &str, domain_urls: &[String]) -> bool {
    let Some(source_key) = home_compare_key(source) else {
        return false;
    };
    domain_urls
        .iter()
        .filter_map(|url| home_compare_key(url))
        .any(|key| key == source_key)
}

fn home_compare_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if parsed.query().is_some_and(|q| !q.is_empty()) {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path().trim_end_matches('/');
    Some(format!("{}{}", host, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_page_compare_ignores_scheme_fragment_and_slash() {
        let home = vec!["http://foo.com/".to_string()];
        assert!(is_home_page("https://foo.com#", &home));
        assert!(is_home_page("http://foo.com", &home));
        assert!(is_home_page("http://FOO.com/", &home));
        assert!(!is_home_page("http://foo.com/bar", &home));
    }

    #[test]
    fn query_params_mean_not_home_page() {
        let home = vec!["http://foo.com/".to_string()];
        assert!(!is_home_page("http://foo.com/?p=123", &home));
    }

    #[test]
    fn any_registered_home_url_matches() {
        let homes = vec![
            "http://baj.com/".to_string(),
            "http://foo.com/".to_string(),
        ];
        assert!(is_home_page("http://foo.com/", &homes));
        assert!(is_home_page("http://baj.com", &homes));
    }
}
