//! Application setup and wiring.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use silopub::fetch::HttpFetcher;
use silopub::notify::TracingNotifier;
use silopub::resolver::{DenyList, UrlResolver};
use silopub::silo::SiloAdapter;
use silopub::storage::Storage;
use silopub::{Publisher, SiloRegistry};

use crate::config::Config;
use crate::routes::{health_handler, interactive_handler, preview_handler, webmention_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<Publisher>,
    pub endpoint: String,
}

/// The per-silo API clients this deployment publishes through. Each
/// adapter wraps one silo's client and OAuth credential plumbing, which
/// live outside this repository.
pub fn build_adapters() -> Vec<Arc<dyn SiloAdapter>> {
    Vec::new()
}

/// The page-to-microformats parser. Wired in by the deployment alongside
/// the silo adapters; until then every parse reports failure.
pub fn build_parser() -> Arc<dyn silopub::mf2::ContentParser> {
    struct UnconfiguredParser;

    impl silopub::mf2::ContentParser for UnconfiguredParser {
        fn parse(&self, _html: &str, _base_url: &str) -> anyhow::Result<silopub::mf2::ParsedPage> {
            anyhow::bail!("no microformats parser configured")
        }
    }

    Arc::new(UnconfiguredParser)
}

/// Wire the pipeline together from config, storage, and adapters
pub fn build_publisher(
    config: &Config,
    storage: Arc<dyn Storage>,
    adapters: Vec<Arc<dyn SiloAdapter>>,
    parser: Arc<dyn silopub::mf2::ContentParser>,
) -> Result<Publisher> {
    let registry = Arc::new(SiloRegistry::new(adapters));

    let mut deny_domains = registry.domains();
    deny_domains.extend(config.deny_domains.iter().cloned());
    let deny = Arc::new(DenyList::new(deny_domains));

    let fetcher = Arc::new(
        HttpFetcher::new(Duration::from_secs(config.http_timeout_secs))
            .context("Failed to build page fetcher")?,
    );
    let resolver = Arc::new(UrlResolver::new(fetcher.clone(), deny));
    let notifier = Arc::new(TracingNotifier);

    Ok(Publisher::new(
        registry,
        storage,
        fetcher,
        parser,
        resolver,
        notifier,
        config.endpoint_url.clone(),
    ))
}

/// Build the router
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/publish/webmention", post(webmention_handler))
        .route("/publish/preview", post(preview_handler))
        .route("/publish/:silo/finish", get(interactive_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
