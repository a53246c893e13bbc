//! Contract to the per-silo API clients.
//!
//! Adapters wrap a silo's API and credential handling; this crate hands
//! them a normalized activity and records what they created.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Account, Creation, PublishKind, RsvpValue};

/// Normalized payload handed to a silo adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub kind: PublishKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsvp: Option<RsvpValue>,
    /// Extracted post text
    pub content: String,
    /// Canonical source page URL, exactly as submitted
    pub url: String,
    /// Expanded target URLs, original reference first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

/// Failure reported by a silo adapter
#[derive(Debug, Error)]
pub enum SiloError {
    /// The silo cannot create this kind of object
    #[error("Cannot publish {0}s")]
    UnsupportedKind(PublishKind),

    /// Structured API failure, relayed with its original status code
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Anything else; treated as an internal error upstream
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait SiloAdapter: Send + Sync {
    /// Human-readable silo name, e.g. "Twitter"
    fn name(&self) -> &str;

    /// Short name used in publish targets, e.g. "twitter"
    fn short_name(&self) -> &str;

    /// The silo's web domain, e.g. "twitter.com"
    fn domain(&self) -> &str;

    /// Create the activity on the silo
    async fn create(
        &self,
        account: &Account,
        activity: &Activity,
        include_link: bool,
    ) -> Result<Creation, SiloError>;

    /// Describe what `create` would do, without side effects
    async fn preview_create(
        &self,
        account: &Account,
        activity: &Activity,
        include_link: bool,
    ) -> Result<String, SiloError>;
}

/// Whether a URL lives on the given silo domain, subdomains included
pub fn on_silo_domain(url: &str, silo_domain: &str) -> bool {
    crate::resolver::domain_from_url(url).is_some_and(|domain| {
        domain == silo_domain || domain.ends_with(&format!(".{}", silo_domain))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silo_domain_matching_allows_subdomains() {
        assert!(on_silo_domain("http://fa.ke/a/b", "fa.ke"));
        assert!(on_silo_domain("http://mobile.fa.ke/a/b", "fa.ke"));
        assert!(on_silo_domain("http://www.fa.ke/a/b", "fa.ke"));
        assert!(!on_silo_domain("http://not-fake/2014", "fa.ke"));
        assert!(!on_silo_domain("http://fakely.com/x", "fa.ke"));
    }
}
