//! Silo registry and account resolution.
//!
//! The registry is an immutable table built once at startup: silo short
//! name to adapter, and silo web domain to adapter. Account resolution
//! maps a source page's domain to the best eligible account on the target
//! silo.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PublishError;
use crate::silo::SiloAdapter;
use crate::storage::Storage;
use crate::types::{Account, AccountId, AccountStatus, Feature};

pub struct SiloRegistry {
    by_name: HashMap<String, Arc<dyn SiloAdapter>>,
    by_domain: HashMap<String, Arc<dyn SiloAdapter>>,
}

impl SiloRegistry {
    pub fn new(adapters: Vec<Arc<dyn SiloAdapter>>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_domain = HashMap::new();
        for adapter in adapters {
            by_name.insert(adapter.short_name().to_string(), adapter.clone());
            by_domain.insert(adapter.domain().to_string(), adapter);
        }
        Self { by_name, by_domain }
    }

    pub fn by_name(&self, short_name: &str) -> Option<&Arc<dyn SiloAdapter>> {
        self.by_name.get(short_name)
    }

    /// The adapter whose silo owns this domain, if any
    pub fn for_domain(&self, domain: &str) -> Option<&Arc<dyn SiloAdapter>> {
        self.by_domain.get(domain)
    }

    /// All registered silo domains, for seeding the deny-list
    pub fn domains(&self) -> Vec<String> {
        self.by_domain.keys().cloned().collect()
    }

    /// Comma-joined short names for error messages, stable order
    pub fn supported_names(&self) -> String {
        let mut names: Vec<&str> = self.by_name.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names.join(",")
    }

    /// Parse a `.../publish/<silo>` target specification
    pub fn parse_target(
        &self,
        target: &str,
        endpoint: &str,
    ) -> Result<Arc<dyn SiloAdapter>, PublishError> {
        let unsupported = || PublishError::UnsupportedTarget {
            endpoint: endpoint.to_string(),
            supported: self.supported_names(),
        };

        let mut segments = target.trim_end_matches('/').rsplitn(3, '/');
        let short_name = segments.next().ok_or_else(unsupported)?;
        if segments.next() != Some("publish") {
            return Err(unsupported());
        }
        self.by_name(short_name).cloned().ok_or_else(unsupported)
    }
}

/// Find the account that owns `domain` on the target silo.
///
/// Accounts are considered in creation order; the first fully eligible one
/// wins and ineligible siblings are ignored. When nothing is eligible the
/// most specific reason is surfaced: no account at all, publish not
/// enabled, or account disabled.
pub async fn resolve_account(
    storage: &dyn Storage,
    silo: &dyn SiloAdapter,
    domain: &str,
    expected: Option<AccountId>,
) -> Result<Account, PublishError> {
    let accounts = storage
        .accounts_for_domain(silo.short_name(), domain)
        .await
        .map_err(PublishError::Internal)?;

    let Some(account) = accounts.iter().find(|a| a.can_publish()).cloned() else {
        if accounts.is_empty() {
            return Err(PublishError::AccountNotFound {
                silo: silo.name().to_string(),
                domain: domain.to_string(),
            });
        }
        let all_disabled = accounts
            .iter()
            .filter(|a| a.features.contains(&Feature::Publish))
            .all(|a| a.status == AccountStatus::Disabled);
        let has_publish = accounts.iter().any(|a| a.features.contains(&Feature::Publish));
        let message = if has_publish && all_disabled {
            format!(
                "Publish is not enabled because your {} account is disabled.",
                silo.name()
            )
        } else {
            format!(
                "Publish is not enabled for your {} account. Visit your user page to turn it on!",
                silo.name()
            )
        };
        return Err(PublishError::FeatureDisabled(message));
    };

    if let Some(expected) = expected {
        if expected != account.id {
            return Err(PublishError::WrongAccount {
                silo: silo.name().to_string(),
                name: account.name.clone(),
            });
        }
    }

    tracing::debug!(
        account = %account.id,
        domain = %domain,
        silo = %silo.short_name(),
        "Resolved publish account"
    );
    Ok(account)
}
