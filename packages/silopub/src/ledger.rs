//! Idempotency ledger: per-page, per-account record of publish attempts,
//! guaranteeing at most one completed non-preview publish per pair.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::storage::Storage;
use crate::types::{
    AccountId, AttemptId, AttemptStatus, Creation, PublishAttempt, PublishKind,
};

/// Outcome of the pre-publish gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Allowed { attempt_id: AttemptId },
    AlreadyPublished,
}

/// Final outcome recorded on an attempt
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Complete {
        kind: PublishKind,
        html: String,
        published: Option<Creation>,
    },
    Failed {
        kind: Option<PublishKind>,
        html: Option<String>,
        error: String,
    },
}

pub struct IdempotencyLedger {
    storage: Arc<dyn Storage>,
}

impl IdempotencyLedger {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Gate a publish attempt and reserve its tracking record.
    ///
    /// Non-preview: refused once any attempt for this (page, account) pair
    /// has completed with a non-preview kind. Previews always pass and
    /// still get a tracking record, but never count toward or against the
    /// check.
    ///
    /// The check and the insert are two storage calls, so two concurrent
    /// requests for the same pair can both pass the gate. Storage writes
    /// are additive either way; the residual risk is a duplicate silo
    /// post, matching the behavior this pipeline replaces.
    pub async fn check_and_reserve(
        &self,
        page_url: &str,
        account_id: AccountId,
        is_preview: bool,
    ) -> Result<Reservation> {
        let page = self
            .storage
            .get_or_create_page(page_url)
            .await
            .context("Failed to load published page")?;

        if !is_preview {
            let attempts = self.storage.attempts_for(page.id, account_id).await?;
            if attempts.iter().any(|a| a.counts_as_published()) {
                tracing::info!(url = %page_url, account = %account_id, "Page already published");
                return Ok(Reservation::AlreadyPublished);
            }
        }

        let attempt = PublishAttempt::new(page.id, account_id);
        let attempt_id = attempt.id;
        self.storage
            .insert_attempt(&attempt)
            .await
            .context("Failed to reserve publish attempt")?;

        Ok(Reservation::Allowed { attempt_id })
    }

    /// Record the attempt's outcome. Each attempt is finished exactly once.
    pub async fn finish(&self, attempt_id: AttemptId, outcome: AttemptOutcome) -> Result<()> {
        let mut attempt = self
            .storage
            .get_attempt(attempt_id)
            .await?
            .with_context(|| format!("No attempt {}", attempt_id))?;

        if attempt.status != AttemptStatus::New {
            bail!("Attempt {} already finished as {}", attempt_id, attempt.status);
        }

        match outcome {
            AttemptOutcome::Complete {
                kind,
                html,
                published,
            } => {
                attempt.status = AttemptStatus::Complete;
                attempt.kind = Some(kind);
                attempt.html = Some(html);
                attempt.published = published;
            }
            AttemptOutcome::Failed { kind, html, error } => {
                attempt.status = AttemptStatus::Failed;
                attempt.kind = kind;
                attempt.html = html;
                attempt.error = Some(error);
            }
        }
        attempt.updated_at = Utc::now();

        self.storage
            .update_attempt(&attempt)
            .await
            .context("Failed to record attempt outcome")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn ledger() -> (IdempotencyLedger, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (IdempotencyLedger::new(storage.clone()), storage)
    }

    async fn complete(ledger: &IdempotencyLedger, attempt_id: AttemptId, kind: PublishKind) {
        ledger
            .finish(
                attempt_id,
                AttemptOutcome::Complete {
                    kind,
                    html: "<html></html>".to_string(),
                    published: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_completed_publish_per_page_and_account() {
        let (ledger, _) = ledger();
        let account = AccountId::new();

        let first = ledger
            .check_and_reserve("http://foo.com/bar", account, false)
            .await
            .unwrap();
        let Reservation::Allowed { attempt_id } = first else {
            panic!("expected first attempt to be allowed");
        };
        complete(&ledger, attempt_id, PublishKind::Post).await;

        let second = ledger
            .check_and_reserve("http://foo.com/bar", account, false)
            .await
            .unwrap();
        assert_eq!(second, Reservation::AlreadyPublished);
    }

    #[tokio::test]
    async fn failed_and_new_attempts_do_not_block() {
        let (ledger, _) = ledger();
        let account = AccountId::new();

        // a failed attempt
        let Reservation::Allowed { attempt_id } = ledger
            .check_and_reserve("http://foo.com/bar", account, false)
            .await
            .unwrap()
        else {
            panic!("expected allowed");
        };
        ledger
            .finish(
                attempt_id,
                AttemptOutcome::Failed {
                    kind: None,
                    html: None,
                    error: "boom".to_string(),
                },
            )
            .await
            .unwrap();

        // a dangling new attempt
        ledger
            .check_and_reserve("http://foo.com/bar", account, false)
            .await
            .unwrap();

        // still allowed
        let reservation = ledger
            .check_and_reserve("http://foo.com/bar", account, false)
            .await
            .unwrap();
        assert!(matches!(reservation, Reservation::Allowed { .. }));
    }

    #[tokio::test]
    async fn previews_neither_block_nor_are_blocked() {
        let (ledger, storage) = ledger();
        let account = AccountId::new();

        // a completed preview doesn't consume the allowed publish
        let Reservation::Allowed { attempt_id } = ledger
            .check_and_reserve("http://foo.com/bar", account, true)
            .await
            .unwrap()
        else {
            panic!("expected allowed");
        };
        complete(&ledger, attempt_id, PublishKind::Preview).await;

        let Reservation::Allowed { attempt_id } = ledger
            .check_and_reserve("http://foo.com/bar", account, false)
            .await
            .unwrap()
        else {
            panic!("expected allowed");
        };
        complete(&ledger, attempt_id, PublishKind::Post).await;

        // the real publish blocks a second one, but previews still pass
        assert_eq!(
            ledger
                .check_and_reserve("http://foo.com/bar", account, false)
                .await
                .unwrap(),
            Reservation::AlreadyPublished
        );
        let preview = ledger
            .check_and_reserve("http://foo.com/bar", account, true)
            .await
            .unwrap();
        assert!(matches!(preview, Reservation::Allowed { .. }));

        // preview attempts are tracked
        let page = storage.get_or_create_page("http://foo.com/bar").await.unwrap();
        let attempts = storage.attempts_for(page.id, account).await.unwrap();
        assert_eq!(attempts.len(), 3);
    }

    #[tokio::test]
    async fn different_accounts_are_independent() {
        let (ledger, _) = ledger();
        let account_a = AccountId::new();
        let account_b = AccountId::new();

        let Reservation::Allowed { attempt_id } = ledger
            .check_and_reserve("http://foo.com/bar", account_a, false)
            .await
            .unwrap()
        else {
            panic!("expected allowed");
        };
        complete(&ledger, attempt_id, PublishKind::Post).await;

        let other = ledger
            .check_and_reserve("http://foo.com/bar", account_b, false)
            .await
            .unwrap();
        assert!(matches!(other, Reservation::Allowed { .. }));
    }

    #[tokio::test]
    async fn attempts_finish_exactly_once() {
        let (ledger, _) = ledger();
        let Reservation::Allowed { attempt_id } = ledger
            .check_and_reserve("http://foo.com/bar", AccountId::new(), false)
            .await
            .unwrap()
        else {
            panic!("expected allowed");
        };

        complete(&ledger, attempt_id, PublishKind::Post).await;
        let again = ledger
            .finish(
                attempt_id,
                AttemptOutcome::Failed {
                    kind: None,
                    html: None,
                    error: "late".to_string(),
                },
            )
            .await;
        assert!(again.is_err());
    }
}
