//! Persistence seam for accounts, pages, attempts, and syndication links.
//!
//! Writes are additive or idempotent, so concurrent requests racing on the
//! same keys converge on the same state.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    Account, AccountId, AttemptId, PageId, PublishAttempt, PublishedPage, SyndicationLink,
};

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    // Accounts are maintained by the signup flows; read-mostly here.
    // Results are ordered by creation time.
    async fn accounts_for_domain(&self, silo: &str, domain: &str) -> Result<Vec<Account>>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    async fn insert_account(&self, account: &Account) -> Result<()>;

    // Published pages, keyed by exact submitted URL
    async fn get_or_create_page(&self, url: &str) -> Result<PublishedPage>;

    // Publish attempts
    async fn attempts_for(
        &self,
        page_id: PageId,
        account_id: AccountId,
    ) -> Result<Vec<PublishAttempt>>;

    async fn insert_attempt(&self, attempt: &PublishAttempt) -> Result<()>;

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<PublishAttempt>>;

    async fn update_attempt(&self, attempt: &PublishAttempt) -> Result<()>;

    // Syndication links, scoped per account
    async fn syndication_urls(&self, account_id: AccountId, original: &str) -> Result<Vec<String>>;

    async fn add_syndication_link(&self, link: &SyndicationLink) -> Result<()>;
}
