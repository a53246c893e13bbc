//! In-memory storage backend, used by tests and single-process setups.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::Storage;
use crate::types::{
    Account, AccountId, AttemptId, PageId, PublishAttempt, PublishedPage, SyndicationLink,
};

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    pages: HashMap<String, PublishedPage>,
    attempts: HashMap<AttemptId, PublishAttempt>,
    links: Vec<SyndicationLink>,
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn accounts_for_domain(&self, silo: &str, domain: &str) -> Result<Vec<Account>> {
        let inner = self.inner.lock().unwrap();
        let mut accounts: Vec<Account> = inner
            .accounts
            .iter()
            .filter(|a| a.silo == silo && a.domains.iter().any(|d| d == domain))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<()> {
        self.inner.lock().unwrap().accounts.push(account.clone());
        Ok(())
    }

    async fn get_or_create_page(&self, url: &str) -> Result<PublishedPage> {
        let mut inner = self.inner.lock().unwrap();
        let page = inner
            .pages
            .entry(url.to_string())
            .or_insert_with(|| PublishedPage::new(url));
        Ok(page.clone())
    }

    async fn attempts_for(
        &self,
        page_id: PageId,
        account_id: AccountId,
    ) -> Result<Vec<PublishAttempt>> {
        let inner = self.inner.lock().unwrap();
        let mut attempts: Vec<PublishAttempt> = inner
            .attempts
            .values()
            .filter(|a| a.page_id == page_id && a.account_id == account_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.created_at);
        Ok(attempts)
    }

    async fn insert_attempt(&self, attempt: &PublishAttempt) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<PublishAttempt>> {
        Ok(self.inner.lock().unwrap().attempts.get(&id).cloned())
    }

    async fn update_attempt(&self, attempt: &PublishAttempt) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn syndication_urls(&self, account_id: AccountId, original: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .links
            .iter()
            .filter(|l| l.account_id == account_id && l.original == original)
            .map(|l| l.syndicated.clone())
            .collect())
    }

    async fn add_syndication_link(&self, link: &SyndicationLink) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let exists = inner.links.iter().any(|l| {
            l.account_id == link.account_id
                && l.original == link.original
                && l.syndicated == link.syndicated
        });
        if !exists {
            inner.links.push(link.clone());
        }
        Ok(())
    }
}
