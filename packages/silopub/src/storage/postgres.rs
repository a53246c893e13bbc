//! Postgres storage backend.
//!
//! Status and kind columns are stored as their string forms; the enum
//! types own the conversions. The silo creation result is stored as JSONB.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::Storage;
use crate::types::{
    Account, AccountId, AttemptId, PageId, PublishAttempt, PublishedPage, SyndicationLink,
};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    silo: String,
    name: String,
    features: Vec<String>,
    status: String,
    domains: Vec<String>,
    domain_urls: Vec<String>,
    created_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Result<Account> {
        Ok(Account {
            id: AccountId(self.id),
            silo: self.silo,
            name: self.name,
            features: self
                .features
                .iter()
                .map(|f| f.parse())
                .collect::<Result<_>>()?,
            status: self.status.parse()?,
            domains: self.domains,
            domain_urls: self.domain_urls,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    page_id: Uuid,
    account_id: Uuid,
    status: String,
    kind: Option<String>,
    html: Option<String>,
    published: Option<serde_json::Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AttemptRow {
    fn into_attempt(self) -> Result<PublishAttempt> {
        Ok(PublishAttempt {
            id: AttemptId(self.id),
            page_id: PageId(self.page_id),
            account_id: AccountId(self.account_id),
            status: self.status.parse()?,
            kind: self.kind.as_deref().map(str::parse).transpose()?,
            html: self.html,
            published: self
                .published
                .map(serde_json::from_value)
                .transpose()
                .context("Invalid stored creation result")?,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn accounts_for_domain(&self, silo: &str, domain: &str) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE silo = $1 AND $2 = ANY(domains) ORDER BY created_at",
        )
        .bind(silo)
        .bind(domain)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query accounts by domain")?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load account")?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn insert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, silo, name, features, status, domains, domain_urls, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(account.id.0)
        .bind(&account.silo)
        .bind(&account.name)
        .bind(
            account
                .features
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>(),
        )
        .bind(account.status.to_string())
        .bind(&account.domains)
        .bind(&account.domain_urls)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert account")?;
        Ok(())
    }

    async fn get_or_create_page(&self, url: &str) -> Result<PublishedPage> {
        let page = PublishedPage::new(url);
        sqlx::query(
            "INSERT INTO published_pages (id, url, created_at) VALUES ($1, $2, $3)
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(page.id.0)
        .bind(&page.url)
        .bind(page.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert published page")?;

        let (id, created_at): (Uuid, DateTime<Utc>) =
            sqlx::query_as("SELECT id, created_at FROM published_pages WHERE url = $1")
                .bind(url)
                .fetch_one(&self.pool)
                .await
                .context("Failed to load published page")?;
        Ok(PublishedPage {
            id: PageId(id),
            url: url.to_string(),
            created_at,
        })
    }

    async fn attempts_for(
        &self,
        page_id: PageId,
        account_id: AccountId,
    ) -> Result<Vec<PublishAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            "SELECT * FROM publish_attempts WHERE page_id = $1 AND account_id = $2
             ORDER BY created_at",
        )
        .bind(page_id.0)
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query publish attempts")?;
        rows.into_iter().map(AttemptRow::into_attempt).collect()
    }

    async fn insert_attempt(&self, attempt: &PublishAttempt) -> Result<()> {
        sqlx::query(
            "INSERT INTO publish_attempts
               (id, page_id, account_id, status, kind, html, published, error, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(attempt.id.0)
        .bind(attempt.page_id.0)
        .bind(attempt.account_id.0)
        .bind(attempt.status.to_string())
        .bind(attempt.kind.map(|k| k.to_string()))
        .bind(&attempt.html)
        .bind(
            attempt
                .published
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .context("Failed to serialize creation result")?,
        )
        .bind(&attempt.error)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert publish attempt")?;
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<PublishAttempt>> {
        let row = sqlx::query_as::<_, AttemptRow>("SELECT * FROM publish_attempts WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load publish attempt")?;
        row.map(AttemptRow::into_attempt).transpose()
    }

    async fn update_attempt(&self, attempt: &PublishAttempt) -> Result<()> {
        sqlx::query(
            "UPDATE publish_attempts
             SET status = $2, kind = $3, html = $4, published = $5, error = $6, updated_at = $7
             WHERE id = $1",
        )
        .bind(attempt.id.0)
        .bind(attempt.status.to_string())
        .bind(attempt.kind.map(|k| k.to_string()))
        .bind(&attempt.html)
        .bind(
            attempt
                .published
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .context("Failed to serialize creation result")?,
        )
        .bind(&attempt.error)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update publish attempt")?;
        Ok(())
    }

    async fn syndication_urls(&self, account_id: AccountId, original: &str) -> Result<Vec<String>> {
        let urls: Vec<(String,)> = sqlx::query_as(
            "SELECT syndicated FROM syndication_links
             WHERE account_id = $1 AND original = $2 ORDER BY created_at",
        )
        .bind(account_id.0)
        .bind(original)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query syndication links")?;
        Ok(urls.into_iter().map(|(u,)| u).collect())
    }

    async fn add_syndication_link(&self, link: &SyndicationLink) -> Result<()> {
        sqlx::query(
            "INSERT INTO syndication_links (account_id, original, syndicated, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (account_id, original, syndicated) DO NOTHING",
        )
        .bind(link.account_id.0)
        .bind(&link.original)
        .bind(&link.syndicated)
        .bind(link.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert syndication link")?;
        Ok(())
    }
}
