use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a published page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capability enabled on an account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Publish,
    Listen,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::Publish => write!(f, "publish"),
            Feature::Listen => write!(f, "listen"),
        }
    }
}

impl std::str::FromStr for Feature {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "publish" => Ok(Feature::Publish),
            "listen" => Ok(Feature::Listen),
            _ => Err(anyhow::anyhow!("Invalid feature: {}", s)),
        }
    }
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Enabled,
    Disabled,
    Error,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Enabled => write!(f, "enabled"),
            AccountStatus::Disabled => write!(f, "disabled"),
            AccountStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enabled" => Ok(AccountStatus::Enabled),
            "disabled" => Ok(AccountStatus::Disabled),
            "error" => Ok(AccountStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid account status: {}", s)),
        }
    }
}

/// A registered identity tying one or more web domains to a silo profile.
///
/// Accounts are created and maintained by the signup/OAuth flows; this
/// pipeline only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Short name of the silo this account belongs to, e.g. "twitter"
    pub silo: String,
    /// Display name on the silo
    pub name: String,
    pub features: Vec<Feature>,
    pub status: AccountStatus,
    /// Registered web domains, lowercased
    pub domains: Vec<String>,
    /// Canonical URLs corresponding to `domains`
    pub domain_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// An account may publish iff the publish feature is enabled and the
    /// account is not disabled. Accounts in `error` status can still publish.
    pub fn can_publish(&self) -> bool {
        self.features.contains(&Feature::Publish) && self.status != AccountStatus::Disabled
    }
}

/// A page that has been the target of publish attempts.
///
/// Keyed by the exact source URL as submitted, not the redirect-resolved
/// form. Created lazily on the first attempt for that URL, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPage {
    pub id: PageId,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl PublishedPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: PageId::new(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle status of a publish attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    New,
    Complete,
    Failed,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::New => write!(f, "new"),
            AttemptStatus::Complete => write!(f, "complete"),
            AttemptStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(AttemptStatus::New),
            "complete" => Ok(AttemptStatus::Complete),
            "failed" => Ok(AttemptStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid attempt status: {}", s)),
        }
    }
}

/// What kind of object a publish attempt creates on the silo
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PublishKind {
    Post,
    Comment,
    Like,
    Repost,
    Rsvp,
    Preview,
}

impl PublishKind {
    /// Kinds that act on another object and therefore need a silo-side
    /// target to act on.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            PublishKind::Comment | PublishKind::Like | PublishKind::Repost | PublishKind::Rsvp
        )
    }

    /// Verb phrase used in target-related error messages
    pub fn verb_phrase(&self) -> &'static str {
        match self {
            PublishKind::Comment => "reply to",
            PublishKind::Like => "like",
            PublishKind::Repost => "repost",
            PublishKind::Rsvp => "RSVP to",
            PublishKind::Post | PublishKind::Preview => "publish",
        }
    }
}

impl std::fmt::Display for PublishKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishKind::Post => write!(f, "post"),
            PublishKind::Comment => write!(f, "comment"),
            PublishKind::Like => write!(f, "like"),
            PublishKind::Repost => write!(f, "repost"),
            PublishKind::Rsvp => write!(f, "rsvp"),
            PublishKind::Preview => write!(f, "preview"),
        }
    }
}

impl std::str::FromStr for PublishKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "post" => Ok(PublishKind::Post),
            "comment" => Ok(PublishKind::Comment),
            "like" => Ok(PublishKind::Like),
            "repost" => Ok(PublishKind::Repost),
            "rsvp" => Ok(PublishKind::Rsvp),
            "preview" => Ok(PublishKind::Preview),
            _ => Err(anyhow::anyhow!("Invalid publish kind: {}", s)),
        }
    }
}

/// RSVP response value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RsvpValue {
    Yes,
    No,
    Maybe,
    Interested,
}

impl std::fmt::Display for RsvpValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RsvpValue::Yes => write!(f, "yes"),
            RsvpValue::No => write!(f, "no"),
            RsvpValue::Maybe => write!(f, "maybe"),
            RsvpValue::Interested => write!(f, "interested"),
        }
    }
}

impl std::str::FromStr for RsvpValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yes" => Ok(RsvpValue::Yes),
            "no" => Ok(RsvpValue::No),
            "maybe" => Ok(RsvpValue::Maybe),
            "interested" => Ok(RsvpValue::Interested),
            _ => Err(anyhow::anyhow!("Invalid RSVP value: {}", s)),
        }
    }
}

/// The silo's record of a created object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Creation {
    pub id: String,
    pub url: String,
    pub content: String,
    /// The silo may reclassify what it published, e.g. record an RSVP as a
    /// plain post. When set, this wins over the kind derived from the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PublishKind>,
}

/// One publish attempt for a (page, account) pair.
///
/// Created in `new` status by the idempotency ledger, then transitioned
/// exactly once to `complete` or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishAttempt {
    pub id: AttemptId,
    pub page_id: PageId,
    pub account_id: AccountId,
    pub status: AttemptStatus,
    pub kind: Option<PublishKind>,
    /// Decoded source page HTML, snapshotted when the page was fetched
    pub html: Option<String>,
    /// The silo's creation result, set on completion of a non-preview attempt
    pub published: Option<Creation>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublishAttempt {
    pub fn new(page_id: PageId, account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id: AttemptId::new(),
            page_id,
            account_id,
            status: AttemptStatus::New,
            kind: None,
            html: None,
            published: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True for attempts that consumed the single allowed publish for
    /// their (page, account) pair.
    pub fn counts_as_published(&self) -> bool {
        self.status == AttemptStatus::Complete && self.kind != Some(PublishKind::Preview)
    }
}

/// A recorded (original page URL, silo copy URL) pair for an account.
/// Many-to-many in both directions; never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyndicationLink {
    pub account_id: AccountId,
    pub original: String,
    pub syndicated: String,
    pub created_at: DateTime<Utc>,
}

impl SyndicationLink {
    pub fn new(account_id: AccountId, original: impl Into<String>, syndicated: impl Into<String>) -> Self {
        Self {
            account_id,
            original: original.into(),
            syndicated: syndicated.into(),
            created_at: Utc::now(),
        }
    }
}

/// How the publish request reached us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Direct webmention call; responds with a JSON body
    Webmention,
    /// Dry run; renders what would be published without creating anything
    Preview,
    /// Browser flow; redirects back to the account page with a message
    Interactive,
}

impl PublishMode {
    pub fn is_preview(&self) -> bool {
        matches!(self, PublishMode::Preview)
    }
}

/// A single publish request as it enters the pipeline
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Page URL to publish, exactly as submitted
    pub source: String,
    /// Target specification, `.../publish/<silo>`
    pub target: String,
    pub mode: PublishMode,
    /// The logged-in account in the interactive flow. When set, the account
    /// resolved from the source domain must match it.
    pub expected_account: Option<AccountId>,
    /// Explicit omit-link request parameter. `None` defers to the in-page
    /// marker.
    pub omit_link: Option<bool>,
    /// Prefer the literal text of the post over HTML-to-text conversion
    pub ignore_formatting: bool,
}

/// Result of a successful run of the publish pipeline
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Published {
        attempt_id: AttemptId,
        account: Account,
        kind: PublishKind,
        creation: Creation,
    },
    Previewed {
        attempt_id: AttemptId,
        account: Account,
        kind: PublishKind,
        description: String,
        include_link: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_eligibility() {
        let mut account = Account {
            id: AccountId::new(),
            silo: "fake".to_string(),
            name: "fake".to_string(),
            features: vec![Feature::Publish],
            status: AccountStatus::Enabled,
            domains: vec!["foo.com".to_string()],
            domain_urls: vec!["http://foo.com/".to_string()],
            created_at: Utc::now(),
        };
        assert!(account.can_publish());

        // error status still publishes
        account.status = AccountStatus::Error;
        assert!(account.can_publish());

        account.status = AccountStatus::Disabled;
        assert!(!account.can_publish());

        account.status = AccountStatus::Enabled;
        account.features = vec![Feature::Listen];
        assert!(!account.can_publish());
    }

    #[test]
    fn preview_attempts_never_count_as_published() {
        let mut attempt = PublishAttempt::new(PageId::new(), AccountId::new());
        assert!(!attempt.counts_as_published());

        attempt.status = AttemptStatus::Complete;
        attempt.kind = Some(PublishKind::Preview);
        assert!(!attempt.counts_as_published());

        attempt.kind = Some(PublishKind::Post);
        assert!(attempt.counts_as_published());

        attempt.status = AttemptStatus::Failed;
        assert!(!attempt.counts_as_published());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [AttemptStatus::New, AttemptStatus::Complete, AttemptStatus::Failed] {
            assert_eq!(status.to_string().parse::<AttemptStatus>().unwrap(), status);
        }
        for kind in [
            PublishKind::Post,
            PublishKind::Comment,
            PublishKind::Like,
            PublishKind::Repost,
            PublishKind::Rsvp,
            PublishKind::Preview,
        ] {
            assert_eq!(kind.to_string().parse::<PublishKind>().unwrap(), kind);
        }
    }
}
