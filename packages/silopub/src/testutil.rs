//! Shared fakes for the collaborator seams. Kept out of `#[cfg(test)]` so
//! package-level scenario tests can use them too.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::fetch::{FetchedPage, HeadResponse, PageFetcher};
use crate::mf2::{ContentParser, Mf2Item, Mf2Value, ParsedPage};
use crate::notify::Notifier;
use crate::silo::{Activity, SiloAdapter, SiloError};
use crate::types::{Account, AccountId, AccountStatus, Creation, Feature, PublishKind};

/// A `publish`-enabled account for a silo and domain
pub fn account_on(silo: &str, domain: &str) -> Account {
    Account {
        id: AccountId::new(),
        silo: silo.to_string(),
        name: domain.to_string(),
        features: vec![Feature::Publish],
        status: AccountStatus::Enabled,
        domains: vec![domain.to_string()],
        domain_urls: vec![format!("http://{}/", domain)],
        created_at: Utc::now(),
    }
}

/// Scripted page fetcher
#[derive(Default)]
pub struct FakeFetcher {
    gets: Mutex<HashMap<String, FetchedPage>>,
    heads: Mutex<HashMap<String, HeadResponse>>,
    get_log: Mutex<Vec<String>>,
    head_count: Mutex<usize>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve an HTML page at `url`
    pub fn page(&self, url: &str, html: &str) {
        self.bytes(url, html.as_bytes().to_vec(), "text/html");
    }

    /// Serve raw bytes with an explicit content type
    pub fn bytes(&self, url: &str, body: Vec<u8>, content_type: &str) {
        self.gets.lock().unwrap().insert(
            url.to_string(),
            FetchedPage {
                url: url.to_string(),
                status: 200,
                content_type: Some(content_type.to_string()),
                body,
            },
        );
    }

    /// Serve an empty response with the given status
    pub fn status(&self, url: &str, status: u16) {
        self.gets.lock().unwrap().insert(
            url.to_string(),
            FetchedPage {
                url: url.to_string(),
                status,
                content_type: Some("text/html".to_string()),
                body: Vec::new(),
            },
        );
    }

    /// HEAD of `from` lands on `to`, as if the client followed redirects
    pub fn redirect(&self, from: &str, to: &str) {
        self.heads.lock().unwrap().insert(
            from.to_string(),
            HeadResponse {
                url: to.to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                refresh: None,
            },
        );
    }

    /// HEAD of `from` carries a refresh directive pointing at `to`
    pub fn refresh(&self, from: &str, to: &str) {
        self.heads.lock().unwrap().insert(
            from.to_string(),
            HeadResponse {
                url: from.to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                refresh: Some(format!("0; url={}", to)),
            },
        );
    }

    /// HEAD of `url` fails with the given status
    pub fn head_status(&self, url: &str, status: u16) {
        self.heads.lock().unwrap().insert(
            url.to_string(),
            HeadResponse {
                url: url.to_string(),
                status,
                content_type: None,
                refresh: None,
            },
        );
    }

    /// URLs fetched with GET, in order
    pub fn get_log(&self) -> Vec<String> {
        self.get_log.lock().unwrap().clone()
    }

    pub fn head_count(&self) -> usize {
        *self.head_count.lock().unwrap()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage> {
        self.get_log.lock().unwrap().push(url.to_string());
        self.gets
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", url))
    }

    async fn head(&self, url: &str) -> Result<HeadResponse> {
        *self.head_count.lock().unwrap() += 1;
        if let Some(head) = self.heads.lock().unwrap().get(url) {
            return Ok(head.clone());
        }
        // unscripted URLs resolve to themselves
        Ok(HeadResponse {
            url: url.to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            refresh: None,
        })
    }
}

/// Parser fake keyed by base URL; the markup itself is ignored
#[derive(Default)]
pub struct FakeParser {
    pages: Mutex<HashMap<String, ParsedPage>>,
}

impl FakeParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, base_url: &str, parsed: ParsedPage) {
        self.pages.lock().unwrap().insert(base_url.to_string(), parsed);
    }

    /// Shorthand: one h-entry with plain text content
    pub fn set_entry(&self, base_url: &str, text: &str) {
        let mut item = Mf2Item::new(&["h-entry"]);
        item.push_prop(
            "content",
            Mf2Value::Content {
                html: None,
                value: Some(text.to_string()),
            },
        );
        self.set(
            base_url,
            ParsedPage {
                items: vec![item],
                rels: Default::default(),
            },
        );
    }
}

impl ContentParser for FakeParser {
    fn parse(&self, _html: &str, base_url: &str) -> Result<ParsedPage> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(base_url)
            .cloned()
            .unwrap_or_default())
    }
}

/// Silo adapter fake. Echoes content back the way the real adapters do,
/// appending " - <source url>" when the link is included.
pub struct FakeSilo {
    name: String,
    short_name: String,
    domain: String,
    unsupported: Mutex<Vec<PublishKind>>,
    kind_override: Mutex<Option<PublishKind>>,
    fail_with: Mutex<Option<SiloError>>,
    creates: Mutex<Vec<Activity>>,
    previews: Mutex<Vec<Activity>>,
}

impl FakeSilo {
    pub fn new(name: &str, short_name: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            short_name: short_name.to_string(),
            domain: domain.to_string(),
            unsupported: Mutex::new(Vec::new()),
            kind_override: Mutex::new(None),
            fail_with: Mutex::new(None),
            creates: Mutex::new(Vec::new()),
            previews: Mutex::new(Vec::new()),
        }
    }

    /// Reject this kind with an unsupported-kind error
    pub fn reject_kind(&self, kind: PublishKind) {
        self.unsupported.lock().unwrap().push(kind);
    }

    /// Report this kind in the next creation result
    pub fn override_kind(&self, kind: PublishKind) {
        *self.kind_override.lock().unwrap() = Some(kind);
    }

    /// Fail the next create or preview with this error
    pub fn fail_next(&self, error: SiloError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    pub fn creates(&self) -> Vec<Activity> {
        self.creates.lock().unwrap().clone()
    }

    pub fn previews(&self) -> Vec<Activity> {
        self.previews.lock().unwrap().clone()
    }

    fn check(&self, activity: &Activity) -> Result<(), SiloError> {
        if let Some(err) = self.fail_with.lock().unwrap().take() {
            return Err(err);
        }
        if self.unsupported.lock().unwrap().contains(&activity.kind) {
            return Err(SiloError::UnsupportedKind(activity.kind));
        }
        Ok(())
    }

    fn render(&self, activity: &Activity, include_link: bool) -> String {
        if include_link {
            format!("{} - {}", activity.content, activity.url)
        } else {
            activity.content.clone()
        }
    }
}

#[async_trait]
impl SiloAdapter for FakeSilo {
    fn name(&self) -> &str {
        &self.name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn create(
        &self,
        _account: &Account,
        activity: &Activity,
        include_link: bool,
    ) -> Result<Creation, SiloError> {
        self.check(activity)?;
        self.creates.lock().unwrap().push(activity.clone());
        Ok(Creation {
            id: "fake id".to_string(),
            url: "http://fake/url".to_string(),
            content: self.render(activity, include_link),
            kind: *self.kind_override.lock().unwrap(),
        })
    }

    async fn preview_create(
        &self,
        _account: &Account,
        activity: &Activity,
        include_link: bool,
    ) -> Result<String, SiloError> {
        self.check(activity)?;
        self.previews.lock().unwrap().push(activity.clone());
        Ok(format!("preview of {}", self.render(activity, include_link)))
    }
}

/// Records operator notifications
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subject: &str, body: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
    }
}
