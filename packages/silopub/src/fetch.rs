//! Page fetcher port and its reqwest implementation.
//!
//! All outbound page fetches go through `PageFetcher` so tests can script
//! responses. The production implementation shares one `reqwest::Client`
//! with a fixed timeout and a bounded redirect policy.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

/// Identifies this service to the sites it fetches
pub const USER_AGENT: &str = "silopub (https://silopub.dev/about)";

/// Hop bound shared by HTTP redirects and refresh directives
pub const MAX_REDIRECT_HOPS: usize = 10;

lazy_static! {
    // Matches both <meta charset="..."> and
    // <meta http-equiv="Content-Type" content="text/html; charset=...">
    static ref META_CHARSET_RE: Regex =
        Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9_\-]+)"#).unwrap();
}

/// A fully fetched page, body still undecoded
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after any redirects the client followed
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as HTML. A charset in the Content-Type response
    /// header wins; otherwise a meta-tag declaration in the document;
    /// otherwise UTF-8.
    pub fn html(&self) -> String {
        decode_html(&self.body, self.content_type.as_deref())
    }
}

/// Result of a metadata-only probe of a URL
#[derive(Debug, Clone)]
pub struct HeadResponse {
    /// Final URL after any redirects the client followed
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Raw `refresh` response header, if the site sent one
    pub refresh: Option<String>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page body
    async fn get(&self, url: &str) -> Result<FetchedPage>;

    /// Probe a URL without fetching the body
    async fn head(&self, url: &str) -> Result<HeadResponse>;
}

/// `PageFetcher` over a shared reqwest client
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECT_HOPS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = header_str(response.headers(), "content-type");
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?
            .to_vec();

        Ok(FetchedPage {
            url: final_url,
            status,
            content_type,
            body,
        })
    }

    async fn head(&self, url: &str) -> Result<HeadResponse> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;

        Ok(HeadResponse {
            url: response.url().to_string(),
            status: response.status().as_u16(),
            content_type: header_str(response.headers(), "content-type"),
            refresh: header_str(response.headers(), "refresh"),
        })
    }
}

fn header_str(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Decode an HTML body. Header charset takes precedence over a meta-tag
/// declaration; the fallback is UTF-8.
pub fn decode_html(body: &[u8], content_type: Option<&str>) -> String {
    let header_charset = content_type.and_then(charset_from_content_type);
    let label = header_charset.or_else(|| sniff_meta_charset(body));

    let encoding = label
        .and_then(|l| encoding_rs::Encoding::for_label(l.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);

    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let part = part.trim();
        part.strip_prefix("charset=")
            .map(|c| c.trim_matches('"').to_string())
    })
}

/// Look for a meta-tag charset declaration in the document head. Charset
/// names are ASCII, so scanning the raw bytes lossily is safe.
fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(2048)];
    let text = String::from_utf8_lossy(head);
    META_CHARSET_RE
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8_by_default() {
        let body = "caf\u{e9}".as_bytes();
        assert_eq!(decode_html(body, None), "caf\u{e9}");
    }

    #[test]
    fn header_charset_wins_over_meta_tag() {
        // body declares iso-8859-1 in a meta tag but is actually utf-8,
        // and the header says so
        let html = "<html><head><meta charset=\"iso-8859-1\"></head><body>d\u{e9}veloppeur</body></html>";
        let decoded = decode_html(html.as_bytes(), Some("text/html; charset=utf-8"));
        assert!(decoded.contains("d\u{e9}veloppeur"));
    }

    #[test]
    fn meta_tag_charset_used_when_header_silent() {
        let text = "D\u{e9}mo pour les d\u{e9}veloppeur";
        let html = format!(
            "<html><head><meta charset=\"iso-8859-1\"></head><body><p>{}</p></body></html>",
            text
        );
        let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(&html);
        let decoded = decode_html(&encoded, Some("text/html"));
        assert!(decoded.contains(text));
    }

    #[test]
    fn meta_http_equiv_charset_recognized() {
        let html = r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8">"#;
        assert_eq!(sniff_meta_charset(html.as_bytes()), Some("utf-8".to_string()));
    }

    #[test]
    fn charset_parsed_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=utf-8"),
            Some("utf-8".to_string())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }
}
