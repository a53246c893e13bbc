//! Interpretation of a parsed item: what kind of object it is, what text
//! to publish, which in-page markers apply, and which references need
//! syndication expansion.

use crate::mf2::{Mf2Item, Mf2Value};
use crate::types::{PublishKind, RsvpValue};

/// In-page marker suppressing the backlink in silo output
const OMIT_LINK_PROP: &str = "bridgy-omit-link";

/// In-page marker preferring literal text over HTML-to-text conversion
const IGNORE_FORMATTING_PROP: &str = "bridgy-ignore-formatting";

/// Properties whose referenced URLs get syndication expansion. Only the
/// antecedent ("-of" style) forms count; a bare `like` or `repost`
/// property is someone else's data, not a request to publish.
const TARGET_PROPS: [&str; 4] = ["in-reply-to", "like-of", "repost-of", "object"];

/// One target reference on an item, pre-expansion
#[derive(Debug, Clone)]
pub struct TargetRef {
    pub prop: &'static str,
    pub urls: Vec<String>,
}

/// Decide what kind of object the item asks us to create
pub fn detect_kind(item: &Mf2Item) -> (PublishKind, Option<RsvpValue>) {
    if let Some(value) = item.prop_str("rsvp") {
        return (PublishKind::Rsvp, value.parse().ok());
    }
    if item.has_prop("invitee") {
        return (PublishKind::Rsvp, None);
    }
    if item.has_prop("in-reply-to") {
        return (PublishKind::Comment, None);
    }
    if item.has_prop("like-of") {
        return (PublishKind::Like, None);
    }
    if item.has_prop("repost-of") {
        return (PublishKind::Repost, None);
    }
    (PublishKind::Post, None)
}

/// Whether to append the canonical backlink. An explicit request parameter
/// wins; otherwise the in-page marker decides.
pub fn omit_link(item: &Mf2Item, param: Option<bool>) -> bool {
    param.unwrap_or_else(|| item.has_prop(OMIT_LINK_PROP))
}

/// Whether to skip HTML-to-text conversion. The request parameter can only
/// turn this on; the in-page marker covers the rest.
pub fn ignore_formatting(item: &Mf2Item, param: bool) -> bool {
    param || item.has_prop(IGNORE_FORMATTING_PROP)
}

/// Extract the text to publish. Rich content is rendered to text unless
/// formatting is ignored; falls back to the item's name, then summary.
pub fn extract_content(item: &Mf2Item, ignore_formatting: bool) -> Option<String> {
    if let Some(Mf2Value::Content { html, value }) = item.prop("content") {
        if ignore_formatting {
            if let Some(text) = value.as_deref() {
                return non_empty(collapse_whitespace(text));
            }
        } else if let Some(html) = html.as_deref() {
            if let Ok(text) = htmd::convert(html) {
                return non_empty(text.trim().to_string());
            }
        } else if let Some(text) = value.as_deref() {
            return non_empty(collapse_whitespace(text));
        }
    }

    if let Some(Mf2Value::Str(text)) = item.prop("content") {
        return non_empty(collapse_whitespace(text));
    }

    for fallback in ["name", "summary"] {
        if let Some(text) = item.prop_str(fallback) {
            return non_empty(collapse_whitespace(text));
        }
    }
    None
}

/// Collect the references whose targets get expanded with syndication URLs
pub fn target_refs(item: &Mf2Item) -> Vec<TargetRef> {
    TARGET_PROPS
        .iter()
        .filter_map(|prop| {
            let urls = item.prop_urls(prop);
            if urls.is_empty() {
                None
            } else {
                Some(TargetRef { prop, urls })
            }
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
