//! Contract to the page-to-microformats parser and the item model it
//! produces. Parsing markup itself happens outside this crate; everything
//! here operates on the parsed item forest.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Item types treated as publishable content containers
const CONTAINER_TYPES: [&str; 2] = ["h-entry", "h-event"];

/// Item types treated as feed wrappers to descend into
const FEED_TYPES: [&str; 2] = ["h-feed", "hfeed"];

/// One parsed microformats item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mf2Item {
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, Vec<Mf2Value>>,
    #[serde(default)]
    pub children: Vec<Mf2Item>,
}

/// A microformats property value. Variant order matters for untagged
/// deserialization: an item map carries a `type` field, a content map
/// doesn't.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mf2Value {
    /// Plain string value, e.g. a URL or a name
    Str(String),
    /// A nested item, e.g. an h-cite wrapping a citation
    Item(Mf2Item),
    /// An e-* value carrying both markup and its text rendering
    Content {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl Mf2Item {
    pub fn new(types: &[&str]) -> Self {
        Self {
            types: types.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn has_type(&self, t: &str) -> bool {
        self.types.iter().any(|ty| ty == t)
    }

    pub fn is_container(&self) -> bool {
        self.types.iter().any(|t| CONTAINER_TYPES.contains(&t.as_str()))
    }

    pub fn is_feed(&self) -> bool {
        self.types.iter().any(|t| FEED_TYPES.contains(&t.as_str()))
    }

    pub fn has_prop(&self, name: &str) -> bool {
        self.properties.get(name).is_some_and(|v| !v.is_empty())
    }

    /// First value of a property
    pub fn prop(&self, name: &str) -> Option<&Mf2Value> {
        self.properties.get(name).and_then(|v| v.first())
    }

    /// First plain-string value of a property
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name)?.iter().find_map(|v| match v {
            Mf2Value::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// All URLs carried by a property: plain string values directly, and
    /// the `url` property of any nested item (citation wrappers).
    pub fn prop_urls(&self, name: &str) -> Vec<String> {
        let Some(values) = self.properties.get(name) else {
            return vec![];
        };
        let mut urls = Vec::new();
        for value in values {
            match value {
                Mf2Value::Str(s) => urls.push(s.clone()),
                Mf2Value::Item(item) => {
                    if let Some(u) = item.prop_str("url") {
                        urls.push(u.to_string());
                    }
                }
                Mf2Value::Content { .. } => {}
            }
        }
        urls
    }

    /// Add a property value, for building items in tests and fixtures
    pub fn push_prop(&mut self, name: &str, value: Mf2Value) -> &mut Self {
        self.properties.entry(name.to_string()).or_default().push(value);
        self
    }
}

/// Everything the parser extracted from one page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedPage {
    pub items: Vec<Mf2Item>,
    /// Page-level link relations, e.g. rel=syndication
    #[serde(default)]
    pub rels: HashMap<String, Vec<String>>,
}

/// Parses fetched markup into an item forest. Implemented outside this
/// crate; test fakes stand in for it here.
pub trait ContentParser: Send + Sync {
    fn parse(&self, html: &str, base_url: &str) -> Result<ParsedPage>;
}

/// Select the item to publish: the first top-level content container,
/// descending into feed wrappers and preferring their inner entries to the
/// wrapper itself. Content that only exists at feed level is ignored.
pub fn find_entry(items: &[Mf2Item]) -> Option<&Mf2Item> {
    for item in items {
        if item.is_feed() {
            if let Some(entry) = find_entry(&item.children) {
                return Some(entry);
            }
        } else if item.is_container() {
            return Some(item);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_content(text: &str) -> Mf2Item {
        let mut item = Mf2Item::new(&["h-entry"]);
        item.push_prop(
            "content",
            Mf2Value::Content {
                html: None,
                value: Some(text.to_string()),
            },
        );
        item
    }

    #[test]
    fn first_container_wins_over_non_containers() {
        let card = Mf2Item::new(&["h-card"]);
        let entry = entry_with_content("foo");
        let items = vec![card, entry];

        let found = find_entry(&items).unwrap();
        assert!(found.has_type("h-entry"));
    }

    #[test]
    fn descends_into_feeds_and_ignores_feed_level_content() {
        let mut feed = Mf2Item::new(&["h-feed"]);
        feed.push_prop(
            "content",
            Mf2Value::Content {
                html: None,
                value: Some("my feed".to_string()),
            },
        );
        feed.children.push(entry_with_content("my article"));

        let found = find_entry(std::slice::from_ref(&feed)).unwrap();
        assert_eq!(
            found.prop("content").and_then(|v| match v {
                Mf2Value::Content { value, .. } => value.as_deref(),
                _ => None,
            }),
            Some("my article")
        );
    }

    #[test]
    fn events_are_containers_too() {
        let event = Mf2Item::new(&["h-event"]);
        let mut feed = Mf2Item::new(&["h-feed"]);
        feed.children.push(event);

        assert!(find_entry(std::slice::from_ref(&feed)).unwrap().has_type("h-event"));
    }

    #[test]
    fn no_items_no_entry() {
        assert!(find_entry(&[]).is_none());
        assert!(find_entry(&[Mf2Item::new(&["h-card"])]).is_none());
    }

    #[test]
    fn prop_urls_unwraps_citations() {
        let mut cite = Mf2Item::new(&["h-cite"]);
        cite.push_prop("url", Mf2Value::Str("https://fa.ke/a/b".to_string()));

        let mut entry = Mf2Item::new(&["h-entry"]);
        entry.push_prop("syndication", Mf2Value::Str("https://fa.ke/c/d".to_string()));
        entry.push_prop("syndication", Mf2Value::Item(cite));

        assert_eq!(
            entry.prop_urls("syndication"),
            vec!["https://fa.ke/c/d".to_string(), "https://fa.ke/a/b".to_string()]
        );
    }
}
