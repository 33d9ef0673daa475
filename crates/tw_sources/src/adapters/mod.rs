use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tw_core::{ArticleStatus, Error, RawItem, Result};

pub mod airtable;
pub mod feed;
pub mod notion;
pub mod python_crawler;
pub mod sheets;
pub mod webhook;
pub mod x_api;

pub use airtable::AirtableAdapter;
pub use feed::FeedAdapter;
pub use notion::NotionAdapter;
pub use python_crawler::PythonCrawlerAdapter;
pub use sheets::SheetsAdapter;
pub use webhook::WebhookAdapter;
pub use x_api::XApiAdapter;

/// Config-store rows seeded at startup, one per gated source.
pub const KNOWN_SOURCES: &[&str] = &[
    "feed_crawler",
    "sheets_import",
    "notion_import",
    "airtable_import",
    "x_api_crawler",
    "python_crawler",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum SourceType {
    Feed,
    GoogleSheets,
    Notion,
    Airtable,
    XApi,
    PythonCrawler,
    Webhook,
}

impl SourceType {
    pub const ALL: [SourceType; 7] = [
        SourceType::Feed,
        SourceType::GoogleSheets,
        SourceType::Notion,
        SourceType::Airtable,
        SourceType::XApi,
        SourceType::PythonCrawler,
        SourceType::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Feed => "feed",
            SourceType::GoogleSheets => "google_sheets",
            SourceType::Notion => "notion",
            SourceType::Airtable => "airtable",
            SourceType::XApi => "x_api",
            SourceType::PythonCrawler => "python_crawler",
            SourceType::Webhook => "webhook",
        }
    }

    /// The config-store row that gates this source. Webhook batches are pushed
    /// by an operator and are not gated.
    pub fn crawler_name(&self) -> Option<&'static str> {
        match self {
            SourceType::Feed => Some("feed_crawler"),
            SourceType::GoogleSheets => Some("sheets_import"),
            SourceType::Notion => Some("notion_import"),
            SourceType::Airtable => Some("airtable_import"),
            SourceType::XApi => Some("x_api_crawler"),
            SourceType::PythonCrawler => Some("python_crawler"),
            SourceType::Webhook => None,
        }
    }

    /// Platform label used when an item does not name one.
    pub fn default_platform(&self) -> &'static str {
        match self {
            SourceType::Feed => "rss",
            SourceType::XApi => "x",
            other => other.as_str(),
        }
    }

    pub fn initial_status(&self) -> ArticleStatus {
        match self {
            SourceType::Feed | SourceType::Webhook => ArticleStatus::Approved,
            _ => ArticleStatus::Pending,
        }
    }

    pub fn adapter(&self) -> Adapter {
        match self {
            SourceType::Feed => Adapter::Feed(FeedAdapter),
            SourceType::GoogleSheets => Adapter::GoogleSheets(SheetsAdapter),
            SourceType::Notion => Adapter::Notion(NotionAdapter),
            SourceType::Airtable => Adapter::Airtable(AirtableAdapter),
            SourceType::XApi => Adapter::XApi(XApiAdapter),
            SourceType::PythonCrawler => Adapter::PythonCrawler(PythonCrawlerAdapter),
            SourceType::Webhook => Adapter::Webhook(WebhookAdapter),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SourceType::ALL
            .into_iter()
            .find(|source| source.as_str() == s.trim())
            .ok_or_else(|| Error::Validation(format!("unsupported source type: {}", s)))
    }
}

/// Output of one adapter run. `rejected` counts rows that were skipped
/// because they did not have the shape the adapter needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    pub items: Vec<RawItem>,
    pub rejected: usize,
}

impl ParsedBatch {
    fn push(&mut self, item: Option<RawItem>) {
        match item {
            Some(item) => self.items.push(item),
            None => self.rejected += 1,
        }
    }
}

pub trait SourceAdapter {
    /// Fails only when the payload as a whole has the wrong shape.
    fn parse(&self, payload: &Value) -> Result<ParsedBatch>;
}

/// One variant per upstream shape.
#[derive(Debug, Clone, Copy)]
pub enum Adapter {
    Feed(FeedAdapter),
    GoogleSheets(SheetsAdapter),
    Notion(NotionAdapter),
    Airtable(AirtableAdapter),
    XApi(XApiAdapter),
    PythonCrawler(PythonCrawlerAdapter),
    Webhook(WebhookAdapter),
}

impl Adapter {
    pub fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        match self {
            Adapter::Feed(a) => a.parse(payload),
            Adapter::GoogleSheets(a) => a.parse(payload),
            Adapter::Notion(a) => a.parse(payload),
            Adapter::Airtable(a) => a.parse(payload),
            Adapter::XApi(a) => a.parse(payload),
            Adapter::PythonCrawler(a) => a.parse(payload),
            Adapter::Webhook(a) => a.parse(payload),
        }
    }
}

pub(crate) mod utils {
    use super::*;

    /// The row array of a payload: either the payload itself or the array
    /// under the first of `keys` present on an object payload.
    pub fn rows<'a>(payload: &'a Value, keys: &[&str], source: &str) -> Result<&'a [Value]> {
        match payload {
            Value::Array(rows) => Ok(rows),
            Value::Object(map) => keys
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
                .map(Vec::as_slice)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "{} payload must be an array or carry one of {:?}",
                        source, keys
                    ))
                }),
            _ => Err(Error::Validation(format!("{} payload must be an array", source))),
        }
    }

    /// Copies the fields of an object row; None for anything else.
    pub fn object(row: &Value) -> Option<RawItem> {
        row.as_object().map(|map| RawItem::new(map.clone()))
    }

    /// Flattens `{ "likes": 1, ... }` found under `key` into top-level fields.
    pub fn flatten_engagement(fields: &mut Map<String, Value>, key: &str) {
        if let Some(Value::Object(engagement)) = fields.remove(key) {
            for (name, value) in engagement {
                fields.entry(name).or_insert(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_type_names() {
        assert_eq!("x_api".parse::<SourceType>().unwrap(), SourceType::XApi);
        assert!("rss2json".parse::<SourceType>().is_err());
        let parsed: SourceType = serde_json::from_value(json!("google_sheets")).unwrap();
        assert_eq!(parsed, SourceType::GoogleSheets);
    }

    #[test]
    fn test_initial_status_by_trust() {
        assert_eq!(SourceType::Feed.initial_status(), ArticleStatus::Approved);
        assert_eq!(SourceType::Webhook.initial_status(), ArticleStatus::Approved);
        assert_eq!(SourceType::Notion.initial_status(), ArticleStatus::Pending);
        assert_eq!(SourceType::PythonCrawler.initial_status(), ArticleStatus::Pending);
    }

    #[test]
    fn test_every_gated_source_is_seeded() {
        for source in SourceType::ALL {
            if let Some(name) = source.crawler_name() {
                assert!(KNOWN_SOURCES.contains(&name), "{} missing", name);
            }
        }
    }

    #[test]
    fn test_rows_container_shapes() {
        let bare = json!([{ "a": 1 }]);
        assert_eq!(utils::rows(&bare, &["items"], "feed").unwrap().len(), 1);
        let wrapped = json!({ "items": [1, 2] });
        assert_eq!(utils::rows(&wrapped, &["items"], "feed").unwrap().len(), 2);
        assert!(utils::rows(&json!({ "other": [] }), &["items"], "feed").is_err());
        assert!(utils::rows(&json!("text"), &["items"], "feed").is_err());
    }
}
