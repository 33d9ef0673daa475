use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

/// Engagement counters reported by a source. Missing values are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Engagement {
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    pub views: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Pending,
    Approved,
    Deleted,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Approved => "approved",
            ArticleStatus::Deleted => "deleted",
        }
    }

    /// Moves along `pending -> approved -> deleted`. Pending items may also be
    /// deleted directly; nothing leaves `deleted`.
    pub fn transition(self, to: ArticleStatus) -> Result<ArticleStatus> {
        use ArticleStatus::*;
        match (self, to) {
            (Pending, Approved) | (Approved, Deleted) | (Pending, Deleted) => Ok(to),
            (from, to) => Err(Error::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ArticleStatus::Pending),
            "approved" => Ok(ArticleStatus::Approved),
            "deleted" => Ok(ArticleStatus::Deleted),
            other => Err(Error::Validation(format!("unknown article status: {}", other))),
        }
    }
}

/// The fixed category vocabulary articles are filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Celebrity,
    NewRelease,
    Event,
    Review,
    Collecting,
    Outfit,
    Art,
    Market,
    Social,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Celebrity,
        Category::NewRelease,
        Category::Event,
        Category::Review,
        Category::Collecting,
        Category::Outfit,
        Category::Art,
        Category::Market,
        Category::Social,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Celebrity => "celebrity",
            Category::NewRelease => "new_release",
            Category::Event => "event",
            Category::Review => "review",
            Category::Collecting => "collecting",
            Category::Outfit => "outfit",
            Category::Art => "art",
            Category::Market => "market",
            Category::Social => "social",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace([' ', '-'], "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| Error::Validation(format!("unknown category: {}", s)))
    }
}

/// The canonical content record every source is normalized into.
/// Unique by `original_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub content: String,
    pub summary: String,
    pub author: String,
    pub platform: String,
    pub original_url: String,
    pub published_at: DateTime<Utc>,
    pub image_urls: Vec<String>,
    pub tags: BTreeSet<String>,
    pub category: Category,
    pub engagement: Engagement,
    pub hot_score: f64,
    pub status: ArticleStatus,
}

/// A single record as handed over by a source adapter: a flat bag of fields
/// whose names may be any of the aliases the normalizer knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem {
    pub fields: Map<String, Value>,
}

impl RawItem {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Sets `key` only when none of `aliases` already carries a value.
    pub fn set_default(&mut self, key: &str, aliases: &[&str], value: impl Into<Value>) {
        if self.first_text(aliases).is_none() {
            self.fields.insert(key.to_string(), value.into());
        }
    }

    /// First non-empty textual value among `aliases`. Numbers are rendered.
    pub fn first_text(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|alias| match self.fields.get(*alias)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// First value among `aliases` that reads as a non-negative count.
    /// Negative or fractional inputs are clamped/truncated.
    pub fn first_count(&self, aliases: &[&str]) -> Option<u64> {
        aliases.iter().find_map(|alias| match self.fields.get(*alias)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_i64().map(|v| v.max(0) as u64))
                .or_else(|| n.as_f64().map(|v| v.max(0.0) as u64)),
            Value::String(s) => {
                let s = s.trim().replace(',', "");
                s.parse::<i64>()
                    .map(|v| v.max(0) as u64)
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|v| v.max(0.0) as u64))
            }
            _ => None,
        })
    }

    /// First non-empty list among `aliases`. Accepts arrays of strings or
    /// comma-separated strings.
    pub fn first_list(&self, aliases: &[&str]) -> Vec<String> {
        for alias in aliases {
            let items: Vec<String> = match self.fields.get(*alias) {
                Some(Value::Array(values)) => values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                Some(Value::String(s)) => s
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
                _ => Vec::new(),
            };
            if !items.is_empty() {
                return items;
            }
        }
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            TrendDirection::Up => "📈",
            TrendDirection::Down => "📉",
            TrendDirection::Stable => "➡️",
        }
    }
}

impl FromStr for TrendDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(TrendDirection::Up),
            "down" => Ok(TrendDirection::Down),
            "stable" => Ok(TrendDirection::Stable),
            other => Err(Error::Parse(format!("unknown trend direction: {}", other))),
        }
    }
}

/// Unique by `keyword`. `first_seen_at` never changes once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingKeyword {
    pub keyword: String,
    pub category: String,
    pub search_count: u64,
    pub mention_count: u64,
    pub hot_score: f64,
    pub trend_direction: TrendDirection,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Per-source enable flag plus an opaque settings map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    pub crawler_name: String,
    pub is_enabled: bool,
    pub config: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlerConfig {
    pub fn disabled(crawler_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            crawler_name: crawler_name.to_string(),
            is_enabled: false,
            config: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: &CrawlerConfigPatch, now: DateTime<Utc>) {
        if let Some(enabled) = patch.is_enabled {
            self.is_enabled = enabled;
        }
        if let Some(config) = &patch.config {
            self.config = config.clone();
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfigPatch {
    pub is_enabled: Option<bool>,
    pub config: Option<Map<String, Value>>,
}

/// Append-only download accounting row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub asset_id: Uuid,
    pub user_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

/// A stored downloadable file (wallpaper image or video).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
    pub original_filename: Option<String>,
    pub download_count: u64,
    pub is_active: bool,
}

impl Asset {
    pub fn download_filename(&self) -> String {
        self.original_filename
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("wallpaper-{}.jpg", self.id))
    }
}
