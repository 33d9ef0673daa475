use std::time::Duration;

use rss::Channel;
use serde_json::{json, Map, Value};
use tracing::{error, info};
use tw_core::{Error, Result};

pub const MAX_ITEMS_PER_FEED: usize = 10;

pub const DEFAULT_FEEDS: &[&str] = &[
    "https://feeds.feedburner.com/ToyNewsInternational",
    "https://hypebeast.com/feed",
    "https://ww.fashionnetwork.com/rss/news.xml",
    "https://ew.com/feed/",
];

/// An item is kept when its title or body mentions one of these.
pub const RELEVANCE_TERMS: &[&str] = &[
    "labubu", "lаbubu", "拉布布", "泡泡玛特", "popmart", "pop mart", "lisa", "blackpink", "盲盒",
    "blind box", "手办", "figure", "collectible", "designer toy", "收藏", "限量", "limited edition",
    "kaws", "molly", "dimoo", "skullpanda", "hirono",
];

pub fn is_relevant(text: &str) -> bool {
    let text = text.to_lowercase();
    RELEVANCE_TERMS.iter().any(|term| text.contains(term))
}

fn item_json(item: &rss::Item) -> Value {
    let mut fields = Map::new();
    let mut put = |key: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            fields.insert(key.to_string(), Value::from(value));
        }
    };
    put("title", item.title());
    put("link", item.link());
    put("guid", item.guid().map(|guid| guid.value()));
    put("description", item.description());
    put("content", item.content());
    put("pubDate", item.pub_date());
    put(
        "author",
        item.author()
            .or_else(|| item.dublin_core_ext().and_then(|dc| dc.creators().first().map(String::as_str))),
    );
    if let Some(enclosure) = item.enclosure() {
        fields.insert(
            "enclosure".to_string(),
            json!({ "link": enclosure.url(), "type": enclosure.mime_type() }),
        );
    }
    Value::Object(fields)
}

/// Relevant items of one RSS document in feed-reader JSON shape.
pub fn parse_channel(bytes: &[u8]) -> Result<Vec<Value>> {
    let channel = Channel::read_from(bytes).map_err(|e| Error::Parse(format!("invalid RSS: {}", e)))?;
    let total = channel.items().len();
    let items: Vec<Value> = channel
        .items()
        .iter()
        .filter(|item| {
            let text = format!(
                "{} {}",
                item.title().unwrap_or_default(),
                item.description().or(item.content()).unwrap_or_default()
            );
            is_relevant(&text)
        })
        .take(MAX_ITEMS_PER_FEED)
        .map(item_json)
        .collect();
    info!("🎯 {} relevant of {} items in {}", items.len(), total, channel.title());
    Ok(items)
}

pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trendwire/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<Value>> {
        info!("🔍 Fetching feed {}", url);
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_channel(&bytes)
    }

    /// Fetches every feed in turn. A failing feed is logged and skipped.
    pub async fn fetch_all(&self, urls: &[String]) -> Value {
        let mut items = Vec::new();
        for url in urls {
            match self.fetch(url).await {
                Ok(found) => items.extend(found),
                Err(e) => error!("🚨 Feed {} failed: {}", url, e),
            }
        }
        json!({ "items": items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Toy News</title>
    <link>https://toys.example</link>
    <description>toys</description>
    <item>
      <title>Pop Mart unveils new Labubu series</title>
      <link>https://toys.example/labubu-series</link>
      <description>&lt;p&gt;Blind box &lt;img src="https://cdn.example/l.jpg"&gt;&lt;/p&gt;</description>
      <pubDate>Wed, 01 May 2024 10:00:00 +0000</pubDate>
      <enclosure url="https://cdn.example/cover.jpg" length="1" type="image/jpeg"/>
    </item>
    <item>
      <title>Quarterly earnings roundup</title>
      <link>https://toys.example/earnings</link>
      <description>Nothing relevant</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_only_relevant_items_are_kept() {
        let items = parse_channel(RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["link"], "https://toys.example/labubu-series");
        assert_eq!(items[0]["enclosure"]["type"], "image/jpeg");
        assert_eq!(items[0]["pubDate"], "Wed, 01 May 2024 10:00:00 +0000");
    }

    #[test]
    fn test_relevance_is_case_insensitive() {
        assert!(is_relevant("LABUBU drop"));
        assert!(is_relevant("泡泡玛特新品"));
        assert!(!is_relevant("stock market"));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(parse_channel(b"<html>"), Err(Error::Parse(_))));
    }
}
