use std::collections::HashMap;

use serde_json::{json, Value};
use tw_core::{Error, RawItem, Result};

use super::{ParsedBatch, SourceAdapter};

const TITLE_CHARS: usize = 100;

/// Recent-search responses of the X API v2:
/// `{ "data": [tweet], "includes": { "users": [...], "media": [...] } }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XApiAdapter;

fn index_by<'a>(payload: &'a Value, collection: &str, key: &str) -> HashMap<&'a str, &'a Value> {
    payload
        .get("includes")
        .and_then(|includes| includes.get(collection))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| Some((entry.get(key)?.as_str()?, entry)))
                .collect()
        })
        .unwrap_or_default()
}

fn metric(tweet: &Value, name: &str) -> u64 {
    tweet
        .get("public_metrics")
        .and_then(|metrics| metrics.get(name))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn tweet_item(
    tweet: &Value,
    users: &HashMap<&str, &Value>,
    media: &HashMap<&str, &Value>,
) -> Option<RawItem> {
    let id = tweet.get("id")?.as_str()?;
    let text = tweet.get("text")?.as_str()?;
    let user = tweet
        .get("author_id")
        .and_then(Value::as_str)
        .and_then(|author| users.get(author));
    let username = user
        .and_then(|u| u.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("i");
    let author = user
        .and_then(|u| u.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(username);

    let images: Vec<&str> = tweet
        .pointer("/attachments/media_keys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .filter_map(|key| media.get(key))
                .filter_map(|m| m.get("url").or_else(|| m.get("preview_image_url")))
                .filter_map(Value::as_str)
                .collect()
        })
        .unwrap_or_default();

    let hashtags: Vec<String> = tweet
        .pointer("/entities/hashtags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| tag.get("tag").and_then(Value::as_str))
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();

    let title: String = text.chars().take(TITLE_CHARS).collect();
    let mut item = RawItem::default()
        .with("title", title)
        .with("content", text)
        .with("author", author)
        .with("url", format!("https://twitter.com/{}/status/{}", username, id))
        .with("images", json!(images))
        .with("tags", json!(hashtags))
        .with("platform", "x")
        .with("likes", metric(tweet, "like_count"))
        .with(
            "shares",
            metric(tweet, "retweet_count") + metric(tweet, "quote_count"),
        )
        .with("comments", metric(tweet, "reply_count"))
        .with("views", metric(tweet, "impression_count"));
    if let Some(created_at) = tweet.get("created_at").and_then(Value::as_str) {
        item = item.with("published_at", created_at);
    }
    Some(item)
}

impl SourceAdapter for XApiAdapter {
    fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        if !payload.is_object() {
            return Err(Error::Validation("x_api payload must be a search response object".to_string()));
        }
        let users = index_by(payload, "users", "id");
        let media = index_by(payload, "media", "media_key");

        // zero-result searches omit `data`
        let tweets = match payload.get("data") {
            None => return Ok(ParsedBatch::default()),
            Some(Value::Array(tweets)) => tweets,
            Some(_) => return Err(Error::Validation("x_api `data` must be an array".to_string())),
        };

        let mut batch = ParsedBatch::default();
        for tweet in tweets {
            batch.push(tweet_item(tweet, &users, &media));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> Value {
        json!({
            "data": [
                {
                    "id": "1790000000000000001",
                    "text": "Lisa spotted with a new #Labubu #PopMart",
                    "author_id": "42",
                    "created_at": "2024-05-01T12:00:00.000Z",
                    "attachments": { "media_keys": ["3_1"] },
                    "entities": { "hashtags": [{ "start": 24, "end": 31, "tag": "Labubu" }, { "start": 32, "end": 40, "tag": "PopMart" }] },
                    "public_metrics": { "retweet_count": 5, "like_count": 100, "reply_count": 7, "quote_count": 2, "impression_count": 5000 }
                },
                { "id": "no text" }
            ],
            "includes": {
                "users": [{ "id": "42", "name": "Toy Watcher", "username": "toywatch" }],
                "media": [{ "media_key": "3_1", "type": "photo", "url": "https://pbs.twimg.com/media/a.jpg" }]
            },
            "meta": { "result_count": 2 }
        })
    }

    #[test]
    fn test_tweets_become_items() {
        let batch = XApiAdapter.parse(&response()).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.rejected, 1);

        let item = &batch.items[0];
        assert_eq!(
            item.first_text(&["url"]).unwrap(),
            "https://twitter.com/toywatch/status/1790000000000000001"
        );
        assert_eq!(item.first_text(&["author"]).unwrap(), "Toy Watcher");
        assert_eq!(item.first_count(&["shares"]), Some(7));
        assert_eq!(item.first_count(&["comments"]), Some(7));
        assert_eq!(item.first_list(&["images"]), vec!["https://pbs.twimg.com/media/a.jpg"]);
        assert_eq!(item.first_list(&["tags"]), vec!["labubu", "popmart"]);
    }

    #[test]
    fn test_empty_search() {
        let batch = XApiAdapter.parse(&json!({ "meta": { "result_count": 0 } })).unwrap();
        assert!(batch.items.is_empty());
        assert!(XApiAdapter.parse(&json!([])).is_err());
    }
}
