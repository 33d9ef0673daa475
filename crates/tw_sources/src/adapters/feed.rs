use serde_json::{json, Value};
use tw_core::{RawItem, Result};

use super::{utils, ParsedBatch, SourceAdapter};

/// Feed-reader JSON: `{ "items": [...] }` or a bare array of items with
/// `title/description/content/link/guid/pubDate/author/thumbnail/enclosure`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedAdapter;

fn is_image_enclosure(enclosure: &Value) -> bool {
    enclosure
        .get("type")
        .and_then(Value::as_str)
        .map_or(false, |kind| kind.starts_with("image/"))
}

fn feed_item(row: &Value) -> Option<RawItem> {
    let mut item = utils::object(row)?;

    let mut images = Vec::new();
    if let Some(thumbnail) = item.first_text(&["thumbnail"]) {
        images.push(thumbnail);
    }
    if let Some(enclosure) = item.fields.get("enclosure").filter(|e| is_image_enclosure(e)) {
        if let Some(link) = enclosure
            .get("link")
            .or_else(|| enclosure.get("url"))
            .and_then(Value::as_str)
        {
            images.push(link.to_string());
        }
    }
    if !images.is_empty() {
        item.set_default("images", &["images"], json!(images));
    }

    // the description is the teaser, the content the full body
    if let Some(description) = item.first_text(&["description"]) {
        item.set_default("summary", &["summary"], description.clone());
        item.set_default("content", &["content"], description);
    }
    Some(item)
}

impl SourceAdapter for FeedAdapter {
    fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        let mut batch = ParsedBatch::default();
        for row in utils::rows(payload, &["items"], "feed")? {
            batch.push(feed_item(row));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_items_keep_enclosure_images() {
        let payload = json!({
            "items": [
                {
                    "title": "Labubu x Lisa",
                    "link": "https://hypebeast.com/labubu",
                    "description": "<p>Teaser</p>",
                    "content": "<p>Full body</p>",
                    "thumbnail": "https://cdn.example/thumb.jpg",
                    "enclosure": { "link": "https://cdn.example/big.png", "type": "image/png" }
                },
                "not an item",
                {
                    "title": "Audio",
                    "link": "https://ew.com/a",
                    "description": "only a teaser",
                    "enclosure": { "link": "https://cdn.example/a.mp3", "type": "audio/mpeg" }
                }
            ]
        });

        let batch = FeedAdapter.parse(&payload).unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.rejected, 1);

        let first = &batch.items[0];
        assert_eq!(
            first.first_list(&["images"]),
            vec!["https://cdn.example/thumb.jpg", "https://cdn.example/big.png"]
        );
        assert_eq!(first.first_text(&["content"]).unwrap(), "<p>Full body</p>");
        assert_eq!(first.first_text(&["summary"]).unwrap(), "<p>Teaser</p>");

        let second = &batch.items[1];
        assert!(second.first_list(&["images"]).is_empty());
        assert_eq!(second.first_text(&["content"]).unwrap(), "only a teaser");
    }

    #[test]
    fn test_feed_rejects_wrong_container() {
        assert!(FeedAdapter.parse(&json!({ "status": "ok" })).is_err());
    }
}
