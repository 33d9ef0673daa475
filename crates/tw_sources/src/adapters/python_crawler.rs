use serde_json::Value;
use tw_core::{Error, RawItem, Result};

use super::{utils, ParsedBatch, SourceAdapter};

/// The crawler worker's artifact: `{ "metadata": {...}, "articles": [...] }`
/// with camelCase articles and counters under `engagementData`. Any
/// `hotScore` the worker computed is ignored and recomputed on ingest.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonCrawlerAdapter;

fn article(row: &Value) -> Option<RawItem> {
    let mut item = utils::object(row)?;
    utils::flatten_engagement(&mut item.fields, "engagementData");
    item.fields.remove("hotScore");
    Some(item)
}

impl SourceAdapter for PythonCrawlerAdapter {
    fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        let articles = payload
            .get("articles")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Validation("crawler output has no articles array".to_string()))?;

        let mut batch = ParsedBatch::default();
        for row in articles {
            batch.push(article(row));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_output() {
        let payload = json!({
            "metadata": { "export_time": "2024-05-01T10:00:00", "total_count": 2, "source": "reddit", "version": "1.0" },
            "articles": [
                {
                    "title": "Labubu haul",
                    "originalUrl": "https://reddit.com/r/popmart/1",
                    "platform": "reddit",
                    "hotScore": 99.0,
                    "engagementData": { "likes": 10, "shares": 1, "comments": 4, "views": 0 }
                },
                null
            ]
        });
        let batch = PythonCrawlerAdapter.parse(&payload).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.rejected, 1);
        assert_eq!(batch.items[0].first_count(&["comments"]), Some(4));
        assert!(batch.items[0].fields.get("hotScore").is_none());
    }

    #[test]
    fn test_missing_articles_is_invalid() {
        assert!(PythonCrawlerAdapter.parse(&json!([])).is_err());
    }
}
