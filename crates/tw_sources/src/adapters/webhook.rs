use serde_json::Value;
use tw_core::{RawItem, Result};

use super::{utils, ParsedBatch, SourceAdapter};

/// Items that are already canonical (camelCase Article fields, engagement
/// nested under `engagement`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookAdapter;

fn canonical(row: &Value) -> Option<RawItem> {
    let mut item = utils::object(row)?;
    utils::flatten_engagement(&mut item.fields, "engagement");
    Some(item)
}

impl SourceAdapter for WebhookAdapter {
    fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        let mut batch = ParsedBatch::default();
        for row in utils::rows(payload, &["items", "batch_data"], "webhook")? {
            batch.push(canonical(row));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engagement_is_flattened() {
        let payload = json!([{
            "title": "Labubu",
            "originalUrl": "https://a.example/1",
            "engagement": { "likes": 3, "views": 900 }
        }]);
        let batch = WebhookAdapter.parse(&payload).unwrap();
        let item = &batch.items[0];
        assert_eq!(item.first_count(&["likes"]), Some(3));
        assert_eq!(item.first_count(&["views"]), Some(900));
        assert!(item.fields.get("engagement").is_none());
    }
}
