use serde_json::Value;
use tw_core::{RawItem, Result};

use super::{utils, ParsedBatch, SourceAdapter};

/// Airtable list responses: `{ "records": [{ "fields": {...} }] }` or the bare
/// record array.
#[derive(Debug, Clone, Copy, Default)]
pub struct AirtableAdapter;

fn record(row: &Value) -> Option<RawItem> {
    row.get("fields")?
        .as_object()
        .map(|fields| RawItem::new(fields.clone()))
}

impl SourceAdapter for AirtableAdapter {
    fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        let mut batch = ParsedBatch::default();
        for row in utils::rows(payload, &["records"], "airtable")? {
            batch.push(record(row));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_without_fields_are_rejected() {
        let payload = json!({
            "records": [
                { "id": "rec1", "fields": { "Title": "Labubu", "URL": "https://a.example/1", "Likes": 4 } },
                { "id": "rec2" }
            ]
        });
        let batch = AirtableAdapter.parse(&payload).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.rejected, 1);
        assert_eq!(batch.items[0].first_text(&["Title"]).unwrap(), "Labubu");
    }
}
