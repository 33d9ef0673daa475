use serde_json::Value;
use tw_core::Result;

use super::{utils, ParsedBatch, SourceAdapter};

/// Spreadsheet exports: flat rows whose column headers may be English or
/// Chinese. The normalizer knows both spellings, so rows pass through as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetsAdapter;

impl SourceAdapter for SheetsAdapter {
    fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        let mut batch = ParsedBatch::default();
        for row in utils::rows(payload, &["rows", "values"], "google_sheets")? {
            batch.push(utils::object(row));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_pass_through() {
        let payload = json!([
            { "标题": "Labubu 新品", "链接": "https://weibo.com/1", "点赞": "12" },
            ["a", "b"],
            { "title": "Second", "url": "https://weibo.com/2" }
        ]);
        let batch = SheetsAdapter.parse(&payload).unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.rejected, 1);
        assert_eq!(batch.items[0].first_count(&["likes", "点赞"]), Some(12));
    }
}
