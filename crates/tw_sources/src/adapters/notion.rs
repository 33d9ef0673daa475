use serde_json::{Map, Value};
use tw_core::{RawItem, Result};

use super::{utils, ParsedBatch, SourceAdapter};

/// Notion database pages. Each typed property is reduced to a plain value
/// under its property name (`Title`, `URL`, `Published`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct NotionAdapter;

fn plain_text(parts: &Value) -> Option<Value> {
    let text: String = parts
        .as_array()?
        .iter()
        .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then(|| Value::String(text))
}

fn property_value(property: &Value) -> Option<Value> {
    let kind = property.get("type").and_then(Value::as_str)?;
    let inner = property.get(kind)?;
    match kind {
        "title" | "rich_text" => plain_text(inner),
        "url" | "email" | "phone_number" | "number" | "checkbox" => {
            (!inner.is_null()).then(|| inner.clone())
        }
        "date" => inner.get("start").cloned(),
        "select" | "status" => inner.get("name").cloned(),
        "multi_select" => Some(Value::Array(
            inner
                .as_array()?
                .iter()
                .filter_map(|option| option.get("name").cloned())
                .collect(),
        )),
        _ => None,
    }
}

fn page(row: &Value) -> Option<RawItem> {
    let properties = row.get("properties")?.as_object()?;
    let mut fields = Map::new();
    for (name, property) in properties {
        if let Some(value) = property_value(property) {
            fields.insert(name.clone(), value);
        }
    }
    Some(RawItem::new(fields))
}

impl SourceAdapter for NotionAdapter {
    fn parse(&self, payload: &Value) -> Result<ParsedBatch> {
        let mut batch = ParsedBatch::default();
        for row in utils::rows(payload, &["results"], "notion")? {
            batch.push(page(row));
        }
        Ok(batch)
    }
}
