//! Sidecar metadata files: `<books>/metadata/<basename>.json`.
//!
//! The files are shared with the external enricher, so unknown keys are kept
//! and `year`/`cover_updated` may be strings or numbers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed sidecar document. Every key is preserved on rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookMetadata(pub Map<String, Value>);

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl BookMetadata {
    /// A non-empty text field. Numbers are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A field passed through as-is when it holds a meaningful value.
    pub fn scalar(&self, key: &str) -> Option<Value> {
        self.0.get(key).filter(|v| is_truthy(v)).cloned()
    }

    /// Apply the non-empty fields of `patch`.
    pub fn apply(&mut self, patch: &MetadataPatch) {
        let fields = [
            ("title", &patch.title),
            ("author", &patch.author),
            ("year", &patch.year),
            ("description", &patch.description),
        ];
        for (key, value) in fields {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                self.0.insert(key.to_string(), Value::String(v.to_string()));
            }
        }
    }
}

/// Admin edit of a book's sidecar metadata. Empty fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub year: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
