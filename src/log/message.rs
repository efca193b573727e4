//! Message record types and the log parse/load error taxonomy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Information density label attached to a message by the upstream tagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Low,
    Medium,
    High,
    Unknown,
}

impl Density {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a raw label. Anything unrecognized maps to `Unknown` rather
    /// than failing the whole record.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Density {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed fact payload value.
///
/// The upstream tagger emits open-ended JSON under `metadata.facts`; we
/// validate at ingestion into a small closed set of variants. Entries that
/// fit none of these (arrays, booleans, null) are dropped from the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Text(String),
    Number(f64),
    Map(BTreeMap<String, FactValue>),
}

impl FactValue {
    /// Convert a raw JSON value, returning `None` for unsupported shapes.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    if let Some(fv) = Self::from_json(v) {
                        out.insert(k.clone(), fv);
                    }
                }
                Some(Self::Map(out))
            }
            _ => None,
        }
    }
}

/// A single parsed chat message, addressable by its 1-indexed file line.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// 1-indexed physical line number in the log file. Unique and stable.
    pub line: u64,
    /// Sender name extracted from the `"<sender>: <body>"` content prefix.
    /// Empty when the content carries no sender prefix.
    pub sender: String,
    /// Message body with the sender prefix stripped.
    pub body: String,
    /// Full raw content, sender prefix included.
    pub content: String,
    /// Original timestamp string, passed through untouched.
    pub timestamp: String,
    /// Topic labels (set semantics: trimmed, deduplicated, order preserved).
    pub topics: Vec<String>,
    pub sentiment: String,
    pub facts: BTreeMap<String, FactValue>,
    pub density: Density,
}

impl Message {
    /// Split `"<sender>: <body>"` content into its parts. Content without
    /// the separator is all body.
    pub fn split_sender(content: &str) -> (String, String) {
        match content.split_once(": ") {
            Some((sender, body)) => (sender.to_string(), body.to_string()),
            None => (String::new(), content.to_string()),
        }
    }

    /// `[timestamp] sender: body` display form used by tools and the CLI.
    pub fn format_simple(&self) -> String {
        format!("[{}] {}", self.timestamp, self.content)
    }
}

/// Errors raised by [`super::MessageStore::load`].
///
/// A missing file is the only fatal condition; malformed lines inside an
/// existing file are skipped and counted instead.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("chatlog file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read chatlog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_parse_is_lenient() {
        assert_eq!(Density::parse("High"), Density::High);
        assert_eq!(Density::parse(" medium "), Density::Medium);
        assert_eq!(Density::parse("banana"), Density::Unknown);
        assert_eq!(Density::parse(""), Density::Unknown);
    }

    #[test]
    fn split_sender_with_prefix() {
        let (sender, body) = Message::split_sender("alice: hello there");
        assert_eq!(sender, "alice");
        assert_eq!(body, "hello there");
    }

    #[test]
    fn split_sender_without_prefix() {
        let (sender, body) = Message::split_sender("no separator here");
        assert_eq!(sender, "");
        assert_eq!(body, "no separator here");
    }

    #[test]
    fn fact_value_accepts_closed_set() {
        let json = serde_json::json!({"salary": "5000", "age": 30, "nested": {"k": "v"}});
        let fv = FactValue::from_json(&json).unwrap();
        match fv {
            FactValue::Map(map) => {
                assert_eq!(map.get("salary"), Some(&FactValue::Text("5000".into())));
                assert_eq!(map.get("age"), Some(&FactValue::Number(30.0)));
                assert!(matches!(map.get("nested"), Some(FactValue::Map(_))));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn fact_value_rejects_arrays_and_bools() {
        assert_eq!(FactValue::from_json(&serde_json::json!([1, 2])), None);
        assert_eq!(FactValue::from_json(&serde_json::json!(true)), None);
        assert_eq!(FactValue::from_json(&serde_json::json!(null)), None);
        // Unsupported entries inside a map are dropped, map survives
        let fv = FactValue::from_json(&serde_json::json!({"ok": "yes", "bad": [1]})).unwrap();
        match fv {
            FactValue::Map(map) => {
                assert!(map.contains_key("ok"));
                assert!(!map.contains_key("bad"));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }
}
