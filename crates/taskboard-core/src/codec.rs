//! Conversion between a board's `lists` column and its in-memory tree.
//!
//! Decoding never fails: absent or unparseable text becomes an empty sequence
//! so a damaged tree cannot take down board retrieval. A parsed array is kept
//! entry by entry; only entries that cannot be a list or task at all are
//! dropped, and their siblings survive. Every repair is reported to a
//! [`DecodeDiagnostics`] collaborator. Encoding always yields the text of a
//! JSON array, so the column stays decodable.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::model::List;

/// Encoding of an empty sequence, stored whenever there is nothing valid to keep.
pub const EMPTY_LISTS: &str = "[]";

/// Why a stored or supplied document, or part of one, was discarded.
#[derive(Debug, Error)]
pub enum DocumentDefect {
    #[error("lists document is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("lists document is a JSON {found}, expected an array")]
    NotAnArray { found: &'static str },

    #[error("lists document entry {path} is a JSON {found}, expected {expected}")]
    EntryDropped {
        path: String,
        found: &'static str,
        expected: &'static str,
    },

    #[error("lists could not be serialized: {0}")]
    Unserializable(#[source] serde_json::Error),
}

/// Receives a report each time the codec repairs a document.
pub trait DecodeDiagnostics: Send + Sync {
    fn document_repaired(&self, defect: &DocumentDefect);
}

impl<D: DecodeDiagnostics + ?Sized> DecodeDiagnostics for Arc<D> {
    fn document_repaired(&self, defect: &DocumentDefect) {
        (**self).document_repaired(defect);
    }
}

/// Reports repairs as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DecodeDiagnostics for TracingDiagnostics {
    fn document_repaired(&self, defect: &DocumentDefect) {
        warn!(error = %defect, "Repaired malformed lists document");
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentCodec<D = TracingDiagnostics> {
    diagnostics: D,
}

impl DocumentCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: DecodeDiagnostics> DocumentCodec<D> {
    pub fn with_diagnostics(diagnostics: D) -> Self {
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    /// Decode the stored column. `None` and `""` are an empty board.
    pub fn decode(&self, raw: Option<&str>) -> Vec<List> {
        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Vec::new(),
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.lists_from_value(Some(&value)),
            Err(e) => {
                self.diagnostics
                    .document_repaired(&DocumentDefect::Syntax(e));
                Vec::new()
            }
        }
    }

    /// Encode a well-typed sequence.
    pub fn encode(&self, lists: &[List]) -> String {
        match serde_json::to_string(lists) {
            Ok(text) => text,
            Err(e) => {
                self.diagnostics
                    .document_repaired(&DocumentDefect::Unserializable(e));
                EMPTY_LISTS.to_string()
            }
        }
    }

    /// Encode an arbitrary caller-supplied value meant to be the list sequence.
    ///
    /// `None` and `null` store an empty array, as does any value that is not
    /// an array. Entries are kept as [`Self::lists_from_value`] keeps them.
    pub fn encode_value(&self, value: Option<&Value>) -> String {
        let lists = self.lists_from_value(value);
        self.encode(&lists)
    }

    /// Interpret an already-parsed JSON value as a list sequence.
    ///
    /// Non-object entries are dropped one by one. Fields of an off type are
    /// kept as they are.
    pub fn lists_from_value(&self, value: Option<&Value>) -> Vec<List> {
        let value = match value {
            None | Some(Value::Null) => return Vec::new(),
            Some(value) => value,
        };
        let Value::Array(entries) = value else {
            self.diagnostics
                .document_repaired(&DocumentDefect::NotAnArray {
                    found: json_kind(value),
                });
            return Vec::new();
        };
        entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| self.list_entry(index, entry))
            .collect()
    }

    fn list_entry(&self, index: usize, entry: &Value) -> Option<List> {
        let Value::Object(fields) = entry else {
            self.drop_entry(format!("[{index}]"), entry, "an object");
            return None;
        };
        match fields.get("tasks") {
            None | Some(Value::Null) => {}
            Some(Value::Array(tasks)) => {
                for (task_index, task) in tasks.iter().enumerate() {
                    if !task.is_object() {
                        self.drop_entry(format!("[{index}].tasks[{task_index}]"), task, "an object");
                    }
                }
            }
            Some(other) => self.drop_entry(format!("[{index}].tasks"), other, "an array"),
        }
        Some(List::from_fields(fields.clone()))
    }

    fn drop_entry(&self, path: String, found: &Value, expected: &'static str) {
        self.diagnostics
            .document_repaired(&DocumentDefect::EntryDropped {
                path,
                found: json_kind(found),
                expected,
            });
    }
}

/// Decode with the default tracing-backed diagnostics.
pub fn decode(raw: Option<&str>) -> Vec<List> {
    DocumentCodec::new().decode(raw)
}

/// Encode with the default tracing-backed diagnostics.
pub fn encode(lists: &[List]) -> String {
    DocumentCodec::new().encode(lists)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
