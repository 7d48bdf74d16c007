//! List and task value types.
//!
//! Stored trees were written by many client versions, so reading one never
//! rejects an entity for the type of a field. `title`, `description` and
//! `completed` hold whatever JSON value was stored or patched in; only a
//! missing or `null` value is replaced by its default. Ids are always text.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A column on a board. Lives only inside its board's `lists` document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct List {
    pub id: String,
    pub title: Value,
    pub tasks: Vec<Task>,
    /// Fields outside the list schema, kept as the client sent them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl List {
    pub fn new(id: impl Into<String>, title: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            tasks: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Build a list from its JSON object form. Task entries that are not
    /// objects are skipped, and a `tasks` value that is not an array reads
    /// as no tasks.
    pub fn from_fields(mut fields: Map<String, Value>) -> Self {
        let id = id_text(fields.remove("id"));
        let title = or_default(fields.remove("title"), || Value::from(""));
        let tasks = match fields.remove("tasks") {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .filter_map(|entry| match entry {
                    Value::Object(task) => Some(Task::from_fields(task)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Self {
            id,
            title,
            tasks,
            extra: fields,
        }
    }

    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.extra;
        fields.insert("id".into(), Value::String(self.id));
        fields.insert("title".into(), self.title);
        let tasks = self
            .tasks
            .into_iter()
            .map(|t| Value::Object(t.into_fields()))
            .collect();
        fields.insert("tasks".into(), Value::Array(tasks));
        fields
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }
}

impl<'de> Deserialize<'de> for List {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_fields)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub title: Value,
    pub description: Value,
    pub completed: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<Value>, description: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            completed: Value::Bool(false),
            extra: Map::new(),
        }
    }

    pub fn from_fields(mut fields: Map<String, Value>) -> Self {
        Self {
            id: id_text(fields.remove("id")),
            title: or_default(fields.remove("title"), || Value::from("")),
            description: or_default(fields.remove("description"), || Value::from("")),
            completed: or_default(fields.remove("completed"), || Value::Bool(false)),
            extra: fields,
        }
    }

    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.extra;
        fields.insert("id".into(), Value::String(self.id));
        fields.insert("title".into(), self.title);
        fields.insert("description".into(), self.description);
        fields.insert("completed".into(), self.completed);
        fields
    }

    /// Whether the task is marked done. Only a JSON `true` counts.
    pub fn is_completed(&self) -> bool {
        self.completed.as_bool().unwrap_or(false)
    }
}

impl<'de> Deserialize<'de> for Task {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_fields)
    }
}

/// Older clients wrote numeric ids; both forms address the same entity.
fn id_text(raw: Option<Value>) -> String {
    match raw {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

fn or_default(raw: Option<Value>, default: impl FnOnce() -> Value) -> Value {
    match raw {
        None | Some(Value::Null) => default(),
        Some(value) => value,
    }
}
