//! Structural edits on a decoded list sequence.
//!
//! The mutator never touches storage. Callers decode the board's column,
//! apply one operation, re-encode and persist. Lookups are linear scans of
//! the immediate parent; boards are small and human-curated.

use serde_json::{Map, Value};

use crate::error::TreeError;
use crate::ids::{IdSource, RandomIds, fresh_id};
use crate::model::{List, Task};

#[derive(Debug, Default)]
pub struct TreeMutator<I = RandomIds> {
    ids: I,
}

impl TreeMutator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I: IdSource> TreeMutator<I> {
    pub fn with_ids(ids: I) -> Self {
        Self { ids }
    }

    /// Append an empty list with a fresh id. The title is stored as given;
    /// a missing one is stored as `""`.
    pub fn append_list(&self, lists: &mut Vec<List>, title: Option<Value>) -> List {
        let id = fresh_id(&self.ids, lists.iter().map(|l| l.id.as_str()));
        let list = List::new(id, text_or_empty(title));
        lists.push(list.clone());
        list
    }

    /// Shallow-merge `patch` over the list named by `list_id`.
    ///
    /// Unspecified fields keep their values and any value the caller sends
    /// is stored. The list's id is fixed by `list_id`; an `id` key in the
    /// patch is ignored.
    pub fn replace_list(
        &self,
        lists: &mut [List],
        list_id: &str,
        patch: &Map<String, Value>,
    ) -> Result<List, TreeError> {
        let list = find_list_mut(lists, list_id)?;
        let fields = merge(list.clone().into_fields(), patch);
        *list = List::from_fields(fields);
        Ok(list.clone())
    }

    pub fn remove_list(&self, lists: &mut Vec<List>, list_id: &str) -> Result<List, TreeError> {
        let index = list_index(lists, list_id)?;
        Ok(lists.remove(index))
    }

    /// Append a task to the end of a list. Description defaults to `""`.
    pub fn append_task(
        &self,
        lists: &mut [List],
        list_id: &str,
        title: Option<Value>,
        description: Option<Value>,
    ) -> Result<Task, TreeError> {
        let list = find_list_mut(lists, list_id)?;
        let id = fresh_id(&self.ids, list.tasks.iter().map(|t| t.id.as_str()));
        let task = Task::new(id, text_or_empty(title), text_or_empty(description));
        list.tasks.push(task.clone());
        Ok(task)
    }

    pub fn replace_task(
        &self,
        lists: &mut [List],
        list_id: &str,
        task_id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Task, TreeError> {
        let list = find_list_mut(lists, list_id)?;
        let index = task_index(list, task_id)?;
        let task = &mut list.tasks[index];
        let fields = merge(task.clone().into_fields(), patch);
        *task = Task::from_fields(fields);
        Ok(task.clone())
    }

    pub fn remove_task(
        &self,
        lists: &mut [List],
        list_id: &str,
        task_id: &str,
    ) -> Result<Task, TreeError> {
        let list = find_list_mut(lists, list_id)?;
        let index = task_index(list, task_id)?;
        Ok(list.tasks.remove(index))
    }
}

fn list_index(lists: &[List], list_id: &str) -> Result<usize, TreeError> {
    lists
        .iter()
        .position(|l| l.id == list_id)
        .ok_or_else(|| TreeError::ListNotFound {
            list_id: list_id.to_string(),
        })
}

fn find_list_mut<'a>(lists: &'a mut [List], list_id: &str) -> Result<&'a mut List, TreeError> {
    let index = list_index(lists, list_id)?;
    Ok(&mut lists[index])
}

fn task_index(list: &List, task_id: &str) -> Result<usize, TreeError> {
    list.tasks
        .iter()
        .position(|t| t.id == task_id)
        .ok_or_else(|| TreeError::TaskNotFound {
            list_id: list.id.clone(),
            task_id: task_id.to_string(),
        })
}

/// Overlay `patch` on an entity's fields, keeping its id.
fn merge(mut fields: Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    for (key, value) in patch {
        if key == "id" {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
    fields
}

fn text_or_empty(value: Option<Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::from(""),
        Some(value) => value,
    }
}
