use thiserror::Error;

/// Failures of a tree mutation: the addressed list or task does not exist.
/// The sequence is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("List not found")]
    ListNotFound { list_id: String },

    #[error("Task not found")]
    TaskNotFound { list_id: String, task_id: String },
}
