//! Typed errors for the board service.
//!
//! Store closures return `anyhow::Result`; domain failures raised inside them
//! are `TaskboardError` values and are recovered by downcasting when the API
//! layer maps an error to a response.

use taskboard_core::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskboardError {
    #[error("Board not found")]
    BoardNotFound { id: i64 },

    #[error("User not found")]
    UserNotFound { id: i64 },

    #[error("User already exists")]
    EmailTaken { email: String },

    #[error("No authentication token, access denied")]
    MissingIdentity,

    #[error("Not authorized to {action} this user data")]
    Forbidden { action: &'static str },

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

impl TaskboardError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::BoardNotFound { .. } | Self::UserNotFound { .. } | Self::Tree(_) => true,
            _ => false,
        }
    }
}
