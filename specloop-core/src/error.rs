//! Error types for the workflow engine and its stores

use thiserror::Error;

/// Errors raised by a persistence backend
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize stored state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn lock(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Lock {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors returned to callers of the workflow engine
///
/// Step failures, validation failures and denied approvals are not errors:
/// they are reported through progress events and the run outcome.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("No workflow registered for mode '{0}'")]
    UnknownMode(String),

    #[error("Workflow '{0}' is not registered")]
    UnknownWorkflow(String),

    #[error("A workflow is already running ('{0}')")]
    AlreadyRunning(String),

    #[error("No saved workflow to resume")]
    NoSavedWorkflow,

    #[error("Saved workflow state is invalid: {0}")]
    InvalidSnapshot(String),

    #[error("Workflow persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors from an approval gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("Approval channel closed before a response arrived")]
    Closed,

    #[error("'{answer}' is not one of the offered options: {options:?}")]
    InvalidOption {
        answer: String,
        options: Vec<String>,
    },
}
