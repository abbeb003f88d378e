use mpx_audit::TimelineError;
use mpx_schemas::Document;
use mpx_store::StoreError;

/// Failure of a workflow operation.
///
/// Only [`WorkflowError::TransactionConflict`] is retried (by
/// [`run_transaction`](crate::run_transaction)); every other variant is
/// returned to the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Caller input is malformed. Message is shown verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The caller may not perform this action. Carries no detail.
    #[error("unauthorized")]
    Authorization,

    /// The entity exists but its current state forbids the action.
    #[error("{entity} {id} is {current}: {reason}")]
    InvalidState {
        entity: &'static str,
        id: String,
        current: String,
        reason: String,
    },

    /// A concurrent writer won; only surfaced once retries are exhausted.
    #[error("transaction conflict on {collection}/{id}")]
    TransactionConflict { collection: String, id: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::Validation(msg.into())
    }

    pub fn not_found<D: Document>(id: &str) -> Self {
        WorkflowError::NotFound {
            entity: D::ENTITY,
            id: id.to_string(),
        }
    }

    pub fn invalid_state<D: Document>(
        id: &str,
        current: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        WorkflowError::InvalidState {
            entity: D::ENTITY,
            id: id.to_string(),
            current: current.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkflowError::TransactionConflict { .. })
    }

    /// Current state carried by an `InvalidState` error.
    pub fn current_state(&self) -> Option<&str> {
        match self {
            WorkflowError::InvalidState { current, .. } => Some(current),
            _ => None,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { collection, id } => {
                WorkflowError::TransactionConflict { collection, id }
            }
            other => WorkflowError::Internal(other.to_string()),
        }
    }
}

impl From<TimelineError> for WorkflowError {
    fn from(err: TimelineError) -> Self {
        WorkflowError::Internal(err.to_string())
    }
}
