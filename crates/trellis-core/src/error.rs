use thiserror::Error;

use crate::remote::{
    EntityKind,
    RemoteError,
};

/// Input rejected before any state is touched or any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task title cannot be empty")]
    EmptyTitle,
    #[error("tag cannot be empty")]
    EmptyTag,
    #[error("tag '{0}' already exists")]
    DuplicateTag(String),
    #[error("maximum {max} tags allowed")]
    TooManyTags { max: usize },
    #[error("tag '{tag}' is longer than {max} characters")]
    TagTooLong { tag: String, max: usize },
    #[error("subtask text cannot be empty")]
    EmptySubtask,
    #[error("maximum {max} subtasks allowed")]
    TooManySubtasks { max: usize },
    #[error("subtask not found: {0}")]
    UnknownSubtask(String),
    #[error("note cannot be empty")]
    EmptyNote,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {min} characters long")]
    WeakPassword { min: usize },
    #[error("username must be 3-20 letters, digits or underscores: '{0}'")]
    InvalidUsername(String),
}

/// Which optimistic operation a remote failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Fetch,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            OpKind::Fetch => "fetch",
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no signed-in owner for {0}")]
    NotSignedIn(EntityKind),

    #[error("{kind} record not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} record already exists: {id}")]
    DuplicateId { kind: EntityKind, id: String },

    #[error("{kind} {op} failed")]
    Remote {
        kind: EntityKind,
        op: OpKind,
        #[source]
        source: RemoteError,
    },

    #[error("failed to encode {kind} record")]
    Encode {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    /// Message suitable for showing to the user. Remote failures stay
    /// generic; validation failures explain themselves.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Validation(err) => err.to_string(),
            SyncError::NotSignedIn(_) => "Please sign in to save your work.".to_string(),
            SyncError::Remote { kind, op, .. } => {
                let noun = kind.singular();
                match op {
                    OpKind::Fetch => format!("Failed to load {}. Please try again.", kind),
                    OpKind::Create => format!("Failed to add {noun}. Please try again."),
                    OpKind::Update => format!("Failed to update {noun}. Please try again."),
                    OpKind::Delete => format!("Failed to delete {noun}. Please try again."),
                }
            }
            SyncError::NotFound { .. } | SyncError::DuplicateId { .. } | SyncError::Encode { .. } => {
                "Something went wrong. Please reload and try again.".to_string()
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote { .. })
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_get_generic_messages() {
        let err = SyncError::Remote {
            kind: EntityKind::Tasks,
            op: OpKind::Create,
            source: RemoteError::Network("connection reset".to_string()),
        };
        assert_eq!(err.user_message(), "Failed to add task. Please try again.");
        assert!(err.is_remote());
    }

    #[test]
    fn validation_failures_explain_themselves() {
        let err = SyncError::from(ValidationError::TooManySubtasks { max: 20 });
        assert_eq!(err.user_message(), "maximum 20 subtasks allowed");
        assert!(!err.is_remote());
    }
}
