use thiserror::Error;

use crate::{models::Role, remote::RemoteError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("No credential available, sign in first")]
    AuthRequired,

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Rejected by the server: {reason}")]
    Rejected { reason: String },

    #[error("Another change to {entity} is still in flight")]
    ConflictInProgress { entity: String },

    #[error("Project creation rejected: {reason}")]
    CreateRejected { reason: String },

    #[error("Task creation failed: {reason}")]
    TaskCreateFailed { reason: String },

    #[error("Failed to {operation} {}: {reason}", .projects.join(", "))]
    OrderingFailed {
        operation: &'static str,
        projects: Vec<String>,
        reason: String,
    },

    #[error("Project '{0}' not found")]
    ProjectNotFound(String),

    #[error("No project is open")]
    NoActiveProject,

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Column '{0}' not found")]
    BoardNotFound(String),

    #[error("Member '{0}' not found")]
    MemberNotFound(String),

    #[error("'{0}' is the only owner of this project")]
    SoleOwner(String),

    #[error("A project {role} cannot {action}")]
    PermissionDenied { role: Role, action: &'static str },

    #[error("No user is signed in")]
    NoSession,
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::AuthRequired => SyncError::AuthRequired,
            RemoteError::Unavailable(message) => SyncError::RemoteUnavailable(message),
            RemoteError::Rejected { reason, .. } => SyncError::Rejected { reason },
            // The server answered, so the store was reachable
            malformed @ RemoteError::Malformed { .. } => SyncError::Rejected {
                reason: malformed.to_string(),
            },
        }
    }
}

impl SyncError {
    /// Message suitable for the `reason` of a wrapping error.
    pub(crate) fn reason(&self) -> String {
        match self {
            SyncError::Rejected { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undecodable_response_is_a_rejection() {
        let error = SyncError::from(RemoteError::Malformed {
            endpoint: String::from("projects/launch-plan"),
            message: String::from("missing field `boards`"),
        });

        assert_eq!(
            error,
            SyncError::Rejected {
                reason: String::from(
                    "Malformed response from 'projects/launch-plan': missing field `boards`"
                ),
            }
        );
    }

    #[test]
    fn test_transport_failure_is_unavailable() {
        let error = SyncError::from(RemoteError::Unavailable(String::from("connection reset")));

        assert_eq!(
            error,
            SyncError::RemoteUnavailable(String::from("connection reset"))
        );
    }
}
