use thiserror::Error;

use crate::backends::errors::BackendError;

/// The closed set of failure categories the UI distinguishes.
///
/// Transport specific errors are folded into one of these before any text
/// reaches a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Permission,
    NotFound,
    Validation,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "We couldn't reach YidVid right now. Please try again.",
            ErrorKind::Permission => "You don't have permission to do that.",
            ErrorKind::NotFound => "We couldn't find what you were looking for.",
            ErrorKind::Validation => "That request couldn't be completed as entered.",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    /// Every source failed on a refresh the user asked for
    #[error("No content source is currently available")]
    ContentUnavailable,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Backend(err) => err.kind(),
            AppError::Mutation(err) => err.kind,
            AppError::Permission(_) => ErrorKind::Permission,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Validation(_) | AppError::Serialization(_) => ErrorKind::Validation,
            AppError::ContentUnavailable => ErrorKind::Network,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::Mutation(err) => err.user_message(),
            other => other.kind().user_message().to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// A write that did not complete.
///
/// Multi-step operations record the steps that already succeeded so the
/// failure can be reconciled by hand.
#[derive(Error, Debug, Clone)]
#[error("{operation} failed at '{failed_step}': {message}")]
pub struct MutationError {
    pub operation: String,
    pub failed_step: String,
    pub completed_steps: Vec<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl MutationError {
    pub fn new(operation: impl Into<String>, failed_step: impl Into<String>, err: &AppError) -> Self {
        Self {
            operation: operation.into(),
            failed_step: failed_step.into(),
            completed_steps: Vec::new(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn with_completed(mut self, completed_steps: Vec<String>) -> Self {
        self.completed_steps = completed_steps;
        self
    }

    pub fn is_partial(&self) -> bool {
        !self.completed_steps.is_empty()
    }

    /// Names the failed operation, never just "an error occurred"
    pub fn user_message(&self) -> String {
        format!(
            "Couldn't {} ({}). {}",
            self.operation,
            self.failed_step,
            self.kind.user_message()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_map_to_kinds() {
        let err = AppError::from(BackendError::Network("connection reset".to_string()));
        assert_eq!(err.kind(), ErrorKind::Network);

        let err = AppError::from(BackendError::Permission {
            status: 403,
            message: "row-level security".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[test]
    fn test_mutation_message_names_operation() {
        let cause = AppError::Permission("not an admin".to_string());
        let err = MutationError::new("delete channel", "soft-delete videos", &cause)
            .with_completed(vec!["soft-delete channel UC1".to_string()]);

        assert!(err.is_partial());
        let message = err.user_message();
        assert!(message.contains("delete channel"));
        assert!(message.contains("soft-delete videos"));
        assert_eq!(AppError::from(err).kind(), ErrorKind::Permission);
    }
}
