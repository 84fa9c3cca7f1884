//! Client error types

use serde_json::Value;
use shared::error::{AppError, ErrorCode};
use std::collections::HashMap;
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with a structured error envelope
    #[error("API error {code}: {message}")]
    Api {
        code: ErrorCode,
        message: String,
        details: Option<HashMap<String, Value>>,
    },

    /// Store answered with a non-success status and no parsable envelope
    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rejected locally before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local storage (identity file) failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// How the caller must react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Table claimed by another session, status regression, ... Never retried.
    Conflict,
    /// Network failure or propagation lag. Retried with bounded backoff.
    Transient,
    /// Table/order no longer exists. Redirect to a safe default view.
    NotFound,
    /// Rejected input. Fix the request.
    Validation,
    /// Anything else
    Internal,
}

impl ClientError {
    /// Classify the error for retry / redirect decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(e) => {
                if e.is_decode() {
                    ErrorKind::Internal
                } else {
                    ErrorKind::Transient
                }
            }
            Self::Api { code, .. } => kind_of_code(*code),
            Self::Status { status, .. } => match *status {
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                408 | 429 | 500..=599 => ErrorKind::Transient,
                400..=499 => ErrorKind::Validation,
                _ => ErrorKind::Internal,
            },
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidResponse(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Structured store error code, when the store sent one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.code() == Some(code)
    }

    /// Actionable message for the person in front of the screen
    ///
    /// Never exposes raw transport errors.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Conflict => match self.code() {
                Some(ErrorCode::TableOccupied) => {
                    "This table is occupied, please choose another table".to_string()
                }
                Some(ErrorCode::SessionTableMismatch) => {
                    "Your visit at this table has ended, please scan the table code again"
                        .to_string()
                }
                _ => "Someone else just changed this, please refresh".to_string(),
            },
            ErrorKind::Transient => "Could not reach the counter, retrying…".to_string(),
            ErrorKind::NotFound => {
                "This table is no longer available, please select a table again".to_string()
            }
            ErrorKind::Validation => match self {
                Self::Validation(msg) => msg.clone(),
                Self::Api { message, .. } => message.clone(),
                _ => "The request was not accepted, please check it and try again".to_string(),
            },
            ErrorKind::Internal => "Something went wrong, please ask the staff for help".to_string(),
        }
    }
}

fn kind_of_code(code: ErrorCode) -> ErrorKind {
    match code {
        ErrorCode::TableOccupied
        | ErrorCode::SessionTableMismatch
        | ErrorCode::OrderAlreadyPaid
        | ErrorCode::OrderCancelled
        | ErrorCode::OrderInvalidTransition
        | ErrorCode::AlreadyExists => ErrorKind::Conflict,

        ErrorCode::NotFound | ErrorCode::TableNotFound | ErrorCode::OrderNotFound => {
            ErrorKind::NotFound
        }

        ErrorCode::SessionWithoutTable
        | ErrorCode::NetworkError
        | ErrorCode::TimeoutError
        | ErrorCode::InternalError
        | ErrorCode::DatabaseError => ErrorKind::Transient,

        ErrorCode::ValidationFailed
        | ErrorCode::InvalidRequest
        | ErrorCode::RequiredField
        | ErrorCode::ValueOutOfRange
        | ErrorCode::OrderEmpty
        | ErrorCode::OrderInvalidTotal
        | ErrorCode::OrderInvalidItem
        | ErrorCode::SessionRequired => ErrorKind::Validation,

        ErrorCode::Success | ErrorCode::Unknown | ErrorCode::ConfigError => ErrorKind::Internal,
    }
}

impl From<AppError> for ClientError {
    fn from(err: AppError) -> Self {
        Self::Api {
            code: err.code,
            message: err.message,
            details: err.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_kinds() {
        let occupied: ClientError = AppError::table_occupied(7).into();
        assert_eq!(occupied.kind(), ErrorKind::Conflict);
        assert!(!occupied.is_transient());

        let missing: ClientError = AppError::table_not_found(99).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let lag: ClientError = AppError::new(ErrorCode::SessionWithoutTable).into();
        assert!(lag.is_transient());
        assert!(lag.has_code(ErrorCode::SessionWithoutTable));
    }

    #[test]
    fn test_status_kinds() {
        let status = |s| ClientError::Status {
            status: s,
            body: String::new(),
        };
        assert_eq!(status(404).kind(), ErrorKind::NotFound);
        assert_eq!(status(409).kind(), ErrorKind::Conflict);
        assert_eq!(status(503).kind(), ErrorKind::Transient);
        assert_eq!(status(429).kind(), ErrorKind::Transient);
        assert_eq!(status(422).kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_user_messages_are_actionable() {
        let occupied: ClientError = AppError::table_occupied(7).into();
        assert_eq!(
            occupied.user_message(),
            "This table is occupied, please choose another table"
        );

        let lag: ClientError = AppError::new(ErrorCode::NetworkError).into();
        assert_eq!(lag.user_message(), "Could not reach the counter, retrying…");

        let invalid = ClientError::Validation("Your cart is empty".into());
        assert_eq!(invalid.user_message(), "Your cart is empty");

        let raw = ClientError::InvalidResponse("missing field `data`".into());
        assert!(!raw.user_message().contains("data"));
    }
}
