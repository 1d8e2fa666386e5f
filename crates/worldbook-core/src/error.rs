//! Error types for worldbook operations.
//!
//! Evaluation itself never fails: these errors surface from the timed-effect
//! state store, configuration loading and document parsing. The engine turns
//! store errors into warnings and carries on with empty state.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for worldbook operations.
pub type WorldbookResult<T> = Result<T, WorldbookError>;

/// Main error type for all worldbook operations.
#[derive(Error, Debug)]
pub enum WorldbookError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// Timed-effect state store operation failed.
    #[error("State store error: {message}")]
    StateStore {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValOutOfRange,

    // State store (STATE_xxx)
    StateReadFailed,
    StateWriteFailed,
    StateLockPoisoned,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseInvalidRegex,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValOutOfRange => "VAL_002",
            ErrorCode::StateReadFailed => "STATE_001",
            ErrorCode::StateWriteFailed => "STATE_002",
            ErrorCode::StateLockPoisoned => "STATE_003",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseInvalidRegex => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl WorldbookError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValOutOfRange,
            details: HashMap::new(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a state store read error wrapping its cause.
    pub fn state_read(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StateStore {
            message: message.into(),
            code: ErrorCode::StateReadFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Create a state store write error wrapping its cause.
    pub fn state_write(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StateStore {
            message: message.into(),
            code: ErrorCode::StateWriteFailed,
            source: Some(Box::new(source)),
        }
    }

    /// The state store mutex was poisoned by a panicking writer.
    pub fn lock_poisoned() -> Self {
        Self::StateStore {
            message: "state store lock poisoned".to_string(),
            code: ErrorCode::StateLockPoisoned,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create an invalid regex error.
    pub fn invalid_regex(pattern: &str, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            message: format!("invalid regex '{}': {}", pattern, err),
            code: ErrorCode::ParseInvalidRegex,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::StateStore { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::StateStore {
                code: ErrorCode::StateReadFailed,
                ..
            } => Some("The timed-effect state file may be corrupt; it will be rebuilt on next write"),
            Self::StateStore { .. } => Some("Please check that the state directory is writable"),
            Self::Parse {
                code: ErrorCode::ParseInvalidRegex,
                ..
            } => Some("Fix the regex key or disable the entry's regex flag"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = WorldbookError::validation("Invalid input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("Invalid input"));
        assert!(err.suggestion().is_none());
    }

    #[test]
    fn test_state_store_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = WorldbookError::state_write("write failed", io);
        assert_eq!(err.code(), ErrorCode::StateWriteFailed);
        assert!(err.suggestion().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_parse_error() {
        let err = WorldbookError::parse("expected value at line 1 column 1");
        assert_eq!(err.code(), ErrorCode::ParseInvalidJson);
        assert_eq!(err.code().as_str(), "PARSE_001");
        assert!(err.to_string().starts_with("Parse error"));
    }

    #[test]
    fn test_invalid_regex_error() {
        let err = WorldbookError::invalid_regex("[a-", "unclosed class");
        assert_eq!(err.code(), ErrorCode::ParseInvalidRegex);
        assert!(err.to_string().contains("[a-"));
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::StateReadFailed.as_str(), "STATE_001");
        assert_eq!(ErrorCode::ParseInvalidRegex.as_str(), "PARSE_002");
        assert_eq!(ErrorCode::Internal.as_str(), "INT_001");
    }
}
