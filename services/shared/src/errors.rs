/// Shared error types for the crash services
///
/// Design Philosophy:
/// - Standardized error codes for consistent error handling across services
/// - Categorized by error domain (Configuration, State, Conflict, Persistence, ...)
/// - Includes context fields for debugging (error_code, message, context)
///
/// Usage:
/// - Engine/backend errors convert into ServiceError at the service boundary
/// - Error codes follow pattern: <CATEGORY>_<SPECIFIC>_<DETAIL>
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error categories that map to HTTP status codes and logging severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Invalid engine configuration, fatal at startup (500)
    Configuration,

    /// Operation attempted in the wrong phase or for an unknown seat (409)
    State,

    /// Duplicate submission lost the first-writer-wins race (409)
    Conflict,

    /// Audit log write failed; never surfaced to bettors directly (503)
    Persistence,

    /// Client provided invalid input (400)
    Validation,

    /// Resource not found (404)
    NotFound,

    /// Unexpected failures (500)
    Internal,
}

impl ErrorCategory {
    /// Map error category to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::Configuration => 500,
            ErrorCategory::State => 409,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Persistence => 503,
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Internal => 500,
        }
    }

    /// Map error category to log level
    pub fn log_level(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "error",
            ErrorCategory::State => "info",
            ErrorCategory::Conflict => "warn",
            ErrorCategory::Persistence => "error",
            ErrorCategory::Validation => "warn",
            ErrorCategory::NotFound => "info",
            ErrorCategory::Internal => "error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "Configuration",
            ErrorCategory::State => "State",
            ErrorCategory::Conflict => "Conflict",
            ErrorCategory::Persistence => "Persistence",
            ErrorCategory::Validation => "Validation",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::Internal => "Internal",
        }
    }
}

/// Standard error codes used across all services
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    // Configuration errors
    pub const CONFIG_INVALID_HOUSE_EDGE: ErrorCode = ErrorCode("CONFIG_INVALID_HOUSE_EDGE");
    pub const CONFIG_INVALID_VALUE: ErrorCode = ErrorCode("CONFIG_INVALID_VALUE");

    // State errors
    pub const STATE_NO_ACTIVE_ROUND: ErrorCode = ErrorCode("STATE_NO_ACTIVE_ROUND");
    pub const STATE_WRONG_PHASE: ErrorCode = ErrorCode("STATE_WRONG_PHASE");
    pub const STATE_NO_BET: ErrorCode = ErrorCode("STATE_NO_BET");
    pub const STATE_ALREADY_CASHED_OUT: ErrorCode = ErrorCode("STATE_ALREADY_CASHED_OUT");

    // Conflict errors
    pub const CONFLICT_DUPLICATE_BET: ErrorCode = ErrorCode("CONFLICT_DUPLICATE_BET");

    // Persistence errors
    pub const PERSISTENCE_WRITE_FAILED: ErrorCode = ErrorCode("PERSISTENCE_WRITE_FAILED");

    // Validation errors
    pub const VALIDATION_INVALID_INPUT: ErrorCode = ErrorCode("VALIDATION_INVALID_INPUT");
    pub const VALIDATION_INVALID_AMOUNT: ErrorCode = ErrorCode("VALIDATION_INVALID_AMOUNT");
    pub const VALIDATION_INVALID_ADDRESS: ErrorCode = ErrorCode("VALIDATION_INVALID_ADDRESS");

    // Resource errors
    pub const NOT_FOUND_ROUND: ErrorCode = ErrorCode("NOT_FOUND_ROUND");

    // Internal errors
    pub const INTERNAL_UNEXPECTED: ErrorCode = ErrorCode("INTERNAL_UNEXPECTED");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standardized error structure used across all services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceError {
    /// Error category (determines status code and log level)
    pub category: ErrorCategory,

    /// Structured error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context (e.g., phase names, addresses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ServiceError {
    pub fn new(category: ErrorCategory, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.as_str().to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Validation,
            ErrorCode::VALIDATION_INVALID_INPUT,
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, ErrorCode::INTERNAL_UNEXPECTED, message)
    }

    pub fn status_code(&self) -> u16 {
        self.category.status_code()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "[{}] {}: {}", self.code, self.message, context)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_status_codes() {
        assert_eq!(ErrorCategory::State.status_code(), 409);
        assert_eq!(ErrorCategory::Conflict.status_code(), 409);
        assert_eq!(ErrorCategory::Validation.status_code(), 400);
        assert_eq!(ErrorCategory::NotFound.status_code(), 404);
        assert_eq!(ErrorCategory::Configuration.status_code(), 500);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            ErrorCode::CONFLICT_DUPLICATE_BET.to_string(),
            "CONFLICT_DUPLICATE_BET"
        );
    }

    #[test]
    fn test_service_error_with_context() {
        let error = ServiceError::new(
            ErrorCategory::NotFound,
            ErrorCode::NOT_FOUND_ROUND,
            "Round not found: abc",
        )
        .with_context("history window");
        assert_eq!(error.code, "NOT_FOUND_ROUND");
        assert_eq!(error.status_code(), 404);
        assert!(error.to_string().contains("history window"));
    }

    #[test]
    fn test_service_error_serializes_without_empty_context() {
        let json = serde_json::to_value(ServiceError::internal("boom")).unwrap();
        assert_eq!(json["category"], "Internal");
        assert!(json.get("context").is_none());
    }
}
