use shared::errors::{ErrorCategory, ErrorCode, ServiceError};
use shared::types::{Address, RoundId, ValidationError};

use crate::round::Phase;

/// Failures surfaced by the round engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {field}: {reason}")]
    Configuration { field: &'static str, reason: String },

    #[error("No active round")]
    NoActiveRound,

    #[error("Operation requires phase {expected}, round is {actual}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("No bet for {address} in this round")]
    NoBet { address: Address },

    #[error("Bet for {address} already cashed out")]
    AlreadyCashedOut { address: Address },

    #[error("Duplicate bet for {address} in this round")]
    DuplicateBet { address: Address },

    #[error("Round not found in history: {0}")]
    RoundNotFound(RoundId),

    #[error("Audit log write failed: {0}")]
    Persistence(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
}

impl EngineError {
    pub fn configuration(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Configuration { .. } => ErrorCategory::Configuration,
            EngineError::NoActiveRound
            | EngineError::WrongPhase { .. }
            | EngineError::NoBet { .. }
            | EngineError::AlreadyCashedOut { .. } => ErrorCategory::State,
            EngineError::DuplicateBet { .. } => ErrorCategory::Conflict,
            EngineError::RoundNotFound(_) => ErrorCategory::NotFound,
            EngineError::Persistence(_) => ErrorCategory::Persistence,
            EngineError::Validation(_) => ErrorCategory::Validation,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Configuration { field, .. } if *field == "house_edge_bps" => {
                ErrorCode::CONFIG_INVALID_HOUSE_EDGE
            }
            EngineError::Configuration { .. } => ErrorCode::CONFIG_INVALID_VALUE,
            EngineError::NoActiveRound => ErrorCode::STATE_NO_ACTIVE_ROUND,
            EngineError::WrongPhase { .. } => ErrorCode::STATE_WRONG_PHASE,
            EngineError::NoBet { .. } => ErrorCode::STATE_NO_BET,
            EngineError::AlreadyCashedOut { .. } => ErrorCode::STATE_ALREADY_CASHED_OUT,
            EngineError::DuplicateBet { .. } => ErrorCode::CONFLICT_DUPLICATE_BET,
            EngineError::RoundNotFound(_) => ErrorCode::NOT_FOUND_ROUND,
            EngineError::Persistence(_) => ErrorCode::PERSISTENCE_WRITE_FAILED,
            EngineError::Validation(ValidationError::ZeroAmount)
            | EngineError::Validation(ValidationError::AmountOverflow) => {
                ErrorCode::VALIDATION_INVALID_AMOUNT
            }
            EngineError::Validation(ValidationError::EmptyAddress)
            | EngineError::Validation(ValidationError::AddressTooLong { .. }) => {
                ErrorCode::VALIDATION_INVALID_ADDRESS
            }
            EngineError::Validation(_) => ErrorCode::VALIDATION_INVALID_INPUT,
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(error: EngineError) -> Self {
        let context = match &error {
            EngineError::WrongPhase { actual, .. } => Some(format!("phase: {}", actual)),
            EngineError::NoBet { address }
            | EngineError::AlreadyCashedOut { address }
            | EngineError::DuplicateBet { address } => Some(format!("address: {}", address)),
            _ => None,
        };
        let service_error = ServiceError::new(error.category(), error.code(), error.to_string());
        match context {
            Some(context) => service_error.with_context(context),
            None => service_error,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_bet_is_a_conflict() {
        let error = EngineError::DuplicateBet {
            address: Address::new("alice").unwrap(),
        };
        assert_eq!(error.category(), ErrorCategory::Conflict);

        let service: ServiceError = error.into();
        assert_eq!(service.code, "CONFLICT_DUPLICATE_BET");
        assert_eq!(service.context.as_deref(), Some("address: alice"));
    }

    #[test]
    fn test_wrong_phase_is_a_state_error() {
        let error = EngineError::WrongPhase {
            expected: Phase::Running,
            actual: Phase::Crashed,
        };
        assert_eq!(error.category(), ErrorCategory::State);
        assert_eq!(error.category().status_code(), 409);
        assert!(error.to_string().contains("CRASHED"));
    }

    #[test]
    fn test_house_edge_error_code() {
        let error = EngineError::configuration("house_edge_bps", "must not be negative");
        assert_eq!(error.code(), ErrorCode::CONFIG_INVALID_HOUSE_EDGE);
        assert_eq!(error.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_zero_amount_maps_to_amount_code() {
        let error: EngineError = ValidationError::ZeroAmount.into();
        assert_eq!(error.code(), ErrorCode::VALIDATION_INVALID_AMOUNT);
    }
}
