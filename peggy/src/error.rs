use alloy::primitives::U256;

use crate::address::AddressError;

/// How an error should be surfaced to whoever submitted the failing query or message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Nothing was read or written.
    InputValidation,
    /// Well-formed input that the current state does not allow. Rejected before any mutation.
    Precondition,
    /// The storage backend failed.
    Internal,
}

/// An error from a keeper operation, query or message.
///
/// Looking up a key that has no record is not an error; those lookups return `Ok(None)` or an empty list.
#[derive(thiserror::Error, Debug)]
pub enum PeggyError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
    #[error("insufficient funds: {required} {denom} required but only {available} available")]
    InsufficientFunds {
        denom: String,
        required: U256,
        available: U256,
    },
    #[error("{0}")]
    Precondition(String),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl PeggyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeggyError::InvalidAddress(_) | PeggyError::InvalidInput { .. } => {
                ErrorKind::InputValidation
            }
            PeggyError::InsufficientFunds { .. } | PeggyError::Precondition(_) => {
                ErrorKind::Precondition
            }
            PeggyError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        PeggyError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = PeggyError> = std::result::Result<T, E>;
