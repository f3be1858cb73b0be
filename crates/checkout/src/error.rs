//! Checkout error and rejection types.

use domain::DomainError;
use serde::Serialize;
use thiserror::Error;

/// An expected business outcome that prevented a purchase.
///
/// Rejections are returned inside [`crate::PurchaseOutcome`], never through
/// the error channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// A write would have broken a data invariant (e.g. negative stock).
    ConstraintViolation { field: String, reason: String },

    /// A record the purchase depends on does not exist.
    NotFound { collection: String, filter: String },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::ConstraintViolation { field, reason } => {
                write!(f, "constraint violation on {field}: {reason}")
            }
            Rejection::NotFound { collection, filter } => {
                write!(f, "no {collection} record matches {filter}")
            }
        }
    }
}

impl TryFrom<DomainError> for Rejection {
    type Error = DomainError;

    fn try_from(error: DomainError) -> std::result::Result<Self, Self::Error> {
        match error {
            DomainError::ConstraintViolation { field, reason } => {
                Ok(Rejection::ConstraintViolation { field, reason })
            }
            DomainError::NotFound { collection, filter } => Ok(Rejection::NotFound {
                collection: collection.to_string(),
                filter,
            }),
            other => Err(other),
        }
    }
}

/// Infrastructure failures of the checkout paths.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// The store failed the write, or the transaction could not be started,
    /// committed or retried to success.
    #[error("Transaction failed after {attempts} attempt(s): {reason}")]
    Transaction { attempts: u32, reason: String },

    /// The store could not be reached.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A purchase must move at least one unit.
    #[error("Invalid quantity: {0}, must be at least 1")]
    InvalidQuantity(u32),
}

impl From<DomainError> for PurchaseError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Connectivity(reason) => PurchaseError::Connectivity(reason),
            DomainError::Transaction(reason) => PurchaseError::Transaction {
                attempts: 1,
                reason,
            },
            other => PurchaseError::Transaction {
                attempts: 1,
                reason: other.to_string(),
            },
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, PurchaseError>;
