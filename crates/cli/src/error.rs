//! Demo error types.

use checkout::PurchaseError;
use document_store::StoreError;
use thiserror::Error;

/// Errors that abort the demo run.
#[derive(Debug, Error)]
pub enum CliError {
    /// The store could not be opened or migrated.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A checkout operation failed on infrastructure.
    #[error("Checkout error: {0}")]
    Checkout(#[from] PurchaseError),

    /// The metrics recorder could not be installed.
    #[error("Metrics error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    /// Writing the narration failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for demo results.
pub type Result<T> = std::result::Result<T, CliError>;
