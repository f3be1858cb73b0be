//! Purchase workflows over the cart and product collections.
//!
//! Two ways to move units from stock into a cart:
//! 1. Without coordination: two independent writes, no compensation. A
//!    rejected stock decrement leaves the cart write in place.
//! 2. With a transaction: both writes in one snapshot-isolated scope with
//!    majority write concern, committed together or aborted together.
//!    Write conflicts are retried per [`RetryPolicy`].
//!
//! Business refusals come back as [`PurchaseOutcome::Rejected`]; only
//! infrastructure failures use [`PurchaseError`].

pub mod coordinated;
pub mod error;
pub mod outcome;
pub mod pacing;
pub mod reporter;
pub mod service;
pub mod steps;
pub mod uncoordinated;

pub use coordinated::RetryPolicy;
pub use error::{PurchaseError, Rejection};
pub use outcome::{Purchase, PurchaseOutcome, PurchaseReceipt};
pub use pacing::Pacing;
pub use reporter::StateReport;
pub use service::Checkout;
