//! Purchase as one atomic, isolated transaction.

use std::time::{Duration, Instant};

use common::Money;
use document_store::{DocumentStore, TransactionOptions};
use domain::{DomainError, StoreFacade, TransactionScope};

use crate::error::{PurchaseError, Rejection, Result};
use crate::outcome::{Purchase, PurchaseOutcome, PurchaseReceipt};
use crate::pacing::Pacing;
use crate::steps;

/// How write conflicts are retried.
///
/// A conflicting attempt is aborted in full and the whole unit of work runs
/// again in a fresh scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt, no retry.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

/// Stages both writes in the scope and returns the unit price charged.
async fn stage<S: DocumentStore>(
    facade: &StoreFacade<S>,
    purchase: &Purchase,
    scope: &mut TransactionScope<S>,
) -> domain::error::Result<Money> {
    let unit_price = steps::unit_price(facade, &purchase.product_id, Some(&mut *scope)).await?;
    steps::add_to_cart(facade, purchase, unit_price, Some(&mut *scope)).await?;
    steps::decrement_stock(facade, purchase, Some(scope)).await?;
    Ok(unit_price)
}

/// One attempt: open, stage, then commit or abort.
async fn attempt<S: DocumentStore>(
    facade: &StoreFacade<S>,
    purchase: &Purchase,
    pacing: Pacing,
) -> domain::error::Result<Money> {
    let mut scope = facade
        .begin_transaction(TransactionOptions::majority())
        .await?;

    match stage(facade, purchase, &mut scope).await {
        Ok(unit_price) => {
            pacing.pause_before_commit().await;
            facade.commit(&mut scope).await?;
            Ok(unit_price)
        }
        Err(e) => {
            if let Err(abort_error) = facade.rollback(&mut scope).await {
                tracing::warn!(error = %abort_error, "abort failed");
            }
            Err(e)
        }
    }
}

#[tracing::instrument(skip_all, fields(owner = %purchase.owner_id, product = %purchase.product_id, quantity = purchase.quantity))]
pub(crate) async fn purchase<S: DocumentStore>(
    facade: &StoreFacade<S>,
    purchase: &Purchase,
    policy: RetryPolicy,
    pacing: Pacing,
) -> Result<PurchaseOutcome> {
    metrics::counter!("checkout_transactions_total").increment(1);
    let started = Instant::now();
    let mut attempts = 0;

    let result = loop {
        attempts += 1;
        match attempt(facade, purchase, pacing).await {
            Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                metrics::counter!("checkout_transaction_retries").increment(1);
                tracing::warn!(attempt = attempts, error = %e, "write conflict, retrying");
                tokio::time::sleep(policy.backoff).await;
            }
            other => break other,
        }
    };

    metrics::histogram!("checkout_transaction_duration_seconds")
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(unit_price) => {
            metrics::counter!("checkout_transactions_committed").increment(1);
            tracing::info!(attempts, "transaction committed");
            Ok(PurchaseOutcome::Completed(PurchaseReceipt::new(
                purchase, unit_price, attempts,
            )))
        }
        Err(e) => {
            metrics::counter!("checkout_transactions_aborted").increment(1);
            match Rejection::try_from(e) {
                Ok(rejection) => {
                    tracing::warn!(%rejection, "transaction rolled back");
                    Ok(PurchaseOutcome::Rejected(rejection))
                }
                Err(DomainError::Connectivity(reason)) => Err(PurchaseError::Connectivity(reason)),
                Err(other) => {
                    tracing::warn!(attempts, error = %other, "transaction failed");
                    Err(PurchaseError::Transaction {
                        attempts,
                        reason: other.to_string(),
                    })
                }
            }
        }
    }
}
