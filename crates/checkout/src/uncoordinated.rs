//! Purchase as two independent writes, with no compensation.
//!
//! Between the two writes other readers can observe the cart already holding
//! the item while the stock is not yet decremented. If the decrement is
//! rejected the cart write stays visible.

use document_store::DocumentStore;
use domain::{DomainError, StoreFacade};

use crate::error::{PurchaseError, Rejection, Result};
use crate::outcome::{Purchase, PurchaseOutcome, PurchaseReceipt};
use crate::pacing::Pacing;
use crate::steps;

fn settle(error: DomainError) -> Result<PurchaseOutcome> {
    match Rejection::try_from(error) {
        Ok(rejection) => Ok(PurchaseOutcome::Rejected(rejection)),
        Err(other) => Err(PurchaseError::from(other)),
    }
}

pub(crate) async fn purchase<S: DocumentStore>(
    facade: &StoreFacade<S>,
    purchase: &Purchase,
    pacing: Pacing,
) -> Result<PurchaseOutcome> {
    let unit_price = match steps::unit_price(facade, &purchase.product_id, None).await {
        Ok(price) => price,
        Err(e) => return settle(e),
    };

    if let Err(e) = steps::add_to_cart(facade, purchase, unit_price, None).await {
        return settle(e);
    }
    tracing::info!(
        owner = %purchase.owner_id,
        quantity = purchase.quantity,
        "cart updated"
    );

    pacing.pause_between_writes().await;

    match steps::decrement_stock(facade, purchase, None).await {
        Ok(()) => Ok(PurchaseOutcome::Completed(PurchaseReceipt::new(
            purchase, unit_price, 1,
        ))),
        Err(e) => {
            tracing::warn!(
                owner = %purchase.owner_id,
                error = %e,
                "stock decrement failed; cart write stays visible"
            );
            settle(e)
        }
    }
}
