//! The checkout entry point.

use document_store::DocumentStore;
use domain::{Cart, Product, StoreFacade};

use crate::coordinated::{self, RetryPolicy};
use crate::error::Result;
use crate::outcome::{Purchase, PurchaseOutcome};
use crate::pacing::Pacing;
use crate::reporter::{self, StateReport};
use crate::uncoordinated;

/// Runs purchases against the cart and product collections.
///
/// Holds the store client by value; clone a pooled handle to share it.
pub struct Checkout<S: DocumentStore> {
    facade: StoreFacade<S>,
    retry_policy: RetryPolicy,
    pacing: Pacing,
}

impl<S: DocumentStore> Checkout<S> {
    /// Creates a checkout over the given store.
    pub fn new(store: S, retry_policy: RetryPolicy) -> Self {
        Self {
            facade: StoreFacade::new(store),
            retry_policy,
            pacing: Pacing::none(),
        }
    }

    /// Sets the delays inserted into both purchase paths.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Returns the store facade.
    pub fn facade(&self) -> &StoreFacade<S> {
        &self.facade
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Creates the collections and attaches the inventory validator.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.facade.ensure_schema().await?;
        Ok(())
    }

    /// Adds the items to the cart, then decrements the stock, as two
    /// independent writes. A rejected decrement does not undo the cart write.
    #[tracing::instrument(skip(self), fields(path = "uncoordinated"))]
    pub async fn purchase_without_coordination(&self, purchase: Purchase) -> Result<PurchaseOutcome> {
        purchase.validate()?;
        uncoordinated::purchase(&self.facade, &purchase, self.pacing).await
    }

    /// Adds the items to the cart and decrements the stock in one
    /// transaction. Either both writes become visible or neither does.
    #[tracing::instrument(skip(self), fields(path = "coordinated"))]
    pub async fn purchase_with_transaction(&self, purchase: Purchase) -> Result<PurchaseOutcome> {
        purchase.validate()?;
        coordinated::purchase(&self.facade, &purchase, self.retry_policy, self.pacing).await
    }

    /// Reads back every committed product and cart.
    pub async fn report_state(&self) -> Result<StateReport> {
        reporter::report(&self.facade).await
    }

    /// Deletes every product and cart. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn reset_state(&self) -> Result<()> {
        let products = self.facade.delete_all::<Product>().await?;
        let carts = self.facade.delete_all::<Cart>().await?;
        tracing::debug!(products, carts, "state reset");
        Ok(())
    }

    /// Seeds a product record.
    #[tracing::instrument(skip(self), fields(product = %product.id))]
    pub async fn stock_product(&self, product: Product) -> Result<()> {
        self.facade.insert(&product, None).await?;
        Ok(())
    }
}

impl<S: DocumentStore + Clone> Clone for Checkout<S> {
    fn clone(&self) -> Self {
        Self {
            facade: self.facade.clone(),
            retry_policy: self.retry_policy,
            pacing: self.pacing,
        }
    }
}
