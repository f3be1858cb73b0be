//! Purchase commands and their outcomes.

use chrono::{DateTime, Utc};
use common::{Money, OwnerId, ProductId};
use serde::Serialize;

use crate::error::{PurchaseError, Rejection, Result};

/// A request to move `quantity` units of a product into an owner's cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub owner_id: OwnerId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl Purchase {
    /// Creates a purchase command.
    pub fn new(
        owner_id: impl Into<OwnerId>,
        product_id: impl Into<ProductId>,
        quantity: u32,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            product_id: product_id.into(),
            quantity,
        }
    }

    /// Rejects empty purchases before touching the store.
    pub fn validate(&self) -> Result<()> {
        if self.quantity == 0 {
            return Err(PurchaseError::InvalidQuantity(self.quantity));
        }
        Ok(())
    }
}

/// Proof that both writes of a purchase are visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub owner_id: OwnerId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    /// Number of transaction attempts (always 1 without coordination).
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

impl PurchaseReceipt {
    pub(crate) fn new(purchase: &Purchase, unit_price: Money, attempts: u32) -> Self {
        Self {
            owner_id: purchase.owner_id.clone(),
            product_id: purchase.product_id.clone(),
            quantity: purchase.quantity,
            unit_price,
            attempts,
            completed_at: Utc::now(),
        }
    }

    /// Returns quantity * unit price.
    pub fn total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// The business result of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Completed(PurchaseReceipt),
    Rejected(Rejection),
}

impl PurchaseOutcome {
    /// Returns true if the purchase completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, PurchaseOutcome::Completed(_))
    }

    /// Returns the receipt of a completed purchase.
    pub fn receipt(&self) -> Option<&PurchaseReceipt> {
        match self {
            PurchaseOutcome::Completed(receipt) => Some(receipt),
            PurchaseOutcome::Rejected(_) => None,
        }
    }

    /// Returns the rejection of a refused purchase.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            PurchaseOutcome::Completed(_) => None,
            PurchaseOutcome::Rejected(rejection) => Some(rejection),
        }
    }
}
