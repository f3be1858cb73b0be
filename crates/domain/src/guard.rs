//! Inventory invariant guard.
//!
//! Stock may never go negative. The rule is attached to the product
//! collection as a store-side validator, so the check and the decrement are a
//! single write and no read-then-write window exists between them.

use common::ProductId;
use document_store::{CollectionOptions, Filter, Update, Validator};

use crate::error::DomainError;
use crate::record::Product;

/// Reason reported when a decrement is rejected.
pub const WOULD_GO_NEGATIVE: &str = "would go negative";

/// Declares and interprets the `quantity >= 0` rule on stock records.
pub struct InventoryGuard;

impl InventoryGuard {
    /// The validator attached to the product collection.
    pub fn validator() -> Validator {
        Validator::new().minimum(Product::QUANTITY, 0)
    }

    /// Collection options carrying the validator.
    pub fn collection_options() -> CollectionOptions {
        CollectionOptions::with_validator(Self::validator())
    }

    /// The guarded decrement: filter and mutation removing `amount` units.
    pub fn decrement(product_id: &ProductId, amount: u32) -> (Filter, Update) {
        (
            Filter::by_id(product_id.as_str()),
            Update::inc(Product::QUANTITY, -i64::from(amount)),
        )
    }

    /// Translates a validator rejection into a domain constraint violation.
    pub fn translate(collection: &str, field: String, rule: String) -> DomainError {
        let reason = if collection == Product::COLLECTION && field == Product::QUANTITY {
            WOULD_GO_NEGATIVE.to_string()
        } else {
            rule
        };
        DomainError::ConstraintViolation { field, reason }
    }
}
