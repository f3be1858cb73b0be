//! Domain layer for the cart/stock consistency protocol.
//!
//! This crate provides:
//! - `Product` (stock record) and `Cart` (order record) documents
//! - `StoreFacade`, typed CRUD over the document store plus transaction scopes
//! - `InventoryGuard`, the store-enforced `quantity >= 0` rule

pub mod error;
pub mod facade;
pub mod guard;
pub mod record;

pub use common::{Money, OwnerId, ProductId};
pub use error::DomainError;
pub use facade::{ScopeState, StoreFacade, TransactionScope};
pub use guard::InventoryGuard;
pub use record::{Cart, CartItem, Product, Record};
