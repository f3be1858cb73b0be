//! The writes shared by both purchase paths.
//!
//! Every step takes an optional scope: `None` performs an independent write,
//! `Some` stages the write in the scope.

use common::{Money, ProductId};
use document_store::{DocumentStore, Filter, Update};
use domain::{
    Cart, CartItem, DomainError, InventoryGuard, Product, StoreFacade, TransactionScope,
};

use crate::outcome::Purchase;

/// Step name: add the item to the owner's cart.
pub const STEP_ADD_TO_CART: &str = "add_to_cart";

/// Step name: decrement the product stock.
pub const STEP_DECREMENT_STOCK: &str = "decrement_stock";

/// Reads the current unit price of a product.
pub(crate) async fn unit_price<S: DocumentStore>(
    facade: &StoreFacade<S>,
    product_id: &ProductId,
    scope: Option<&mut TransactionScope<S>>,
) -> domain::error::Result<Money> {
    let filter = Filter::by_id(product_id.as_str());
    facade
        .find_one::<Product>(&filter, scope)
        .await?
        .map(|product| product.unit_price)
        .ok_or_else(|| DomainError::NotFound {
            collection: Product::COLLECTION,
            filter: filter.to_string(),
        })
}

/// Appends the item to the owner's cart, or increments it if present.
///
/// Creates the cart on the owner's first purchase.
#[tracing::instrument(skip_all, fields(step = STEP_ADD_TO_CART, owner = %purchase.owner_id))]
pub(crate) async fn add_to_cart<S: DocumentStore>(
    facade: &StoreFacade<S>,
    purchase: &Purchase,
    unit_price: Money,
    mut scope: Option<&mut TransactionScope<S>>,
) -> domain::error::Result<()> {
    let owner = Filter::by_id(purchase.owner_id.as_str());
    let holding_product = owner.clone().and(Filter::elem_match(
        Cart::ITEMS,
        Filter::eq(CartItem::PRODUCT_ID, purchase.product_id.as_str()),
    ));

    let increment = Update::inc_matched(
        Cart::ITEMS,
        CartItem::QUANTITY,
        i64::from(purchase.quantity),
    );
    match facade
        .update_one::<Cart>(&holding_product, &increment, scope.as_deref_mut())
        .await
    {
        Err(DomainError::NotFound { .. }) => {}
        other => return other.map(|_| ()),
    }

    let item = CartItem::new(purchase.product_id.clone(), purchase.quantity, unit_price);
    let append = Update::push(Cart::ITEMS, serde_json::to_value(&item)?);
    match facade
        .update_one::<Cart>(&owner, &append, scope.as_deref_mut())
        .await
    {
        Err(DomainError::NotFound { .. }) => {}
        other => return other.map(|_| ()),
    }

    facade
        .insert(&Cart::with_item(purchase.owner_id.clone(), item), scope)
        .await
}

/// Removes the purchased units from stock, guarded by `quantity >= 0`.
#[tracing::instrument(skip_all, fields(step = STEP_DECREMENT_STOCK, product = %purchase.product_id))]
pub(crate) async fn decrement_stock<S: DocumentStore>(
    facade: &StoreFacade<S>,
    purchase: &Purchase,
    scope: Option<&mut TransactionScope<S>>,
) -> domain::error::Result<()> {
    let (filter, update) = InventoryGuard::decrement(&purchase.product_id, purchase.quantity);
    facade.update_one::<Product>(&filter, &update, scope).await?;
    Ok(())
}
