//! Record kinds persisted through the facade.

use common::{Money, OwnerId, ProductId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A record kind stored in its own collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Returns the collection name.
    fn collection() -> &'static str;

    /// Returns the record's document key (`_id`).
    fn key(&self) -> &str;
}

/// Stock record: one per product SKU.
///
/// `quantity` is never negative in any committed state; the store rejects
/// writes that would break this (see [`crate::InventoryGuard`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl Product {
    pub const COLLECTION: &'static str = "product";
    pub const QUANTITY: &'static str = "quantity";

    /// Creates a new product record.
    pub fn new(id: impl Into<ProductId>, quantity: i64, unit_price: Money) -> Self {
        Self {
            id: id.into(),
            quantity,
            unit_price,
        }
    }
}

impl Record for Product {
    fn collection() -> &'static str {
        Self::COLLECTION
    }

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Product{{id='{}', quantity={}, unitPrice={}}}",
            self.id, self.quantity, self.unit_price
        )
    }
}

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    pub const PRODUCT_ID: &'static str = "productId";
    pub const QUANTITY: &'static str = "quantity";

    /// Creates a new cart item.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns quantity * unit price.
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl std::fmt::Display for CartItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Item{{productId='{}', quantity={}, unitPrice={}}}",
            self.product_id, self.quantity, self.unit_price
        )
    }
}

/// Order record: the single active cart of an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(rename = "_id")]
    pub owner_id: OwnerId,
    pub items: Vec<CartItem>,
}

impl Cart {
    pub const COLLECTION: &'static str = "cart";
    pub const ITEMS: &'static str = "items";

    /// Creates a cart holding a single item.
    pub fn with_item(owner_id: impl Into<OwnerId>, item: CartItem) -> Self {
        Self {
            owner_id: owner_id.into(),
            items: vec![item],
        }
    }

    /// Returns the item for a product, if present.
    pub fn item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    /// Returns the quantity of a product in the cart (zero if absent).
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.item(product_id).map_or(0, |i| i.quantity)
    }

    /// Returns the sum of all item totals.
    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::total_price).sum()
    }
}

impl Record for Cart {
    fn collection() -> &'static str {
        Self::COLLECTION
    }

    fn key(&self) -> &str {
        self.owner_id.as_str()
    }
}

impl std::fmt::Display for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cart{{ownerId='{}', items=[", self.owner_id)?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        write!(f, "]}}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn product_document_shape() {
        let product = Product::new("chocolate", 3, Money::from_dollars(3));
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(
            json,
            json!({"_id": "chocolate", "quantity": 3, "unitPrice": 300})
        );
        assert_eq!(product.key(), "chocolate");
    }

    #[test]
    fn cart_document_shape() {
        let cart = Cart::with_item(
            "Nofar",
            CartItem::new("chocolate", 2, Money::from_dollars(3)),
        );
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(
            json,
            json!({
                "_id": "Nofar",
                "items": [{"productId": "chocolate", "quantity": 2, "unitPrice": 300}]
            })
        );
        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }

    #[test]
    fn cart_lookups_and_total() {
        let mut cart = Cart::with_item(
            "Nofar",
            CartItem::new("chocolate", 2, Money::from_dollars(3)),
        );
        cart.items
            .push(CartItem::new("candy", 1, Money::from_cents(150)));

        assert_eq!(cart.quantity_of(&ProductId::new("chocolate")), 2);
        assert_eq!(cart.quantity_of(&ProductId::new("gum")), 0);
        assert_eq!(cart.total(), Money::from_cents(750));
    }

    #[test]
    fn display_matches_report_format() {
        let product = Product::new("chocolate", 3, Money::from_dollars(3));
        assert_eq!(
            product.to_string(),
            "Product{id='chocolate', quantity=3, unitPrice=$3.00}"
        );

        let cart = Cart::with_item(
            "Nofar",
            CartItem::new("chocolate", 2, Money::from_dollars(3)),
        );
        assert_eq!(
            cart.to_string(),
            "Cart{ownerId='Nofar', items=[Item{productId='chocolate', quantity=2, unitPrice=$3.00}]}"
        );
    }
}
