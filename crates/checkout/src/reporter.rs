//! Committed-state read-back.

use common::{OwnerId, ProductId};
use document_store::DocumentStore;
use domain::{Cart, Product, StoreFacade};
use serde::Serialize;

use crate::error::Result;

/// Every committed product and cart, read outside any transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateReport {
    pub products: Vec<Product>,
    pub carts: Vec<Cart>,
}

impl StateReport {
    /// Returns the product with the given ID.
    pub fn product(&self, product_id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == product_id)
    }

    /// Returns the stock of a product, if it exists.
    pub fn stock_of(&self, product_id: &ProductId) -> Option<i64> {
        self.product(product_id).map(|p| p.quantity)
    }

    /// Returns the cart of an owner.
    pub fn cart(&self, owner_id: &OwnerId) -> Option<&Cart> {
        self.carts.iter().find(|c| &c.owner_id == owner_id)
    }

    /// Units of a product held across all carts.
    pub fn units_in_carts(&self, product_id: &ProductId) -> u64 {
        self.carts
            .iter()
            .map(|c| u64::from(c.quantity_of(product_id)))
            .sum()
    }
}

impl std::fmt::Display for StateReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database state:")?;
        for product in &self.products {
            writeln!(f, "{product}")?;
        }
        if self.carts.is_empty() {
            writeln!(f, "No carts...")?;
        }
        for cart in &self.carts {
            writeln!(f, "{cart}")?;
        }
        Ok(())
    }
}

pub(crate) async fn report<S: DocumentStore>(facade: &StoreFacade<S>) -> Result<StateReport> {
    let products = facade.find::<Product>().await?;
    let carts = facade.find::<Cart>().await?;
    Ok(StateReport { products, carts })
}

#[cfg(test)]
mod tests {
    use common::Money;
    use domain::CartItem;

    use super::*;

    fn report() -> StateReport {
        StateReport {
            products: vec![Product::new("chocolate", 1, Money::from_dollars(3))],
            carts: vec![Cart::with_item(
                "Nofar",
                CartItem::new("chocolate", 2, Money::from_dollars(3)),
            )],
        }
    }

    #[test]
    fn renders_products_then_carts() {
        assert_eq!(
            report().to_string(),
            "Database state:\n\
             Product{id='chocolate', quantity=1, unitPrice=$3.00}\n\
             Cart{ownerId='Nofar', items=[Item{productId='chocolate', quantity=2, unitPrice=$3.00}]}\n"
        );
    }

    #[test]
    fn renders_placeholder_without_carts() {
        let report = StateReport {
            products: vec![Product::new("chocolate", 3, Money::from_dollars(3))],
            carts: Vec::new(),
        };
        assert!(report.to_string().ends_with("No carts...\n"));
    }

    #[test]
    fn lookups() {
        let report = report();
        let chocolate = ProductId::new("chocolate");
        assert_eq!(report.stock_of(&chocolate), Some(1));
        assert_eq!(report.units_in_carts(&chocolate), 2);
        assert!(report.cart(&OwnerId::new("Alex")).is_none());
    }
}
