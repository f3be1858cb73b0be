use serde::{Deserialize, Serialize};

/// Identifier of a cart owner.
///
/// One owner holds at most one active cart, so the owner ID doubles as the
/// cart's document key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the owner ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Money amount represented in cents to avoid floating point issues.
///
/// Serialized as a bare integer so documents carry `"unitPrice": 300`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole dollar value, saturating at
    /// the representable bounds.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars.saturating_mul(100),
        }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Multiplies by a quantity, saturating at the representable bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let cents = self.cents.unsigned_abs();
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::default(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_string_conversion() {
        let id = ProductId::new("chocolate");
        assert_eq!(id.as_str(), "chocolate");

        let id2: ProductId = "candy".into();
        assert_eq!(id2.to_string(), "candy");
    }

    #[test]
    fn owner_id_serializes_as_plain_string() {
        let owner = OwnerId::new("Nofar");
        assert_eq!(serde_json::to_value(&owner).unwrap(), serde_json::json!("Nofar"));
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_dollars(3).to_string(), "$3.00");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn money_serializes_as_cents() {
        let json = serde_json::to_value(Money::from_dollars(3)).unwrap();
        assert_eq!(json, serde_json::json!(300));
        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, Money::from_cents(300));
    }

    #[test]
    fn money_arithmetic() {
        let total = Money::from_cents(1000) + Money::from_cents(500);
        assert_eq!(total.cents(), 1500);
        assert_eq!(Money::from_cents(300).multiply(3).cents(), 900);

        let sum: Money = [Money::from_cents(1), Money::from_cents(2)].into_iter().sum();
        assert_eq!(sum.cents(), 3);
    }

    #[test]
    fn money_saturates_instead_of_overflowing() {
        assert_eq!(Money::from_dollars(i64::MAX).cents(), i64::MAX);
        assert_eq!(Money::from_dollars(i64::MIN).cents(), i64::MIN);
        assert_eq!(Money::from_cents(i64::MAX / 2).multiply(u32::MAX).cents(), i64::MAX);

        let sum: Money = [Money::from_cents(i64::MAX), Money::from_cents(1)].into_iter().sum();
        assert_eq!(sum.cents(), i64::MAX);
        assert_eq!(Money::from_cents(i64::MIN).to_string(), "-$92233720368547758.08");
    }
}
