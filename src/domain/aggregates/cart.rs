//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::domain::value_objects::{CartId, Money, MoneyError, ProductId, UserId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartStatus { #[default] Active, CheckedOut, Abandoned }

impl CartStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self { Self::Active => "active", Self::CheckedOut => "checked_out", Self::Abandoned => "abandoned" }
    }
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self { Self::Active => "Active", Self::CheckedOut => "CheckedOut", Self::Abandoned => "Abandoned" };
        f.write_str(label)
    }
}

impl FromStr for CartStatus {
    type Err = CartStateError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "checked_out" => Ok(Self::CheckedOut),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(CartStateError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price captured at the most recent add.
    pub unit_price: Money,
    pub title: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub total_before_discount: Money,
    pub discount_amount: Money,
    pub shipping_cost: Money,
    pub final_total: Money,
}

impl CartTotals {
    pub fn zero(currency: &str) -> Self {
        Self {
            total_before_discount: Money::zero(currency), discount_amount: Money::zero(currency),
            shipping_cost: Money::zero(currency), final_total: Money::zero(currency),
        }
    }

    pub fn total_after_discount(&self) -> Result<Money, MoneyError> {
        self.total_before_discount.subtract(&self.discount_amount)
    }
}

/// Flat-rate shipping, waived at or above `free_over`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_rate: Decimal,
    pub free_over: Option<Decimal>,
}

impl ShippingPolicy {
    pub fn cost_for(&self, subtotal: &Money, item_count: usize) -> Money {
        let currency = subtotal.currency();
        if item_count == 0 { return Money::zero(currency); }
        match self.free_over {
            Some(threshold) if subtotal.amount() >= threshold => Money::zero(currency),
            _ => Money::new(self.flat_rate, currency),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    status: CartStatus,
    currency: String,
    items: Vec<CartItem>,
    totals: CartTotals,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// Persisted cart header fields; items are attached separately.
#[derive(Clone, Debug)]
pub struct CartParts {
    pub id: CartId,
    pub user_id: UserId,
    pub status: CartStatus,
    pub currency: String,
    pub totals: CartTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Cart {
    pub fn for_customer(user_id: UserId, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(), user_id, status: CartStatus::Active, currency: currency.to_uppercase(),
            items: vec![], totals: CartTotals::zero(currency), created_at: now, updated_at: now, deleted_at: None,
        }
    }

    pub fn restore(parts: CartParts, items: Vec<CartItem>) -> Self {
        Self {
            id: parts.id, user_id: parts.user_id, status: parts.status, currency: parts.currency, items,
            totals: parts.totals, created_at: parts.created_at, updated_at: parts.updated_at, deleted_at: parts.deleted_at,
        }
    }

    pub fn id(&self) -> CartId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn status(&self) -> CartStatus { self.status }
    pub fn is_active(&self) -> bool { self.status == CartStatus::Active }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn totals(&self) -> &CartTotals { &self.totals }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> { self.deleted_at }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Inserts the item, or overwrites quantity and price of the existing
    /// line for the same product. A zero quantity removes the line.
    pub fn put_item(&mut self, item: CartItem) {
        if item.quantity == 0 {
            self.remove_item(item.product_id);
            return;
        }
        match self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            Some(existing) => {
                existing.quantity = item.quantity;
                existing.unit_price = item.unit_price;
                existing.title = item.title;
                existing.image_url = item.image_url;
                existing.category = item.category;
            }
            None => self.items.push(item),
        }
        self.touch();
    }

    pub fn remove_item(&mut self, product_id: ProductId) -> Option<CartItem> {
        let pos = self.items.iter().position(|i| i.product_id == product_id)?;
        self.touch();
        Some(self.items.remove(pos))
    }

    pub fn set_totals(&mut self, totals: CartTotals) { self.totals = totals; self.touch(); }

    /// Recomputes totals from the line items. The stored discount is kept
    /// but never exceeds the subtotal.
    pub fn recalculate(&self, shipping: &ShippingPolicy) -> Result<CartTotals, MoneyError> {
        let subtotal = self.items.iter().try_fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()))?;
        let discount = self.totals.discount_amount.min(&subtotal)?;
        let shipping_cost = shipping.cost_for(&subtotal, self.items.len());
        let final_total = subtotal.subtract(&discount)?.add(&shipping_cost)?;
        Ok(CartTotals { total_before_discount: subtotal, discount_amount: discount, shipping_cost, final_total })
    }

    pub fn transition(&mut self, to: CartStatus) -> Result<(), CartStateError> {
        if self.status != CartStatus::Active || to == CartStatus::Active {
            return Err(CartStateError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        if to == CartStatus::Abandoned { self.deleted_at = Some(Utc::now()); }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartStateError { UnknownStatus(String), InvalidTransition { from: CartStatus, to: CartStatus } }
impl std::error::Error for CartStateError {}
impl fmt::Display for CartStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStatus(s) => write!(f, "Unknown cart status '{s}'"),
            Self::InvalidTransition { from, to } => write!(f, "Cart cannot move from {from} to {to}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: ProductId, quantity: u32, price: i64) -> CartItem {
        CartItem {
            product_id, quantity, unit_price: Money::usd(Decimal::new(price, 0)), title: "Widget".into(),
            image_url: None, category: None, added_at: Utc::now(),
        }
    }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::for_customer(UserId::new(), "USD");
        let p1 = ProductId::new();
        cart.put_item(item(p1, 2, 10));
        assert_eq!(cart.item_count(), 1);
        cart.put_item(item(p1, 3, 10));
        assert_eq!(cart.items()[0].quantity, 3); // Overwritten, not merged
        cart.put_item(item(p1, 0, 10));
        assert!(cart.is_empty());
        assert!(cart.remove_item(p1).is_none());
    }

    #[test]
    fn test_recalculate_with_shipping() {
        let mut cart = Cart::for_customer(UserId::new(), "USD");
        let policy = ShippingPolicy { flat_rate: Decimal::new(5, 0), free_over: Some(Decimal::new(100, 0)) };
        assert_eq!(cart.recalculate(&policy).unwrap(), CartTotals::zero("USD"));

        cart.put_item(item(ProductId::new(), 2, 10));
        let totals = cart.recalculate(&policy).unwrap();
        assert_eq!(totals.total_before_discount.amount(), Decimal::new(20, 0));
        assert_eq!(totals.shipping_cost.amount(), Decimal::new(5, 0));
        assert_eq!(totals.final_total.amount(), Decimal::new(25, 0));

        cart.put_item(item(ProductId::new(), 1, 80));
        let totals = cart.recalculate(&policy).unwrap();
        assert!(totals.shipping_cost.is_zero());
        assert_eq!(totals.final_total.amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_discount_clamped_to_subtotal() {
        let mut cart = Cart::for_customer(UserId::new(), "USD");
        let mut totals = CartTotals::zero("USD");
        totals.discount_amount = Money::usd(Decimal::new(50, 0));
        cart.set_totals(totals);
        cart.put_item(item(ProductId::new(), 1, 30));
        let totals = cart.recalculate(&ShippingPolicy::default()).unwrap();
        assert_eq!(totals.discount_amount.amount(), Decimal::new(30, 0));
        assert!(totals.total_after_discount().unwrap().is_zero());
    }

    #[test]
    fn test_status_transitions() {
        let mut cart = Cart::for_customer(UserId::new(), "USD");
        cart.transition(CartStatus::CheckedOut).unwrap();
        assert!(cart.transition(CartStatus::Abandoned).is_err());
        assert_eq!("checked_out".parse::<CartStatus>().unwrap(), CartStatus::CheckedOut);
        assert_eq!(CartStatus::CheckedOut.to_string(), "CheckedOut");

        let mut other = Cart::for_customer(UserId::new(), "USD");
        other.transition(CartStatus::Abandoned).unwrap();
        assert!(other.deleted_at().is_some());
    }
}
