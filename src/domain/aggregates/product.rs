//! Product Aggregate
//!
//! Only the stock-accounting view of a product lives here. `inventory_total`
//! counts units ever stocked and not yet sold, `inventory_available` the
//! units no cart has reserved. Every mutation keeps
//! `0 <= inventory_available <= inventory_total`.

use chrono::{DateTime, Utc};
use crate::domain::value_objects::{Money, ProductId};
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug)]
pub struct Product {
    id: ProductId,
    title: String,
    price: Money,
    image_url: Option<String>,
    category: Option<String>,
    inventory_total: u32,
    inventory_available: u32,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

/// Persisted fields of a product, used by stores to rebuild the aggregate.
#[derive(Clone, Debug)]
pub struct ProductParts {
    pub id: ProductId,
    pub title: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub inventory_total: u32,
    pub inventory_available: u32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// A freshly stocked product: every unit is available.
    pub fn create(title: impl Into<String>, price: Money, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::new(), title: title.into(), price, image_url: None, category: None,
            inventory_total: stock, inventory_available: stock, version: 0,
            created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn restore(parts: ProductParts) -> Result<Self, ProductError> {
        if parts.inventory_available > parts.inventory_total {
            return Err(ProductError::InvalidStock { total: parts.inventory_total, available: parts.inventory_available });
        }
        Ok(Self {
            id: parts.id, title: parts.title, price: parts.price, image_url: parts.image_url, category: parts.category,
            inventory_total: parts.inventory_total, inventory_available: parts.inventory_available,
            version: parts.version, created_at: parts.created_at, updated_at: parts.updated_at, events: vec![],
        })
    }

    pub fn with_id(mut self, id: ProductId) -> Self { self.id = id; self }
    pub fn with_image(mut self, url: impl Into<String>) -> Self { self.image_url = Some(url.into()); self }
    pub fn with_category(mut self, category: impl Into<String>) -> Self { self.category = Some(category.into()); self }

    pub fn id(&self) -> ProductId { self.id }
    pub fn title(&self) -> &str { &self.title }
    pub fn price(&self) -> &Money { &self.price }
    pub fn image_url(&self) -> Option<&str> { self.image_url.as_deref() }
    pub fn category(&self) -> Option<&str> { self.category.as_deref() }
    pub fn inventory_total(&self) -> u32 { self.inventory_total }
    pub fn inventory_available(&self) -> u32 { self.inventory_available }
    /// Units currently held by carts.
    pub fn inventory_reserved(&self) -> u32 { self.inventory_total - self.inventory_available }
    pub fn version(&self) -> i64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn update_price(&mut self, new_price: Money) {
        self.price = new_price;
        self.touch();
    }

    /// Moves `qty` units from available stock into a cart reservation.
    pub fn reserve(&mut self, qty: u32) -> Result<(), ProductError> {
        if qty > self.inventory_available {
            return Err(ProductError::InsufficientStock { requested: qty, available: self.inventory_available });
        }
        self.inventory_available -= qty;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReserved {
            product_id: self.id, quantity: qty, available: self.inventory_available,
        }));
        Ok(())
    }

    /// Returns `qty` reserved units to available stock.
    pub fn release(&mut self, qty: u32) -> Result<(), ProductError> {
        if qty > self.inventory_reserved() {
            return Err(ProductError::ReleaseExceedsReserved { requested: qty, reserved: self.inventory_reserved() });
        }
        self.inventory_available += qty;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReleased {
            product_id: self.id, quantity: qty, available: self.inventory_available,
        }));
        Ok(())
    }

    /// Turns a reservation into a sale: the units leave `inventory_total`.
    /// Available stock was already reduced when the units were reserved.
    pub fn commit_sale(&mut self, qty: u32) -> Result<(), ProductError> {
        if qty > self.inventory_reserved() {
            return Err(ProductError::CommitExceedsReserved { requested: qty, reserved: self.inventory_reserved() });
        }
        self.inventory_total -= qty;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockCommitted {
            product_id: self.id, quantity: qty, total: self.inventory_total,
        }));
        Ok(())
    }

    /// Called by stores once an update has been written.
    pub fn bump_version(&mut self) { self.version += 1; }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    InsufficientStock { requested: u32, available: u32 },
    ReleaseExceedsReserved { requested: u32, reserved: u32 },
    CommitExceedsReserved { requested: u32, reserved: u32 },
    InvalidStock { total: u32, available: u32 },
}
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientStock { requested, available } => write!(f, "Requested {requested} units but only {available} available"),
            Self::ReleaseExceedsReserved { requested, reserved } => write!(f, "Cannot release {requested} units, only {reserved} reserved"),
            Self::CommitExceedsReserved { requested, reserved } => write!(f, "Cannot sell {requested} units, only {reserved} reserved"),
            Self::InvalidStock { total, available } => write!(f, "Available stock {available} exceeds total {total}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product(stock: u32) -> Product { Product::create("Widget", Money::usd(Decimal::new(10, 0)), stock) }

    #[test]
    fn test_reserve_and_release() {
        let mut p = product(10);
        p.reserve(5).unwrap();
        assert_eq!(p.inventory_available(), 5);
        assert_eq!(p.inventory_reserved(), 5);
        p.release(2).unwrap();
        assert_eq!(p.inventory_available(), 7);
        assert_eq!(p.inventory_total(), 10);
        assert_eq!(p.take_events().len(), 2);
        assert!(p.take_events().is_empty());
    }

    #[test]
    fn test_reserve_more_than_available() {
        let mut p = product(2);
        assert_eq!(p.reserve(5), Err(ProductError::InsufficientStock { requested: 5, available: 2 }));
        assert_eq!(p.inventory_available(), 2);
        assert!(p.take_events().is_empty());
    }

    #[test]
    fn test_release_never_exceeds_total() {
        let mut p = product(10);
        p.reserve(1).unwrap();
        assert!(p.release(2).is_err());
        assert_eq!(p.inventory_available(), 9);
    }

    #[test]
    fn test_commit_sale_keeps_available() {
        let mut p = product(10);
        p.reserve(2).unwrap();
        p.commit_sale(2).unwrap();
        assert_eq!(p.inventory_total(), 8);
        assert_eq!(p.inventory_available(), 8);
        assert!(p.commit_sale(1).is_err());
    }

    #[test]
    fn test_restore_rejects_broken_invariant() {
        let p = product(1);
        let parts = ProductParts {
            id: p.id(), title: "x".into(), price: p.price().clone(), image_url: None, category: None,
            inventory_total: 1, inventory_available: 2, version: 0, created_at: p.created_at(), updated_at: p.updated_at(),
        };
        assert!(Product::restore(parts).is_err());
    }
}
