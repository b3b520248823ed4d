//! Aggregates module
pub mod product;
pub mod cart;

pub use product::{Product, ProductError, ProductParts};
pub use cart::{Cart, CartItem, CartParts, CartStateError, CartStatus, CartTotals, ShippingPolicy};
