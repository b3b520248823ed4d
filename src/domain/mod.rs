//! Cart domain: aggregates, value objects and events
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::{Cart, CartItem, CartStatus, CartTotals, Product, ShippingPolicy};
pub use events::{CartEvent, DomainEvent, ProductEvent};
pub use value_objects::{CartId, Money, ProductId, UserId};
