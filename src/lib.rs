//! OpenSASE Cart - inventory-reserving shopping carts
//!
//! Shopping carts that hold stock while a shopper decides.
//!
//! ## Features
//! - Stock reservation on add, release on decrease/remove/clear/abandon
//! - Atomic checkout that turns reservations into sales
//! - Optimistic concurrency on product stock, with bounded retries
//! - Cart snapshots with recomputed totals after every mutation
//! - Low-stock and price-change warnings
//! - Postgres and in-memory stores, NATS event publishing

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod publisher;
pub mod store;

pub use config::{Config, EngineSettings};
pub use engine::{CartEngine, CartSnapshot, InventoryWarning, WarningKind};
pub use error::{CartError, Result, StoreError};
