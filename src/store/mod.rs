//! Product and cart persistence.
//!
//! The engine never talks to a store directly: it opens a [`UnitOfWork`]
//! through [`Store::begin`], performs all reads and writes of one operation
//! on it, and calls [`UnitOfWork::commit`]. Dropping a unit of work without
//! committing discards every write made through it.

use async_trait::async_trait;

use crate::domain::aggregates::{Cart, CartItem, CartStatus, CartTotals, Product};
use crate::domain::value_objects::{CartId, ProductId, UserId};
use crate::error::StoreError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ProductStore: Send {
    async fn product_by_id(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    /// Writes stock and price fields. Fails with [`StoreError::Conflict`]
    /// when the stored version differs from `product.version()`; on success
    /// the product's version is bumped to match the stored row.
    async fn update_product(&mut self, product: &mut Product) -> StoreResult<()>;
}

#[async_trait]
pub trait CartStore: Send {
    /// The user's `Active` cart with its items.
    async fn active_cart_by_user(&mut self, user_id: UserId) -> StoreResult<Option<Cart>>;

    async fn cart_by_id(&mut self, cart_id: CartId) -> StoreResult<Option<Cart>>;

    /// Fails with [`StoreError::Conflict`] if the user already has an active cart.
    async fn create_cart(&mut self, cart: &Cart) -> StoreResult<Cart>;

    /// Sets the line for `item.product_id` to exactly `item.quantity`.
    async fn add_or_update_cart_item(&mut self, cart_id: CartId, item: &CartItem) -> StoreResult<()>;

    async fn remove_cart_item(&mut self, cart_id: CartId, product_id: ProductId) -> StoreResult<()>;

    async fn update_cart_totals(&mut self, cart_id: CartId, totals: &CartTotals) -> StoreResult<()>;

    async fn update_cart_status(&mut self, cart_id: CartId, status: CartStatus) -> StoreResult<()>;

    /// Marks the cart abandoned and stamps its deletion time. Returns false
    /// when no such cart exists.
    async fn soft_delete_cart(&mut self, cart_id: CartId) -> StoreResult<bool>;
}

#[async_trait]
pub trait UnitOfWork: ProductStore + CartStore {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}
