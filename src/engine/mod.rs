//! Cart engine: stock reservation, cart mutation and checkout.
//!
//! Every operation runs inside one [`UnitOfWork`]. Stock changes, line item
//! changes and the totals recomputation are committed together or not at
//! all, so a failure at any step leaves products and carts untouched. Events
//! are published only after the commit succeeds.
//!
//! Stock accounting:
//! - adding or increasing a line reserves units (`inventory_available` drops);
//! - decreasing, removing, clearing or abandoning releases them;
//! - checkout converts reservations into sales (`inventory_total` drops,
//!   `inventory_available` stays where the reservation left it).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::instrument;

use crate::config::EngineSettings;
use crate::domain::aggregates::{Cart, CartItem, CartStatus, Product};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{CartId, ProductId, UserId};
use crate::error::{CartError, Result};
use crate::publisher::{EventPublisher, NoopPublisher};
use crate::store::{Store, UnitOfWork};

pub mod snapshot;
pub mod warnings;

pub use snapshot::{CartLineSnapshot, CartSnapshot, DisplayData, DisplaySource};
pub use warnings::{InventoryWarning, WarningKind};

#[derive(Clone)]
pub struct CartEngine {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
    settings: EngineSettings,
}

impl CartEngine {
    pub fn new(store: Arc<dyn Store>, settings: EngineSettings) -> Self {
        Self { store, publisher: Arc::new(NoopPublisher), settings }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn settings(&self) -> &EngineSettings { &self.settings }

    /// The user's active cart, or `None`. Never creates one.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn get_active_cart(&self, user_id: UserId) -> Result<Option<CartSnapshot>> {
        let mut uow = self.store.begin().await?;
        let Some(cart) = uow.active_cart_by_user(user_id).await? else { return Ok(None) };
        Ok(Some(self.snapshot(uow.as_mut(), &cart).await?))
    }

    /// The user's active cart, created empty if the user has none.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn get_or_create_active_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        self.with_retry("get_or_create_active_cart", || self.try_get_or_create(user_id)).await
    }

    /// Same as [`Self::get_or_create_active_cart`]: a user never holds two active carts.
    pub async fn create_empty_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        self.get_or_create_active_cart(user_id).await
    }

    #[instrument(skip_all, fields(%user_id, %product_id, quantity))]
    pub async fn add_item(&self, user_id: UserId, product_id: ProductId, quantity: u32) -> Result<CartSnapshot> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        self.with_retry("add_item", || self.try_add_item(user_id, product_id, quantity)).await
    }

    /// Sets the line's quantity; zero removes the line. Fails with
    /// `ItemNotInCart` unless the product is a line of the active cart.
    #[instrument(skip_all, fields(%user_id, %product_id, new_quantity))]
    pub async fn update_item_quantity(&self, user_id: UserId, product_id: ProductId, new_quantity: u32) -> Result<CartSnapshot> {
        self.with_retry("update_item_quantity", || self.try_update_quantity(user_id, product_id, new_quantity)).await
    }

    /// Fails with `CartNotFound` without an active cart and `ItemNotInCart`
    /// when the product is not a line of it.
    #[instrument(skip_all, fields(%user_id, %product_id))]
    pub async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<CartSnapshot> {
        self.with_retry("remove_item", || self.try_remove_item(user_id, product_id)).await
    }

    #[instrument(skip_all, fields(%user_id))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        self.with_retry("clear_cart", || self.try_clear_cart(user_id)).await
    }

    #[instrument(skip_all, fields(%user_id))]
    pub async fn checkout_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        self.with_retry("checkout_cart", || self.try_checkout(user_id)).await
    }

    /// Releases every reservation and soft-deletes the active cart.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn abandon_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        self.with_retry("abandon_cart", || self.try_abandon(user_id)).await
    }

    #[instrument(skip_all, fields(%user_id))]
    pub async fn get_inventory_warnings(&self, user_id: UserId) -> Result<Vec<InventoryWarning>> {
        let mut uow = self.store.begin().await?;
        let Some(cart) = uow.active_cart_by_user(user_id).await? else { return Ok(vec![]) };
        let live = live_products(uow.as_mut(), &cart).await?;
        Ok(warnings::inventory_warnings(&cart, &live, self.settings.low_stock_threshold))
    }

    async fn try_get_or_create(&self, user_id: UserId) -> Result<CartSnapshot> {
        let mut uow = self.store.begin().await?;
        let cart = self.load_or_create(uow.as_mut(), user_id).await?;
        let snapshot = self.snapshot(uow.as_mut(), &cart).await?;
        uow.commit().await?;
        Ok(snapshot)
    }

    async fn try_add_item(&self, user_id: UserId, product_id: ProductId, quantity: u32) -> Result<CartSnapshot> {
        let mut uow = self.store.begin().await?;
        let mut events = Vec::new();
        let cart = self.load_or_create(uow.as_mut(), user_id).await?;

        let mut product = uow.product_by_id(product_id).await?.ok_or(CartError::ProductNotFound)?;
        if !product.price().same_currency(cart.currency()) {
            return Err(CartError::CurrencyMismatch { expected: cart.currency().to_string(), found: product.price().currency().to_string() });
        }
        product.reserve(quantity)?;
        persist_product(uow.as_mut(), &mut product, &mut events).await?;

        // An existing line grows by the newly reserved units and is repriced.
        let existing = cart.item(product_id);
        let new_quantity = existing.map_or(0, |i| i.quantity).checked_add(quantity).ok_or(CartError::InvalidQuantity)?;
        let item = CartItem {
            product_id,
            quantity: new_quantity,
            unit_price: product.price().clone(),
            title: product.title().to_string(),
            image_url: product.image_url().map(str::to_string),
            category: product.category().map(str::to_string),
            added_at: existing.map_or_else(Utc::now, |i| i.added_at),
        };
        uow.add_or_update_cart_item(cart.id(), &item).await?;

        let snapshot = self.finish(uow, cart.id(), events).await?;
        tracing::info!(cart_id = %snapshot.cart_id, quantity = new_quantity, "item reserved");
        Ok(snapshot)
    }

    async fn try_update_quantity(&self, user_id: UserId, product_id: ProductId, new_quantity: u32) -> Result<CartSnapshot> {
        let mut uow = self.store.begin().await?;
        let mut events = Vec::new();
        let cart = uow.active_cart_by_user(user_id).await?.ok_or(CartError::ItemNotInCart)?;
        let current = cart.item(product_id).ok_or(CartError::ItemNotInCart)?.clone();

        if new_quantity > current.quantity {
            let mut product = uow.product_by_id(product_id).await?.ok_or(CartError::ProductNotFound)?;
            product.reserve(new_quantity - current.quantity)?;
            persist_product(uow.as_mut(), &mut product, &mut events).await?;
        } else if new_quantity < current.quantity {
            self.release(uow.as_mut(), product_id, current.quantity - new_quantity, &mut events).await?;
        }

        if new_quantity == 0 {
            uow.remove_cart_item(cart.id(), product_id).await?;
        } else if new_quantity != current.quantity {
            uow.add_or_update_cart_item(cart.id(), &CartItem { quantity: new_quantity, ..current }).await?;
        }

        let snapshot = self.finish(uow, cart.id(), events).await?;
        tracing::info!(cart_id = %snapshot.cart_id, new_quantity, "item quantity updated");
        Ok(snapshot)
    }

    async fn try_remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<CartSnapshot> {
        let mut uow = self.store.begin().await?;
        let mut events = Vec::new();
        let cart = uow.active_cart_by_user(user_id).await?.ok_or(CartError::CartNotFound)?;
        let item = cart.item(product_id).ok_or(CartError::ItemNotInCart)?;

        self.release(uow.as_mut(), product_id, item.quantity, &mut events).await?;
        uow.remove_cart_item(cart.id(), product_id).await?;

        let snapshot = self.finish(uow, cart.id(), events).await?;
        tracing::info!(cart_id = %snapshot.cart_id, "item removed");
        Ok(snapshot)
    }

    async fn try_clear_cart(&self, user_id: UserId) -> Result<CartSnapshot> {
        let mut uow = self.store.begin().await?;
        let mut events = Vec::new();
        let cart = self.load_or_create(uow.as_mut(), user_id).await?;

        for item in cart.items() {
            self.release(uow.as_mut(), item.product_id, item.quantity, &mut events).await?;
            uow.remove_cart_item(cart.id(), item.product_id).await?;
        }

        let snapshot = self.finish(uow, cart.id(), events).await?;
        tracing::info!(cart_id = %snapshot.cart_id, released = cart.item_count(), "cart cleared");
        Ok(snapshot)
    }

    async fn try_checkout(&self, user_id: UserId) -> Result<CartSnapshot> {
        let mut uow = self.store.begin().await?;
        let mut events = Vec::new();
        let cart = uow.active_cart_by_user(user_id).await?.ok_or(CartError::EmptyCart)?;
        if cart.is_empty() {
            return Err(CartError::EmptyCart);
        }

        for item in cart.items() {
            let mut product = uow.product_by_id(item.product_id).await?.ok_or(CartError::ProductNotFound)?;
            product.commit_sale(item.quantity)?;
            persist_product(uow.as_mut(), &mut product, &mut events).await?;
        }

        let totals = self.refresh_totals(uow.as_mut(), cart.id()).await?.totals().clone();
        uow.update_cart_status(cart.id(), CartStatus::CheckedOut).await?;
        events.push(DomainEvent::Cart(CartEvent::CheckedOut { cart_id: cart.id(), user_id, final_total: totals.final_total }));

        let checked_out = uow.cart_by_id(cart.id()).await?.ok_or(CartError::CartNotFound)?;
        let snapshot = self.snapshot(uow.as_mut(), &checked_out).await?;
        uow.commit().await?;
        self.publish(&events).await;
        tracing::info!(cart_id = %snapshot.cart_id, final_total = %snapshot.final_total, "cart checked out");
        Ok(snapshot)
    }

    async fn try_abandon(&self, user_id: UserId) -> Result<CartSnapshot> {
        let mut uow = self.store.begin().await?;
        let mut events = Vec::new();
        let cart = uow.active_cart_by_user(user_id).await?.ok_or(CartError::CartNotFound)?;

        for item in cart.items() {
            self.release(uow.as_mut(), item.product_id, item.quantity, &mut events).await?;
        }
        if !uow.soft_delete_cart(cart.id()).await? {
            return Err(CartError::CartNotFound);
        }
        events.push(DomainEvent::Cart(CartEvent::Abandoned { cart_id: cart.id(), user_id }));

        let abandoned = uow.cart_by_id(cart.id()).await?.ok_or(CartError::CartNotFound)?;
        let snapshot = self.snapshot(uow.as_mut(), &abandoned).await?;
        uow.commit().await?;
        self.publish(&events).await;
        tracing::info!(cart_id = %snapshot.cart_id, "cart abandoned");
        Ok(snapshot)
    }

    async fn load_or_create(&self, uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = uow.active_cart_by_user(user_id).await? {
            return Ok(cart);
        }
        let cart = uow.create_cart(&Cart::for_customer(user_id, &self.settings.currency)).await?;
        tracing::debug!(cart_id = %cart.id(), "created active cart");
        Ok(cart)
    }

    /// Returns `quantity` units to the product, if it still exists.
    async fn release(&self, uow: &mut dyn UnitOfWork, product_id: ProductId, quantity: u32, events: &mut Vec<DomainEvent>) -> Result<()> {
        match uow.product_by_id(product_id).await? {
            Some(mut product) => {
                product.release(quantity)?;
                persist_product(uow, &mut product, events).await
            }
            None => {
                tracing::warn!(%product_id, quantity, "product no longer exists, nothing to release");
                Ok(())
            }
        }
    }

    async fn refresh_totals(&self, uow: &mut dyn UnitOfWork, cart_id: CartId) -> Result<Cart> {
        let mut cart = uow.cart_by_id(cart_id).await?.ok_or(CartError::CartNotFound)?;
        let totals = cart.recalculate(&self.settings.shipping)?;
        uow.update_cart_totals(cart_id, &totals).await?;
        cart.set_totals(totals);
        Ok(cart)
    }

    /// Recomputes totals, snapshots the reloaded cart, commits and publishes.
    async fn finish(&self, mut uow: Box<dyn UnitOfWork>, cart_id: CartId, events: Vec<DomainEvent>) -> Result<CartSnapshot> {
        let cart = self.refresh_totals(uow.as_mut(), cart_id).await?;
        let snapshot = self.snapshot(uow.as_mut(), &cart).await?;
        uow.commit().await?;
        self.publish(&events).await;
        Ok(snapshot)
    }

    async fn snapshot(&self, uow: &mut dyn UnitOfWork, cart: &Cart) -> Result<CartSnapshot> {
        let live = live_products(uow, cart).await?;
        Ok(CartSnapshot::assemble(cart, &live)?)
    }

    async fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            self.publisher.publish(event).await;
        }
    }

    /// Runs `attempt` again after a concurrency conflict. Each attempt opens
    /// its own unit of work, so a failed one has left nothing behind.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.settings.conflict_retries => {
                    retries += 1;
                    tracing::debug!(operation, retries, "concurrency conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(5 * u64::from(retries))).await;
                }
                Err(e @ CartError::Storage(_)) => {
                    tracing::error!(operation, error = %e, "cart operation failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(operation, error = %e, "cart operation rejected");
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }
}

async fn persist_product(uow: &mut dyn UnitOfWork, product: &mut Product, events: &mut Vec<DomainEvent>) -> Result<()> {
    events.extend(product.take_events());
    uow.update_product(product).await?;
    Ok(())
}

async fn live_products(uow: &mut dyn UnitOfWork, cart: &Cart) -> Result<HashMap<ProductId, Product>> {
    let mut live = HashMap::with_capacity(cart.item_count());
    for item in cart.items() {
        if let Some(product) = uow.product_by_id(item.product_id).await? {
            live.insert(product.id(), product);
        }
    }
    Ok(live)
}
