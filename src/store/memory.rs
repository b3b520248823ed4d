//! In-process store used for tests and local runs without Postgres.
//!
//! Units of work are serialised: `begin` takes the state lock and hands out a
//! working copy, `commit` swaps the copy back in.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{CartStore, ProductStore, Store, StoreResult, UnitOfWork};
use crate::domain::aggregates::{Cart, CartItem, CartStatus, CartTotals, Product};
use crate::domain::value_objects::{CartId, Money, ProductId, UserId};
use crate::error::StoreError;

#[derive(Clone, Debug, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

/// One product entry of a JSON seed file.
#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub id: Option<Uuid>,
    pub title: String,
    pub price: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub stock: u32,
}

fn default_currency() -> String { "USD".to_string() }

impl From<ProductSeed> for Product {
    fn from(seed: ProductSeed) -> Self {
        let mut product = Product::create(seed.title, Money::new(seed.price, &seed.currency), seed.stock);
        if let Some(id) = seed.id { product = product.with_id(ProductId::from_uuid(id)); }
        if let Some(url) = seed.image_url { product = product.with_image(url); }
        if let Some(category) = seed.category { product = product.with_category(category); }
        product
    }
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Loads products from a JSON array of [`ProductSeed`].
    pub async fn from_seed_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let seeds: Vec<ProductSeed> = serde_json::from_str(&raw)?;
        let store = Self::new();
        for seed in seeds { store.insert_product(seed.into()).await; }
        Ok(store)
    }

    /// Adds or replaces a catalog product.
    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id(), product);
    }

    /// Deletes a product from the catalog, leaving cart lines that reference it.
    pub async fn remove_product(&self, id: ProductId) -> bool {
        self.state.lock().await.products.remove(&id).is_some()
    }

    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.state.lock().await.products.get(&id).cloned()
    }

    pub async fn carts_for_user(&self, user_id: UserId) -> Vec<Cart> {
        self.state.lock().await.carts.values().filter(|c| c.user_id() == user_id).cloned().collect()
    }

    pub async fn cart(&self, id: CartId) -> Option<Cart> {
        self.state.lock().await.carts.get(&id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryUnitOfWork {
    fn cart_mut(&mut self, cart_id: CartId) -> StoreResult<&mut Cart> {
        self.working.carts.get_mut(&cart_id).ok_or_else(|| StoreError::Corrupt(format!("cart {cart_id} does not exist")))
    }
}

#[async_trait]
impl ProductStore for MemoryUnitOfWork {
    async fn product_by_id(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn update_product(&mut self, product: &mut Product) -> StoreResult<()> {
        let stored = self.working.products.get_mut(&product.id())
            .ok_or_else(|| StoreError::Conflict(format!("product {} was deleted", product.id())))?;
        if stored.version() != product.version() {
            return Err(StoreError::Conflict(format!("product {} changed since it was read", product.id())));
        }
        product.bump_version();
        let mut saved = product.clone();
        saved.take_events();
        *stored = saved;
        Ok(())
    }
}

#[async_trait]
impl CartStore for MemoryUnitOfWork {
    async fn active_cart_by_user(&mut self, user_id: UserId) -> StoreResult<Option<Cart>> {
        Ok(self.working.carts.values().find(|c| c.user_id() == user_id && c.is_active()).cloned())
    }

    async fn cart_by_id(&mut self, cart_id: CartId) -> StoreResult<Option<Cart>> {
        Ok(self.working.carts.get(&cart_id).cloned())
    }

    async fn create_cart(&mut self, cart: &Cart) -> StoreResult<Cart> {
        let user_id = cart.user_id();
        if self.working.carts.values().any(|c| c.user_id() == user_id && c.is_active()) {
            return Err(StoreError::Conflict(format!("user {user_id} already has an active cart")));
        }
        self.working.carts.insert(cart.id(), cart.clone());
        Ok(cart.clone())
    }

    async fn add_or_update_cart_item(&mut self, cart_id: CartId, item: &CartItem) -> StoreResult<()> {
        self.cart_mut(cart_id)?.put_item(item.clone());
        Ok(())
    }

    async fn remove_cart_item(&mut self, cart_id: CartId, product_id: ProductId) -> StoreResult<()> {
        self.cart_mut(cart_id)?.remove_item(product_id);
        Ok(())
    }

    async fn update_cart_totals(&mut self, cart_id: CartId, totals: &CartTotals) -> StoreResult<()> {
        self.cart_mut(cart_id)?.set_totals(totals.clone());
        Ok(())
    }

    async fn update_cart_status(&mut self, cart_id: CartId, status: CartStatus) -> StoreResult<()> {
        self.cart_mut(cart_id)?.transition(status).map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn soft_delete_cart(&mut self, cart_id: CartId) -> StoreResult<bool> {
        match self.working.carts.get_mut(&cart_id) {
            Some(cart) if cart.is_active() => {
                cart.transition(CartStatus::Abandoned).map_err(|e| StoreError::Conflict(e.to_string()))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(stock: u32) -> Product { Product::create("Widget", Money::usd(Decimal::new(10, 0)), stock) }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = MemoryStore::new();
        let product = widget(10);
        let id = product.id();
        store.insert_product(product).await;

        let mut uow = store.begin().await.unwrap();
        let mut fresh = uow.product_by_id(id).await.unwrap().unwrap();
        let mut stale = fresh.clone();
        fresh.reserve(1).unwrap();
        uow.update_product(&mut fresh).await.unwrap();
        assert_eq!(fresh.version(), 1);

        stale.reserve(1).unwrap();
        assert!(matches!(uow.update_product(&mut stale).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let store = MemoryStore::new();
        let product = widget(10);
        let id = product.id();
        store.insert_product(product).await;

        {
            let mut uow = store.begin().await.unwrap();
            let mut p = uow.product_by_id(id).await.unwrap().unwrap();
            p.reserve(4).unwrap();
            uow.update_product(&mut p).await.unwrap();
        }
        assert_eq!(store.product(id).await.unwrap().inventory_available(), 10);

        let mut uow = store.begin().await.unwrap();
        let mut p = uow.product_by_id(id).await.unwrap().unwrap();
        p.reserve(4).unwrap();
        uow.update_product(&mut p).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(store.product(id).await.unwrap().inventory_available(), 6);
    }

    #[tokio::test]
    async fn test_second_active_cart_conflicts() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let mut uow = store.begin().await.unwrap();
        uow.create_cart(&Cart::for_customer(user, "USD")).await.unwrap();
        assert!(matches!(uow.create_cart(&Cart::for_customer(user, "USD")).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.json");
        let id = Uuid::now_v7();
        let json = format!(r#"[{{"id": "{id}", "title": "Mug", "price": "12.50", "stock": 3, "category": "kitchen"}}]"#);
        tokio::fs::write(&path, json).await.unwrap();

        let store = MemoryStore::from_seed_file(&path).await.unwrap();
        let product = store.product(ProductId::from_uuid(id)).await.unwrap();
        assert_eq!(product.inventory_available(), 3);
        assert_eq!(product.price().amount(), Decimal::new(1250, 2));
        assert_eq!(product.category(), Some("kitchen"));
    }
}
