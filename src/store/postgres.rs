//! Postgres store.
//!
//! Each unit of work is one database transaction. Product stock is guarded by
//! an optimistic `version` column; the active cart row is locked with
//! `FOR UPDATE` so operations on the same cart run one after another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{CartStore, ProductStore, Store, StoreResult, UnitOfWork};
use crate::domain::aggregates::{Cart, CartItem, CartParts, CartStatus, CartTotals, Product, ProductParts};
use crate::domain::value_objects::{CartId, Money, ProductId, UserId};
use crate::error::StoreError;

const PRODUCT_COLUMNS: &str = "id, title, price, currency, image_url, category, inventory_total, inventory_available, version, created_at, updated_at";
const CART_COLUMNS: &str = "id, user_id, status, currency, total_before_discount, discount_amount, shipping_cost, final_total, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork { tx: Transaction<'static, Postgres> }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, title: String, price: Decimal, currency: String, image_url: Option<String>, category: Option<String>,
    inventory_total: i32, inventory_available: i32, version: i64, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Product::restore(ProductParts {
            id: ProductId::from_uuid(r.id), title: r.title, price: Money::new(r.price, &r.currency),
            image_url: r.image_url, category: r.category,
            inventory_total: from_db_qty(r.inventory_total)?, inventory_available: from_db_qty(r.inventory_available)?,
            version: r.version, created_at: r.created_at, updated_at: r.updated_at,
        }).map_err(|e| StoreError::Corrupt(format!("product {}: {e}", r.id)))
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid, user_id: Uuid, status: String, currency: String,
    total_before_discount: Decimal, discount_amount: Decimal, shipping_cost: Decimal, final_total: Decimal,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>, deleted_at: Option<DateTime<Utc>>,
}

impl CartRow {
    fn into_parts(self) -> StoreResult<CartParts> {
        let status = self.status.parse::<CartStatus>().map_err(|e| StoreError::Corrupt(format!("cart {}: {e}", self.id)))?;
        let c = self.currency.as_str();
        Ok(CartParts {
            id: CartId::from_uuid(self.id), user_id: UserId::from_uuid(self.user_id), status, currency: self.currency.clone(),
            totals: CartTotals {
                total_before_discount: Money::new(self.total_before_discount, c), discount_amount: Money::new(self.discount_amount, c),
                shipping_cost: Money::new(self.shipping_cost, c), final_total: Money::new(self.final_total, c),
            },
            created_at: self.created_at, updated_at: self.updated_at, deleted_at: self.deleted_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: Uuid, quantity: i32, unit_price: Decimal, title: String,
    image_url: Option<String>, category: Option<String>, added_at: DateTime<Utc>,
}

impl PgUnitOfWork {
    async fn load_cart(&mut self, row: Option<CartRow>) -> StoreResult<Option<Cart>> {
        let Some(row) = row else { return Ok(None) };
        let parts = row.into_parts()?;
        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, quantity, unit_price, title, image_url, category, added_at FROM cart_items WHERE cart_id = $1 ORDER BY added_at, product_id")
            .bind(parts.id.as_uuid()).fetch_all(&mut *self.tx).await.map_err(map_db_error)?;
        let items = rows.into_iter().map(|r| -> StoreResult<CartItem> { Ok(CartItem {
            product_id: ProductId::from_uuid(r.product_id), quantity: from_db_qty(r.quantity)?,
            unit_price: Money::new(r.unit_price, &parts.currency), title: r.title, image_url: r.image_url,
            category: r.category, added_at: r.added_at,
        }) }).collect::<StoreResult<Vec<_>>>()?;
        Ok(Some(Cart::restore(parts, items)))
    }

    async fn touch_cart(&mut self, cart_id: CartId) -> StoreResult<()> {
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id.as_uuid()).execute(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PgUnitOfWork {
    async fn product_by_id(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid()).fetch_optional(&mut *self.tx).await.map_err(map_db_error)?;
        row.map(Product::try_from).transpose()
    }

    async fn update_product(&mut self, product: &mut Product) -> StoreResult<()> {
        let result = sqlx::query("UPDATE products SET inventory_total = $2, inventory_available = $3, price = $4, version = version + 1, updated_at = $5 WHERE id = $1 AND version = $6")
            .bind(product.id().as_uuid()).bind(to_db_qty(product.inventory_total())?).bind(to_db_qty(product.inventory_available())?)
            .bind(product.price().amount()).bind(product.updated_at()).bind(product.version())
            .execute(&mut *self.tx).await.map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("product {} changed since it was read", product.id())));
        }
        product.bump_version();
        Ok(())
    }
}

#[async_trait]
impl CartStore for PgUnitOfWork {
    async fn active_cart_by_user(&mut self, user_id: UserId) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(&format!("SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 AND status = 'active' FOR UPDATE"))
            .bind(user_id.as_uuid()).fetch_optional(&mut *self.tx).await.map_err(map_db_error)?;
        self.load_cart(row).await
    }

    async fn cart_by_id(&mut self, cart_id: CartId) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(cart_id.as_uuid()).fetch_optional(&mut *self.tx).await.map_err(map_db_error)?;
        self.load_cart(row).await
    }

    async fn create_cart(&mut self, cart: &Cart) -> StoreResult<Cart> {
        let t = cart.totals();
        sqlx::query("INSERT INTO carts (id, user_id, status, currency, total_before_discount, discount_amount, shipping_cost, final_total, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(cart.id().as_uuid()).bind(cart.user_id().as_uuid()).bind(cart.status().as_str()).bind(cart.currency())
            .bind(t.total_before_discount.amount()).bind(t.discount_amount.amount()).bind(t.shipping_cost.amount()).bind(t.final_total.amount())
            .bind(cart.created_at()).bind(cart.updated_at())
            .execute(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(cart.clone())
    }

    async fn add_or_update_cart_item(&mut self, cart_id: CartId, item: &CartItem) -> StoreResult<()> {
        if item.quantity == 0 {
            return self.remove_cart_item(cart_id, item.product_id).await;
        }
        sqlx::query("INSERT INTO cart_items (cart_id, product_id, quantity, unit_price, title, image_url, category, added_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity, unit_price = EXCLUDED.unit_price, title = EXCLUDED.title, image_url = EXCLUDED.image_url, category = EXCLUDED.category")
            .bind(cart_id.as_uuid()).bind(item.product_id.as_uuid()).bind(to_db_qty(item.quantity)?).bind(item.unit_price.amount())
            .bind(&item.title).bind(&item.image_url).bind(&item.category).bind(item.added_at)
            .execute(&mut *self.tx).await.map_err(map_db_error)?;
        self.touch_cart(cart_id).await
    }

    async fn remove_cart_item(&mut self, cart_id: CartId, product_id: ProductId) -> StoreResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_uuid()).bind(product_id.as_uuid()).execute(&mut *self.tx).await.map_err(map_db_error)?;
        self.touch_cart(cart_id).await
    }

    async fn update_cart_totals(&mut self, cart_id: CartId, totals: &CartTotals) -> StoreResult<()> {
        sqlx::query("UPDATE carts SET total_before_discount = $2, discount_amount = $3, shipping_cost = $4, final_total = $5, updated_at = NOW() WHERE id = $1")
            .bind(cart_id.as_uuid()).bind(totals.total_before_discount.amount()).bind(totals.discount_amount.amount())
            .bind(totals.shipping_cost.amount()).bind(totals.final_total.amount())
            .execute(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(())
    }

    async fn update_cart_status(&mut self, cart_id: CartId, status: CartStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE carts SET status = $2, updated_at = NOW(), deleted_at = CASE WHEN $2 = 'abandoned' THEN NOW() ELSE deleted_at END WHERE id = $1 AND status = 'active'")
            .bind(cart_id.as_uuid()).bind(status.as_str()).execute(&mut *self.tx).await.map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("cart {cart_id} is no longer active")));
        }
        Ok(())
    }

    async fn soft_delete_cart(&mut self, cart_id: CartId) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE carts SET status = 'abandoned', deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND status = 'active'")
            .bind(cart_id.as_uuid()).execute(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}

/// Unique violations, serialization failures and deadlocks are retryable conflicts.
fn map_db_error(e: sqlx::Error) -> StoreError {
    let code = e.as_database_error().and_then(|d| d.code()).map(|c| c.into_owned());
    match code.as_deref() {
        Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(e.to_string()),
        _ => StoreError::Database(e),
    }
}

fn to_db_qty(v: u32) -> StoreResult<i32> {
    i32::try_from(v).map_err(|_| StoreError::Corrupt(format!("quantity {v} does not fit the database column")))
}

fn from_db_qty(v: i32) -> StoreResult<u32> {
    u32::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative quantity {v} in database")))
}
