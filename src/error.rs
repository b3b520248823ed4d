//! Error types

use thiserror::Error;

use crate::domain::aggregates::{CartStateError, ProductError};
use crate::domain::value_objects::MoneyError;

/// Business and infrastructure failures of cart operations.
#[derive(Error, Debug)]
pub enum CartError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Cart not found")]
    CartNotFound,

    #[error("Not enough available stock (requested {requested}, available {available})")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("Product not found in cart")]
    ItemNotInCart,

    #[error("Cannot checkout empty cart")]
    EmptyCart,

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Product is priced in {found}, cart uses {expected}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("Concurrent update detected, retry the operation")]
    ConcurrencyConflict,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CartError {
    /// Short machine-readable name of the failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProductNotFound => "product_not_found",
            Self::CartNotFound => "cart_not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::ItemNotInCart => "item_not_in_cart",
            Self::EmptyCart => "empty_cart",
            Self::InvalidQuantity => "invalid_quantity",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::Storage(_) => "storage",
        }
    }

    pub fn is_retryable(&self) -> bool { matches!(self, Self::ConcurrencyConflict) }
}

/// Failures reported by product and cart stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Optimistic version mismatch, unique violation, serialization failure or deadlock.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row cannot be turned back into a valid aggregate.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for CartError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => CartError::ConcurrencyConflict,
            other => CartError::Storage(other.to_string()),
        }
    }
}

impl From<ProductError> for CartError {
    fn from(e: ProductError) -> Self {
        match e {
            ProductError::InsufficientStock { requested, available } => CartError::InsufficientStock { requested, available },
            other => CartError::Storage(other.to_string()),
        }
    }
}

impl From<MoneyError> for CartError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::CurrencyMismatch { expected, found } => CartError::CurrencyMismatch { expected, found },
        }
    }
}

impl From<CartStateError> for CartError {
    fn from(e: CartStateError) -> Self { CartError::Storage(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, CartError>;
