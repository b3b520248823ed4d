//! Domain events
use crate::domain::value_objects::{CartId, Money, ProductId, UserId};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Cart(CartEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    StockReserved { product_id: ProductId, quantity: u32, available: u32 },
    StockReleased { product_id: ProductId, quantity: u32, available: u32 },
    StockCommitted { product_id: ProductId, quantity: u32, total: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    CheckedOut { cart_id: CartId, user_id: UserId, final_total: Money },
    Abandoned { cart_id: CartId, user_id: UserId },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::StockReserved { .. }) => "ecommerce.inventory.reserved",
            Self::Product(ProductEvent::StockReleased { .. }) => "ecommerce.inventory.released",
            Self::Product(ProductEvent::StockCommitted { .. }) => "ecommerce.inventory.committed",
            Self::Cart(CartEvent::CheckedOut { .. }) => "ecommerce.cart.checked_out",
            Self::Cart(CartEvent::Abandoned { .. }) => "ecommerce.cart.abandoned",
        }
    }
}

impl From<ProductEvent> for DomainEvent {
    fn from(e: ProductEvent) -> Self { Self::Product(e) }
}

impl From<CartEvent> for DomainEvent {
    fn from(e: CartEvent) -> Self { Self::Cart(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = DomainEvent::from(ProductEvent::StockReserved { product_id: ProductId::new(), quantity: 2, available: 8 });
        assert_eq!(event.subject(), "ecommerce.inventory.reserved");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stock_reserved");
        assert_eq!(json["quantity"], 2);
    }
}
