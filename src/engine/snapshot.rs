//! Cart snapshots returned by every engine operation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::aggregates::{Cart, CartItem, Product};
use crate::domain::value_objects::{CartId, MoneyError, ProductId, UserId};

/// Where a line's display fields were taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySource {
    /// The product still exists; title and image are current.
    Live,
    /// The product is gone; title and image were captured when it was added.
    Snapshot,
}

/// Display data for a line: the live product if it still exists, the
/// captured item fields otherwise.
#[derive(Clone, Copy, Debug)]
pub enum DisplayData<'a> {
    Live(&'a Product),
    Snapshot(&'a CartItem),
}

impl<'a> DisplayData<'a> {
    pub fn resolve(item: &'a CartItem, live: Option<&'a Product>) -> Self {
        match live {
            Some(product) => Self::Live(product),
            None => Self::Snapshot(item),
        }
    }

    pub fn title(&self) -> &'a str {
        match self {
            Self::Live(p) => p.title(),
            Self::Snapshot(i) => &i.title,
        }
    }

    pub fn image_url(&self) -> Option<&'a str> {
        match self {
            Self::Live(p) => p.image_url(),
            Self::Snapshot(i) => i.image_url.as_deref(),
        }
    }

    pub fn source(&self) -> DisplaySource {
        match self {
            Self::Live(_) => DisplaySource::Live,
            Self::Snapshot(_) => DisplaySource::Snapshot,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartLineSnapshot {
    pub product_id: ProductId,
    pub title: String,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub display_source: DisplaySource,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartSnapshot {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub status: String,
    pub currency: String,
    pub items: Vec<CartLineSnapshot>,
    pub item_count: usize,
    pub total_before_discount: Decimal,
    pub discount_amount: Decimal,
    pub total_after_discount: Decimal,
    pub shipping_cost: Decimal,
    pub final_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartSnapshot {
    /// Projects a cart, preferring live product data for display fields.
    pub fn assemble(cart: &Cart, live: &HashMap<ProductId, Product>) -> Result<Self, MoneyError> {
        let items = cart.items().iter().map(|item| {
            let display = DisplayData::resolve(item, live.get(&item.product_id));
            CartLineSnapshot {
                product_id: item.product_id,
                title: display.title().to_string(),
                image_url: display.image_url().map(str::to_string),
                quantity: item.quantity,
                unit_price: item.unit_price.amount(),
                line_total: item.line_total().amount(),
                display_source: display.source(),
            }
        }).collect::<Vec<_>>();
        let totals = cart.totals();
        Ok(Self {
            cart_id: cart.id(),
            user_id: cart.user_id(),
            status: cart.status().to_string(),
            currency: cart.currency().to_string(),
            item_count: items.len(),
            items,
            total_before_discount: totals.total_before_discount.amount(),
            discount_amount: totals.discount_amount.amount(),
            total_after_discount: totals.total_after_discount()?.amount(),
            shipping_cost: totals.shipping_cost.amount(),
            final_total: totals.final_total.amount(),
            created_at: cart.created_at(),
            updated_at: cart.updated_at(),
        })
    }

    pub fn line(&self, product_id: ProductId) -> Option<&CartLineSnapshot> {
        self.items.iter().find(|l| l.product_id == product_id)
    }

    pub fn total_quantity(&self) -> u32 { self.items.iter().map(|l| l.quantity).sum() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ShippingPolicy;
    use crate::domain::value_objects::Money;

    #[test]
    fn test_display_falls_back_to_snapshot() {
        let product = Product::create("Lamp (2024)", Money::usd(Decimal::new(40, 0)), 5).with_image("https://img/lamp-new.png");
        let gone = ProductId::new();
        let mut cart = Cart::for_customer(UserId::new(), "USD");
        cart.put_item(CartItem {
            product_id: product.id(), quantity: 1, unit_price: Money::usd(Decimal::new(35, 0)), title: "Lamp".into(),
            image_url: Some("https://img/lamp.png".into()), category: None, added_at: Utc::now(),
        });
        cart.put_item(CartItem {
            product_id: gone, quantity: 2, unit_price: Money::usd(Decimal::new(5, 0)), title: "Bulb".into(),
            image_url: None, category: None, added_at: Utc::now(),
        });
        let totals = cart.recalculate(&ShippingPolicy::default()).unwrap();
        cart.set_totals(totals);

        let live = HashMap::from([(product.id(), product.clone())]);
        let snapshot = CartSnapshot::assemble(&cart, &live).unwrap();

        let lamp = snapshot.line(product.id()).unwrap();
        assert_eq!(lamp.title, "Lamp (2024)");
        assert_eq!(lamp.display_source, DisplaySource::Live);
        assert_eq!(lamp.unit_price, Decimal::new(35, 0));

        let bulb = snapshot.line(gone).unwrap();
        assert_eq!(bulb.title, "Bulb");
        assert_eq!(bulb.display_source, DisplaySource::Snapshot);

        assert_eq!(snapshot.total_before_discount, Decimal::new(45, 0));
        assert_eq!(snapshot.total_after_discount, Decimal::new(45, 0));
        assert_eq!(snapshot.total_quantity(), 3);
        assert_eq!(snapshot.status, "Active");
    }
}
