use serde::Serialize;
use std::collections::HashMap;

use crate::domain::aggregates::{Cart, Product};
use crate::domain::value_objects::ProductId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ProductUnavailable,
    SoldOut,
    LowStock,
    PriceChanged,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InventoryWarning {
    pub product_id: ProductId,
    pub kind: WarningKind,
    pub message: String,
}

/// Stock and price warnings for the lines of `cart`. The caller's own
/// reservation is already excluded from `inventory_available`.
pub fn inventory_warnings(cart: &Cart, live: &HashMap<ProductId, Product>, low_stock_threshold: u32) -> Vec<InventoryWarning> {
    let mut warnings = Vec::new();
    for item in cart.items() {
        let warn = |kind, message: String| InventoryWarning { product_id: item.product_id, kind, message };
        let Some(product) = live.get(&item.product_id) else {
            warnings.push(warn(WarningKind::ProductUnavailable, format!("{} is no longer available", item.title)));
            continue;
        };
        let available = product.inventory_available();
        if available == 0 {
            warnings.push(warn(WarningKind::SoldOut, format!("{} is sold out; no more units can be added", product.title())));
        } else if available <= low_stock_threshold {
            warnings.push(warn(WarningKind::LowStock, format!("Only {available} more units of {} in stock", product.title())));
        }
        if product.price() != &item.unit_price {
            warnings.push(warn(
                WarningKind::PriceChanged,
                format!("Price of {} changed from {} to {} since it was added", product.title(), item.unit_price, product.price()),
            ));
        }
    }
    warnings
}
