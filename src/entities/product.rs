// Product Entity - priced catalog item owned by a Category

use super::Category;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Always > 0
    pub price: Decimal,
    /// Must reference an existing category at commit time
    pub category_id: i64,
}

impl Product {
    pub fn new(id: i64, name: impl Into<String>, price: Decimal, category_id: i64) -> Self {
        Product {
            id,
            name: name.into(),
            price,
            category_id,
        }
    }
}

/// Product as returned to the dashboard, with its category embedded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}
