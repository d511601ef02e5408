// Analytics Aggregator - the four dashboard views
//
// Pure read-side computation, recomputed from a store snapshot on every
// call. Sales whose product (or the product's category) no longer exists
// are left out of the per-product and per-category views.

use crate::db::{self, Store};
use crate::entities::{sale::compare_month_keys, Category, Product, Sale};
use crate::error::StoreError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

// ============================================================================
// VIEW TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub total_sales: usize,
    pub total_revenue: Decimal,
    pub total_quantity: i64,
    /// 0 when there are no sales
    pub average_sale_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub id: i64,
    pub name: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySales {
    pub id: i64,
    pub name: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySales {
    pub month: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
    pub total_sales: usize,
}

/// All four views computed from the same snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub sales: SalesSummary,
    pub products: Vec<ProductSales>,
    pub categories: Vec<CategorySales>,
    pub monthly: Vec<MonthlySales>,
}

#[derive(Default)]
struct Totals {
    quantity: i64,
    revenue: Decimal,
    count: usize,
}

impl Totals {
    /// Fails instead of wrapping when a running sum leaves its numeric range.
    fn add(&mut self, sale: &Sale) -> Result<(), StoreError> {
        self.quantity = self
            .quantity
            .checked_add(sale.quantity)
            .ok_or(StoreError::Overflow { column: "quantity" })?;
        self.revenue = self
            .revenue
            .checked_add(sale.total_price)
            .ok_or(StoreError::Overflow { column: "total_price" })?;
        self.count += 1;
        Ok(())
    }
}

// ============================================================================
// PURE COMPUTATION
// ============================================================================

pub fn sales_summary(sales: &[Sale]) -> Result<SalesSummary, StoreError> {
    let mut totals = Totals::default();
    for sale in sales {
        totals.add(sale)?;
    }

    let average_sale_value = if totals.count == 0 {
        Decimal::ZERO
    } else {
        totals
            .revenue
            .checked_div(Decimal::from(totals.count))
            .ok_or(StoreError::Overflow { column: "total_price" })?
    };

    Ok(SalesSummary {
        total_sales: totals.count,
        total_revenue: totals.revenue,
        total_quantity: totals.quantity,
        average_sale_value,
    })
}

/// Per-product totals, best sellers first (quantity desc, then id asc)
pub fn product_sales(sales: &[Sale], products: &[Product]) -> Result<Vec<ProductSales>, StoreError> {
    let names: HashMap<i64, &str> = products.iter().map(|p| (p.id, p.name.as_str())).collect();

    let mut totals: HashMap<i64, Totals> = HashMap::new();
    for sale in sales.iter().filter(|s| names.contains_key(&s.product_id)) {
        totals.entry(sale.product_id).or_default().add(sale)?;
    }

    let mut rows: Vec<ProductSales> = totals
        .into_iter()
        .map(|(id, t)| ProductSales {
            id,
            name: names[&id].to_string(),
            total_quantity: t.quantity,
            total_revenue: t.revenue,
        })
        .collect();

    rows.sort_by(|a, b| b.total_quantity.cmp(&a.total_quantity).then(a.id.cmp(&b.id)));
    Ok(rows)
}

pub fn top_products(sales: &[Sale], products: &[Product], limit: usize) -> Result<Vec<ProductSales>, StoreError> {
    let mut rows = product_sales(sales, products)?;
    rows.truncate(limit);
    Ok(rows)
}

/// Per-category totals, highest revenue first (then id asc)
pub fn category_sales(
    sales: &[Sale],
    products: &[Product],
    categories: &[Category],
) -> Result<Vec<CategorySales>, StoreError> {
    let category_of: HashMap<i64, i64> = products.iter().map(|p| (p.id, p.category_id)).collect();
    let names: HashMap<i64, &str> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();

    let mut totals: HashMap<i64, Totals> = HashMap::new();
    for sale in sales {
        let Some(category_id) = category_of.get(&sale.product_id) else {
            continue;
        };
        if names.contains_key(category_id) {
            totals.entry(*category_id).or_default().add(sale)?;
        }
    }

    let mut rows: Vec<CategorySales> = totals
        .into_iter()
        .map(|(id, t)| CategorySales {
            id,
            name: names[&id].to_string(),
            total_quantity: t.quantity,
            total_revenue: t.revenue,
        })
        .collect();

    rows.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue).then(a.id.cmp(&b.id)));
    Ok(rows)
}

/// Monthly buckets in chronological order
pub fn monthly_sales(sales: &[Sale]) -> Result<Vec<MonthlySales>, StoreError> {
    let mut buckets: HashMap<String, Totals> = HashMap::new();
    for sale in sales {
        buckets.entry(sale.date.month_key()).or_default().add(sale)?;
    }

    let mut rows: Vec<MonthlySales> = buckets
        .into_iter()
        .map(|(month, t)| MonthlySales {
            month,
            total_quantity: t.quantity,
            total_revenue: t.revenue,
            total_sales: t.count,
        })
        .collect();

    rows.sort_by(|a, b| compare_month_keys(&a.month, &b.month));
    Ok(rows)
}

// ============================================================================
// AGGREGATOR (store-backed)
// ============================================================================

pub struct AnalyticsAggregator<'a> {
    store: &'a Store,
    top_products_limit: usize,
}

impl<'a> AnalyticsAggregator<'a> {
    pub fn new(store: &'a Store, top_products_limit: usize) -> Self {
        AnalyticsAggregator {
            store,
            top_products_limit,
        }
    }

    pub fn sales_summary(&self) -> Result<SalesSummary, StoreError> {
        self.store.read(|conn| sales_summary(&db::all_sales(conn)?))
    }

    pub fn top_products(&self) -> Result<Vec<ProductSales>, StoreError> {
        self.store.read(|conn| {
            let sales = db::all_sales(conn)?;
            let products = db::all_products(conn)?;
            top_products(&sales, &products, self.top_products_limit)
        })
    }

    pub fn category_sales(&self) -> Result<Vec<CategorySales>, StoreError> {
        self.store.read(|conn| {
            let sales = db::all_sales(conn)?;
            let products = db::all_products(conn)?;
            let categories = db::all_categories(conn)?;
            category_sales(&sales, &products, &categories)
        })
    }

    pub fn monthly_sales(&self) -> Result<Vec<MonthlySales>, StoreError> {
        self.store.read(|conn| monthly_sales(&db::all_sales(conn)?))
    }

    pub fn dashboard(&self) -> Result<Dashboard, StoreError> {
        self.store.read(|conn| {
            let sales = db::all_sales(conn)?;
            let products = db::all_products(conn)?;
            let categories = db::all_categories(conn)?;

            Ok(Dashboard {
                sales: sales_summary(&sales)?,
                products: top_products(&sales, &products, self.top_products_limit)?,
                categories: category_sales(&sales, &products, &categories)?,
                monthly: monthly_sales(&sales)?,
            })
        })
    }
}
