// Catalog - direct create/read/update/delete on the store
//
// Thin pass-through next to the import pipeline. Product writes enforce the
// same category existence rule as the reference resolver; deletes never
// leave dangling references behind.

use crate::config::DeletePolicy;
use crate::db::{self, Store};
use crate::entities::{Category, EntityType, Product, ProductView, Sale};
use crate::error::{CatalogError, ConflictError};
use crate::query::ProductFilter;
use crate::resolver;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::{info, warn};

// ============================================================================
// REQUEST SHAPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub category_id: i64,
}

/// Partial product update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub id: i64,
    /// Sales removed together with a product (cascade only)
    pub sales_deleted: usize,
}

// ============================================================================
// CATALOG
// ============================================================================

pub struct Catalog<'a> {
    store: &'a Store,
    product_delete_policy: DeletePolicy,
}

impl<'a> Catalog<'a> {
    pub fn new(store: &'a Store, product_delete_policy: DeletePolicy) -> Self {
        Catalog {
            store,
            product_delete_policy,
        }
    }

    // ------------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------------

    pub fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        Ok(self.store.read(db::all_categories)?)
    }

    pub fn get_category(&self, id: i64) -> Result<Category, CatalogError> {
        self.store.read(|conn| find_category(conn, id))
    }

    pub fn create_category(&self, request: NewCategory) -> Result<Category, CatalogError> {
        let name = required_name(&request.name)?;

        let category = self.store.write(EntityType::Category, |conn| {
            ensure_name_free(conn, &name, None)?;
            let category = Category::new(db::next_id(conn, EntityType::Category)?, name);
            db::save_category(conn, &category)?;
            Ok::<_, CatalogError>(category)
        })?;

        info!(id = category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub fn update_category(&self, id: i64, request: NewCategory) -> Result<Category, CatalogError> {
        let name = required_name(&request.name)?;

        self.store.write(EntityType::Category, |conn| {
            let mut category = find_category(conn, id)?;
            ensure_name_free(conn, &name, Some(id))?;
            category.name = name;
            db::save_category(conn, &category)?;
            Ok(category)
        })
    }

    /// Refused while any product still belongs to the category.
    pub fn delete_category(&self, id: i64) -> Result<DeleteOutcome, CatalogError> {
        let outcome = self
            .store
            .write_many(&[EntityType::Category, EntityType::Product], |conn| {
                find_category(conn, id)?;

                let products = db::count_products_in_category(conn, id)?;
                if products > 0 {
                    warn!(category_id = id, products, "category delete blocked");
                    return Err(ConflictError::CategoryHasProducts {
                        category_id: id,
                        products,
                    }
                    .into());
                }

                db::delete_category(conn, id)?;
                Ok::<_, CatalogError>(DeleteOutcome { id, sales_deleted: 0 })
            })?;

        info!(id, "category deleted");
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------------

    pub fn list_products(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, CatalogError> {
        self.store.read(|conn| {
            let categories = db::all_categories(conn)?;
            let products = filter.apply(db::all_products(conn)?);

            Ok(products
                .into_iter()
                .map(|product| {
                    let category = categories.iter().find(|c| c.id == product.category_id).cloned();
                    ProductView { product, category }
                })
                .collect())
        })
    }

    pub fn get_product(&self, id: i64) -> Result<ProductView, CatalogError> {
        self.store.read(|conn| view(conn, find_product(conn, id)?))
    }

    pub fn create_product(&self, request: NewProduct) -> Result<ProductView, CatalogError> {
        let name = required_name(&request.name)?;
        positive_price(request.price)?;

        let created = self.store.write(EntityType::Product, |conn| {
            ensure_category(conn, request.category_id)?;
            let product = Product::new(
                db::next_id(conn, EntityType::Product)?,
                name,
                request.price,
                request.category_id,
            );
            db::save_product(conn, &product)?;
            view(conn, product)
        })?;

        info!(id = created.product.id, "product created");
        Ok(created)
    }

    pub fn update_product(&self, id: i64, update: ProductUpdate) -> Result<ProductView, CatalogError> {
        let name = update.name.as_deref().map(required_name).transpose()?;
        if let Some(price) = update.price {
            positive_price(price)?;
        }

        self.store.write(EntityType::Product, |conn| {
            let mut product = find_product(conn, id)?;

            if let Some(category_id) = update.category_id {
                ensure_category(conn, category_id)?;
                product.category_id = category_id;
            }
            if let Some(name) = name {
                product.name = name;
            }
            if let Some(price) = update.price {
                product.price = price;
            }

            db::save_product(conn, &product)?;
            view(conn, product)
        })
    }

    /// Delete a product. `policy` overrides the configured delete policy.
    pub fn delete_product(&self, id: i64, policy: Option<DeletePolicy>) -> Result<DeleteOutcome, CatalogError> {
        let policy = policy.unwrap_or(self.product_delete_policy);

        let outcome = self
            .store
            .write_many(&[EntityType::Product, EntityType::Sale], |conn| {
                find_product(conn, id)?;

                let sales = db::count_sales_for_product(conn, id)?;
                let sales_deleted = match policy {
                    DeletePolicy::Block if sales > 0 => {
                        warn!(product_id = id, sales, "product delete blocked");
                        return Err(ConflictError::ProductHasSales { product_id: id, sales }.into());
                    }
                    DeletePolicy::Block => 0,
                    DeletePolicy::Cascade => db::delete_sales_for_product(conn, id)?,
                };

                db::delete_product(conn, id)?;
                Ok::<_, CatalogError>(DeleteOutcome { id, sales_deleted })
            })?;

        info!(id, sales_deleted = outcome.sales_deleted, "product deleted");
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Sales
    // ------------------------------------------------------------------------

    /// Sales newest first (undated month labels last), ties by ascending id.
    pub fn list_sales(&self, product_id: Option<i64>) -> Result<Vec<Sale>, CatalogError> {
        let mut sales = self.store.read(|conn| match product_id {
            Some(product_id) => db::sales_for_product(conn, product_id),
            None => db::all_sales(conn),
        })?;

        sales.sort_by_key(|sale| (Reverse(sale.date.first_day()), sale.id));
        Ok(sales)
    }

    pub fn get_sale(&self, id: i64) -> Result<Sale, CatalogError> {
        self.store
            .read(|conn| db::get_sale(conn, id))?
            .ok_or(CatalogError::NotFound { entity: "sale", id })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn find_category(conn: &Connection, id: i64) -> Result<Category, CatalogError> {
    db::get_category(conn, id)?.ok_or(CatalogError::NotFound { entity: "category", id })
}

fn find_product(conn: &Connection, id: i64) -> Result<Product, CatalogError> {
    db::get_product(conn, id)?.ok_or(CatalogError::NotFound { entity: "product", id })
}

fn view(conn: &Connection, product: Product) -> Result<ProductView, CatalogError> {
    let category = db::get_category(conn, product.category_id)?;
    Ok(ProductView { product, category })
}

fn ensure_category(conn: &Connection, category_id: i64) -> Result<(), CatalogError> {
    if resolver::category_exists(conn, category_id)? {
        Ok(())
    } else {
        Err(CatalogError::Validation {
            field: "category_id",
            message: format!("category {} does not exist", category_id),
        })
    }
}

fn ensure_name_free(conn: &Connection, name: &str, except: Option<i64>) -> Result<(), CatalogError> {
    if db::category_name_taken(conn, name, except)? {
        return Err(ConflictError::DuplicateCategoryName(name.to_string()).into());
    }
    Ok(())
}

fn required_name(raw: &str) -> Result<String, CatalogError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CatalogError::Validation {
            field: "name",
            message: "must not be empty".to_string(),
        });
    }
    Ok(name.to_string())
}

fn positive_price(price: Decimal) -> Result<(), CatalogError> {
    if price <= Decimal::ZERO {
        return Err(CatalogError::Validation {
            field: "price",
            message: format!("must be greater than 0, got {}", price),
        });
    }
    Ok(())
}
