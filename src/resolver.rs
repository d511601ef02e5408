// Reference Resolver - foreign key checks against the store snapshot
//
// Product → Category and Sale → Product. The snapshot is taken inside the
// commit transaction, so the check and the write see the same state.
// References are never deferred: a sale naming an unknown product is rejected.

use crate::db;
use crate::entities::EntityType;
use crate::error::{ReferenceError, StoreError};
use crate::schema::{Record, ValidatedRow};
use rusqlite::Connection;
use std::collections::HashSet;

pub struct ReferenceResolver {
    categories: HashSet<i64>,
    products: HashSet<i64>,
}

impl ReferenceResolver {
    /// Load the id sets that rows of `entity` may reference.
    pub fn load(conn: &Connection, entity: EntityType) -> Result<Self, StoreError> {
        let (categories, products) = match entity {
            EntityType::Category => (HashSet::new(), HashSet::new()),
            EntityType::Product => (db::ids(conn, EntityType::Category)?, HashSet::new()),
            EntityType::Sale => (HashSet::new(), db::ids(conn, EntityType::Product)?),
        };
        Ok(ReferenceResolver { categories, products })
    }

    pub fn from_ids(categories: HashSet<i64>, products: HashSet<i64>) -> Self {
        ReferenceResolver { categories, products }
    }

    pub fn check(&self, row: &ValidatedRow) -> Result<(), ReferenceError> {
        match &row.record {
            Record::Category(_) => Ok(()),
            Record::Product(product) if !self.categories.contains(&product.category_id) => {
                Err(ReferenceError {
                    row: row.row,
                    column: "category_id",
                    entity: EntityType::Category,
                    missing_id: product.category_id,
                })
            }
            Record::Sale(sale) if !self.products.contains(&sale.product_id) => Err(ReferenceError {
                row: row.row,
                column: "product_id",
                entity: EntityType::Product,
                missing_id: sale.product_id,
            }),
            _ => Ok(()),
        }
    }

    /// Split rows into resolved ones and dangling references.
    pub fn resolve(&self, rows: Vec<ValidatedRow>) -> (Vec<ValidatedRow>, Vec<ReferenceError>) {
        let mut resolved = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for row in rows {
            match self.check(&row) {
                Ok(()) => resolved.push(row),
                Err(err) => errors.push(err),
            }
        }

        (resolved, errors)
    }
}

pub fn category_exists(conn: &Connection, id: i64) -> Result<bool, StoreError> {
    Ok(db::get_category(conn, id)?.is_some())
}
