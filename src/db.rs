use crate::entities::{Category, EntityType, Product, Sale, SaleDate};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================================================
// STORE HANDLE
// ============================================================================

/// Owned handle to the SQLite store.
///
/// Created once per process and shared (behind an `Arc`) by the import
/// pipeline, the analytics aggregator, the query engine and the catalog.
/// Writers of one entity type are serialized by that type's commit lock and
/// every commit runs in one SQLite transaction, so readers only ever observe
/// fully applied batches.
pub struct Store {
    conn: Mutex<Connection>,
    commit_locks: [Mutex<()>; 3],
}

impl Store {
    /// Open (or create) a database file. `:memory:` opens a private in-memory store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }

        let conn = Connection::open(path)?;
        // WAL for crash recovery
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        setup_database(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
            commit_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        })
    }

    /// Run `f` as one commit for `entity`, serialized against other writers
    /// of the same entity type.
    pub fn write<T, E, F>(&self, entity: EntityType, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.write_many(&[entity], f)
    }

    /// Like [`Store::write`] for mutations spanning several entity types.
    /// Commit locks are always taken in the same order.
    pub fn write_many<T, E, F>(&self, entities: &[EntityType], f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut order: Vec<usize> = entities.iter().map(EntityType::index).collect();
        order.sort_unstable();
        order.dedup();

        let _writers: Vec<MutexGuard<'_, ()>> = order
            .into_iter()
            .map(|i| self.commit_locks[i].lock().unwrap_or_else(PoisonError::into_inner))
            .collect();

        let mut conn = self.connection();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let out = f(&*tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    /// Run a read inside a transaction so it sees one consistent snapshot.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.connection();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let out = f(&*tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    /// A panicking closure's transaction is rolled back on drop, which
    /// leaves a poisoned connection usable.
    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Referential integrity is checked by the resolver so that violations
    // become per-row errors instead of aborting the batch.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            price TEXT NOT NULL,
            category_id INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sales (
            id INTEGER PRIMARY KEY,
            product_id INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            total_price TEXT NOT NULL,
            date TEXT,
            month TEXT
        );

        CREATE TABLE IF NOT EXISTS import_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT UNIQUE NOT NULL,
            entity_type TEXT NOT NULL,
            file_sha256 TEXT NOT NULL,
            total_rows INTEGER NOT NULL,
            inserted INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            imported_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);
        CREATE INDEX IF NOT EXISTS idx_sales_product ON sales(product_id);
        CREATE INDEX IF NOT EXISTS idx_import_log_time ON import_log(imported_at);",
    )?;

    Ok(())
}

pub fn count(conn: &Connection, entity: EntityType) -> Result<i64, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {}", entity.plural());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}

/// Ids currently stored for one entity type
pub fn ids(conn: &Connection, entity: EntityType) -> Result<HashSet<i64>, StoreError> {
    let sql = format!("SELECT id FROM {}", entity.plural());
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<i64>, _>>()?;
    Ok(ids)
}

/// Next free id (`max(id) + 1`) for records created outside an import
pub fn next_id(conn: &Connection, entity: EntityType) -> Result<i64, StoreError> {
    let sql = format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {}", entity.plural());
    let id: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(id)
}

fn parse_decimal(table: &'static str, column: &'static str, raw: String) -> Result<Decimal, StoreError> {
    raw.parse::<Decimal>()
        .map_err(|_| StoreError::Corrupt { table, column, value: raw })
}

// ============================================================================
// CATEGORIES
// ============================================================================

pub fn save_category(conn: &Connection, category: &Category) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO categories (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![category.id, category.name],
    )?;
    Ok(())
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Option<Category>, StoreError> {
    let category = conn
        .query_row(
            "SELECT id, name FROM categories WHERE id = ?1",
            [id],
            |row| Ok(Category { id: row.get(0)?, name: row.get(1)? }),
        )
        .optional()?;
    Ok(category)
}

pub fn all_categories(conn: &Connection) -> Result<Vec<Category>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id")?;
    let categories = stmt
        .query_map([], |row| Ok(Category { id: row.get(0)?, name: row.get(1)? }))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

/// Whether another category (other than `except`) already uses `name`
pub fn category_name_taken(conn: &Connection, name: &str, except: Option<i64>) -> Result<bool, StoreError> {
    let taken: i64 = conn.query_row(
        "SELECT COUNT(*) FROM categories WHERE name = ?1 AND id != COALESCE(?2, -1)",
        params![name, except],
        |row| row.get(0),
    )?;
    Ok(taken > 0)
}

pub fn delete_category(conn: &Connection, id: i64) -> Result<bool, StoreError> {
    let deleted = conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

pub fn count_products_in_category(conn: &Connection, category_id: i64) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE category_id = ?1",
        [category_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

// ============================================================================
// PRODUCTS
// ============================================================================

struct ProductRow {
    id: i64,
    name: String,
    price: String,
    category_id: i64,
}

impl ProductRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(ProductRow {
            id: row.get(0)?,
            name: row.get(1)?,
            price: row.get(2)?,
            category_id: row.get(3)?,
        })
    }

    fn into_product(self) -> Result<Product, StoreError> {
        Ok(Product {
            id: self.id,
            name: self.name,
            price: parse_decimal("products", "price", self.price)?,
            category_id: self.category_id,
        })
    }
}

pub fn save_product(conn: &Connection, product: &Product) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO products (id, name, price, category_id) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            price = excluded.price,
            category_id = excluded.category_id",
        params![product.id, product.name, product.price.to_string(), product.category_id],
    )?;
    Ok(())
}

pub fn get_product(conn: &Connection, id: i64) -> Result<Option<Product>, StoreError> {
    conn.query_row(
        "SELECT id, name, price, category_id FROM products WHERE id = ?1",
        [id],
        ProductRow::from_row,
    )
    .optional()?
    .map(ProductRow::into_product)
    .transpose()
}

/// All products in ascending id order
pub fn all_products(conn: &Connection) -> Result<Vec<Product>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, price, category_id FROM products ORDER BY id")?;
    let rows = stmt
        .query_map([], ProductRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(ProductRow::into_product).collect()
}

pub fn delete_product(conn: &Connection, id: i64) -> Result<bool, StoreError> {
    let deleted = conn.execute("DELETE FROM products WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

// ============================================================================
// SALES
// ============================================================================

struct SaleRow {
    id: i64,
    product_id: i64,
    quantity: i64,
    total_price: String,
    date: Option<String>,
    month: Option<String>,
}

impl SaleRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(SaleRow {
            id: row.get(0)?,
            product_id: row.get(1)?,
            quantity: row.get(2)?,
            total_price: row.get(3)?,
            date: row.get(4)?,
            month: row.get(5)?,
        })
    }

    fn into_sale(self) -> Result<Sale, StoreError> {
        let raw_date = format!("{:?}/{:?}", self.date, self.month);
        let date = SaleDate::from_columns(self.date, self.month).ok_or(StoreError::Corrupt {
            table: "sales",
            column: "date",
            value: raw_date,
        })?;

        Ok(Sale {
            id: self.id,
            product_id: self.product_id,
            quantity: self.quantity,
            total_price: parse_decimal("sales", "total_price", self.total_price)?,
            date,
        })
    }
}

const SALE_COLUMNS: &str = "id, product_id, quantity, total_price, date, month";

pub fn save_sale(conn: &Connection, sale: &Sale) -> Result<(), StoreError> {
    let (date, month) = sale.date.to_columns();
    conn.execute(
        "INSERT INTO sales (id, product_id, quantity, total_price, date, month)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            product_id = excluded.product_id,
            quantity = excluded.quantity,
            total_price = excluded.total_price,
            date = excluded.date,
            month = excluded.month",
        params![
            sale.id,
            sale.product_id,
            sale.quantity,
            sale.total_price.to_string(),
            date,
            month,
        ],
    )?;
    Ok(())
}

pub fn get_sale(conn: &Connection, id: i64) -> Result<Option<Sale>, StoreError> {
    let sql = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);
    conn.query_row(&sql, [id], SaleRow::from_row)
        .optional()?
        .map(SaleRow::into_sale)
        .transpose()
}

/// All sales in ascending id order
pub fn all_sales(conn: &Connection) -> Result<Vec<Sale>, StoreError> {
    let sql = format!("SELECT {} FROM sales ORDER BY id", SALE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], SaleRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(SaleRow::into_sale).collect()
}

pub fn sales_for_product(conn: &Connection, product_id: i64) -> Result<Vec<Sale>, StoreError> {
    let sql = format!("SELECT {} FROM sales WHERE product_id = ?1 ORDER BY id", SALE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([product_id], SaleRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(SaleRow::into_sale).collect()
}

pub fn count_sales_for_product(conn: &Connection, product_id: i64) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sales WHERE product_id = ?1",
        [product_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn delete_sales_for_product(conn: &Connection, product_id: i64) -> Result<usize, StoreError> {
    let deleted = conn.execute("DELETE FROM sales WHERE product_id = ?1", [product_id])?;
    Ok(deleted)
}

// ============================================================================
// IMPORT LOG (audit trail)
// ============================================================================

/// One completed import, as recorded in the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub batch_id: String,
    pub entity_type: EntityType,
    pub file_sha256: String,
    pub total_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub imported_at: DateTime<Utc>,
}

pub fn insert_import_record(conn: &Connection, record: &ImportRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO import_log (
            batch_id, entity_type, file_sha256, total_rows, inserted, updated, failed, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.batch_id,
            record.entity_type.singular(),
            record.file_sha256,
            record.total_rows as i64,
            record.inserted as i64,
            record.updated as i64,
            record.failed as i64,
            record.imported_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Most recent imports first
pub fn recent_imports(conn: &Connection, limit: usize) -> Result<Vec<ImportRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT batch_id, entity_type, file_sha256, total_rows, inserted, updated, failed, imported_at
         FROM import_log
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(batch_id, entity, sha, total, inserted, updated, failed, at)| {
            let entity_type = entity.parse::<EntityType>().map_err(|_| StoreError::Corrupt {
                table: "import_log",
                column: "entity_type",
                value: entity.clone(),
            })?;
            let imported_at = DateTime::parse_from_rfc3339(&at)
                .map_err(|_| StoreError::Corrupt {
                    table: "import_log",
                    column: "imported_at",
                    value: at.clone(),
                })?
                .with_timezone(&Utc);

            Ok(ImportRecord {
                batch_id,
                entity_type,
                file_sha256: sha,
                total_rows: total as usize,
                inserted: inserted as usize,
                updated: updated as usize,
                failed: failed as usize,
                imported_at,
            })
        })
        .collect()
}
