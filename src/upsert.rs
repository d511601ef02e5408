// Upsert Engine - applies validated, resolved records to the store
//
// Insert when the id is absent, overwrite every field when it is present.
// Valid rows are applied and invalid ones skipped; a batch is never
// all-or-nothing at the row level.

use crate::config::DuplicatePolicy;
use crate::db;
use crate::entities::EntityType;
use crate::error::{RowError, StoreError};
use crate::schema::{Record, ValidatedRow};
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

pub struct UpsertEngine {
    policy: DuplicatePolicy,
}

impl UpsertEngine {
    pub fn new(policy: DuplicatePolicy) -> Self {
        UpsertEngine { policy }
    }

    /// Apply `rows` (all of type `entity`) on `conn`.
    ///
    /// Must run inside the entity's commit section (see `Store::write`).
    /// An id repeated within the batch behaves like a re-import: the later
    /// row overwrites the earlier one, or is rejected under
    /// `DuplicatePolicy::Reject`.
    pub fn apply(
        &self,
        conn: &Connection,
        entity: EntityType,
        rows: Vec<ValidatedRow>,
    ) -> Result<CommitSummary, StoreError> {
        let mut existing = db::ids(conn, entity)?;
        let mut summary = CommitSummary::default();

        for row in rows {
            debug_assert_eq!(row.record.entity_type(), entity);
            let id = row.record.id();
            let present = existing.contains(&id);

            if present && self.policy == DuplicatePolicy::Reject {
                summary.failed += 1;
                summary.errors.push(RowError::duplicate_id(row.row, entity, id));
                continue;
            }

            save_record(conn, &row.record)?;

            if present {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
                existing.insert(id);
            }
        }

        debug!(
            entity = %entity,
            inserted = summary.inserted,
            updated = summary.updated,
            rejected = summary.failed,
            "upsert applied"
        );

        Ok(summary)
    }
}

fn save_record(conn: &Connection, record: &Record) -> Result<(), StoreError> {
    match record {
        Record::Category(category) => db::save_category(conn, category),
        Record::Product(product) => db::save_product(conn, product),
        Record::Sale(sale) => db::save_sale(conn, sale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Category;
    use crate::error::RowErrorKind;

    fn category_row(row: usize, id: i64, name: &str) -> ValidatedRow {
        ValidatedRow {
            row,
            record: Record::Category(Category::new(id, name)),
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_then_overwrite() {
        let conn = test_conn();
        let engine = UpsertEngine::new(DuplicatePolicy::Overwrite);

        let first = engine
            .apply(&conn, EntityType::Category, vec![category_row(1, 1, "A"), category_row(2, 2, "B")])
            .unwrap();
        assert_eq!((first.inserted, first.updated, first.failed), (2, 0, 0));

        let second = engine
            .apply(&conn, EntityType::Category, vec![category_row(1, 1, "A2")])
            .unwrap();
        assert_eq!((second.inserted, second.updated), (0, 1));
        assert_eq!(db::get_category(&conn, 1).unwrap().unwrap().name, "A2");
    }

    #[test]
    fn test_repeated_id_within_batch_overwrites() {
        let conn = test_conn();
        let engine = UpsertEngine::new(DuplicatePolicy::Overwrite);

        let summary = engine
            .apply(&conn, EntityType::Category, vec![category_row(1, 7, "old"), category_row(2, 7, "new")])
            .unwrap();

        assert_eq!((summary.inserted, summary.updated), (1, 1));
        assert_eq!(db::get_category(&conn, 7).unwrap().unwrap().name, "new");
    }

    #[test]
    fn test_reject_policy_keeps_stored_record() {
        let conn = test_conn();
        db::save_category(&conn, &Category::new(1, "kept")).unwrap();
        let engine = UpsertEngine::new(DuplicatePolicy::Reject);

        let summary = engine
            .apply(&conn, EntityType::Category, vec![category_row(1, 1, "ignored"), category_row(2, 2, "B")])
            .unwrap();

        assert_eq!((summary.inserted, summary.updated, summary.failed), (1, 0, 1));
        assert_eq!(summary.errors[0].kind, RowErrorKind::DuplicateId);
        assert_eq!(summary.errors[0].row, 1);
        assert_eq!(db::get_category(&conn, 1).unwrap().unwrap().name, "kept");
    }
}
