// CSV Import Pipeline - one uploaded file of one entity type
//
// Parsing → Validating → Resolving → Committing → Done
//
// Only file-level problems move the pipeline to Failed. Row-level problems
// accumulate in the summary, which always accounts for every data row:
// total_rows == inserted + updated + failed.

use crate::config::ImportOptions;
use crate::db::{self, ImportRecord, Store};
use crate::entities::EntityType;
use crate::error::{ImportError, ParseError, RowError};
use crate::resolver::ReferenceResolver;
use crate::schema::{RawRow, SchemaValidator};
use crate::upsert::UpsertEngine;
use chrono::Utc;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const UTF8_BOM: &str = "\u{feff}";

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Parsing,
    Validating,
    Resolving,
    Committing,
    Done,
    Failed,
}

/// Result of one import, returned to the uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub batch_id: String,
    pub entity_type: EntityType,
    pub total_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

/// Rows read from a file, plus records the CSV reader could not decode
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub rows: Vec<RawRow>,
    pub malformed: Vec<RowError>,
}

impl ParsedFile {
    pub fn total_rows(&self) -> usize {
        self.rows.len() + self.malformed.len()
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Decode an uploaded file into raw rows keyed by lower-cased header.
///
/// Fails when the file is over the byte or row ceiling, is not UTF-8, or has
/// no header / no data rows. Records the reader cannot decode become
/// `malformed_record` row errors.
pub fn parse_csv(bytes: &[u8], options: &ImportOptions) -> Result<ParsedFile, ParseError> {
    if bytes.len() > options.max_upload_bytes {
        return Err(ParseError::TooLarge {
            size: bytes.len(),
            limit: options.max_upload_bytes,
        });
    }

    let text = std::str::from_utf8(bytes)?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::NoHeader);
    }

    let mut parsed = ParsedFile::default();

    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        if row > options.max_rows {
            return Err(ParseError::TooManyRows { limit: options.max_rows });
        }

        match result {
            Ok(record) => {
                let cells: HashMap<String, String> = headers
                    .iter()
                    .zip(record.iter())
                    .filter(|(header, _)| !header.is_empty())
                    .map(|(header, value)| (header.clone(), value.to_string()))
                    .collect();
                parsed.rows.push(RawRow::new(row, cells));
            }
            Err(err) => parsed.malformed.push(RowError::malformed(row, err.to_string())),
        }
    }

    if parsed.total_rows() == 0 {
        return Err(ParseError::NoDataRows);
    }

    Ok(parsed)
}

/// Hex SHA-256 of the uploaded bytes, recorded in the import log
pub fn file_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct ImportPipeline<'a> {
    store: &'a Store,
    options: ImportOptions,
    stage: ImportStage,
}

impl<'a> ImportPipeline<'a> {
    pub fn new(store: &'a Store, options: ImportOptions) -> Self {
        ImportPipeline {
            store,
            options,
            stage: ImportStage::Parsing,
        }
    }

    pub fn stage(&self) -> ImportStage {
        self.stage
    }

    fn enter(&mut self, stage: ImportStage) {
        debug!(from = ?self.stage, to = ?stage, "import stage");
        self.stage = stage;
    }

    /// Run the whole pipeline for one file.
    pub fn run(&mut self, entity: EntityType, bytes: &[u8]) -> Result<ImportSummary, ImportError> {
        let result = self.run_stages(entity, bytes);

        match &result {
            Ok(summary) => {
                self.enter(ImportStage::Done);
                info!(
                    batch_id = %summary.batch_id,
                    entity = %entity,
                    total_rows = summary.total_rows,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    failed = summary.failed,
                    "import finished"
                );
            }
            Err(err) => {
                warn!(entity = %entity, stage = ?self.stage, error = %err, "import failed");
                self.enter(ImportStage::Failed);
            }
        }

        result
    }

    fn run_stages(&mut self, entity: EntityType, bytes: &[u8]) -> Result<ImportSummary, ImportError> {
        self.enter(ImportStage::Parsing);
        let parsed = parse_csv(bytes, &self.options)?;
        let total_rows = parsed.total_rows();
        let mut errors = parsed.malformed;

        self.enter(ImportStage::Validating);
        let validator = SchemaValidator::with_limits(entity, self.options.limits);
        let (valid, invalid) = validator.validate_batch(&parsed.rows);
        errors.extend(invalid);

        let batch_id = uuid::Uuid::new_v4().to_string();
        let file_sha256 = file_digest(bytes);
        let engine = UpsertEngine::new(self.options.duplicate_policy);
        let store = self.store;

        let commit = store.write(entity, |conn| -> Result<_, ImportError> {
            self.enter(ImportStage::Resolving);
            let resolver = ReferenceResolver::load(conn, entity)?;
            let (resolved, dangling) = resolver.resolve(valid);
            errors.extend(dangling.into_iter().map(RowError::from));

            self.enter(ImportStage::Committing);
            let commit = engine.apply(conn, entity, resolved)?;
            errors.extend(commit.errors.iter().cloned());

            db::insert_import_record(
                conn,
                &ImportRecord {
                    batch_id: batch_id.clone(),
                    entity_type: entity,
                    file_sha256,
                    total_rows,
                    inserted: commit.inserted,
                    updated: commit.updated,
                    failed: errors.len(),
                    imported_at: Utc::now(),
                },
            )?;

            Ok(commit)
        })?;

        errors.sort_by_key(|e| e.row);

        Ok(ImportSummary {
            batch_id,
            entity_type: entity,
            total_rows,
            inserted: commit.inserted,
            updated: commit.updated,
            failed: errors.len(),
            errors,
        })
    }
}

/// Import one file with a fresh pipeline.
pub fn import_csv(
    store: &Store,
    entity: EntityType,
    bytes: &[u8],
    options: ImportOptions,
) -> Result<ImportSummary, ImportError> {
    ImportPipeline::new(store, options).run(entity, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::error::RowErrorKind;
    use std::collections::HashSet;

    const CATEGORIES: &str = "id,name\n1,Eletrônicos\n2,Games\n";
    const PRODUCTS: &str = "id,name,price,category_id\n1,Notebook,3500.00,1\n2,Console,2500,2\n";

    fn store_with(files: &[(EntityType, &str)]) -> Store {
        crate::logging::init_test();
        let store = Store::open_in_memory().unwrap();
        for (entity, csv) in files {
            import_csv(&store, *entity, csv.as_bytes(), ImportOptions::default()).unwrap();
        }
        store
    }

    #[test]
    fn test_parse_csv_reads_rows_by_header() {
        let parsed = parse_csv(b"ID, Name \n1, Games\n", &ImportOptions::default()).unwrap();

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].row, 1);
        assert_eq!(parsed.rows[0].cells["id"], "1");
        assert_eq!(parsed.rows[0].cells["name"], "Games");
    }

    #[test]
    fn test_parse_csv_strips_bom() {
        let parsed = parse_csv("\u{feff}id,name\n1,A\n".as_bytes(), &ImportOptions::default()).unwrap();
        assert!(parsed.rows[0].cells.contains_key("id"));
    }

    #[test]
    fn test_parse_csv_file_level_failures() {
        let options = ImportOptions::default();

        assert!(matches!(parse_csv(b"", &options), Err(ParseError::NoHeader)));
        assert!(matches!(parse_csv(b"id,name\n", &options), Err(ParseError::NoDataRows)));
        assert!(matches!(parse_csv(&[0xff, 0xfe, 0x00], &options), Err(ParseError::Encoding(_))));
    }

    #[test]
    fn test_parse_csv_enforces_ceilings() {
        let tight = ImportOptions {
            max_upload_bytes: 16,
            max_rows: 2,
            ..ImportOptions::default()
        };
        let too_big = "id,name\n1,abcdefghijklmnop\n";
        assert!(matches!(
            parse_csv(too_big.as_bytes(), &tight),
            Err(ParseError::TooLarge { limit: 16, .. })
        ));

        let many_rows = ImportOptions { max_upload_bytes: 1024, ..tight };
        assert!(matches!(
            parse_csv(b"id\n1\n2\n3\n", &many_rows),
            Err(ParseError::TooManyRows { limit: 2 })
        ));
        assert!(parse_csv(b"id\n1\n2\n", &many_rows).is_ok());
    }

    #[test]
    fn test_pipeline_reaches_done() {
        let store = Store::open_in_memory().unwrap();
        let mut pipeline = ImportPipeline::new(&store, ImportOptions::default());

        let summary = pipeline.run(EntityType::Category, CATEGORIES.as_bytes()).unwrap();

        assert_eq!(pipeline.stage(), ImportStage::Done);
        assert_eq!(summary.entity_type, EntityType::Category);
        assert_eq!((summary.total_rows, summary.inserted, summary.failed), (2, 2, 0));
    }

    #[test]
    fn test_pipeline_fails_only_on_unreadable_file() {
        let store = Store::open_in_memory().unwrap();
        let mut pipeline = ImportPipeline::new(&store, ImportOptions::default());

        let err = pipeline.run(EntityType::Category, b"id,name\n").unwrap_err();

        assert!(matches!(err, ImportError::Parse(ParseError::NoDataRows)));
        assert_eq!(pipeline.stage(), ImportStage::Failed);
        assert!(store.read(|conn| db::recent_imports(conn, 10)).unwrap().is_empty());
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let store = store_with(&[(EntityType::Category, CATEGORIES)]);

        let second = import_csv(&store, EntityType::Category, CATEGORIES.as_bytes(), ImportOptions::default()).unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(store.read(|conn| db::count(conn, EntityType::Category)).unwrap(), 2);
    }

    #[test]
    fn test_valid_rows_commit_despite_invalid_ones() {
        let store = store_with(&[(EntityType::Category, CATEGORIES)]);
        let csv = "id,name,price,category_id\n\
                   1,Notebook,3500,1\n\
                   2,Broken,abc,1\n\
                   3,Orphan,10,99\n\
                   4,Mouse,50,2\n";

        let summary = import_csv(&store, EntityType::Product, csv.as_bytes(), ImportOptions::default()).unwrap();

        assert_eq!(summary.total_rows, 4);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.errors[0].row, 2);
        assert_eq!(summary.errors[0].kind, RowErrorKind::NotNumeric);
        assert_eq!(summary.errors[1].row, 3);
        assert_eq!(summary.errors[1].kind, RowErrorKind::UnknownReference);

        let ids = store.read(|conn| db::ids(conn, EntityType::Product)).unwrap();
        assert_eq!(ids, HashSet::from([1, 4]));
    }

    #[test]
    fn test_sale_with_unknown_product_never_stored() {
        let store = store_with(&[(EntityType::Category, CATEGORIES), (EntityType::Product, PRODUCTS)]);
        let csv = "id,product_id,quantity,total_price,date\n\
                   1,1,1,3500,2024-01-15\n\
                   2,42,1,10,2024-01-16\n";

        let summary = import_csv(&store, EntityType::Sale, csv.as_bytes(), ImportOptions::default()).unwrap();

        assert_eq!((summary.inserted, summary.failed), (1, 1));
        assert_eq!(summary.errors[0].column.as_deref(), Some("product_id"));
        assert!(store.read(|conn| db::get_sale(conn, 2)).unwrap().is_none());
    }

    #[test]
    fn test_import_is_logged_with_digest() {
        let store = store_with(&[(EntityType::Category, CATEGORIES)]);

        let log = store.read(|conn| db::recent_imports(conn, 5)).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log[0].entity_type, EntityType::Category);
        assert_eq!(log[0].file_sha256, file_digest(CATEGORIES.as_bytes()));
        assert_eq!(log[0].file_sha256.len(), 64);
        assert_eq!(log[0].inserted, 2);
    }

    #[test]
    fn test_reject_policy_reports_duplicates() {
        let store = store_with(&[(EntityType::Category, CATEGORIES)]);
        let options = ImportOptions {
            duplicate_policy: DuplicatePolicy::Reject,
            ..ImportOptions::default()
        };

        let summary = import_csv(&store, EntityType::Category, b"id,name\n1,Other\n3,Books\n", options).unwrap();

        assert_eq!((summary.inserted, summary.updated, summary.failed), (1, 0, 1));
        assert_eq!(summary.errors[0].kind, RowErrorKind::DuplicateId);
    }
}
