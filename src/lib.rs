// Retail Analytics - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod logging;

pub mod schema;    // Schema Validator
pub mod resolver;  // Reference Resolver
pub mod upsert;    // Upsert Engine
pub mod importer;  // CSV Import Pipeline
pub mod analytics; // Analytics Aggregator
pub mod query;     // Product Query Engine
pub mod catalog;   // CRUD pass-through

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use analytics::{
    AnalyticsAggregator, CategorySales, Dashboard, MonthlySales, ProductSales, SalesSummary,
};
pub use catalog::{Catalog, DeleteOutcome, NewCategory, NewProduct, ProductUpdate};
pub use config::{AppConfig, DeletePolicy, DuplicatePolicy, ImportOptions, ValueLimits};
pub use db::{ImportRecord, Store};
pub use entities::{Category, EntityType, Product, ProductView, Sale, SaleDate};
pub use error::{
    CatalogError, ConfigError, ConflictError, ImportError, ParseError, ReferenceError, RowError,
    RowErrorKind, StoreError,
};
pub use importer::{import_csv, ImportPipeline, ImportStage, ImportSummary};
pub use query::{ProductFilter, ProductQueryEngine};
pub use resolver::ReferenceResolver;
pub use schema::{RawRow, Record, SchemaValidator, ValidatedRow};
pub use upsert::{CommitSummary, UpsertEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
