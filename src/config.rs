// Configuration - environment driven, with `.env` support
//
// Every ceiling and policy lives here rather than as a constant in the
// pipeline, so operators can tune uploads without a rebuild.

use crate::error::ConfigError;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_ROWS: usize = 100_000;
pub const DEFAULT_TOP_PRODUCTS: usize = 10;
pub const DEFAULT_MAX_QUANTITY: i64 = 1_000_000_000;
pub const DEFAULT_MAX_AMOUNT: i64 = 1_000_000_000_000;

// ============================================================================
// POLICIES
// ============================================================================

/// What to do with an imported row whose id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Overwrite every field of the existing record (upsert)
    #[default]
    Overwrite,
    /// Report the row as a `duplicate_id` error and keep the stored record
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" | "upsert" => Ok(DuplicatePolicy::Overwrite),
            "reject" => Ok(DuplicatePolicy::Reject),
            _ => Err("expected 'overwrite' or 'reject'".to_string()),
        }
    }
}

/// What happens to sales when their product is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Refuse the delete with a conflict while sales reference the product
    #[default]
    Block,
    /// Delete the referencing sales together with the product
    Cascade,
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(DeletePolicy::Block),
            "cascade" => Ok(DeletePolicy::Cascade),
            _ => Err("expected 'block' or 'cascade'".to_string()),
        }
    }
}

// ============================================================================
// IMPORT OPTIONS
// ============================================================================

/// Largest values a single imported row may carry.
///
/// Keeps stored quantities and amounts far enough from the numeric limits
/// that dashboard totals over the whole store stay representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLimits {
    /// Inclusive ceiling for a sale's `quantity`
    pub max_quantity: i64,
    /// Inclusive ceiling for `price` and `total_price`
    pub max_amount: Decimal,
}

impl Default for ValueLimits {
    fn default() -> Self {
        ValueLimits {
            max_quantity: DEFAULT_MAX_QUANTITY,
            max_amount: Decimal::from(DEFAULT_MAX_AMOUNT),
        }
    }
}

/// Subset of the configuration the import pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub max_upload_bytes: usize,
    pub max_rows: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub limits: ValueLimits,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_rows: DEFAULT_MAX_ROWS,
            duplicate_policy: DuplicatePolicy::Overwrite,
            limits: ValueLimits::default(),
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub import: ImportOptions,
    pub product_delete_policy: DeletePolicy,
    pub top_products_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("retail.db"),
            bind_addr: "0.0.0.0:8000".to_string(),
            import: ImportOptions::default(),
            product_delete_policy: DeletePolicy::Block,
            top_products_limit: DEFAULT_TOP_PRODUCTS,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read `RETAIL_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = lookup("RETAIL_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("RETAIL_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(value) = read::<usize, _>(&lookup, "RETAIL_MAX_UPLOAD_BYTES")? {
            config.import.max_upload_bytes = positive("RETAIL_MAX_UPLOAD_BYTES", value)?;
        }
        if let Some(value) = read::<usize, _>(&lookup, "RETAIL_MAX_ROWS")? {
            config.import.max_rows = positive("RETAIL_MAX_ROWS", value)?;
        }
        if let Some(value) = read::<i64, _>(&lookup, "RETAIL_MAX_QUANTITY")? {
            config.import.limits.max_quantity = positive("RETAIL_MAX_QUANTITY", value)?;
        }
        if let Some(value) = read::<Decimal, _>(&lookup, "RETAIL_MAX_AMOUNT")? {
            config.import.limits.max_amount = positive("RETAIL_MAX_AMOUNT", value)?;
        }
        if let Some(policy) = read(&lookup, "RETAIL_DUPLICATE_POLICY")? {
            config.import.duplicate_policy = policy;
        }
        if let Some(policy) = read(&lookup, "RETAIL_PRODUCT_DELETE")? {
            config.product_delete_policy = policy;
        }
        if let Some(value) = read::<usize, _>(&lookup, "RETAIL_TOP_PRODUCTS")? {
            config.top_products_limit = positive("RETAIL_TOP_PRODUCTS", value)?;
        }

        Ok(config)
    }
}

fn read<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError {
            key: key.to_string(),
            value: raw.clone(),
            message: e.to_string(),
        }),
    }
}

fn positive<T>(key: &str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + ToString,
{
    if value <= T::default() {
        return Err(ConfigError {
            key: key.to_string(),
            value: value.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
