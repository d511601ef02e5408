// Schema Validator - per-entity row schemas and type coercion
//
// Turns one raw CSV row (cells keyed by trimmed header) into a typed record,
// or into the first RowError found. Rows are validated independently.

use crate::config::ValueLimits;
use crate::entities::{Category, EntityType, Product, Sale, SaleDate};
use crate::error::{RowError, RowErrorKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

// ============================================================================
// SCHEMAS
// ============================================================================

const CATEGORY_COLUMNS: &[&str] = &["id", "name"];
const PRODUCT_COLUMNS: &[&str] = &["id", "name", "price", "category_id"];
/// `date` may be replaced by `month`
const SALE_COLUMNS: &[&str] = &["id", "product_id", "quantity", "total_price", "date"];

pub fn required_columns(entity: EntityType) -> &'static [&'static str] {
    match entity {
        EntityType::Category => CATEGORY_COLUMNS,
        EntityType::Product => PRODUCT_COLUMNS,
        EntityType::Sale => SALE_COLUMNS,
    }
}

// ============================================================================
// ROWS AND RECORDS
// ============================================================================

/// One data row as read from the file
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub cells: HashMap<String, String>,
}

impl RawRow {
    pub fn new(row: usize, cells: HashMap<String, String>) -> Self {
        RawRow { row, cells }
    }

    /// Build a row from (header, value) pairs; handy for tests and the CLI.
    pub fn from_pairs(row: usize, pairs: &[(&str, &str)]) -> Self {
        let cells = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawRow { row, cells }
    }

    fn cell(&self, column: &str) -> Result<&str, RowError> {
        self.cells
            .get(column)
            .map(|v| v.trim())
            .ok_or_else(|| RowError::missing_column(self.row, column))
    }

    fn non_empty(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Category(Category),
    Product(Product),
    Sale(Sale),
}

impl Record {
    pub fn id(&self) -> i64 {
        match self {
            Record::Category(c) => c.id,
            Record::Product(p) => p.id,
            Record::Sale(s) => s.id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Record::Category(_) => EntityType::Category,
            Record::Product(_) => EntityType::Product,
            Record::Sale(_) => EntityType::Sale,
        }
    }
}

/// A record that passed schema validation, with its source row number
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub row: usize,
    pub record: Record,
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

pub struct SchemaValidator {
    entity: EntityType,
    limits: ValueLimits,
}

impl SchemaValidator {
    pub fn new(entity: EntityType) -> Self {
        Self::with_limits(entity, ValueLimits::default())
    }

    pub fn with_limits(entity: EntityType, limits: ValueLimits) -> Self {
        SchemaValidator { entity, limits }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// Validate one row; stops at the first failing column.
    pub fn validate(&self, row: &RawRow) -> Result<ValidatedRow, RowError> {
        let record = match self.entity {
            EntityType::Category => Record::Category(validate_category(row)?),
            EntityType::Product => Record::Product(validate_product(row, &self.limits)?),
            EntityType::Sale => Record::Sale(validate_sale(row, &self.limits)?),
        };

        Ok(ValidatedRow { row: row.row, record })
    }

    /// Validate every row; one bad row never affects the others.
    pub fn validate_batch(&self, rows: &[RawRow]) -> (Vec<ValidatedRow>, Vec<RowError>) {
        let mut valid = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for row in rows {
            match self.validate(row) {
                Ok(validated) => valid.push(validated),
                Err(err) => errors.push(err),
            }
        }

        (valid, errors)
    }
}

fn validate_category(row: &RawRow) -> Result<Category, RowError> {
    Ok(Category {
        id: integer(row, "id")?,
        name: text(row, "name")?,
    })
}

fn validate_product(row: &RawRow, limits: &ValueLimits) -> Result<Product, RowError> {
    let id = integer(row, "id")?;
    let name = text(row, "name")?;
    let price = decimal(row, "price")?;
    if price <= Decimal::ZERO {
        return Err(RowError::new(
            row.row,
            "price",
            RowErrorKind::NonPositive,
            format!("price must be greater than zero, got {}", price),
        ));
    }
    at_most(row, "price", price, limits.max_amount)?;
    let category_id = integer(row, "category_id")?;

    Ok(Product { id, name, price, category_id })
}

fn validate_sale(row: &RawRow, limits: &ValueLimits) -> Result<Sale, RowError> {
    let id = integer(row, "id")?;
    let product_id = integer(row, "product_id")?;
    let quantity = integer(row, "quantity")?;
    if quantity <= 0 {
        return Err(RowError::new(
            row.row,
            "quantity",
            RowErrorKind::NonPositive,
            format!("quantity must be greater than zero, got {}", quantity),
        ));
    }
    at_most(row, "quantity", quantity, limits.max_quantity)?;
    let total_price = decimal(row, "total_price")?;
    if total_price < Decimal::ZERO {
        return Err(RowError::new(
            row.row,
            "total_price",
            RowErrorKind::Negative,
            format!("total_price must not be negative, got {}", total_price),
        ));
    }
    at_most(row, "total_price", total_price, limits.max_amount)?;
    let date = sale_date(row)?;

    Ok(Sale { id, product_id, quantity, total_price, date })
}

/// `date` wins when it has a value; otherwise fall back to a `month` label.
fn sale_date(row: &RawRow) -> Result<SaleDate, RowError> {
    if let Some(raw) = row.non_empty("date") {
        return SaleDate::parse(raw).ok_or_else(|| {
            RowError::new(
                row.row,
                "date",
                RowErrorKind::InvalidDate,
                format!("cannot parse date '{}'", raw),
            )
        });
    }

    if let Some(label) = row.non_empty("month") {
        return Ok(SaleDate::month_label(label));
    }

    let column = if row.cells.contains_key("date") {
        "date"
    } else if row.cells.contains_key("month") {
        "month"
    } else {
        return Err(RowError::missing_column(row.row, "date"));
    };
    Err(empty(row.row, column))
}

// ============================================================================
// CELL COERCION
// ============================================================================

fn at_most<T>(row: &RawRow, column: &str, value: T, max: T) -> Result<(), RowError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value > max {
        return Err(RowError::new(
            row.row,
            column,
            RowErrorKind::OutOfRange,
            format!("{} must be at most {}, got {}", column, max, value),
        ));
    }
    Ok(())
}

fn empty(row: usize, column: &str) -> RowError {
    RowError::new(row, column, RowErrorKind::EmptyField, format!("{} is empty", column))
}

fn text(row: &RawRow, column: &str) -> Result<String, RowError> {
    let value = row.cell(column)?;
    if value.is_empty() {
        return Err(empty(row.row, column));
    }
    Ok(value.to_string())
}

/// Integers; exports that write whole numbers as `3.0` are accepted.
fn integer(row: &RawRow, column: &str) -> Result<i64, RowError> {
    let value = row.cell(column)?;
    if value.is_empty() {
        return Err(empty(row.row, column));
    }

    if let Ok(n) = value.parse::<i64>() {
        return Ok(n);
    }

    parse_decimal(value)
        .filter(|d| d.fract().is_zero())
        .and_then(|d| d.to_i64())
        .ok_or_else(|| {
            RowError::new(
                row.row,
                column,
                RowErrorKind::NotNumeric,
                format!("{} must be an integer, got '{}'", column, value),
            )
        })
}

fn decimal(row: &RawRow, column: &str) -> Result<Decimal, RowError> {
    let value = row.cell(column)?;
    if value.is_empty() {
        return Err(empty(row.row, column));
    }

    parse_decimal(value).ok_or_else(|| {
        RowError::new(
            row.row,
            column,
            RowErrorKind::NotNumeric,
            format!("{} must be a number, got '{}'", column, value),
        )
    })
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    value
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
        .map(|d| d.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn validate(entity: EntityType, pairs: &[(&str, &str)]) -> Result<Record, RowError> {
        SchemaValidator::new(entity)
            .validate(&RawRow::from_pairs(1, pairs))
            .map(|v| v.record)
    }

    #[test]
    fn test_valid_category() {
        let record = validate(EntityType::Category, &[("id", "1"), ("name", " Games ")]).unwrap();
        assert_eq!(record, Record::Category(Category::new(1, "Games")));
    }

    #[test]
    fn test_category_empty_name() {
        let err = validate(EntityType::Category, &[("id", "1"), ("name", "   ")]).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::EmptyField);
        assert_eq!(err.column.as_deref(), Some("name"));
    }

    #[test]
    fn test_category_missing_column() {
        let err = validate(EntityType::Category, &[("id", "1")]).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::MissingColumn);
        assert_eq!(err.column.as_deref(), Some("name"));
    }

    #[test]
    fn test_valid_product() {
        let record = validate(
            EntityType::Product,
            &[("id", "3"), ("name", "Mouse"), ("price", "49.90"), ("category_id", "2")],
        )
        .unwrap();

        assert_eq!(record, Record::Product(Product::new(3, "Mouse", dec("49.9"), 2)));
    }

    #[test]
    fn test_product_non_positive_price() {
        for price in ["0", "-5"] {
            let err = validate(
                EntityType::Product,
                &[("id", "3"), ("name", "Mouse"), ("price", price), ("category_id", "2")],
            )
            .unwrap_err();
            assert_eq!(err.kind, RowErrorKind::NonPositive);
            assert_eq!(err.column.as_deref(), Some("price"));
        }
    }

    #[test]
    fn test_product_non_numeric_category() {
        let err = validate(
            EntityType::Product,
            &[("id", "3"), ("name", "Mouse"), ("price", "10"), ("category_id", "two")],
        )
        .unwrap_err();
        assert_eq!(err.kind, RowErrorKind::NotNumeric);
        assert_eq!(err.column.as_deref(), Some("category_id"));
    }

    #[test]
    fn test_integer_accepts_whole_floats_only() {
        let ok = validate(EntityType::Category, &[("id", "4.0"), ("name", "A")]).unwrap();
        assert_eq!(ok.id(), 4);

        let err = validate(EntityType::Category, &[("id", "4.5"), ("name", "A")]).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::NotNumeric);
    }

    #[test]
    fn test_valid_sale_with_date() {
        let record = validate(
            EntityType::Sale,
            &[
                ("id", "10"),
                ("product_id", "3"),
                ("quantity", "2"),
                ("total_price", "99.80"),
                ("date", "2024-01-15"),
            ],
        )
        .unwrap();

        let Record::Sale(sale) = record else { panic!("expected a sale") };
        assert_eq!(sale.quantity, 2);
        assert_eq!(sale.total_price, dec("99.8"));
        assert_eq!(sale.date, SaleDate::Day(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    }

    #[test]
    fn test_sale_falls_back_to_month() {
        let record = validate(
            EntityType::Sale,
            &[
                ("id", "10"),
                ("product_id", "3"),
                ("quantity", "1"),
                ("total_price", "0"),
                ("month", "2024-02"),
            ],
        )
        .unwrap();

        let Record::Sale(sale) = record else { panic!("expected a sale") };
        assert_eq!(sale.date, SaleDate::Month("2024-02".to_string()));
        assert_eq!(sale.total_price, Decimal::ZERO);
    }

    #[test]
    fn test_sale_month_cell_is_zero_padded() {
        let record = validate(
            EntityType::Sale,
            &[
                ("id", "11"),
                ("product_id", "3"),
                ("quantity", "1"),
                ("total_price", "5"),
                ("month", "2024-1"),
            ],
        )
        .unwrap();

        let Record::Sale(sale) = record else { panic!("expected a sale") };
        assert_eq!(sale.date, SaleDate::Month("2024-01".to_string()));
        assert_eq!(sale.date.first_day(), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_sale_empty_date_uses_month() {
        let record = validate(
            EntityType::Sale,
            &[
                ("id", "10"),
                ("product_id", "3"),
                ("quantity", "1"),
                ("total_price", "5"),
                ("date", ""),
                ("month", "Jan"),
            ],
        )
        .unwrap();

        let Record::Sale(sale) = record else { panic!("expected a sale") };
        assert_eq!(sale.date.month_key(), "Jan");
    }

    #[test]
    fn test_sale_errors() {
        let base = [("id", "10"), ("product_id", "3"), ("quantity", "1"), ("total_price", "5")];

        let mut no_date = base.to_vec();
        let err = validate(EntityType::Sale, &no_date).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::MissingColumn);
        assert_eq!(err.column.as_deref(), Some("date"));

        no_date.push(("date", "31/31/2024"));
        let err = validate(EntityType::Sale, &no_date).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::InvalidDate);

        let mut zero_qty = base.to_vec();
        zero_qty[2] = ("quantity", "0");
        zero_qty.push(("date", "2024-01-01"));
        let err = validate(EntityType::Sale, &zero_qty).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::NonPositive);
        assert_eq!(err.column.as_deref(), Some("quantity"));

        let mut negative_total = base.to_vec();
        negative_total[3] = ("total_price", "-1");
        negative_total.push(("date", "2024-01-01"));
        let err = validate(EntityType::Sale, &negative_total).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::Negative);
    }

    #[test]
    fn test_values_above_ceiling_are_out_of_range() {
        let sale = |quantity: &str, total: &str| {
            validate(
                EntityType::Sale,
                &[
                    ("id", "1"),
                    ("product_id", "1"),
                    ("quantity", quantity),
                    ("total_price", total),
                    ("date", "2024-01-01"),
                ],
            )
        };

        let err = sale("9223372036854775807", "10").unwrap_err();
        assert_eq!(err.kind, RowErrorKind::OutOfRange);
        assert_eq!(err.column.as_deref(), Some("quantity"));

        let err = sale("1", "79228162514264337593543950335").unwrap_err();
        assert_eq!(err.kind, RowErrorKind::OutOfRange);
        assert_eq!(err.column.as_deref(), Some("total_price"));

        assert!(sale("1000000000", "1000000000000").is_ok());
    }

    #[test]
    fn test_custom_limits_apply_to_price() {
        let limits = ValueLimits {
            max_quantity: 10,
            max_amount: dec("100"),
        };
        let validator = SchemaValidator::with_limits(EntityType::Product, limits);
        let row = |price: &str| {
            RawRow::from_pairs(4, &[("id", "1"), ("name", "A"), ("price", price), ("category_id", "1")])
        };

        assert!(validator.validate(&row("100")).is_ok());
        let err = validator.validate(&row("100.01")).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::OutOfRange);
        assert_eq!(err.row, 4);
    }

    #[test]
    fn test_validate_batch_keeps_rows_independent() {
        let rows = vec![
            RawRow::from_pairs(1, &[("id", "1"), ("name", "A")]),
            RawRow::from_pairs(2, &[("id", "x"), ("name", "B")]),
            RawRow::from_pairs(3, &[("id", "3"), ("name", "C")]),
        ];

        let (valid, errors) = SchemaValidator::new(EntityType::Category).validate_batch(&rows);

        assert_eq!(valid.iter().map(|v| v.row).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 2);
    }

    #[test]
    fn test_required_columns() {
        assert_eq!(required_columns(EntityType::Product), &["id", "name", "price", "category_id"]);
        assert!(required_columns(EntityType::Sale).contains(&"date"));
    }
}
