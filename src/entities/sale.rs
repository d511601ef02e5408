// Sale Entity - one sales line for one Product
//
// The date is either a calendar day or, for exports that only carry a
// `month` column, the raw month label. Both bucket into a month key.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Date formats accepted in a `date` cell, tried in order
const DAY_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

// ============================================================================
// SALE DATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SaleDate {
    Day(NaiveDate),
    Month(String),
}

impl SaleDate {
    /// Parse a `date` cell. `YYYY-MM` is accepted and kept as a month label.
    pub fn parse(raw: &str) -> Option<SaleDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        for format in DAY_FORMATS {
            if let Ok(day) = NaiveDate::parse_from_str(raw, format) {
                return Some(SaleDate::Day(day));
            }
        }

        parse_year_month(raw).map(|(year, month)| SaleDate::Month(year_month_key(year, month)))
    }

    /// A `month` cell: `YYYY-M` normalizes to `YYYY-MM`, any other label is
    /// kept verbatim (trimmed).
    pub fn month_label(raw: &str) -> SaleDate {
        let raw = raw.trim();
        match parse_year_month(raw) {
            Some((year, month)) => SaleDate::Month(year_month_key(year, month)),
            None => SaleDate::Month(raw.to_string()),
        }
    }

    /// Bucket key for monthly aggregation: `YYYY-MM`, or the raw label
    pub fn month_key(&self) -> String {
        match self {
            SaleDate::Day(day) => year_month_key(day.year(), day.month()),
            SaleDate::Month(label) => label.clone(),
        }
    }

    /// First calendar day covered by this date, when one can be determined
    pub fn first_day(&self) -> Option<NaiveDate> {
        match self {
            SaleDate::Day(day) => Some(*day),
            SaleDate::Month(label) => {
                parse_year_month(label).and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
            }
        }
    }

    /// Split into the (`date`, `month`) columns stored in the sales table
    pub fn to_columns(&self) -> (Option<String>, Option<String>) {
        match self {
            SaleDate::Day(day) => (Some(day.format("%Y-%m-%d").to_string()), None),
            SaleDate::Month(label) => (None, Some(label.clone())),
        }
    }

    pub fn from_columns(date: Option<String>, month: Option<String>) -> Option<SaleDate> {
        match (date, month) {
            (Some(date), _) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .ok()
                .map(SaleDate::Day),
            (None, Some(month)) => Some(SaleDate::Month(month)),
            (None, None) => None,
        }
    }
}

impl fmt::Display for SaleDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleDate::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
            SaleDate::Month(label) => f.write_str(label),
        }
    }
}

impl Serialize for SaleDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SaleDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SaleDate::parse(&raw).unwrap_or_else(|| SaleDate::month_label(&raw)))
    }
}

fn year_month_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// Parse a `YYYY-MM` label into (year, month).
pub fn parse_year_month(label: &str) -> Option<(i32, u32)> {
    let (year, month) = label.trim().split_once('-')?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// Chronological order for month keys; non `YYYY-MM` labels sort last.
pub fn compare_month_keys(a: &str, b: &str) -> Ordering {
    match (parse_year_month(a), parse_year_month(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

// ============================================================================
// SALE ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    /// Must reference an existing product at commit time
    pub product_id: i64,
    /// Always > 0
    pub quantity: i64,
    /// Always >= 0
    pub total_price: Decimal,
    pub date: SaleDate,
}
