// Entity Models - the three linked record types held by the store
//
// Category 1:N Product 1:N Sale. Ids are caller-supplied integers.

pub mod category;
pub mod product;
pub mod sale;

pub use category::Category;
pub use product::{Product, ProductView};
pub use sale::{Sale, SaleDate};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Category,
    Product,
    Sale,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Category, EntityType::Product, EntityType::Sale];

    /// Singular tag, used in error messages and the import log
    pub fn singular(&self) -> &'static str {
        match self {
            EntityType::Category => "category",
            EntityType::Product => "product",
            EntityType::Sale => "sale",
        }
    }

    /// Plural form, used in upload routes and table names
    pub fn plural(&self) -> &'static str {
        match self {
            EntityType::Category => "categories",
            EntityType::Product => "products",
            EntityType::Sale => "sales",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            EntityType::Category => 0,
            EntityType::Product => 1,
            EntityType::Sale => 2,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

impl FromStr for EntityType {
    type Err = String;

    /// Accepts both singular and plural tags, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" | "categories" => Ok(EntityType::Category),
            "product" | "products" => Ok(EntityType::Product),
            "sale" | "sales" => Ok(EntityType::Sale),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_from_str_accepts_both_forms() {
        assert_eq!("categories".parse::<EntityType>(), Ok(EntityType::Category));
        assert_eq!("Product".parse::<EntityType>(), Ok(EntityType::Product));
        assert_eq!(" sales ".parse::<EntityType>(), Ok(EntityType::Sale));
        assert!("customers".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_entity_type_names() {
        for entity in EntityType::ALL {
            assert!(entity.plural().starts_with(&entity.singular()[..3]));
        }
        assert_eq!(EntityType::Category.plural(), "categories");
        assert_eq!(EntityType::Sale.to_string(), "sale");
    }
}
