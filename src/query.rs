// Product Query Engine - conjunctive catalog filtering

use crate::db::{self, Store};
use crate::entities::Product;
use crate::error::StoreError;
use rust_decimal::Decimal;

/// The four recognized product filters. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    /// Case-insensitive substring of the product name
    pub search: Option<String>,
    pub category_id: Option<i64>,
    /// Inclusive lower price bound
    pub min_price: Option<Decimal>,
    /// Inclusive upper price bound
    pub max_price: Option<Decimal>,
}

impl ProductFilter {
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn price_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.needle().is_none()
            && self.category_id.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
    }

    // A blank search term does not constrain anything
    fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, product: &Product) -> bool {
        self.matches_with(product, self.needle().as_deref())
    }

    fn matches_with(&self, product: &Product, needle: Option<&str>) -> bool {
        if let Some(needle) = needle {
            if !product.name.to_lowercase().contains(needle) {
                return false;
            }
        }
        if self.category_id.is_some_and(|id| id != product.category_id) {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        true
    }

    /// Keep matching products, ordered by ascending id.
    pub fn apply(&self, products: Vec<Product>) -> Vec<Product> {
        let needle = self.needle();
        let mut matched: Vec<Product> = products
            .into_iter()
            .filter(|p| self.matches_with(p, needle.as_deref()))
            .collect();
        matched.sort_by_key(|p| p.id);
        matched
    }
}

pub struct ProductQueryEngine<'a> {
    store: &'a Store,
}

impl<'a> ProductQueryEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        ProductQueryEngine { store }
    }

    pub fn run(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let products = self.store.read(db::all_products)?;
        Ok(filter.apply(products))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn catalog() -> Vec<Product> {
        vec![
            Product::new(2, "Gadget", dec("50"), 2),
            Product::new(1, "Widget", dec("10"), 1),
            Product::new(3, "Mini Widget Pro", dec("20"), 2),
        ]
    }

    fn ids(products: &[Product]) -> Vec<i64> {
        products.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_no_filter_returns_full_catalog_by_id() {
        let filter = ProductFilter::default();

        assert!(filter.is_empty());
        assert_eq!(ids(&filter.apply(catalog())), vec![1, 2, 3]);
    }

    #[test]
    fn test_search_and_max_price_compose() {
        let products = vec![
            Product::new(1, "Widget", dec("10"), 1),
            Product::new(2, "Gadget", dec("50"), 2),
        ];
        let filter = ProductFilter::default().search("wid").price_range(None, Some(dec("20")));

        assert_eq!(ids(&filter.apply(products)), vec![1]);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let filter = ProductFilter::default().search("WIDGET");
        assert_eq!(ids(&filter.apply(catalog())), vec![1, 3]);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = ProductFilter::default().search("   ");

        assert!(filter.is_empty());
        assert_eq!(filter.apply(catalog()).len(), 3);
    }

    #[test]
    fn test_price_bounds_are_inclusive() {
        let filter = ProductFilter::default().price_range(Some(dec("10")), Some(dec("20")));
        assert_eq!(ids(&filter.apply(catalog())), vec![1, 3]);

        let above = ProductFilter::default().price_range(Some(dec("20.01")), None);
        assert_eq!(ids(&above.apply(catalog())), vec![2]);
    }

    #[test]
    fn test_category_filter() {
        let filter = ProductFilter::default().category(2);
        assert_eq!(ids(&filter.apply(catalog())), vec![2, 3]);

        let none = ProductFilter::default().category(2).search("widget").price_range(None, Some(dec("5")));
        assert!(none.apply(catalog()).is_empty());
    }

    #[test]
    fn test_engine_reads_store() {
        let store = Store::open_in_memory().unwrap();
        store
            .write(crate::entities::EntityType::Product, |conn| -> Result<(), StoreError> {
                for product in catalog() {
                    db::save_product(conn, &product)?;
                }
                Ok(())
            })
            .unwrap();

        let found = ProductQueryEngine::new(&store)
            .run(&ProductFilter::default().search("gad"))
            .unwrap();

        assert_eq!(ids(&found), vec![2]);
        assert_eq!(found[0].price, dec("50"));
    }
}
