//! Catalog types and client-side browsing.
//!
//! The listing pages fetch the whole `products` table once and then narrow
//! and order it locally. Everything here is a pure function of the fetched
//! list, so filtering or re-sorting never costs a backend round-trip.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// A fruit offered in the store (`products` table row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_in_stock() -> bool {
    true
}

/// Insert/update payload for a product. Produced by
/// [`ProductForm::validate`](crate::forms::ProductForm::validate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub image: String,
    pub in_stock: bool,
}

impl ProductDraft {
    /// Materialize a row from this draft, as the backend would on insert.
    #[must_use]
    pub fn into_product(self, id: ProductId) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            image: self.image,
            in_stock: self.in_stock,
            created_at: None,
        }
    }
}

/// Listing sort order, as selected in the sort dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOption {
    #[default]
    #[serde(rename = "name-asc")]
    NameAsc,
    #[serde(rename = "name-desc")]
    NameDesc,
    #[serde(rename = "price-asc")]
    PriceAsc,
    #[serde(rename = "price-desc")]
    PriceDesc,
}

impl SortOption {
    /// All options in dropdown order.
    pub const ALL: [Self; 4] = [Self::NameAsc, Self::NameDesc, Self::PriceAsc, Self::PriceDesc];

    /// Query-string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NameAsc => "name-asc",
            Self::NameDesc => "name-desc",
            Self::PriceAsc => "price-asc",
            Self::PriceDesc => "price-desc",
        }
    }

    /// Dropdown label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NameAsc => "Name: A to Z",
            Self::NameDesc => "Name: Z to A",
            Self::PriceAsc => "Price: Low to High",
            Self::PriceDesc => "Price: High to Low",
        }
    }

    /// Parse a query-string value, falling back to the default for
    /// anything unrecognized.
    #[must_use]
    pub fn parse_or_default(value: Option<&str>) -> Self {
        Self::ALL
            .into_iter()
            .find(|option| Some(option.as_str()) == value)
            .unwrap_or_default()
    }
}

/// Case-insensitive substring match over name and description.
fn matches_term(product: &Product, needle: &str) -> bool {
    product.name.to_lowercase().contains(needle)
        || product.description.to_lowercase().contains(needle)
}

/// Keep the products whose name or description contains `term`,
/// ignoring case. A blank term keeps everything.
#[must_use]
pub fn search<'a>(products: &'a [Product], term: &str) -> Vec<&'a Product> {
    let needle = term.trim().to_lowercase();
    products
        .iter()
        .filter(|product| needle.is_empty() || matches_term(product, &needle))
        .collect()
}

/// Admin-table search: name only.
#[must_use]
pub fn search_by_name<'a>(products: &'a [Product], term: &str) -> Vec<&'a Product> {
    let needle = term.trim().to_lowercase();
    products
        .iter()
        .filter(|product| needle.is_empty() || product.name.to_lowercase().contains(&needle))
        .collect()
}

fn by_name(a: &Product, b: &Product) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

fn by_price(a: &Product, b: &Product) -> Ordering {
    a.price.cmp(&b.price).then_with(|| by_name(a, b))
}

/// Sort in place.
///
/// Every ordering is total (ties fall through to name and then id), so a
/// descending sort is always the exact reverse of the ascending one.
pub fn sort(products: &mut [&Product], option: SortOption) {
    match option {
        SortOption::NameAsc => products.sort_by(|a, b| by_name(a, b)),
        SortOption::NameDesc => products.sort_by(|a, b| by_name(b, a)),
        SortOption::PriceAsc => products.sort_by(|a, b| by_price(a, b)),
        SortOption::PriceDesc => products.sort_by(|a, b| by_price(b, a)),
    }
}

/// Search then sort: the listing page's derived view.
#[must_use]
pub fn browse<'a>(products: &'a [Product], term: &str, option: SortOption) -> Vec<&'a Product> {
    let mut found = search(products, term);
    sort(&mut found, option);
    found
}

/// Up to `limit` in-stock products for the home page, in catalog order.
#[must_use]
pub fn featured(products: &[Product], limit: usize) -> Vec<&Product> {
    products.iter().filter(|p| p.in_stock).take(limit).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn fruit(id: i64, name: &str, description: &str, cents: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            description: description.to_string(),
            price: Price::from_cents(cents),
            image: format!("https://img.orchard.test/{id}.jpg"),
            in_stock: true,
            created_at: None,
        }
    }

    fn catalog() -> Vec<Product> {
        vec![
            fruit(1, "Mango", "Sweet tropical stone fruit", 250),
            fruit(2, "apple", "Crisp and tart", 120),
            fruit(3, "Banana", "Rich in potassium", 80),
            fruit(4, "Cherry", "Small, dark and juicy", 120),
        ]
    }

    fn names(products: &[&Product]) -> Vec<String> {
        products.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn search_matches_description_only_terms() {
        let products = catalog();
        let found = search(&products, "POTASSIUM");
        assert_eq!(names(&found), vec!["Banana"]);
    }

    #[test]
    fn search_is_case_insensitive_on_names() {
        let products = catalog();
        assert_eq!(names(&search(&products, "APPLE")), vec!["apple"]);
        assert_eq!(search(&products, "   ").len(), 4);
    }

    #[test]
    fn admin_search_ignores_description() {
        let products = catalog();
        assert!(search_by_name(&products, "potassium").is_empty());
        assert_eq!(names(&search_by_name(&products, "an")), vec!["Mango", "Banana"]);
    }

    #[test]
    fn name_sort_ignores_case() {
        let products = catalog();
        let sorted = browse(&products, "", SortOption::NameAsc);
        assert_eq!(names(&sorted), vec!["apple", "Banana", "Cherry", "Mango"]);
    }

    #[test]
    fn price_descending_reverses_ascending_even_with_ties() {
        let products = catalog();
        let asc = browse(&products, "", SortOption::PriceAsc);
        let mut desc = browse(&products, "", SortOption::PriceDesc);
        desc.reverse();
        assert_eq!(names(&asc), names(&desc));
        assert_eq!(names(&asc), vec!["Banana", "apple", "Cherry", "Mango"]);
    }

    #[test]
    fn unknown_sort_value_falls_back_to_default() {
        assert_eq!(SortOption::parse_or_default(Some("price-desc")), SortOption::PriceDesc);
        assert_eq!(SortOption::parse_or_default(Some("weight")), SortOption::NameAsc);
        assert_eq!(SortOption::parse_or_default(None), SortOption::NameAsc);
    }

    #[test]
    fn featured_skips_out_of_stock() {
        let mut products = catalog();
        products[0].in_stock = false;
        let picked = featured(&products, 2);
        assert_eq!(names(&picked), vec!["apple", "Banana"]);
    }
}
