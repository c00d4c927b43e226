//! Seed the catalog from a YAML file.
//!
//! The whole file is validated before anything is written, using the same
//! rules as the admin product form.
//!
//! ```yaml
//! - name: Honeycrisp Apple
//!   description: Crisp, sweet and a little tart.
//!   price: 1.25
//!   image: https://images.example.com/apple.jpg
//! - name: Blood Orange
//!   description: Deep red flesh with berry notes.
//!   price: 1.80
//!   image: https://images.example.com/orange.jpg
//!   in_stock: false
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

use orchard_core::ProductDraft;
use orchard_core::forms::ProductForm;
use orchard_storefront::backend::Gateway;

use super::{CliError, service_client};

/// One product entry in the seed file.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Kept as text so the admin form's price rules apply unchanged.
    pub price: serde_yaml::Value,
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

const fn default_in_stock() -> bool {
    true
}

impl SeedProduct {
    fn to_form(&self) -> ProductForm {
        let price = match &self.price {
            serde_yaml::Value::String(text) => text.clone(),
            serde_yaml::Value::Number(number) => number.to_string(),
            _ => String::new(),
        };
        ProductForm {
            name: self.name.clone(),
            description: self.description.clone(),
            price,
            image: self.image.clone(),
            in_stock: self.in_stock.then(|| "on".to_string()),
        }
    }
}

/// Flags for [`products`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedOptions {
    pub dry_run: bool,
    pub skip_existing: bool,
}

/// Parse and validate every entry. Errors are reported per entry.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or any entry is invalid.
pub fn parse_products(content: &str) -> Result<Vec<ProductDraft>, CliError> {
    let entries: Vec<SeedProduct> = serde_yaml::from_str(content)?;

    let mut drafts = Vec::with_capacity(entries.len());
    let mut invalid = 0;
    for (index, entry) in entries.iter().enumerate() {
        match entry.to_form().validate() {
            Ok(draft) => drafts.push(draft),
            Err(errors) => {
                invalid += 1;
                error!("  - entry {} ({}): {errors}", index + 1, entry.name);
            }
        }
    }

    if invalid > 0 {
        return Err(CliError::Invalid(invalid));
    }
    Ok(drafts)
}

/// Insert products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, an entry is
/// invalid, or the backend refuses a write.
pub async fn products(file_path: &str, options: SeedOptions) -> Result<(), CliError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading products from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io {
            path: file_path.to_string(),
            source,
        })?;
    let drafts = parse_products(&content)?;
    info!(products = drafts.len(), "File validated");

    if options.dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let client = service_client()?;

    let existing: HashSet<String> = if options.skip_existing {
        client
            .list_products()
            .await?
            .into_iter()
            .map(|product| product.name.to_lowercase())
            .collect()
    } else {
        HashSet::new()
    };

    let mut inserted = 0;
    let mut skipped = 0;
    for draft in &drafts {
        if existing.contains(&draft.name.to_lowercase()) {
            skipped += 1;
            continue;
        }
        match client.create_product(None, draft).await {
            Ok(product) => {
                inserted += 1;
                info!(id = %product.id, name = %product.name, "Inserted");
            }
            Err(e) => {
                warn!(name = %draft.name, error = %e, "Insert failed, stopping");
                return Err(e.into());
            }
        }
    }

    info!("Seeding complete!");
    info!("  Products inserted: {inserted}");
    info!("  Products skipped (already exist): {skipped}");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_numeric_and_text_prices() {
        let yaml = r"
- name: Fig
  description: Soft, jammy and honeyed.
  price: 2.5
  image: https://img.orchard.test/fig.jpg
- name: Quince
  description: Fragrant and best cooked.
  price: '3.10'
  image: https://img.orchard.test/quince.jpg
  in_stock: false
";
        let drafts = parse_products(yaml).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].price.to_string(), "$2.50");
        assert!(!drafts[1].in_stock);
    }

    #[test]
    fn test_parse_counts_invalid_entries() {
        let yaml = r"
- name: F
  description: short
  price: -1
  image: not a url
- name: Lime
  description: Sharp and bright green.
  price: 0.4
  image: https://img.orchard.test/lime.jpg
";
        assert!(matches!(parse_products(yaml), Err(CliError::Invalid(1))));
    }
}
