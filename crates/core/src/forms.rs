//! Form validation.
//!
//! Forms arrive as raw strings from HTML form posts. Each `validate` either
//! produces a typed payload or a [`ValidationErrors`] with one message per
//! offending field, which the page re-renders next to the inputs.

use serde::Deserialize;

use crate::catalog::ProductDraft;
use crate::types::{Email, Price};

/// Minimum password length accepted by the auth service.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Field-level validation messages, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: Vec<(&'static str, String)>,
}

impl ValidationErrors {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push((field, message.into()));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Message for `field`, if it failed.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(name, message)| (*name, message.as_str()))
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .fields
            .iter()
            .map(|(name, message)| format!("{name}: {message}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationErrors {}

fn require_min_chars(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    min: usize,
    message: &str,
) {
    if value.trim().chars().count() < min {
        errors.add(field, message);
    }
}

/// Checkbox value as posted by a browser: present means checked.
fn checkbox(value: Option<&str>) -> bool {
    matches!(value, Some("on" | "true" | "1"))
}

// =============================================================================
// Product form (admin)
// =============================================================================

/// Admin create/edit product form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub image: String,
    /// Absent when the checkbox is unchecked.
    #[serde(default)]
    pub in_stock: Option<String>,
}

impl ProductForm {
    /// A blank form for the "add" dialog; stock defaults to checked.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            in_stock: Some("on".to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_stock_checked(&self) -> bool {
        checkbox(self.in_stock.as_deref())
    }

    /// Validate into a [`ProductDraft`].
    ///
    /// # Errors
    ///
    /// Returns every failing field: name under 2 characters, description
    /// under 10, price not a positive number, image not an absolute URL.
    pub fn validate(&self) -> Result<ProductDraft, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        require_min_chars(&mut errors, "name", &self.name, 2, "Name must be at least 2 characters");
        require_min_chars(
            &mut errors,
            "description",
            &self.description,
            10,
            "Description must be at least 10 characters",
        );

        let price = match self.price.parse::<Price>() {
            Ok(price) if price.is_positive() => price,
            _ => {
                errors.add("price", "Price must be a positive number");
                Price::ZERO
            }
        };

        let image = self.image.trim();
        if url::Url::parse(image).map_or(true, |parsed| parsed.cannot_be_a_base()) {
            errors.add("image", "Please enter a valid URL");
        }

        errors.into_result(ProductDraft {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            price,
            image: image.to_string(),
            in_stock: self.in_stock_checked(),
        })
    }
}

// =============================================================================
// Shipping form (checkout)
// =============================================================================

/// Checkout shipping details.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Validated shipping details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingDetails {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub notes: Option<String>,
}

impl ShippingDetails {
    /// The single-string address stored on the order.
    #[must_use]
    pub fn flattened(&self) -> String {
        format!("{}, {}, {} {}", self.address, self.city, self.state, self.zip_code)
    }
}

impl ShippingForm {
    /// # Errors
    ///
    /// Returns every field that is too short; notes are optional.
    pub fn validate(&self) -> Result<ShippingDetails, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        require_min_chars(&mut errors, "full_name", &self.full_name, 2, "Full name is required");
        require_min_chars(&mut errors, "address", &self.address, 5, "Valid address is required");
        require_min_chars(&mut errors, "city", &self.city, 2, "City is required");
        require_min_chars(&mut errors, "state", &self.state, 2, "State is required");
        require_min_chars(&mut errors, "zip_code", &self.zip_code, 5, "Valid ZIP code is required");

        errors.into_result(ShippingDetails {
            full_name: self.full_name.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            zip_code: self.zip_code.trim().to_string(),
            notes: self
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|notes| !notes.is_empty())
                .map(str::to_string),
        })
    }
}

// =============================================================================
// Credentials (sign in / sign up)
// =============================================================================

/// Sign-in and sign-up form. `password_confirm` is only posted by sign-up.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: Option<String>,
}

impl CredentialsForm {
    /// Validate for sign-in: a well-formed email and a non-empty password.
    ///
    /// # Errors
    ///
    /// Returns the failing fields.
    pub fn validate_sign_in(&self) -> Result<Email, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let email = Email::parse(&self.email).map_err(|e| errors.add("email", e.to_string()));
        if self.password.is_empty() {
            errors.add("password", "Password is required");
        }
        match email {
            Ok(email) => errors.into_result(email),
            Err(()) => Err(errors),
        }
    }

    /// Validate for sign-up: as sign-in, plus password length and
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns the failing fields.
    pub fn validate_sign_up(&self) -> Result<Email, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let email = Email::parse(&self.email).map_err(|e| errors.add("email", e.to_string()));
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
            );
        }
        if self.password_confirm.as_deref() != Some(self.password.as_str()) {
            errors.add("password_confirm", "Passwords do not match");
        }
        match email {
            Ok(email) => errors.into_result(email),
            Err(()) => Err(errors),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid_product() -> ProductForm {
        ProductForm {
            name: "Dragon fruit".into(),
            description: "Bright pink skin, speckled flesh".into(),
            price: "3.49".into(),
            image: "https://img.orchard.test/dragon.jpg".into(),
            in_stock: Some("on".into()),
        }
    }

    #[test]
    fn product_form_accepts_valid_input() {
        let draft = valid_product().validate().unwrap();
        assert_eq!(draft.price, Price::from_cents(349));
        assert!(draft.in_stock);
    }

    #[test]
    fn product_form_reports_each_field() {
        let form = ProductForm {
            name: "X".into(),
            description: "short".into(),
            price: "0".into(),
            image: "not a url".into(),
            in_stock: None,
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("name"), Some("Name must be at least 2 characters"));
        assert_eq!(errors.get("description"), Some("Description must be at least 10 characters"));
        assert_eq!(errors.get("price"), Some("Price must be a positive number"));
        assert_eq!(errors.get("image"), Some("Please enter a valid URL"));
        assert_eq!(errors.iter().count(), 4);
    }

    #[test]
    fn unchecked_stock_box_means_out_of_stock() {
        let mut form = valid_product();
        form.in_stock = None;
        assert!(!form.validate().unwrap().in_stock);
        assert!(ProductForm::blank().in_stock_checked());
    }

    #[test]
    fn shipping_address_is_flattened() {
        let form = ShippingForm {
            full_name: "Ada Grower".into(),
            address: "12 Orchard Lane".into(),
            city: "Yakima".into(),
            state: "WA".into(),
            zip_code: "98901".into(),
            notes: Some("   ".into()),
        };
        let details = form.validate().unwrap();
        assert_eq!(details.flattened(), "12 Orchard Lane, Yakima, WA 98901");
        assert_eq!(details.notes, None);
    }

    #[test]
    fn shipping_form_requires_zip() {
        let form = ShippingForm {
            full_name: "Ada Grower".into(),
            address: "12 Orchard Lane".into(),
            city: "Yakima".into(),
            state: "WA".into(),
            zip_code: "989".into(),
            notes: None,
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("zip_code"), Some("Valid ZIP code is required"));
        assert_eq!(errors.get("city"), None);
    }

    #[test]
    fn sign_up_checks_confirmation() {
        let form = CredentialsForm {
            email: "grower@orchard.test".into(),
            password: "peaches".into(),
            password_confirm: Some("plums!!".into()),
        };
        assert!(form.validate_sign_in().is_ok());
        let errors = form.validate_sign_up().unwrap_err();
        assert_eq!(errors.get("password_confirm"), Some("Passwords do not match"));
    }
}
