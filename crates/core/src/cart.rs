//! Shopping cart reducer.
//!
//! The cart is an ordered list of lines, unique by product id. Totals are
//! derived from the lines on every read and never stored.

use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::order::NewOrderLine;
use crate::types::{Price, ProductId};

/// Most units a single line may hold. Adds and updates past it are clamped.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Errors from cart operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be at least 1")]
    QuantityBelowOne,
    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),
}

/// One product in the cart, with a snapshot of the product fields taken
/// when it was first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub image: String,
    pub quantity: u32,
}

impl CartLine {
    fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            image: product.image.clone(),
            quantity,
        }
    }

    /// Quantity times unit price.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price * self.quantity
    }
}

/// The cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|line| line.product_id == product_id)
    }

    /// Add `quantity` units of `product`, merging into an existing line.
    /// Adding zero units does nothing. The line never exceeds
    /// [`MAX_LINE_QUANTITY`].
    pub fn add(&mut self, product: &Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.line_mut(product.id) {
            Some(line) => {
                line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
            }
            None => self.lines.push(CartLine::from_product(
                product,
                quantity.min(MAX_LINE_QUANTITY),
            )),
        }
    }

    /// Take one unit off a line, deleting the line when it reaches zero.
    ///
    /// Returns the remaining quantity (zero when the line was deleted or was
    /// never present).
    pub fn decrement(&mut self, product_id: ProductId) -> u32 {
        let Some(line) = self.line_mut(product_id) else {
            return 0;
        };
        line.quantity = line.quantity.saturating_sub(1);
        let remaining = line.quantity;
        if remaining == 0 {
            self.lines.retain(|line| line.product_id != product_id);
        }
        remaining
    }

    /// Delete a line outright. Returns whether it was present.
    pub fn remove_line(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.product_id != product_id);
        self.lines.len() != before
    }

    /// Set a line's quantity. The floor is 1; use [`Cart::decrement`] or
    /// [`Cart::remove_line`] to drop a line. Values above
    /// [`MAX_LINE_QUANTITY`] are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::QuantityBelowOne`] for zero and
    /// [`CartError::NotInCart`] if the product has no line.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        if quantity < 1 {
            return Err(CartError::QuantityBelowOne);
        }
        let line = self
            .line_mut(product_id)
            .ok_or(CartError::NotInCart(product_id))?;
        line.quantity = quantity.min(MAX_LINE_QUANTITY);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0, |count: u32, line| count.saturating_add(line.quantity))
    }

    /// Sum of quantity × price over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Order line payloads with the price at purchase.
    #[must_use]
    pub fn to_new_order_lines(&self) -> Vec<NewOrderLine> {
        self.lines
            .iter()
            .map(|line| NewOrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::fruit;

    fn assert_totals_consistent(cart: &Cart) {
        let count: u32 = cart.lines().iter().map(|l| l.quantity).sum();
        let total: Price = cart.lines().iter().map(|l| l.price * l.quantity).sum();
        assert_eq!(cart.item_count(), count);
        assert_eq!(cart.total(), total);
        assert!(cart.lines().iter().all(|l| l.quantity >= 1));
    }

    #[test]
    fn adding_same_product_twice_merges_lines() {
        let apple = fruit(1, "Apple", "Crisp and tart", 120);
        let mut cart = Cart::new();
        cart.add(&apple, 1);
        cart.add(&apple, 1);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.line(apple.id).map(|l| l.quantity), Some(2));
        assert_eq!(cart.total(), Price::from_cents(240));
    }

    #[test]
    fn decrementing_last_unit_deletes_line() {
        let apple = fruit(1, "Apple", "Crisp and tart", 120);
        let mut cart = Cart::new();
        cart.add(&apple, 2);
        assert_eq!(cart.decrement(apple.id), 1);
        assert_eq!(cart.decrement(apple.id), 0);
        assert!(cart.is_empty());
        assert_eq!(cart.decrement(apple.id), 0);
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn totals_track_any_sequence_of_operations() {
        let apple = fruit(1, "Apple", "Crisp and tart", 120);
        let kiwi = fruit(2, "Kiwi", "Fuzzy and green", 45);
        let plum = fruit(3, "Plum", "Purple stone fruit", 99);
        let mut cart = Cart::new();

        cart.add(&apple, 3);
        assert_totals_consistent(&cart);
        cart.add(&kiwi, 1);
        cart.add(&plum, 2);
        assert_totals_consistent(&cart);
        cart.decrement(kiwi.id);
        assert_totals_consistent(&cart);
        cart.decrement(plum.id);
        cart.add(&apple, 0);
        assert_totals_consistent(&cart);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total(), Price::from_cents(3 * 120 + 99));
        assert!(cart.remove_line(apple.id));
        assert!(!cart.remove_line(apple.id));
        assert_totals_consistent(&cart);
    }

    #[test]
    fn set_quantity_enforces_floor_of_one() {
        let apple = fruit(1, "Apple", "Crisp and tart", 120);
        let mut cart = Cart::new();
        cart.add(&apple, 1);
        assert_eq!(cart.set_quantity(apple.id, 0), Err(CartError::QuantityBelowOne));
        assert_eq!(cart.set_quantity(apple.id, 5), Ok(()));
        assert_eq!(cart.item_count(), 5);
        assert_eq!(
            cart.set_quantity(ProductId::new(9), 2),
            Err(CartError::NotInCart(ProductId::new(9)))
        );
    }

    #[test]
    fn quantities_are_clamped_per_line() {
        let apple = fruit(1, "Apple", "Crisp and tart", 120);
        let kiwi = fruit(2, "Kiwi", "Fuzzy and green", 45);
        let mut cart = Cart::new();

        cart.add(&apple, u32::MAX);
        cart.add(&apple, 1);
        cart.add(&kiwi, 1);
        assert_eq!(cart.line(apple.id).map(|l| l.quantity), Some(MAX_LINE_QUANTITY));
        assert_eq!(cart.item_count(), MAX_LINE_QUANTITY + 1);

        assert_eq!(cart.set_quantity(kiwi.id, u32::MAX), Ok(()));
        assert_eq!(cart.item_count(), 2 * MAX_LINE_QUANTITY);
        assert_eq!(cart.total(), Price::from_cents(120 + 45) * MAX_LINE_QUANTITY);
    }

    #[test]
    fn item_count_saturates_for_oversized_stored_lines() {
        let apple = fruit(1, "Apple", "Crisp and tart", 120);
        let kiwi = fruit(2, "Kiwi", "Fuzzy and green", 45);
        let cart = Cart {
            lines: vec![
                CartLine::from_product(&apple, u32::MAX),
                CartLine::from_product(&kiwi, 5),
            ],
        };
        assert_eq!(cart.item_count(), u32::MAX);
    }

    #[test]
    fn order_lines_keep_purchase_price() {
        let mut apple = fruit(1, "Apple", "Crisp and tart", 120);
        let mut cart = Cart::new();
        cart.add(&apple, 2);
        apple.price = Price::from_cents(500);
        cart.add(&apple, 1);
        let lines = cart.to_new_order_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].price, Price::from_cents(120));
    }

    #[test]
    fn clear_empties_cart() {
        let mut cart = Cart::new();
        cart.add(&fruit(1, "Apple", "Crisp and tart", 120), 1);
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Price::ZERO);
    }
}
