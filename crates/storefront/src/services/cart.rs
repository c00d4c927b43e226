//! Session-held cart.
//!
//! The cart lives under one session key. It survives page navigation for
//! the lifetime of the session and is gone after a process restart or
//! session expiry.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use tower_sessions::Session;

use orchard_core::Cart;

use crate::models::session_keys;

/// Loads and saves the visitor's [`Cart`].
#[derive(Clone)]
pub struct CartStore {
    session: Session,
}

impl CartStore {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }

    /// The current cart; empty when none was stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store cannot be read.
    pub async fn load(&self) -> Result<Cart, tower_sessions::session::Error> {
        Ok(self
            .session
            .get::<Cart>(session_keys::CART)
            .await?
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns an error if the session cannot be modified.
    pub async fn save(&self, cart: &Cart) -> Result<(), tower_sessions::session::Error> {
        self.session.insert(session_keys::CART, cart).await
    }

    /// Load, apply `change`, save. Returns the saved cart and whatever
    /// `change` returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or modified.
    pub async fn update<R>(
        &self,
        change: impl FnOnce(&mut Cart) -> R,
    ) -> Result<(Cart, R), tower_sessions::session::Error> {
        let mut cart = self.load().await?;
        let outcome = change(&mut cart);
        self.save(&cart).await?;
        Ok((cart, outcome))
    }

    /// # Errors
    ///
    /// Returns an error if the session cannot be modified.
    pub async fn clear(&self) -> Result<(), tower_sessions::session::Error> {
        self.session.remove::<Cart>(session_keys::CART).await?;
        Ok(())
    }

    /// Units in the cart; zero if the session cannot be read.
    pub async fn count(&self) -> u32 {
        self.load().await.map_or(0, |cart| cart.item_count())
    }
}

impl<S> FromRequestParts<S> for CartStore
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(Self::new)
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session layer missing"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use orchard_core::{Price, Product, ProductId};
    use tower_sessions::MemoryStore;

    use super::*;

    fn store() -> CartStore {
        CartStore::new(Session::new(None, Arc::new(MemoryStore::default()), None))
    }

    fn plum() -> Product {
        Product {
            id: ProductId::new(3),
            name: "Plum".to_string(),
            description: "Dark and tart".to_string(),
            price: Price::from_cents(90),
            image: String::new(),
            in_stock: true,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_cart_round_trips_through_session() {
        let carts = store();
        assert!(carts.load().await.unwrap().is_empty());

        let (cart, ()) = carts.update(|cart| cart.add(&plum(), 2)).await.unwrap();
        assert_eq!(cart.item_count(), 2);
        assert_eq!(carts.count().await, 2);

        carts.clear().await.unwrap();
        assert_eq!(carts.count().await, 0);
    }
}
