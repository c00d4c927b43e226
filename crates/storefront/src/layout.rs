//! Page shell shared by every full-page template.
//!
//! Holds what the navigation bar needs (who is signed in, the cart badge)
//! plus the pending flash message.

use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tower_sessions::Session;

use crate::flash::take_flash;
use crate::middleware::resolve_identity;
use crate::models::{CurrentUser, Flash};
use crate::services::CartStore;
use crate::state::AppState;

/// Navigation and notification data for the base layout.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    pub user: Option<CurrentUser>,
    pub cart_count: u32,
    pub flash: Option<Flash>,
    /// Request path, used to highlight the active nav link.
    pub path: String,
}

impl Shell {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.is_admin)
    }

    #[must_use]
    pub fn is_active(&self, prefix: &str) -> bool {
        if prefix == "/" {
            self.path == "/"
        } else {
            self.path.starts_with(prefix)
        }
    }
}

impl<S> FromRequestParts<S> for Shell
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let identity = resolve_identity(parts, &state).await;

        let (cart_count, flash) = match parts.extensions.get::<Session>().cloned() {
            Some(session) => {
                let count = CartStore::new(session.clone()).count().await;
                (count, take_flash(&session).await)
            }
            None => (0, None),
        };

        Ok(Self {
            user: identity.user().cloned(),
            cart_count,
            flash,
            path: parts.uri.path().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_link_matching() {
        let shell = Shell {
            path: "/products/4".to_string(),
            ..Shell::default()
        };
        assert!(shell.is_active("/products"));
        assert!(!shell.is_active("/"));
        assert!(!shell.is_admin());
    }
}
