//! Authentication extractors.
//!
//! The identity behind a request is resolved once by [`resolve_identity`]
//! and cached in the request extensions, so a handler that takes both a
//! page shell and an auth guard does not hit the auth service twice.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use orchard_core::checkout::SIGN_IN_PATH;

use crate::error::set_sentry_user;
use crate::flash::set_flash;
use crate::models::{CurrentUser, Flash};
use crate::services::IdentityState;
use crate::state::AppState;

/// Shown when a signed-in non-admin opens an admin page.
pub const ACCESS_DENIED: &str = "Access denied. Admin privileges required.";

/// Resolve the visitor's identity, at most once per request.
pub async fn resolve_identity(parts: &mut Parts, state: &AppState) -> IdentityState {
    if let Some(identity) = parts.extensions.get::<IdentityState>() {
        return identity.clone();
    }

    let session = parts.extensions.get::<Session>().cloned();
    let identity = match session {
        Some(session) => state.identity().resolve(&session).await,
        None => IdentityState::Anonymous,
    };

    if let Some(user) = identity.user() {
        set_sentry_user(&user.id, Some(&user.email));
    }

    parts.extensions.insert(identity.clone());
    identity
}

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Orders for {}", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires a signed-in admin.
pub struct RequireAdmin(pub CurrentUser);

/// Error returned when a guard rejects the request.
#[derive(Debug)]
pub enum AuthRejection {
    /// Nobody is signed in.
    RedirectToSignIn,
    /// Signed in without admin rights; a flash has been queued.
    RedirectHome,
    /// The session layer is not installed.
    MissingSession,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToSignIn => Redirect::to(SIGN_IN_PATH).into_response(),
            Self::RedirectHome => Redirect::to("/").into_response(),
            Self::MissingSession => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session layer missing").into_response()
            }
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        match resolve_identity(parts, &state).await {
            IdentityState::Authenticated { user } => Ok(Self(user)),
            IdentityState::Anonymous | IdentityState::Loading => {
                Err(AuthRejection::RedirectToSignIn)
            }
        }
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if user.is_admin {
            return Ok(Self(user));
        }

        tracing::info!(user_id = %user.id, path = %parts.uri.path(), "Admin page refused");
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::MissingSession)?;
        set_flash(session, Flash::error(ACCESS_DENIED)).await;
        Err(AuthRejection::RedirectHome)
    }
}

/// Extractor that optionally gets the signed-in user.
///
/// Unlike `RequireAuth`, this does not reject anonymous visitors.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let identity = resolve_identity(parts, &state).await;
        Ok(Self(identity.user().cloned()))
    }
}
