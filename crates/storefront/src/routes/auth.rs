//! Authentication route handlers.
//!
//! Sign-in, sign-up and sign-out against the backend auth service. The
//! resulting identity and tokens are kept in the HTTP session by the
//! identity store.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::instrument;

use orchard_core::forms::{CredentialsForm, ValidationErrors};

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::flash::set_flash;
use crate::layout::Shell;
use crate::models::Flash;
use crate::state::AppState;

/// Sign-in page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signin.html")]
pub struct SignInTemplate {
    pub shell: Shell,
    pub email: String,
    pub errors: ValidationErrors,
    pub error: Option<String>,
}

/// Sign-up page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signup.html")]
pub struct SignUpTemplate {
    pub shell: Shell,
    pub email: String,
    pub errors: ValidationErrors,
    pub error: Option<String>,
}

/// Shown while an email confirmation is pending.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signup_success.html")]
pub struct SignUpSuccessTemplate {
    pub shell: Shell,
}

// =============================================================================
// Sign in
// =============================================================================

/// Display the sign-in page.
#[instrument(skip(shell))]
pub async fn sign_in_page(shell: Shell) -> impl IntoResponse {
    SignInTemplate {
        shell,
        email: String::new(),
        errors: ValidationErrors::new(),
        error: None,
    }
}

/// Handle sign-in form submission.
#[instrument(skip_all)]
pub async fn sign_in(
    State(state): State<AppState>,
    shell: Shell,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let email = match form.validate_sign_in() {
        Ok(email) => email,
        Err(errors) => {
            return SignInTemplate {
                shell,
                email: form.email,
                errors,
                error: None,
            }
            .into_response();
        }
    };

    match state.identity().sign_in(&session, &email, &form.password).await {
        Ok(user) => {
            set_sentry_user(&user.id, Some(&user.email));
            tracing::info!(user_id = %user.id, "Signed in");
            set_flash(&session, Flash::success("Welcome back!")).await;
            Redirect::to("/").into_response()
        }
        Err(e) => {
            tracing::info!(error = %e, "Sign-in failed");
            SignInTemplate {
                shell,
                email: form.email,
                errors: ValidationErrors::new(),
                error: Some(e.user_message()),
            }
            .into_response()
        }
    }
}

// =============================================================================
// Sign up
// =============================================================================

/// Display the sign-up page.
#[instrument(skip(shell))]
pub async fn sign_up_page(shell: Shell) -> impl IntoResponse {
    SignUpTemplate {
        shell,
        email: String::new(),
        errors: ValidationErrors::new(),
        error: None,
    }
}

/// Handle sign-up form submission.
///
/// Accounts that need an email confirmation land on the sign-up success
/// page; accounts usable right away are signed in.
#[instrument(skip_all)]
pub async fn sign_up(
    State(state): State<AppState>,
    shell: Shell,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let email = match form.validate_sign_up() {
        Ok(email) => email,
        Err(errors) => {
            return SignUpTemplate {
                shell,
                email: form.email,
                errors,
                error: None,
            }
            .into_response();
        }
    };

    match state.identity().sign_up(&session, &email, &form.password).await {
        Ok(Some(user)) => {
            set_sentry_user(&user.id, Some(&user.email));
            tracing::info!(user_id = %user.id, "Signed up and signed in");
            set_flash(&session, Flash::success("Account created. Welcome to Orchard!")).await;
            Redirect::to("/").into_response()
        }
        Ok(None) => {
            tracing::info!("Signed up, confirmation pending");
            set_flash(
                &session,
                Flash::info(format!("We sent a confirmation link to {email}.")),
            )
            .await;
            Redirect::to("/signup-success").into_response()
        }
        Err(e) => {
            tracing::info!(error = %e, "Sign-up failed");
            SignUpTemplate {
                shell,
                email: form.email,
                errors: ValidationErrors::new(),
                error: Some(e.user_message()),
            }
            .into_response()
        }
    }
}

/// Display the confirmation-pending page.
#[instrument(skip(shell))]
pub async fn sign_up_success(shell: Shell) -> impl IntoResponse {
    SignUpSuccessTemplate { shell }
}

// =============================================================================
// Sign out
// =============================================================================

/// Sign out and return home. The cart is kept.
#[instrument(skip_all)]
pub async fn sign_out(State(state): State<AppState>, session: Session) -> Result<Response> {
    state.identity().sign_out(&session).await?;
    clear_sentry_user();
    set_flash(&session, Flash::success("You have been signed out.")).await;
    Ok(Redirect::to("/").into_response())
}
