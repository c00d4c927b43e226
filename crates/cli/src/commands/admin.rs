//! Admin flag management.
//!
//! The storefront reads `profiles.is_admin` to decide who may open the
//! admin catalog panel. Row-level security keeps users from changing their
//! own flag, so it is set here with the service-role key.
//!
//! # Usage
//!
//! ```bash
//! orchard admin grant --user-id <uuid>
//! orchard admin revoke --user-id <uuid>
//! ```

use orchard_core::UserId;

use super::{CliError, service_client};

/// Set or clear the admin flag on a user's profile.
///
/// # Errors
///
/// Returns an error if the environment is incomplete, the profile does not
/// exist, or the backend refuses the update.
pub async fn set_admin(user_id: UserId, is_admin: bool) -> Result<(), CliError> {
    let client = service_client()?;

    tracing::info!(%user_id, is_admin, "Updating admin flag");
    let profile = client.set_admin_flag(user_id, is_admin).await?;

    tracing::info!(
        "Profile {} ({}) is_admin = {}",
        profile.id,
        profile.email.as_deref().unwrap_or("no email"),
        profile.is_admin
    );
    if is_admin {
        tracing::info!("The user sees the Admin link after their next page load.");
    }

    Ok(())
}
