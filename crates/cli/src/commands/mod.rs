//! CLI command implementations.

pub mod admin;
pub mod seed;

use thiserror::Error;

use orchard_storefront::backend::{BackendError, SupabaseClient};
use orchard_storefront::config::{BackendConfig, ConfigError};

/// Environment variable holding the service-role key.
pub const SERVICE_ROLE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} invalid entries found")]
    Invalid(usize),
}

/// Build a backend client that authenticates with the service-role key.
///
/// # Errors
///
/// Returns an error if the environment is incomplete or the client cannot
/// be built.
pub fn service_client() -> Result<SupabaseClient, CliError> {
    dotenvy::dotenv().ok();
    let config = BackendConfig::from_env(SERVICE_ROLE_KEY_VAR)?;
    Ok(SupabaseClient::new(&config)?)
}
