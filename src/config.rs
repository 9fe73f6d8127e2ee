use std::path::PathBuf;

use crate::bootstrap::{DISCOVERY_DOC, OPENID_CONFIGURATION};
use crate::gmail_api::RetryPolicy;

pub const TOKEN_INFO_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";

/// Where the provider's resources live. Overridable so tests can point at a mock server.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub discovery_url: String,
    pub openid_configuration_url: String,
    pub token_info_url: String,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            discovery_url: DISCOVERY_DOC.to_string(),
            openid_configuration_url: OPENID_CONFIGURATION.to_string(),
            token_info_url: TOKEN_INFO_URL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    Keyring,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub client_secret_path: PathBuf,
    /// yup-oauth2 keeps refresh tokens here so silent reauthorization works across runs.
    pub token_cache_path: PathBuf,
    pub store: StoreKind,
    pub database_url: String,
    pub retry: RetryPolicy,
}
