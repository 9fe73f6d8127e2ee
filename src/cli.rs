use crate::config::{Config, ProviderConfig, StoreKind};
use crate::gmail_api::RetryPolicy;
use crate::gmail_api::auth::ACCESS_TOKEN_KEY;
use crate::storage::{KeyValueStore, KeyringStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Clear the stored access token from the system keyring and exit.
    #[clap(long)]
    pub clear_keyring: bool,

    /// OAuth client secret downloaded from the Google Cloud console.
    #[clap(long, default_value = "client_secret.json")]
    pub client_secret: PathBuf,

    /// File where refresh tokens are cached between runs.
    #[clap(long, default_value = "gmailmd_tokencache.json")]
    pub token_cache: PathBuf,

    /// Google API key attached to Gmail requests.
    #[clap(long, env = "GMAILMD_API_KEY")]
    pub api_key: Option<String>,

    /// Where the access token is persisted.
    #[clap(long, value_enum, default_value = "keyring")]
    pub store: StoreKind,

    /// SQLite database used by `--store sqlite`.
    #[clap(long, default_value = "sqlite:gmailmd.db")]
    pub database: String,

    /// How many times a search may silently reauthorize after the token is rejected.
    #[clap(long, default_value_t = 1)]
    pub reauth_attempts: u32,

    #[clap(long, hide = true, default_value = crate::bootstrap::DISCOVERY_DOC)]
    pub discovery_url: String,

    #[clap(long, hide = true, default_value = crate::bootstrap::OPENID_CONFIGURATION)]
    pub openid_configuration_url: String,

    #[clap(long, hide = true, default_value = crate::config::TOKEN_INFO_URL)]
    pub token_info_url: String,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize with Gmail and store the access token.
    Login,
    /// List the messages matching a Gmail search query.
    Search {
        /// Gmail search syntax, e.g. `from:alice subject:report`.
        query: String,
    },
    /// Search, then write the selected messages as markdown files.
    Export {
        query: String,
        /// Message ids to export. Exports every result when omitted.
        #[clap(long = "select", value_name = "ID")]
        select: Vec<String>,
        /// Output directory for the markdown files.
        #[clap(long, default_value = ".")]
        out: PathBuf,
    },
    /// Revoke the access token and forget it.
    Logout,
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            provider: ProviderConfig {
                discovery_url: self.discovery_url.clone(),
                openid_configuration_url: self.openid_configuration_url.clone(),
                token_info_url: self.token_info_url.clone(),
                api_key: self.api_key.clone(),
            },
            client_secret_path: self.client_secret.clone(),
            token_cache_path: self.token_cache.clone(),
            store: self.store,
            database_url: self.database.clone(),
            retry: RetryPolicy {
                reauthorize_attempts: self.reauth_attempts,
            },
        }
    }
}

pub async fn handle_keyring_clear() -> Result<(), Box<dyn std::error::Error>> {
    let credentials_keyring = KeyringStore::new();

    if let Err(e) = credentials_keyring.remove_item(ACCESS_TOKEN_KEY).await {
        eprintln!("Failed to delete credentials from keyring: {}", e);
    } else {
        println!("Credentials removed from keyring. Exiting.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_collects_selected_ids() {
        let cli = Cli::parse_from([
            "gmailmd", "--store", "memory", "export", "invoice", "--select", "a", "--select", "b",
            "--out", "docs",
        ]);
        assert_eq!(cli.config().store, StoreKind::Memory);
        match cli.command {
            Some(Command::Export { query, select, out }) => {
                assert_eq!(query, "invoice");
                assert_eq!(select, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(out, PathBuf::from("docs"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_defaults_point_at_google() {
        let cli = Cli::parse_from(["gmailmd", "login"]);
        let config = cli.config();
        assert_eq!(
            config.provider,
            ProviderConfig {
                api_key: config.provider.api_key.clone(),
                ..ProviderConfig::default()
            }
        );
        assert_eq!(config.client_secret_path, PathBuf::from("client_secret.json"));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_reauth_attempts_can_be_disabled() {
        let cli = Cli::parse_from(["gmailmd", "--reauth-attempts", "0", "search", "invoice"]);
        assert_eq!(cli.config().retry, RetryPolicy::never());
    }
}
