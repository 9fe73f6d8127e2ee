use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::{Bootstrap, HttpLoader};
use crate::cli::Command;
use crate::config::{Config, StoreKind};
use crate::database::SqliteStore;
use crate::email_content::{decode_html_entities, sender_display};
use crate::error::Result;
use crate::gmail_api::{GmailClient, InstalledFlow, RetryPolicy, TokenManager};
use crate::state::PickerSession;
use crate::storage::{KeyValueStore, KeyringStore, MemoryStore};
use crate::upload::DirectorySink;

/// Everything a command needs, built once per run.
pub struct AppContext {
    pub client: GmailClient,
    pub tokens: Arc<TokenManager>,
    pub retry: RetryPolicy,
}

pub async fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    Ok(match config.store {
        StoreKind::Keyring => Arc::new(KeyringStore::new()),
        StoreKind::Sqlite => Arc::new(SqliteStore::new(&config.database_url).await?),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    })
}

pub async fn initialize_app(config: &Config) -> Result<AppContext> {
    let http = reqwest::Client::new();

    let endpoints = Bootstrap::global()
        .ensure_ready(&config.provider, &HttpLoader::new(http.clone()))
        .await?;
    let client = GmailClient::new(http, endpoints);

    let store = open_store(config).await?;
    let flow = InstalledFlow::from_file(
        &config.client_secret_path,
        config.token_cache_path.clone(),
    )
    .await?;

    let tokens = Arc::new(TokenManager::new(client.clone(), store, Arc::new(flow)));
    Ok(AppContext {
        client,
        tokens,
        retry: config.retry,
    })
}

/// Cancel in-flight requests on Ctrl+C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    cancel
}

pub async fn run_command(ctx: AppContext, command: Command) -> Result<()> {
    match command {
        Command::Login => {
            let mut session = session(&ctx, PathBuf::from("."));
            if session.open().await? {
                println!("Signed in.");
            } else {
                println!("Sign-in was cancelled.");
            }
        }
        Command::Search { query } => {
            let mut session = session(&ctx, PathBuf::from("."));
            if !session.open().await? {
                println!("Sign-in was cancelled.");
                return Ok(());
            }
            session.search(&query, &cancel_on_interrupt()).await?;
            print_messages(&session);
        }
        Command::Export { query, select, out } => {
            let mut session = session(&ctx, out.clone());
            if !session.open().await? {
                println!("Sign-in was cancelled.");
                return Ok(());
            }
            session.search(&query, &cancel_on_interrupt()).await?;

            let ids: Vec<String> = if select.is_empty() {
                session.view().messages.iter().map(|m| m.id.clone()).collect()
            } else {
                select
            };
            if ids.is_empty() {
                println!("No messages matched {query:?}.");
                return Ok(());
            }
            for id in &ids {
                session.select(id);
            }

            let report = session.commit().await?;
            for artifact in &report.artifacts {
                println!("{}", out.join(&artifact.name).display());
            }
            for failure in &report.failures {
                eprintln!("{}: {}", failure.message_id, failure.error);
            }
        }
        Command::Logout => {
            match ctx.tokens.load_stored().await? {
                Some(token) => {
                    ctx.tokens.revoke(&token).await?;
                    println!("Signed out.");
                }
                None => println!("Not signed in."),
            }
        }
    }
    Ok(())
}

fn session(ctx: &AppContext, out: PathBuf) -> PickerSession {
    PickerSession::new(
        ctx.client.clone(),
        ctx.tokens.clone(),
        Arc::new(DirectorySink::new(out)),
    )
    .with_retry_policy(ctx.retry)
}

fn print_messages(session: &PickerSession) {
    let view = session.view();
    if view.messages.is_empty() {
        println!("No messages found.");
        return;
    }
    for message in view.messages {
        println!(
            "{}  {:<24}  {}",
            message.id,
            sender_display(message.header("From")),
            message.subject().unwrap_or("No Subject")
        );
        let snippet = if message.snippet.is_empty() {
            "No preview available".to_string()
        } else {
            decode_html_entities(&message.snippet)
        };
        println!("    {}", snippet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail_api::auth::{MockOAuthFlow, ACCESS_TOKEN_KEY};
    use crate::gmail_api::test_support::{
        client_for, mount_message, mount_search, mount_token_info,
    };
    use wiremock::MockServer;

    async fn signed_in_context(server: &MockServer, retry: RetryPolicy) -> AppContext {
        let store = Arc::new(MemoryStore::new());
        store.set_item(ACCESS_TOKEN_KEY, "tok").await.unwrap();
        let client = client_for(server);
        let tokens = Arc::new(TokenManager::new(
            client.clone(),
            store,
            Arc::new(MockOAuthFlow::new()),
        ));
        AppContext {
            client,
            tokens,
            retry,
        }
    }

    fn out_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gmailmd_export_{}", uuid::Uuid::new_v4()))
    }

    fn exported(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_export_with_repeated_select_keeps_message_selected() {
        let server = MockServer::start().await;
        mount_token_info(&server, "tok", 200).await;
        mount_search(&server, "tok", "report", &["m1", "m2"]).await;
        mount_message(&server, "tok", "m1", "Weekly sync").await;
        mount_message(&server, "tok", "m2", "Q3 Report").await;

        let out = out_dir();
        let ctx = signed_in_context(&server, RetryPolicy::default()).await;
        run_command(
            ctx,
            Command::Export {
                query: "report".to_string(),
                select: vec!["m1".to_string(), "m1".to_string()],
                out: out.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(exported(&out), vec!["weekly-sync.md".to_string()]);

        // Cleanup
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn test_export_with_interleaved_duplicates_exports_each_once() {
        let server = MockServer::start().await;
        mount_token_info(&server, "tok", 200).await;
        mount_search(&server, "tok", "report", &["m1", "m2"]).await;
        mount_message(&server, "tok", "m1", "Weekly sync").await;
        mount_message(&server, "tok", "m2", "Q3 Report").await;

        let out = out_dir();
        let ctx = signed_in_context(&server, RetryPolicy::default()).await;
        run_command(
            ctx,
            Command::Export {
                query: "report".to_string(),
                select: vec!["m1".to_string(), "m2".to_string(), "m1".to_string()],
                out: out.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            exported(&out),
            vec!["q3-report.md".to_string(), "weekly-sync.md".to_string()]
        );

        // Cleanup
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn test_export_honours_configured_retry_policy() {
        let server = MockServer::start().await;
        mount_token_info(&server, "tok", 401).await;

        // No reauthorization allowed, so the flow must never be asked.
        let ctx = signed_in_context(&server, RetryPolicy::never()).await;
        let result = run_command(
            ctx,
            Command::Export {
                query: "report".to_string(),
                select: vec![],
                out: out_dir(),
            },
        )
        .await;
        assert!(matches!(result, Err(crate::GmailError::InvalidToken)));
    }
}
