use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::error::AuthErrorCode;
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use super::client::GmailClient;
use crate::error::{GmailError, Result};
use crate::storage::KeyValueStore;
use crate::types::AccessToken;

/// Store key under which the live access token is persisted.
pub const ACCESS_TOKEN_KEY: &str = "gmailmd:gmail-picker:access-token";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// How the consent screen should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// New session: make the user pick an account and consent.
    SelectAccount,
    /// Existing session: refresh without showing anything if the provider allows it.
    None,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("the consent prompt was dismissed")]
    Dismissed,
    #[error("{code}")]
    Provider { code: String },
}

// Define a trait for OAuth flow operations to allow mocking
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    async fn request_token(&self, prompt: Prompt) -> std::result::Result<AccessToken, FlowError>;
}

/// Installed-app flow: opens a local redirect listener and asks the user to visit a URL.
pub struct InstalledFlow {
    secret: ApplicationSecret,
    token_cache: PathBuf,
}

impl InstalledFlow {
    pub fn new(secret: ApplicationSecret, token_cache: PathBuf) -> Self {
        Self {
            secret,
            token_cache,
        }
    }

    pub async fn from_file(client_secret: &Path, token_cache: PathBuf) -> Result<Self> {
        match yup_oauth2::read_application_secret(client_secret).await {
            Ok(secret) => Ok(Self::new(secret, token_cache)),
            Err(e) => Err(GmailError::Config(format!(
                "failed to read {}: {}. Download an OAuth client secret for a desktop app from the Google Cloud console.",
                client_secret.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl OAuthFlow for InstalledFlow {
    async fn request_token(&self, prompt: Prompt) -> std::result::Result<AccessToken, FlowError> {
        if prompt == Prompt::SelectAccount {
            // A cached refresh token would skip the account chooser entirely.
            match tokio::fs::remove_file(&self.token_cache).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(FlowError::Provider {
                        code: e.to_string(),
                    })
                }
            }
        }

        let auth = InstalledFlowAuthenticator::builder(
            self.secret.clone(),
            InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(self.token_cache.clone())
        .flow_delegate(Box::new(PromptDelegate { prompt }))
        .build()
        .await
        .map_err(|e| FlowError::Provider {
            code: e.to_string(),
        })?;

        let scopes = [GMAIL_READONLY_SCOPE];
        let token = match prompt {
            Prompt::SelectAccount => auth.token(&scopes[..]).await,
            Prompt::None => auth.force_refreshed_token(&scopes[..]).await,
        }
        .map_err(flow_error)?;

        token
            .token()
            .map(AccessToken::new)
            .ok_or_else(|| FlowError::Provider {
                code: "empty_token".to_string(),
            })
    }
}

fn flow_error(e: yup_oauth2::Error) -> FlowError {
    match e {
        yup_oauth2::Error::AuthError(ref auth) if matches!(auth.error, AuthErrorCode::AccessDenied) => {
            FlowError::Dismissed
        }
        other => FlowError::Provider {
            code: other.to_string(),
        },
    }
}

struct PromptDelegate {
    prompt: Prompt,
}

impl InstalledFlowDelegate for PromptDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            let url = match self.prompt {
                Prompt::SelectAccount => format!("{url}&prompt=select_account"),
                Prompt::None => url.to_string(),
            };
            eprintln!("Please direct your browser to {url} and follow the instructions displayed there.");

            if !need_code {
                return Ok(String::new());
            }

            use tokio::io::AsyncBufReadExt;
            let mut code = String::new();
            tokio::io::BufReader::new(tokio::io::stdin())
                .read_line(&mut code)
                .await
                .map_err(|e| e.to_string())?;
            Ok(code.trim().to_string())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenState {
    Unauthenticated,
    Authorizing,
    Authorized(AccessToken),
    Reauthorizing(AccessToken),
}

/// Sole owner and writer of the access token.
///
/// Other components never read the token from here mid-request; they receive a snapshot
/// (an [`AccessToken`] clone) and hand it back explicitly when they need a new one.
pub struct TokenManager {
    state: RwLock<TokenState>,
    store: Arc<dyn KeyValueStore>,
    flow: Arc<dyn OAuthFlow>,
    client: GmailClient,
}

impl TokenManager {
    pub fn new(
        client: GmailClient,
        store: Arc<dyn KeyValueStore>,
        flow: Arc<dyn OAuthFlow>,
    ) -> Self {
        Self {
            state: RwLock::new(TokenState::Unauthenticated),
            store,
            flow,
            client,
        }
    }

    pub async fn state(&self) -> TokenState {
        self.state.read().await.clone()
    }

    /// Snapshot of the live token, if authorized.
    pub async fn current(&self) -> Option<AccessToken> {
        match &*self.state.read().await {
            TokenState::Authorized(token) | TokenState::Reauthorizing(token) => {
                Some(token.clone())
            }
            _ => None,
        }
    }

    async fn transition(&self, next: TokenState) {
        let mut state = self.state.write().await;
        info!(from = ?*state, to = ?next, "token state");
        *state = next;
    }

    /// Resume a previous session from the store.
    pub async fn load_stored(&self) -> Result<Option<AccessToken>> {
        let stored = self
            .store
            .get_item(ACCESS_TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty())
            .map(AccessToken::new);

        if let Some(token) = &stored {
            self.transition(TokenState::Authorized(token.clone())).await;
        }
        Ok(stored)
    }

    /// Obtain a token: consent with an account chooser when `existing` is `None`, a silent
    /// refresh otherwise.
    ///
    /// Returns `Ok(None)` when the user dismissed the prompt; the previous state is kept.
    /// Any other failure drops the session back to `Unauthenticated`.
    pub async fn authorize(&self, existing: Option<&AccessToken>) -> Result<Option<AccessToken>> {
        let previous = self.state().await;
        let (pending, prompt) = match existing {
            None => (TokenState::Authorizing, Prompt::SelectAccount),
            Some(token) => (TokenState::Reauthorizing(token.clone()), Prompt::None),
        };
        self.transition(pending).await;

        match self.flow.request_token(prompt).await {
            Ok(token) => {
                if let Err(e) = self.store.set_item(ACCESS_TOKEN_KEY, token.as_str()).await {
                    self.transition(previous).await;
                    return Err(e);
                }
                self.transition(TokenState::Authorized(token.clone())).await;
                Ok(Some(token))
            }
            Err(FlowError::Dismissed) => {
                info!("consent prompt dismissed");
                self.transition(previous).await;
                Ok(None)
            }
            Err(FlowError::Provider { code }) => {
                warn!(%code, "authorization failed");
                self.clear().await?;
                Err(GmailError::Authorization { code })
            }
        }
    }

    pub async fn is_valid(&self, token: &AccessToken, cancel: &CancellationToken) -> Result<bool> {
        self.client.is_token_valid(token, cancel).await
    }

    /// Revoke at the provider, then forget the token locally. A failed revoke call is logged
    /// and does not keep the token alive.
    pub async fn revoke(&self, token: &AccessToken) -> Result<()> {
        if let Err(e) = self.client.revoke(token).await {
            warn!(error = %e, "token revocation failed");
        }
        self.clear().await
    }

    async fn clear(&self) -> Result<()> {
        self.transition(TokenState::Unauthenticated).await;
        self.store.remove_item(ACCESS_TOKEN_KEY).await
    }
}
