use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::auth::TokenManager;
use super::client::{fetch_json_cancellable, GmailClient};
use crate::error::{GmailError, Result};
use crate::types::{AccessToken, Message, MessageRef, MessagesResponse};

/// How many matches a single search returns.
pub const PAGE_SIZE: usize = 10;

/// How often `search_with_reauth` may reauthorize before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub reauthorize_attempts: u32,
}

impl RetryPolicy {
    pub fn never() -> Self {
        Self {
            reauthorize_attempts: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reauthorize_attempts: 1,
        }
    }
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub messages: Vec<Message>,
    /// The token the successful attempt used. Differs from the input after a reauthorization.
    pub token: AccessToken,
    pub reauthorized: bool,
}

/// Run `query` and fetch every match in full.
///
/// The token is probed first; a rejected token yields [`GmailError::InvalidToken`] and nothing
/// else is requested. Message bodies are fetched concurrently and the first failure fails the
/// whole batch, dropping the remaining requests.
pub async fn search(
    client: &GmailClient,
    token: &AccessToken,
    query: &str,
    cancel: &CancellationToken,
) -> Result<Vec<Message>> {
    if !client.is_token_valid(token, cancel).await? {
        return Err(GmailError::InvalidToken);
    }

    let refs = list_message_ids(client, token, query, cancel).await?;
    debug!(query, matches = refs.len(), "listed messages");

    try_join_all(
        refs.iter()
            .map(|msg_ref| get_message(client, token, &msg_ref.id, cancel)),
    )
    .await
}

pub async fn list_message_ids(
    client: &GmailClient,
    token: &AccessToken,
    query: &str,
    cancel: &CancellationToken,
) -> Result<Vec<MessageRef>> {
    let max_results = PAGE_SIZE.to_string();
    let request = client
        .user_get(token, "messages")
        .query(&[("q", query), ("maxResults", max_results.as_str())]);
    let messages_data: MessagesResponse = fetch_json_cancellable(request, cancel).await?;
    let mut refs = messages_data.messages.unwrap_or_default();
    refs.truncate(PAGE_SIZE);
    Ok(refs)
}

pub async fn get_message(
    client: &GmailClient,
    token: &AccessToken,
    message_id: &str,
    cancel: &CancellationToken,
) -> Result<Message> {
    let request = client
        .user_get(token, &format!("messages/{}", message_id))
        .query(&[("format", "full")]);
    fetch_json_cancellable(request, cancel).await
}

/// [`search`], reauthorizing through `tokens` when the provider rejects the token.
///
/// This is the only place that retries on an invalid token. Each retry re-runs the identical
/// search with the fresh token; once `policy` is exhausted the `InvalidToken` error propagates.
pub async fn search_with_reauth(
    client: &GmailClient,
    tokens: &TokenManager,
    token: AccessToken,
    query: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<SearchOutcome> {
    let mut token = token;
    let mut attempts = 0;

    loop {
        match search(client, &token, query, cancel).await {
            Ok(messages) => {
                return Ok(SearchOutcome {
                    messages,
                    token,
                    reauthorized: attempts > 0,
                })
            }
            Err(GmailError::InvalidToken) if attempts < policy.reauthorize_attempts => {
                attempts += 1;
                warn!(attempt = attempts, "token is invalid or expired, reauthorizing");
                token = match tokens.authorize(Some(&token)).await? {
                    Some(fresh) => fresh,
                    None => return Err(GmailError::InvalidToken),
                };
            }
            Err(e) => return Err(e),
        }
    }
}
