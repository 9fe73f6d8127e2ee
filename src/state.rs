use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{GmailError, Result};
use crate::gmail_api::{search_with_reauth, GmailClient, RetryPolicy, TokenManager};
use crate::packaging::{commit, CommitReport};
use crate::types::{AccessToken, Message};
use crate::upload::UploadSink;

/// Message ids the user picked, in the order they were picked.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    ids: Vec<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `id`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        match self.ids.iter().position(|selected| selected == id) {
            Some(index) => {
                self.ids.remove(index);
                false
            }
            None => {
                self.ids.push(id.to_string());
                true
            }
        }
    }

    /// Add `id` unless it is already selected. Returns whether it was newly added.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|selected| selected == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

// Membership equality; selection order only matters for packaging.
impl PartialEq for SelectionSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|id| other.contains(id))
    }
}

impl Eq for SelectionSet {}

/// What a front end renders.
#[derive(Debug)]
pub struct PickerView<'a> {
    pub loading: bool,
    pub messages: &'a [Message],
    pub selection: &'a SelectionSet,
}

/// One user's picker: the current token snapshot, the last search results and the selection.
pub struct PickerSession {
    client: GmailClient,
    tokens: Arc<TokenManager>,
    sink: Arc<dyn UploadSink>,
    retry: RetryPolicy,
    token: Option<AccessToken>,
    loading: bool,
    messages: Vec<Message>,
    selection: SelectionSet,
}

impl PickerSession {
    pub fn new(client: GmailClient, tokens: Arc<TokenManager>, sink: Arc<dyn UploadSink>) -> Self {
        Self {
            client,
            tokens,
            sink,
            retry: RetryPolicy::default(),
            token: None,
            loading: false,
            messages: vec![],
            selection: SelectionSet::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resume the stored session, or ask for consent when there is none.
    ///
    /// Returns whether the session ended up authenticated; a dismissed prompt is not an error.
    pub async fn open(&mut self) -> Result<bool> {
        self.loading = true;
        let result = match self.tokens.load_stored().await {
            Ok(Some(token)) => Ok(Some(token)),
            Ok(None) => self.tokens.authorize(None).await,
            Err(e) => Err(e),
        };
        self.loading = false;

        self.token = result?;
        Ok(self.token.is_some())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn view(&self) -> PickerView<'_> {
        PickerView {
            loading: self.loading,
            messages: &self.messages,
            selection: &self.selection,
        }
    }

    /// Replace the results with the matches for `query`.
    pub async fn search(&mut self, query: &str, cancel: &CancellationToken) -> Result<()> {
        let token = self.token.clone().ok_or_else(|| GmailError::Authorization {
            code: "not signed in".to_string(),
        })?;

        self.loading = true;
        self.messages.clear();
        let result = search_with_reauth(
            &self.client,
            &self.tokens,
            token,
            query,
            self.retry,
            cancel,
        )
        .await;
        self.loading = false;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                // A failed reauthorization leaves the manager signed out.
                if self.tokens.current().await.is_none() {
                    self.token = None;
                }
                return Err(e);
            }
        };
        if outcome.reauthorized {
            info!("access token refreshed during search");
        }
        self.token = Some(outcome.token);
        self.messages = outcome.messages;
        Ok(())
    }

    pub fn toggle(&mut self, message_id: &str) -> bool {
        self.selection.toggle(message_id)
    }

    /// Select without toggling, so repeating an id keeps it selected.
    pub fn select(&mut self, message_id: &str) -> bool {
        self.selection.insert(message_id)
    }

    /// Package the selection and hand the artifacts to the upload sink.
    pub async fn commit(&mut self) -> Result<CommitReport> {
        if self.selection.is_empty() {
            return Err(GmailError::EmptySelection);
        }

        let report = commit(&self.selection, &self.messages);
        if !report.artifacts.is_empty() {
            self.sink.enqueue(report.artifacts.clone()).await?;
        }
        info!(
            packaged = report.artifacts.len(),
            failed = report.failures.len(),
            "committed selection"
        );
        Ok(report)
    }

    pub async fn logout(&mut self) -> Result<()> {
        if let Some(token) = self.token.take() {
            self.tokens.revoke(&token).await?;
        }
        self.messages.clear();
        self.selection.clear();
        Ok(())
    }
}
