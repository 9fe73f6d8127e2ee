use thiserror::Error;

/// Errors surfaced by the acquisition pipeline.
#[derive(Debug, Error)]
pub enum GmailError {
    /// A base64url string whose length leaves a remainder of 1 after division by 4.
    #[error("malformed base64url input: length {length} cannot be padded")]
    MalformedEncoding { length: usize },

    #[error("failed to bootstrap provider resource {resource}: {reason}")]
    Bootstrap { resource: String, reason: String },

    /// The access token was rejected by the provider. Recoverable once by reauthorizing.
    #[error("invalid or expired access token")]
    InvalidToken,

    #[error("authorization failed: {code}")]
    Authorization { code: String },

    #[error("failed to extract part {part_id}: {reason}")]
    Extraction { part_id: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("message {0} is not among the retrieved messages")]
    MessageNotFound(String),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("nothing selected")]
    EmptySelection,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GmailError {
    pub fn bootstrap(resource: &str, reason: impl ToString) -> Self {
        GmailError::Bootstrap {
            resource: resource.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn extraction(part_id: &str, reason: impl ToString) -> Self {
        GmailError::Extraction {
            part_id: part_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether a caller may recover by reauthorizing and retrying.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, GmailError::InvalidToken)
    }
}

impl From<keyring::Error> for GmailError {
    fn from(e: keyring::Error) -> Self {
        GmailError::Storage(e.to_string())
    }
}

impl From<sqlx::Error> for GmailError {
    fn from(e: sqlx::Error) -> Self {
        GmailError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GmailError>;
