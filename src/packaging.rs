//! Turning selected messages into markdown file artifacts.
//!
//! Each message is packaged on its own: a message that is missing or fails to extract is
//! reported in [`CommitReport::failures`] and the rest of the selection still goes through.

use chrono::{DateTime, Utc};
use deunicode::deunicode;
use std::collections::HashSet;
use tracing::warn;

use crate::email_content::extract;
use crate::error::GmailError;
use crate::state::SelectionSet;
use crate::types::{FileArtifact, Message, MARKDOWN_MIME_TYPE};

#[derive(Debug)]
pub struct CommitFailure {
    pub message_id: String,
    pub error: GmailError,
}

#[derive(Debug, Default)]
pub struct CommitReport {
    pub artifacts: Vec<FileArtifact>,
    pub failures: Vec<CommitFailure>,
}

impl CommitReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Lowercase ASCII slug. Non-ASCII text is transliterated first (`Café` becomes `cafe`,
/// `北京` becomes `bei-jing`); alphanumeric runs are kept and everything else collapses into
/// one `-`.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

fn file_stem(message: &Message, now: DateTime<Utc>) -> String {
    let slug = message.subject().map(slugify).unwrap_or_default();
    if slug.is_empty() {
        format!("untitled-{}", now.timestamp_millis())
    } else {
        slug
    }
}

fn unique_name(stem: &str, used: &mut HashSet<String>) -> String {
    let mut name = format!("{stem}.md");
    let mut n = 2;
    while used.contains(&name) {
        name = format!("{stem}-{n}.md");
        n += 1;
    }
    used.insert(name.clone());
    name
}

pub fn commit(selection: &SelectionSet, messages: &[Message]) -> CommitReport {
    commit_at(selection, messages, Utc::now())
}

/// [`commit`] with an explicit clock for the `untitled-<millis>` fallback.
pub fn commit_at(selection: &SelectionSet, messages: &[Message], now: DateTime<Utc>) -> CommitReport {
    let mut report = CommitReport::default();
    let mut used = HashSet::new();

    for id in selection.iter() {
        let Some(message) = messages.iter().find(|m| m.id == id) else {
            report.failures.push(CommitFailure {
                message_id: id.to_string(),
                error: GmailError::MessageNotFound(id.to_string()),
            });
            continue;
        };

        match extract(&message.payload) {
            Ok(content) => {
                let name = unique_name(&file_stem(message, now), &mut used);
                report.artifacts.push(FileArtifact {
                    message_id: message.id.clone(),
                    name,
                    mime_type: MARKDOWN_MIME_TYPE,
                    content,
                });
            }
            Err(error) => {
                warn!(message_id = %message.id, %error, "skipping message");
                report.failures.push(CommitFailure {
                    message_id: message.id.clone(),
                    error,
                });
            }
        }
    }

    report
}
