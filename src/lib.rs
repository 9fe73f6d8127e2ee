//! Search a Gmail mailbox and turn the chosen messages into markdown documents.

pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod codec;
pub mod config;
pub mod database;
pub mod email_content;
pub mod error;
pub mod gmail_api;
pub mod packaging;
pub mod state;
pub mod storage;
pub mod types;
pub mod upload;

pub use error::{GmailError, Result};
