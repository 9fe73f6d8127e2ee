//! Base64url handling for Gmail body data.
//!
//! Gmail encodes `body.data` with the URL-safe alphabet and usually omits padding. Decoding is
//! done in two steps: [`decode`] rewrites the input into padded standard base64, and the
//! standard engine turns that into bytes.

use base64::engine::general_purpose::STANDARD;
use base64::engine::Engine;

use crate::error::{GmailError, Result};

/// Rewrite a base64url string into padded standard base64.
pub fn decode(input: &str) -> Result<String> {
    let mut output: String = input
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    match output.len() % 4 {
        0 => {}
        1 => {
            return Err(GmailError::MalformedEncoding {
                length: output.len(),
            })
        }
        pad => output.extend(std::iter::repeat('=').take(4 - pad)),
    }

    Ok(output)
}

pub fn decode_to_bytes(input: &str) -> Result<Vec<u8>> {
    let standard = decode(input)?;
    STANDARD
        .decode(standard.as_bytes())
        .map_err(|_| GmailError::MalformedEncoding {
            length: input.len(),
        })
}

/// Decode body data all the way to UTF-8 text.
pub fn decode_to_text(input: &str) -> Result<String> {
    let bytes = decode_to_bytes(input)?;
    String::from_utf8(bytes).map_err(|e| GmailError::extraction("", e))
}
