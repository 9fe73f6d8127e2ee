use crate::codec;
use crate::error::{GmailError, Result};
use crate::types::MessagePart;
use htmd::HtmlToMarkdown;
use tracing::debug;

/// Flatten a message part tree into one markdown document.
///
/// Parts are visited in pre-order: a part's own body comes before its children, and children
/// are visited in the order the provider returned them. Multipart containers usually carry no
/// body, so their output is just their children's output.
pub fn extract(part: &MessagePart) -> Result<String> {
    let mut content = String::new();
    extract_into(part, &mut content)?;
    Ok(content)
}

fn extract_into(part: &MessagePart, content: &mut String) -> Result<()> {
    if let Some(data) = part.body_data() {
        if is_binary_mime(&part.mime_type) {
            debug!(part_id = %part.part_id, mime_type = %part.mime_type, "skipping binary part");
        } else {
            let text = codec::decode_to_text(data).map_err(|e| match e {
                GmailError::MalformedEncoding { length } => GmailError::extraction(
                    &part.part_id,
                    format!("body data of length {length} is not valid base64url"),
                ),
                GmailError::Extraction { reason, .. } => {
                    GmailError::extraction(&part.part_id, reason)
                }
                other => other,
            })?;

            if is_html_mime(&part.mime_type) {
                content.push_str(&html_to_markdown(&part.part_id, &text)?);
            } else {
                content.push_str(&text);
            }
        }
    }

    for child in &part.parts {
        extract_into(child, content)?;
    }

    Ok(())
}

fn html_to_markdown(part_id: &str, html: &str) -> Result<String> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style"])
        .build();
    converter
        .convert(html)
        .map_err(|e| GmailError::extraction(part_id, e))
}

fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn is_html_mime(mime_type: &str) -> bool {
    matches!(
        mime_essence(mime_type).as_str(),
        "text/html" | "application/xhtml+xml"
    )
}

// Attachments small enough to be inlined still carry body data.
fn is_binary_mime(mime_type: &str) -> bool {
    let essence = mime_essence(mime_type);
    if essence == "application/xhtml+xml" {
        return false;
    }
    ["image/", "audio/", "video/", "font/", "application/"]
        .iter()
        .any(|prefix| essence.starts_with(prefix))
}

/// Decode the handful of entities Gmail leaves in snippets. Unknown entities are kept as-is.
pub fn decode_html_entities(text: &str) -> String {
    const ENTITIES: [(&str, &str); 9] = [
        ("&#39;", "'"),
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&nbsp;", " "),
        ("&#x2F;", "/"),
        ("&#x27;", "'"),
        ("&#x60;", "`"),
    ];

    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match ENTITIES
            .iter()
            .find(|(entity, _)| candidate.starts_with(entity))
        {
            Some((entity, replacement)) => {
                decoded.push_str(replacement);
                rest = &candidate[entity.len()..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

/// `From` header without the `<address>` part, for listings.
pub fn sender_display(from: Option<&str>) -> String {
    let from = from.unwrap_or("").trim();
    let name = match (from.find('<'), from.find('>')) {
        (Some(open), Some(close)) if open < close => {
            format!("{}{}", &from[..open], &from[close + 1..])
        }
        _ => from.to_string(),
    };
    let name = name.trim().trim_matches('"').trim();
    if name.is_empty() {
        // Bare "<addr>" headers have no display name left; fall back to the address.
        let address = from.trim_matches(|c| c == '<' || c == '>').trim();
        if address.is_empty() {
            "Unknown Sender".to_string()
        } else {
            address.to_string()
        }
    } else {
        name.to_string()
    }
}
