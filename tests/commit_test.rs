use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use gmailmd::packaging::commit_at;
use gmailmd::state::SelectionSet;
use gmailmd::types::{Message, MARKDOWN_MIME_TYPE};
use gmailmd::GmailError;

fn message(id: &str, subject: Option<&str>, payload_parts: Value) -> Message {
    let headers = match subject {
        Some(subject) => json!([{ "name": "Subject", "value": subject }]),
        None => json!([{ "name": "From", "value": "Alice <alice@example.com>" }]),
    };
    serde_json::from_value(json!({
        "id": id,
        "threadId": format!("t-{id}"),
        "payload": {
            "partId": "",
            "mimeType": "multipart/alternative",
            "headers": headers,
            "parts": payload_parts,
        }
    }))
    .unwrap()
}

fn text_part(part_id: &str, mime_type: &str, data: &str) -> Value {
    json!({
        "partId": part_id,
        "mimeType": mime_type,
        "body": { "size": data.len(), "data": data }
    })
}

fn select(ids: &[&str]) -> SelectionSet {
    let mut selection = SelectionSet::new();
    for id in ids {
        selection.toggle(id);
    }
    selection
}

#[test]
fn test_commit_names_files_after_subject() {
    let messages = vec![message(
        "m1",
        Some("Q3 Report!!"),
        json!([
            text_part("0", "text/plain", "UXVhcnRlcmx5IG51bWJlcnMgYXR0YWNoZWQuCg"),
            text_part("1", "text/html", "PHA-UmV2ZW51ZSBpcyA8Yj51cDwvYj48L3A-"),
        ]),
    )];

    let report = commit_at(&select(&["m1"]), &messages, Utc::now());

    assert!(report.is_complete());
    assert_eq!(report.artifacts.len(), 1);
    let artifact = &report.artifacts[0];
    assert_eq!(artifact.name, "q3-report.md");
    assert_eq!(artifact.mime_type, MARKDOWN_MIME_TYPE);
    assert_eq!(artifact.message_id, "m1");
    assert!(artifact.content.starts_with("Quarterly numbers attached.\n"));
    assert!(artifact.content.contains("Revenue is **up**"));
}

#[test]
fn test_untitled_fallback_only_without_subject() {
    let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
    let messages = vec![
        message("m1", None, json!([text_part("0", "text/plain", "bm8gc3ViamVjdCBoZXJl")])),
        message("m2", Some("!!!"), json!([text_part("0", "text/plain", "SGkgdGhlcmU")])),
        message("m3", Some("Lunch"), json!([text_part("0", "text/plain", "THVuY2ggYXQgbm9vbj8")])),
    ];

    let report = commit_at(&select(&["m1", "m2", "m3"]), &messages, now);

    let names: Vec<_> = report.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "untitled-1700000000123.md",
            "untitled-1700000000123-2.md",
            "lunch.md"
        ]
    );
    assert_eq!(report.artifacts[0].content, "no subject here");
}

#[test]
fn test_commit_follows_selection_order() {
    let messages = vec![
        message("a", Some("Alpha"), json!([text_part("0", "text/plain", "SGkgdGhlcmU")])),
        message("b", Some("Beta"), json!([text_part("0", "text/plain", "SGkgdGhlcmU")])),
    ];

    let report = commit_at(&select(&["b", "a"]), &messages, Utc::now());

    let ids: Vec<_> = report.artifacts.iter().map(|a| a.message_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[test]
fn test_one_bad_message_does_not_block_the_rest() {
    let messages = vec![
        message("good", Some("Lunch"), json!([text_part("0", "text/plain", "THVuY2ggYXQgbm9vbj8")])),
        // Five characters leave a remainder of one: not decodable.
        message("broken", Some("Broken"), json!([text_part("0.1", "text/plain", "SGkgd")])),
    ];

    let report = commit_at(
        &select(&["broken", "missing", "good"]),
        &messages,
        Utc::now(),
    );

    assert!(!report.is_complete());
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].name, "lunch.md");
    assert_eq!(report.artifacts[0].content, "Lunch at noon?");

    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].message_id, "broken");
    assert!(matches!(
        &report.failures[0].error,
        GmailError::Extraction { part_id, .. } if part_id == "0.1"
    ));
    assert_eq!(report.failures[1].message_id, "missing");
    assert!(matches!(
        &report.failures[1].error,
        GmailError::MessageNotFound(id) if id == "missing"
    ));
}

#[test]
fn test_non_latin_subjects_keep_their_words() {
    let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
    let messages = vec![
        message("m1", Some("Café menu"), json!([text_part("0", "text/plain", "SGkgdGhlcmU")])),
        message("m2", Some("北京"), json!([text_part("0", "text/plain", "SGkgdGhlcmU")])),
    ];

    let report = commit_at(&select(&["m1", "m2"]), &messages, now);

    let names: Vec<_> = report.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["cafe-menu.md", "bei-jing.md"]);
}
