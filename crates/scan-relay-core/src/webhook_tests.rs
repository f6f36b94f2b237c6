//! Tests for push event extraction.

use super::*;

#[test]
fn test_extracts_clone_url_and_commit_count() {
    let body = br#"{"repository":{"clone_url":"https://example.com/org/repo.git"},"commits":[{},{}]}"#;
    let event = WebhookEvent::from_payload(body).unwrap();

    assert_eq!(event.repository_clone_url, "https://example.com/org/repo.git");
    assert_eq!(event.commit_count, 2);
}

#[test]
fn test_commits_are_optional() {
    let body = br#"{"repository":{"clone_url":"https://example.com/org/repo.git","name":"repo"}}"#;
    let event = WebhookEvent::from_payload(body).unwrap();

    assert_eq!(event.commit_count, 0);
}

#[test]
fn test_clone_url_is_trimmed() {
    let body = br#"{"repository":{"clone_url":"  https://example.com/org/repo.git\n"}}"#;
    let event = WebhookEvent::from_payload(body).unwrap();

    assert_eq!(event.repository_clone_url, "https://example.com/org/repo.git");
}

#[test]
fn test_missing_repository_is_malformed() {
    let result = WebhookEvent::from_payload(br#"{"zen":"Keep it logically awesome."}"#);
    assert!(matches!(result, Err(PayloadError::Malformed(_))));
}

#[test]
fn test_non_json_is_malformed() {
    let result = WebhookEvent::from_payload(b"payload=%7B%7D");
    assert!(matches!(result, Err(PayloadError::Malformed(_))));
}

#[test]
fn test_non_string_clone_url_is_malformed() {
    let result = WebhookEvent::from_payload(br#"{"repository":{"clone_url":42}}"#);
    assert!(matches!(result, Err(PayloadError::Malformed(_))));
}

#[test]
fn test_blank_clone_url_rejected() {
    let result = WebhookEvent::from_payload(br#"{"repository":{"clone_url":"   "}}"#);
    assert!(matches!(result, Err(PayloadError::EmptyCloneUrl)));
}
