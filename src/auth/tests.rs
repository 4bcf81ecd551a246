//! Auth module tests

use super::*;

fn users() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("alice".to_string(), "s3cret".to_string());
    m
}

#[test]
fn anonymous_accepted_when_allowed() {
    assert_eq!(
        authenticate(true, &HashMap::new(), None, None),
        AuthOutcome::Accepted
    );
}

#[test]
fn anonymous_refused_when_not_allowed() {
    assert_eq!(
        authenticate(false, &HashMap::new(), None, None),
        AuthOutcome::Refused
    );
}

#[test]
fn correct_credentials_accepted() {
    assert_eq!(
        authenticate(false, &users(), Some("alice"), Some(b"s3cret")),
        AuthOutcome::Accepted
    );
}

#[test]
fn wrong_password_refused() {
    assert_eq!(
        authenticate(false, &users(), Some("alice"), Some(b"wrong")),
        AuthOutcome::Refused
    );
}

#[test]
fn unknown_username_refused() {
    assert_eq!(
        authenticate(false, &users(), Some("bob"), Some(b"whatever")),
        AuthOutcome::Refused
    );
}
