//! Authentication: plaintext username/password check against the in-memory
//! user directory (SPEC_FULL §3, §9 — preserved without hashing, by design).

use std::collections::HashMap;

#[cfg(test)]
mod tests;

/// Outcome of a CONNECT authentication attempt, independent of the
/// capacity check that the connection handler performs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted,
    /// No username and `allow_anonymous` is false, or username present but
    /// unknown or with a mismatched password. MQTT 3.1.1 does not
    /// distinguish "bad username" from "bad password" at the wire level for
    /// this broker; both map to `RefusedNotAuthorized` (SPEC_FULL §4.3).
    Refused,
}

/// Direct string-equality password comparison. No hashing, no
/// constant-time compare — see SPEC_FULL §9 for why this is preserved
/// rather than hardened.
fn verify_password(password: &[u8], stored: &str) -> bool {
    match std::str::from_utf8(password) {
        Ok(pwd) => pwd == stored,
        Err(_) => false,
    }
}

/// Authenticate a CONNECT attempt against the user directory.
///
/// Order per SPEC_FULL §4.3: anonymous access is checked first, then
/// username/password lookup. The caller is responsible for the
/// `max_connections` capacity check, which takes priority over both.
pub fn authenticate(
    allow_anonymous: bool,
    users: &HashMap<String, String>,
    username: Option<&str>,
    password: Option<&[u8]>,
) -> AuthOutcome {
    let Some(username) = username else {
        return if allow_anonymous {
            AuthOutcome::Accepted
        } else {
            AuthOutcome::Refused
        };
    };

    let stored = match users.get(username) {
        Some(p) => p,
        None => return AuthOutcome::Refused,
    };

    if verify_password(password.unwrap_or(&[]), stored) {
        AuthOutcome::Accepted
    } else {
        AuthOutcome::Refused
    }
}
