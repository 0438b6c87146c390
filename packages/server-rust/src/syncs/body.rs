//! Field extraction from loosely shaped request bodies.
//!
//! Clients name the same field several ways (`owner`, `ownerId`, `user`), so
//! every helper takes a list of alias keys and uses the first usable one.
//! Numbers are accepted wherever a string is expected.

use mediator_core::Document;
use serde_json::Value;

use crate::service::operation::UnitError;

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First alias holding a non-blank string or number, trimmed.
#[must_use]
pub fn pick_string(body: &Document, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| body.get(*key).and_then(as_text))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// First alias holding a string or number, untrimmed and possibly empty.
#[must_use]
pub fn pick_text(body: &Document, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| body.get(*key).and_then(as_text))
}

/// Like [`pick_string`], but a missing value is an error naming `field`.
///
/// # Errors
///
/// Rejects with `"{field} is required."`.
pub fn require_string(body: &Document, keys: &[&str], field: &str) -> Result<String, UnitError> {
    pick_string(body, keys).ok_or_else(|| UnitError::rejected(format!("{field} is required.")))
}

/// Like [`pick_text`], but a missing or empty value is an error.
///
/// # Errors
///
/// Rejects with `"{field} is required."`.
pub fn require_text(body: &Document, keys: &[&str], field: &str) -> Result<String, UnitError> {
    pick_text(body, keys)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UnitError::rejected(format!("{field} is required.")))
}

/// Whether `key` is present at all, even as `null`.
#[must_use]
pub fn has_key(body: &Document, key: &str) -> bool {
    body.contains_key(key)
}

/// A field that distinguishes "absent" from "explicitly null".
///
/// Returns `None` when no alias holds a usable value, `Some(None)` for an
/// explicit `null`, and `Some(Some(s))` for a string or number (trimmed).
/// Aliases holding other types are skipped.
#[must_use]
pub fn pick_nullable_string(body: &Document, keys: &[&str]) -> Option<Option<String>> {
    keys.iter().find_map(|key| match body.get(*key)? {
        Value::Null => Some(None),
        other => as_text(other).map(|s| Some(s.trim().to_string())),
    })
}

/// First alias holding a boolean, or the string `"true"`/`"false"` in any
/// case. An explicit `null` ends the search.
#[must_use]
pub fn pick_boolean(body: &Document, keys: &[&str]) -> Option<bool> {
    for key in keys {
        match body.get(*key) {
            Some(Value::Bool(b)) => return Some(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => return Some(true),
                "false" => return Some(false),
                _ => {}
            },
            Some(Value::Null) => return None,
            _ => {}
        }
    }
    None
}

/// The caller identity an upstream authenticator attached as `authUser`.
#[must_use]
pub fn auth_user(body: &Document) -> Option<String> {
    match body.get("authUser") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Requires `authUser` to equal `claimed`.
///
/// # Errors
///
/// Rejects with `"Forbidden: {role} must match authenticated user."`.
pub fn require_caller(body: &Document, claimed: &str, role: &str) -> Result<(), UnitError> {
    match auth_user(body) {
        Some(user) if user == claimed => Ok(()),
        _ => Err(UnitError::rejected(format!(
            "Forbidden: {role} must match authenticated user."
        ))),
    }
}
