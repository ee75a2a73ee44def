//! Bus names and object paths.
//!
//! The layout is fixed by the Secret Service API:
//!
//! ```text
//! /org/freedesktop/secrets                         service root
//! /org/freedesktop/secrets/collections/<name>      collection
//! /org/freedesktop/secrets/collections/<name>/<id> item
//! /org/freedesktop/secrets/aliases/<name>          alias of a collection
//! /org/freedesktop/secrets/session/<n>             session
//! /org/freedesktop/secrets/prompt/<n>              prompt
//! ```
//!
//! Object path segments may only contain `[A-Za-z0-9_]`, so vault UUIDs are
//! stored with their hyphens stripped.

pub const BUS_NAME: &str = "org.freedesktop.secrets";
pub const SERVICE_PATH: &str = "/org/freedesktop/secrets";
pub const COLLECTION_PREFIX: &str = "/org/freedesktop/secrets/collections";
pub const ALIAS_PREFIX: &str = "/org/freedesktop/secrets/aliases";
pub const SESSION_PREFIX: &str = "/org/freedesktop/secrets/session";
pub const PROMPT_PREFIX: &str = "/org/freedesktop/secrets/prompt";

/// The path returned where the protocol expects a prompt but none is needed.
pub const NO_PROMPT: &str = "/";

/// Name and alias of the one collection this service provides.
pub const DEFAULT_COLLECTION: &str = "default";

pub fn collection_path(name: &str) -> String {
    format!("{}/{}", COLLECTION_PREFIX, name)
}

pub fn alias_path(name: &str) -> String {
    format!("{}/{}", ALIAS_PREFIX, name)
}

pub fn item_path(collection: &str, item_id: &str) -> String {
    format!("{}/{}/{}", COLLECTION_PREFIX, collection, item_id)
}

pub fn session_path(n: u64) -> String {
    format!("{}/{}", SESSION_PREFIX, n)
}

pub fn prompt_path(n: u64) -> String {
    format!("{}/{}", PROMPT_PREFIX, n)
}

/// Split an item path into `(collection, item_id)`.
///
/// Items addressed through an alias (`aliases/<name>/<id>`) resolve to the
/// alias name as collection.
pub fn parse_item_path(path: &str) -> Option<(&str, &str)> {
    let rest = path
        .strip_prefix(COLLECTION_PREFIX)
        .or_else(|| path.strip_prefix(ALIAS_PREFIX))?
        .strip_prefix('/')?;
    let (collection, item) = rest.split_once('/')?;
    if collection.is_empty() || item.is_empty() || item.contains('/') {
        return None;
    }
    Some((collection, item))
}

/// Turn a vault identifier into an object path segment.
///
/// Hyphens are dropped and any other character outside `[A-Za-z0-9_]`
/// becomes `_`. Applying it twice gives the same result as applying it once.
pub fn sanitize(id: &str) -> String {
    id.chars()
        .filter(|c| *c != '-')
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Re-insert UUID hyphens at offsets 8, 12, 16 and 20.
///
/// Only exactly 32-character ASCII inputs are transformed; anything else is
/// returned unchanged.
pub fn unsanitize(segment: &str) -> String {
    if segment.len() != 32 || !segment.is_ascii() {
        return segment.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &segment[..8],
        &segment[8..12],
        &segment[12..16],
        &segment[16..20],
        &segment[20..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "5f1a6c0e-3b7d-4e9a-8c21-0d4b6e8f9a12";

    #[test]
    fn test_sanitize_strips_hyphens() {
        assert_eq!(sanitize(UUID), "5f1a6c0e3b7d4e9a8c210d4b6e8f9a12");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for raw in [UUID, "plain_id", "a.b-c d", "", "ünïcode-id"] {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once);
            assert!(once.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }

    #[test]
    fn test_unsanitize_restores_canonical_uuid() {
        assert_eq!(unsanitize(&sanitize(UUID)), UUID);
    }

    #[test]
    fn test_unsanitize_passes_other_lengths_through() {
        assert_eq!(unsanitize("short"), "short");
        assert_eq!(unsanitize(UUID), UUID);
        assert_eq!(unsanitize(&"a".repeat(33)), "a".repeat(33));
    }

    #[test]
    fn test_parse_item_path() {
        let path = item_path(DEFAULT_COLLECTION, "abc123");
        assert_eq!(parse_item_path(&path), Some(("default", "abc123")));
        assert_eq!(
            parse_item_path("/org/freedesktop/secrets/aliases/default/abc123"),
            Some(("default", "abc123"))
        );
        assert_eq!(parse_item_path(&collection_path("default")), None);
        assert_eq!(parse_item_path("/org/freedesktop/secrets/session/1"), None);
        assert_eq!(parse_item_path(&format!("{}/x/y", path)), None);
    }
}
