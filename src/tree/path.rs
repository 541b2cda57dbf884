//! Path parsing helpers.

use crate::error::{Result, TreeError};

/// Segment separator used in every path.
pub const SEPARATOR: char = '/';

/// Split a path into its segments, dropping the empty ones that repeated,
/// leading or trailing separators produce.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Split a path and reject it if nothing usable is left.
///
/// Fails with `InvalidPath` when the path is empty, whitespace-only, made
/// only of separators, or deeper than `max_depth` segments.
pub(crate) fn parse_path(path: &str, max_depth: usize) -> Result<Vec<&str>> {
    if path.trim().is_empty() {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    let segments = split_path(path);
    if segments.is_empty() || segments.len() > max_depth {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Normalize a path to the form used as a node key ("a/b/c").
pub fn normalize_path(path: &str) -> String {
    split_path(path).join("/")
}

/// Join a parent path and a child name.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("HKEY_USERS"), vec!["HKEY_USERS"]);
        assert_eq!(
            split_path("HKEY_LOCAL_MACHINE/Software/Vendor"),
            vec!["HKEY_LOCAL_MACHINE", "Software", "Vendor"]
        );
        assert_eq!(split_path("/a//b/"), vec!["a", "b"]);
        assert!(split_path("///").is_empty());
    }

    #[test]
    fn test_parse_path_rejects_unusable_input() {
        assert!(matches!(parse_path("", 8), Err(TreeError::InvalidPath(_))));
        assert!(matches!(parse_path("   ", 8), Err(TreeError::InvalidPath(_))));
        assert!(matches!(parse_path("///", 8), Err(TreeError::InvalidPath(_))));
        assert!(matches!(parse_path("a/b/c", 2), Err(TreeError::InvalidPath(_))));
        assert_eq!(parse_path("a/b", 2).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_whitespace_segments_are_names() {
        // Only empty segments are dropped; a key may legitimately be " ".
        assert_eq!(split_path("a/ /b"), vec!["a", " ", "b"]);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("HKEY_USERS"), "HKEY_USERS");
        assert_eq!(normalize_path("/HKEY_USERS/"), "HKEY_USERS");
        assert_eq!(normalize_path("a//b///c"), "a/b/c");
        assert_eq!(join_path("a/b", "c"), "a/b/c");
    }
}
