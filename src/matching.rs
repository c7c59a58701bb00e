//! Segment-based path matching.
//!
//! Patterns are split on `/` and compared segment by segment:
//!
//! - literal segments must match exactly
//! - `:name` segments capture the path segment into [`RouteParams`]
//! - path segments beyond the end of the pattern are returned as `remaining`
//!   (prefix semantics, the host SPA appends sub-views freely)
//!
//! No regex, no wildcards.

use crate::params::RouteParams;

/// Result of matching a path against a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Captured `:param` values
    pub params: RouteParams,
    /// Path segments left over after the pattern was consumed
    pub remaining: Vec<String>,
}

/// Match `path` against `pattern` as a prefix.
///
/// ```
/// use convo_widgets::matching::match_pattern;
///
/// let m = match_pattern("/v2/location/W1/contacts/detail", "/v2/location/:workspace").unwrap();
/// assert_eq!(m.params.get("workspace"), Some("W1"));
/// assert_eq!(m.remaining, vec!["contacts", "detail"]);
///
/// assert!(match_pattern("/settings", "/v2/location/:workspace").is_none());
/// ```
pub fn match_pattern(path: &str, pattern: &str) -> Option<PatternMatch> {
    let path_segments = split_path(path);
    let pattern_segments = split_path(pattern);

    if pattern_segments.len() > path_segments.len() {
        return None;
    }

    let mut params = RouteParams::new();
    for (pattern_seg, path_seg) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = extract_param_name(pattern_seg) {
            params.insert(name, path_seg.clone());
        } else if pattern_seg != path_seg {
            return None;
        }
    }

    Some(PatternMatch {
        params,
        remaining: path_segments[pattern_segments.len()..].to_vec(),
    })
}

/// Split a path into segments, filtering empty segments
///
/// ```
/// use convo_widgets::matching::split_path;
///
/// assert_eq!(split_path("/v2/location/"), vec!["v2", "location"]);
/// assert!(split_path("/").is_empty());
/// ```
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Extract parameter name from a pattern segment
pub fn extract_param_name(segment: &str) -> Option<&str> {
    segment.strip_prefix(':').filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/users/123"), vec!["users", "123"]);
        assert_eq!(split_path("//a///b/"), vec!["a", "b"]);
        assert_eq!(split_path(""), Vec::<String>::new());
    }

    #[test]
    fn test_extract_param_name() {
        assert_eq!(extract_param_name(":workspace"), Some("workspace"));
        assert_eq!(extract_param_name("location"), None);
        assert_eq!(extract_param_name(":"), None);
    }

    #[test]
    fn test_exact_match() {
        let m = match_pattern("/v2/location/W1", "/v2/location/:workspace").unwrap();
        assert_eq!(m.params.get("workspace"), Some("W1"));
        assert!(m.remaining.is_empty());
    }

    #[test]
    fn test_literal_mismatch() {
        assert!(match_pattern("/v1/location/W1", "/v2/location/:workspace").is_none());
    }

    #[test]
    fn test_path_shorter_than_pattern() {
        assert!(match_pattern("/v2/location", "/v2/location/:workspace").is_none());
    }
}
