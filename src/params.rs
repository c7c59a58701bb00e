//! Path parameters captured by [`match_pattern`](crate::matching::match_pattern).
//!
//! ```
//! use convo_widgets::RouteParams;
//!
//! let mut params = RouteParams::new();
//! params.insert("workspace", "W1");
//! assert_eq!(params.get("workspace"), Some("W1"));
//! assert!(params.get("conversation").is_none());
//! ```

use std::collections::HashMap;

/// Named values extracted from `:param` pattern segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    params: HashMap<String, String>,
}

impl RouteParams {
    /// Create empty route parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a parameter value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Return `true` if the given key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Remove and return a parameter.
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }

    /// Return `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Return the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }
}
