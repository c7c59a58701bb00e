//! Route matching for the host application's locations.
//!
//! The host SPA addresses a workspace as `/v2/location/{workspace}/...` and a
//! conversation as `/v2/location/{workspace}/conversations/{conversation}`.
//! Some host views repeat the `conversations` segment
//! (`.../conversations/conversations/{conversation}`), so the conversation
//! id is the segment following the **last** `conversations` segment.
//!
//! ```
//! use convo_widgets::route::{current_route, is_conversation_page, is_target_workspace};
//!
//! let route = current_route("/v2/location/W1/conversations/conversations/C1");
//! assert_eq!(route.workspace_id.as_deref(), Some("W1"));
//! assert_eq!(route.conversation_id.as_deref(), Some("C1"));
//! assert!(is_conversation_page(&route));
//! assert!(is_target_workspace(&route, &["W1"]));
//! ```

use crate::matching::match_pattern;

/// Pattern every workspace-scoped host path starts with.
pub const WORKSPACE_PATTERN: &str = "/v2/location/:workspace";

const CONVERSATIONS_SEGMENT: &str = "conversations";

/// Location of the host SPA, reduced to what the widgets care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Route {
    /// Workspace (location) id, `None` outside workspace paths
    pub workspace_id: Option<String>,
    /// Conversation id, only set on conversation pages
    pub conversation_id: Option<String>,
}

impl Route {
    /// Parse a pathname. Never fails; unknown paths give an empty route.
    pub fn from_path(pathname: &str) -> Self {
        let Some(mut matched) = match_pattern(pathname, WORKSPACE_PATTERN) else {
            return Self::default();
        };
        let workspace_id = matched.params.take("workspace");
        let conversation_id = conversation_from_segments(&matched.remaining);

        Self {
            workspace_id,
            conversation_id,
        }
    }

    /// Route pointing at a conversation, mostly useful in tests.
    pub fn conversation(workspace_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            workspace_id: Some(workspace_id.into()),
            conversation_id: Some(conversation_id.into()),
        }
    }

    /// Workspace id as `&str`.
    pub fn workspace(&self) -> Option<&str> {
        self.workspace_id.as_deref()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.workspace_id, &self.conversation_id) {
            (Some(w), Some(c)) => write!(f, "workspace {w} / conversation {c}"),
            (Some(w), None) => write!(f, "workspace {w}"),
            _ => write!(f, "outside workspace"),
        }
    }
}

fn conversation_from_segments(remaining: &[String]) -> Option<String> {
    if remaining.first().map(String::as_str) != Some(CONVERSATIONS_SEGMENT) {
        return None;
    }
    let last = remaining
        .iter()
        .rposition(|segment| segment == CONVERSATIONS_SEGMENT)?;
    remaining.get(last + 1).cloned()
}

/// Route for the given pathname.
pub fn current_route(pathname: &str) -> Route {
    Route::from_path(pathname)
}

/// True when the route is a workspace the widgets are configured for.
pub fn is_target_workspace<S: AsRef<str>>(route: &Route, supported: &[S]) -> bool {
    route
        .workspace()
        .is_some_and(|id| supported.iter().any(|s| s.as_ref() == id))
}

/// True iff the path matched `/v2/location/{id}/conversations/{id}`.
pub fn is_conversation_page(route: &Route) -> bool {
    route.workspace_id.is_some() && route.conversation_id.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_route() {
        let route = current_route("/v2/location/W1/conversations/C1");
        assert_eq!(route, Route::conversation("W1", "C1"));
        assert!(is_conversation_page(&route));
    }

    #[test]
    fn test_repeated_conversations_segment() {
        let route = current_route("/v2/location/W1/conversations/conversations/C9");
        assert_eq!(route.conversation_id.as_deref(), Some("C9"));
    }

    #[test]
    fn test_trailing_segments_allowed() {
        let route = current_route("/v2/location/W1/conversations/C1/details");
        assert_eq!(route.conversation_id.as_deref(), Some("C1"));
    }

    #[test]
    fn test_conversation_list_is_not_a_conversation_page() {
        let route = current_route("/v2/location/W1/conversations");
        assert_eq!(route.workspace(), Some("W1"));
        assert!(!is_conversation_page(&route));

        let route = current_route("/v2/location/W1/conversations/conversations");
        assert!(!is_conversation_page(&route));
    }

    #[test]
    fn test_other_workspace_views() {
        let route = current_route("/v2/location/W1/contacts/smart_list/All");
        assert_eq!(route.workspace(), Some("W1"));
        assert!(route.conversation_id.is_none());
    }

    #[test]
    fn test_unknown_path_gives_empty_route() {
        let route = current_route("/login");
        assert_eq!(route, Route::default());
        assert!(!is_target_workspace(&route, &["W1"]));
    }

    #[test]
    fn test_target_workspace() {
        let route = current_route("/v2/location/W2/conversations/C1");
        assert!(!is_target_workspace(&route, &["W1"]));
        assert!(is_target_workspace(&route, &["W1", "W2"]));
        assert!(!is_target_workspace::<&str>(&route, &[]));
    }
}
