//! Mount guards.
//!
//! Guards decide whether a widget may be mounted for the current route. They
//! are checked on every [`evaluate`](crate::WidgetController::evaluate) and
//! answer with a [`MountDecision`]:
//!
//! | Decision | Effect on the widget |
//! |----------|----------------------|
//! | [`Allow`](MountDecision::Allow) | mount (or stay mounted) |
//! | [`Deny`](MountDecision::Deny) | unmount (or stay unmounted) |
//! | [`Defer`](MountDecision::Defer) | not yet; schedule a bounded retry |
//!
//! All guard methods are **synchronous**. Anything asynchronous (waiting for
//! the toolbar, calling the backend) happens after the guards allowed the
//! mount.
//!
//! # Built-in guards
//!
//! | Guard | Purpose | Priority |
//! |-------|---------|----------|
//! | [`ConversationPageGuard`] | path is `/v2/location/{w}/conversations/{c}` | 100 |
//! | [`WorkspaceGuard`] | workspace is configured | 90 |
//! | [`FieldMappedGuard`] | workspace maps a required field | 80 |
//! | [`CredentialsGuard`] | credentials are already available | 10 |
//!
//! # Composition
//!
//! [`Guards`] is an AND composition. Guards run in **priority order**
//! (higher value first) and the first non-`Allow` decision short-circuits.
//!
//! ```
//! use convo_widgets::config::{ScriptConfig, WidgetConfig};
//! use convo_widgets::credentials::StaticCredentials;
//! use convo_widgets::guards::{FieldMappedGuard, GuardContext, Guards, MountGuard};
//! use convo_widgets::route::Route;
//!
//! let config = ScriptConfig::new().workspace(WidgetConfig::new("W1").field("snooze", "F1"));
//! let credentials = StaticCredentials::default();
//! let guards = Guards::standard().guard(FieldMappedGuard::new("snooze")).build();
//!
//! let route = Route::conversation("W1", "C1");
//! let cx = GuardContext::new(&route, &config, &credentials);
//! assert!(guards.check(&cx).is_allow());
//! ```

use crate::config::{ScriptConfig, WidgetConfig};
use crate::credentials::CredentialSource;
use crate::route::{is_conversation_page, is_target_workspace, Route};

// ============================================================================
// MountDecision
// ============================================================================

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountDecision {
    Allow,
    Deny { reason: String },
    /// Conditions may still be met later (e.g. credentials not captured yet).
    Defer { reason: String },
}

impl MountDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    pub fn defer(reason: impl Into<String>) -> Self {
        Self::Defer {
            reason: reason.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    pub fn is_defer(&self) -> bool {
        matches!(self, Self::Defer { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason } | Self::Defer { reason } => Some(reason),
        }
    }
}

/// What a guard gets to look at.
#[derive(Clone, Copy)]
pub struct GuardContext<'a> {
    pub route: &'a Route,
    pub config: &'a ScriptConfig,
    pub credentials: &'a dyn CredentialSource,
}

impl<'a> GuardContext<'a> {
    pub fn new(
        route: &'a Route,
        config: &'a ScriptConfig,
        credentials: &'a dyn CredentialSource,
    ) -> Self {
        Self {
            route,
            config,
            credentials,
        }
    }

    /// Configuration of the route's workspace, if it is configured.
    pub fn workspace(&self) -> Option<&'a WidgetConfig> {
        self.route
            .workspace()
            .and_then(|id| self.config.workspace_config(id))
    }
}

// ============================================================================
// MountGuard trait
// ============================================================================

/// Decides whether a widget may be mounted on the current route.
pub trait MountGuard: 'static {
    fn check(&self, cx: &GuardContext<'_>) -> MountDecision;

    /// Guard name for logs.
    fn name(&self) -> &'static str {
        "MountGuard"
    }

    /// Priority for execution order. Higher runs first. Default is 0.
    fn priority(&self) -> i32 {
        0
    }
}

// ============================================================================
// guard_fn helper
// ============================================================================

/// Create a guard from a closure.
///
/// ```
/// use convo_widgets::guards::{guard_fn, MountDecision};
///
/// let only_w1 = guard_fn(|cx| {
///     if cx.route.workspace() == Some("W1") {
///         MountDecision::Allow
///     } else {
///         MountDecision::deny("W1 only")
///     }
/// });
/// ```
pub const fn guard_fn<F>(f: F) -> FnGuard<F>
where
    F: Fn(&GuardContext<'_>) -> MountDecision + 'static,
{
    FnGuard { f }
}

/// Guard created from a closure.
pub struct FnGuard<F> {
    f: F,
}

impl<F> MountGuard for FnGuard<F>
where
    F: Fn(&GuardContext<'_>) -> MountDecision + 'static,
{
    fn check(&self, cx: &GuardContext<'_>) -> MountDecision {
        (self.f)(cx)
    }

    fn name(&self) -> &'static str {
        "FnGuard"
    }
}

// ============================================================================
// Built-in guards
// ============================================================================

/// Allows only conversation pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationPageGuard;

impl MountGuard for ConversationPageGuard {
    fn check(&self, cx: &GuardContext<'_>) -> MountDecision {
        if is_conversation_page(cx.route) {
            MountDecision::Allow
        } else {
            MountDecision::deny("not a conversation page")
        }
    }

    fn name(&self) -> &'static str {
        "ConversationPageGuard"
    }

    fn priority(&self) -> i32 {
        100
    }
}

/// Allows only workspaces present in the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceGuard;

impl MountGuard for WorkspaceGuard {
    fn check(&self, cx: &GuardContext<'_>) -> MountDecision {
        if is_target_workspace(cx.route, &cx.config.workspace_ids()) {
            MountDecision::Allow
        } else {
            MountDecision::deny(format!(
                "workspace `{}` is not configured",
                cx.route.workspace().unwrap_or("<none>")
            ))
        }
    }

    fn name(&self) -> &'static str {
        "WorkspaceGuard"
    }

    fn priority(&self) -> i32 {
        90
    }
}

/// Requires the workspace to map a logical field to a remote field id.
#[derive(Debug, Clone)]
pub struct FieldMappedGuard {
    field: String,
}

impl FieldMappedGuard {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl MountGuard for FieldMappedGuard {
    fn check(&self, cx: &GuardContext<'_>) -> MountDecision {
        match cx.workspace() {
            Some(workspace) if workspace.field_id(&self.field).is_some() => MountDecision::Allow,
            _ => MountDecision::deny(format!("field `{}` is not mapped", self.field)),
        }
    }

    fn name(&self) -> &'static str {
        "FieldMappedGuard"
    }

    fn priority(&self) -> i32 {
        80
    }
}

/// Defers mounting until credentials are available.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialsGuard;

impl MountGuard for CredentialsGuard {
    fn check(&self, cx: &GuardContext<'_>) -> MountDecision {
        if cx.credentials.credentials().is_some() {
            MountDecision::Allow
        } else {
            MountDecision::defer(format!(
                "no credentials from {} yet",
                cx.credentials.name()
            ))
        }
    }

    fn name(&self) -> &'static str {
        "CredentialsGuard"
    }

    fn priority(&self) -> i32 {
        10
    }
}

// ============================================================================
// Guards (AND composition)
// ============================================================================

/// All guards must allow.
pub struct Guards {
    guards: Vec<Box<dyn MountGuard>>,
}

impl Guards {
    /// Create an AND composition, ordered by priority.
    pub fn new(mut guards: Vec<Box<dyn MountGuard>>) -> Self {
        guards.sort_by_key(|g| std::cmp::Reverse(g.priority()));
        Self { guards }
    }

    pub fn builder() -> GuardBuilder {
        GuardBuilder::new()
    }

    /// Builder pre-loaded with the checks every widget needs: conversation
    /// page and configured workspace.
    pub fn standard() -> GuardBuilder {
        GuardBuilder::new()
            .guard(ConversationPageGuard)
            .guard(WorkspaceGuard)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }
}

impl MountGuard for Guards {
    fn check(&self, cx: &GuardContext<'_>) -> MountDecision {
        for guard in &self.guards {
            let decision = guard.check(cx);
            if !decision.is_allow() {
                return decision;
            }
        }
        MountDecision::Allow
    }

    fn name(&self) -> &'static str {
        "Guards"
    }

    fn priority(&self) -> i32 {
        self.guards.first().map_or(0, |g| g.priority())
    }
}

/// Builder for [`Guards`] with fluent API.
#[must_use]
pub struct GuardBuilder {
    guards: Vec<Box<dyn MountGuard>>,
}

impl GuardBuilder {
    pub fn new() -> Self {
        Self { guards: Vec::new() }
    }

    pub fn guard<G: MountGuard>(mut self, guard: G) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    pub fn build(self) -> Guards {
        Guards::new(self.guards)
    }
}

impl Default for GuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
