//! Credentials for the host application's REST API.
//!
//! The widgets never log in on their own; they borrow the session the host
//! application already has. Two acquisition strategies exist in the wild and
//! both are supported as [`CredentialSource`] implementations:
//!
//! - [`HostAuthState`] reads the signed-in user from the host application's
//!   in-memory state (bearer token plus `x-api-key`).
//! - [`CapturedCredentials`] passively records the bearer token and
//!   `Token-Id` header from requests the host application makes itself.
//!
//! [`FallbackCredentials`] chains them; the browser binding prefers the auth
//! state and falls back to captured headers.
//!
//! The controller and the gateway only ever hold a [`Credentials`] value for
//! the duration of one request.

use crate::info_log;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Credentials
// ============================================================================

/// Which header identifies the tenant next to the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantHeader {
    /// `x-api-key`, paired with tokens read from host state
    ApiKey,
    /// `Token-Id`, paired with tokens captured from host traffic
    TokenId,
}

impl TenantHeader {
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::ApiKey => "x-api-key",
            Self::TokenId => "Token-Id",
        }
    }
}

/// Bearer token plus tenant identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub tenant_header: TenantHeader,
    pub tenant_value: String,
}

impl Credentials {
    pub fn new(
        token: impl Into<String>,
        tenant_header: TenantHeader,
        tenant_value: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            tenant_header,
            tenant_value: tenant_value.into(),
        }
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("tenant_header", &self.tenant_header)
            .field("tenant_value", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials for gateway calls.
pub trait CredentialSource {
    /// Current credentials, `None` while they are not available.
    fn credentials(&self) -> Option<Credentials>;

    /// Name for logs.
    fn name(&self) -> &'static str {
        "CredentialSource"
    }
}

// ============================================================================
// HostAuthState
// ============================================================================

/// Signed-in user as exposed by the host application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub api_key: String,
}

type AuthReader = Box<dyn Fn() -> Option<AuthUser>>;

/// Reads credentials from the host application's auth state on every call.
pub struct HostAuthState {
    read: AuthReader,
}

impl HostAuthState {
    pub fn new<F>(read: F) -> Self
    where
        F: Fn() -> Option<AuthUser> + 'static,
    {
        Self {
            read: Box::new(read),
        }
    }
}

impl CredentialSource for HostAuthState {
    fn credentials(&self) -> Option<Credentials> {
        let user = (self.read)()?;
        if user.auth_token.is_empty() || user.api_key.is_empty() {
            return None;
        }
        Some(Credentials::new(
            user.auth_token,
            TenantHeader::ApiKey,
            user.api_key,
        ))
    }

    fn name(&self) -> &'static str {
        "HostAuthState"
    }
}

// ============================================================================
// CapturedCredentials
// ============================================================================

/// Credentials captured from the host application's own API traffic.
///
/// ```
/// use convo_widgets::credentials::{CapturedCredentials, CredentialSource};
///
/// let captured = CapturedCredentials::new("leadconnectorhq.com");
/// captured.observe_request(
///     "https://services.leadconnectorhq.com/users/me",
///     [("Authorization", "Bearer abc"), ("token-id", "tid")],
/// );
/// let creds = captured.credentials().unwrap();
/// assert_eq!(creds.token, "abc");
/// assert_eq!(creds.tenant_value, "tid");
/// ```
#[derive(Debug)]
pub struct CapturedCredentials {
    host_fragment: String,
    token: RefCell<Option<String>>,
    token_id: RefCell<Option<String>>,
}

impl CapturedCredentials {
    /// Capture only from requests whose URL contains `host_fragment`.
    pub fn new(host_fragment: impl Into<String>) -> Self {
        Self {
            host_fragment: host_fragment.into(),
            token: RefCell::new(None),
            token_id: RefCell::new(None),
        }
    }

    /// Inspect an outgoing request. Returns `true` if anything was captured.
    pub fn observe_request<I, K, V>(&self, url: &str, headers: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if !url.contains(&self.host_fragment) {
            return false;
        }

        let mut captured = false;
        for (name, value) in headers {
            let (name, value) = (name.as_ref(), value.as_ref().trim());
            if name.eq_ignore_ascii_case("authorization") {
                if let Some(token) = value.strip_prefix("Bearer ").map(str::trim) {
                    if !token.is_empty() {
                        captured |= replace_if_changed(&self.token, token, "bearer token");
                    }
                }
            } else if name.eq_ignore_ascii_case("token-id") && !value.is_empty() {
                captured |= replace_if_changed(&self.token_id, value, "Token-Id");
            }
        }
        captured
    }

    /// Forget everything captured so far.
    pub fn clear(&self) {
        self.token.borrow_mut().take();
        self.token_id.borrow_mut().take();
    }
}

fn replace_if_changed(slot: &RefCell<Option<String>>, value: &str, what: &str) -> bool {
    let mut slot = slot.borrow_mut();
    if slot.as_deref() == Some(value) {
        return false;
    }
    if slot.is_none() {
        info_log!("captured {} from host traffic", what);
    }
    *slot = Some(value.to_string());
    true
}

impl CredentialSource for CapturedCredentials {
    fn credentials(&self) -> Option<Credentials> {
        let token = self.token.borrow().clone()?;
        let token_id = self.token_id.borrow().clone()?;
        Some(Credentials::new(token, TenantHeader::TokenId, token_id))
    }

    fn name(&self) -> &'static str {
        "CapturedCredentials"
    }
}

// ============================================================================
// StaticCredentials
// ============================================================================

/// Credentials set explicitly, e.g. by an embedding page or a test.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    current: RefCell<Option<Credentials>>,
}

impl StaticCredentials {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            current: RefCell::new(credentials),
        }
    }

    pub fn set(&self, credentials: Credentials) {
        *self.current.borrow_mut() = Some(credentials);
    }

    pub fn clear(&self) {
        self.current.borrow_mut().take();
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Option<Credentials> {
        self.current.borrow().clone()
    }

    fn name(&self) -> &'static str {
        "StaticCredentials"
    }
}

// ============================================================================
// FallbackCredentials
// ============================================================================

/// Tries several sources in order and uses the first one that has
/// credentials.
#[derive(Default)]
pub struct FallbackCredentials {
    sources: Vec<Rc<dyn CredentialSource>>,
}

impl FallbackCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: Rc<dyn CredentialSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl CredentialSource for FallbackCredentials {
    fn credentials(&self) -> Option<Credentials> {
        self.sources.iter().find_map(|source| source.credentials())
    }

    fn name(&self) -> &'static str {
        "FallbackCredentials"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_uses_first_available() {
        let captured = Rc::new(CapturedCredentials::new("leadconnectorhq.com"));
        let fallback = FallbackCredentials::new()
            .source(Rc::new(HostAuthState::new(|| None)))
            .source(captured.clone());
        assert_eq!(fallback.len(), 2);
        assert!(fallback.credentials().is_none());

        captured.observe_request(
            "https://backend.leadconnectorhq.com/",
            [("Authorization", "Bearer abc"), ("Token-Id", "tid")],
        );
        let creds = fallback.credentials().unwrap();
        assert_eq!(creds.tenant_header, TenantHeader::TokenId);
    }

    #[test]
    fn test_host_auth_state() {
        let source = HostAuthState::new(|| {
            Some(AuthUser {
                auth_token: "tok".into(),
                api_key: "key".into(),
            })
        });
        let creds = source.credentials().unwrap();
        assert_eq!(creds.bearer(), "Bearer tok");
        assert_eq!(creds.tenant_header.header_name(), "x-api-key");
    }

    #[test]
    fn test_host_auth_state_missing_user() {
        assert!(HostAuthState::new(|| None).credentials().is_none());
        let partial = HostAuthState::new(|| {
            Some(AuthUser {
                auth_token: "tok".into(),
                api_key: String::new(),
            })
        });
        assert!(partial.credentials().is_none());
    }

    #[test]
    fn test_auth_user_from_host_json() {
        let user: AuthUser =
            serde_json::from_str(r#"{"authToken":"t","apiKey":"k","name":"x"}"#).unwrap();
        assert_eq!(user.auth_token, "t");
        assert_eq!(user.api_key, "k");
    }

    #[test]
    fn test_capture_requires_both_headers() {
        let captured = CapturedCredentials::new("leadconnectorhq.com");
        assert!(captured.observe_request(
            "https://backend.leadconnectorhq.com/x",
            [("Authorization", "Bearer abc")]
        ));
        assert!(captured.credentials().is_none());

        assert!(captured.observe_request(
            "https://backend.leadconnectorhq.com/y",
            [("Token-Id", "tid")]
        ));
        let creds = captured.credentials().unwrap();
        assert_eq!(creds.tenant_header, TenantHeader::TokenId);
        assert_eq!(creds.tenant_header.header_name(), "Token-Id");
    }

    #[test]
    fn test_capture_ignores_foreign_hosts_and_non_bearer() {
        let captured = CapturedCredentials::new("leadconnectorhq.com");
        assert!(!captured.observe_request(
            "https://analytics.example.com/",
            [("Authorization", "Bearer abc"), ("Token-Id", "tid")]
        ));
        assert!(!captured.observe_request(
            "https://backend.leadconnectorhq.com/",
            [("Authorization", "Basic xyz")]
        ));
        assert!(captured.credentials().is_none());
    }

    #[test]
    fn test_capture_same_value_is_not_reported_twice() {
        let captured = CapturedCredentials::new("lc");
        assert!(captured.observe_request("https://lc/", [("token-id", "a")]));
        assert!(!captured.observe_request("https://lc/", [("token-id", "a")]));
        assert!(captured.observe_request("https://lc/", [("token-id", "b")]));
        captured.clear();
        assert!(captured.credentials().is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("secret-token", TenantHeader::ApiKey, "secret-key");
        let printed = format!("{creds:?}");
        assert!(!printed.contains("secret"));
    }
}
