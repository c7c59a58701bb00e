//! Script configuration.
//!
//! One [`ScriptConfig`] is built at start-up and shared immutably by every
//! widget. It can be loaded from JSON or built fluently:
//!
//! ```
//! use convo_widgets::config::{ScriptConfig, WidgetConfig};
//! use std::time::Duration;
//!
//! let config = ScriptConfig::new()
//!     .workspace(WidgetConfig::new("W1").field("snooze", "FIELD_SNOOZE"))
//!     .anchor_timeout(Duration::from_secs(5));
//! assert!(config.validate().is_ok());
//! assert_eq!(
//!     config.workspace_config("W1").and_then(|w| w.field_id("snooze")),
//!     Some("FIELD_SNOOZE")
//! );
//! ```
//!
//! JSON keys are camelCase and durations are given in milliseconds:
//!
//! ```
//! use convo_widgets::config::ScriptConfig;
//!
//! let config = ScriptConfig::from_json(r#"{
//!     "workspaces": [{ "workspaceId": "W1", "fieldMap": { "snooze": "F1" } }],
//!     "anchorTimeoutMs": 2000,
//!     "retry": { "delayMs": 500, "maxAttempts": 3 }
//! }"#).unwrap();
//! assert_eq!(config.retry.max_attempts, 3);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default backend for all REST calls.
pub const DEFAULT_API_BASE: &str = "https://backend.leadconnectorhq.com";

/// Host toolbar the widget buttons are inserted into.
pub const DEFAULT_ANCHOR_SELECTOR: &str = ".button-group.flex";

// ============================================================================
// Errors
// ============================================================================

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(String),

    #[error("workspace #{index} has an empty id")]
    EmptyWorkspaceId { index: usize },

    #[error("workspace `{0}` is configured twice")]
    DuplicateWorkspace(String),

    #[error("retry policy must allow at least one attempt")]
    ZeroRetryAttempts,

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("anchor selector must not be empty")]
    EmptyAnchorSelector,

    #[error("`{0}` cannot be used as an API base url")]
    InvalidApiBase(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// ============================================================================
// WidgetConfig
// ============================================================================

/// Per-workspace configuration: which contact custom field backs each
/// logical field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub workspace_id: String,
    #[serde(default)]
    pub field_map: BTreeMap<String, String>,
}

impl WidgetConfig {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            field_map: BTreeMap::new(),
        }
    }

    /// Map logical field `name` to remote field `id`.
    pub fn field(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.field_map.insert(name.into(), id.into());
        self
    }

    pub fn field_id(&self, name: &str) -> Option<&str> {
        self.field_map.get(name).map(String::as_str)
    }
}

// ============================================================================
// Editor fields
// ============================================================================

/// Input element used for a field in the contact editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Number,
    Date,
    Select,
}

impl InputKind {
    /// `type` attribute of the `<input>` (selects have none).
    pub const fn html_type(self) -> Option<&'static str> {
        match self {
            Self::Text => Some("text"),
            Self::Number => Some("number"),
            Self::Date => Some("date"),
            Self::Select => None,
        }
    }
}

/// One field of the contact editor form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub input: InputKind,
    #[serde(default)]
    pub options: Vec<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, label: impl Into<String>, input: InputKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            input,
            options: Vec::new(),
        }
    }

    pub fn select<I, S>(name: impl Into<String>, label: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            ..Self::new(name, label, InputKind::Select)
        }
    }
}

/// Vehicle-deal form shown by the contact editor unless configured otherwise.
pub fn default_editor_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("offerAmount", "Offer Amount (USD)", InputKind::Number),
        FieldDefinition::new("mileage", "Mileage", InputKind::Number),
        FieldDefinition::select("status", "Lost/Win Status", ["open", "lost", "win"]),
        FieldDefinition::new("year", "Year", InputKind::Number),
        FieldDefinition::new("make", "Make", InputKind::Text),
        FieldDefinition::new("model", "Model", InputKind::Text),
        FieldDefinition::new("offerLink", "Offer Link", InputKind::Text),
        FieldDefinition::new("vin", "VIN", InputKind::Text),
        FieldDefinition::new("snooze", "Snooze", InputKind::Date),
        FieldDefinition::new("followUp", "Follow Up Call", InputKind::Date),
    ]
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounded retry of failed mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(rename = "delayMs", with = "duration_ms")]
    pub delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Total time spent waiting between attempts before giving up.
    pub fn horizon(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 15)
    }
}

// ============================================================================
// ScriptConfig
// ============================================================================

/// Configuration shared by the controller and every widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptConfig {
    pub api_base: String,
    pub workspaces: Vec<WidgetConfig>,
    pub editor_fields: Vec<FieldDefinition>,
    /// Logical field names shown when the editor is minimised.
    pub summary_fields: Vec<String>,
    pub anchor_selector: String,
    #[serde(rename = "anchorTimeoutMs", with = "duration_ms")]
    pub anchor_timeout: Duration,
    #[serde(rename = "pollIntervalMs", with = "duration_ms")]
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub tag: String,
    #[serde(rename = "tagRefreshIntervalMs", with = "duration_ms")]
    pub tag_refresh_interval: Duration,
    pub snooze_field: String,
    pub capture_host: String,
    #[serde(rename = "navigationDebounceMs", with = "opt_duration_ms")]
    pub navigation_debounce: Option<Duration>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            workspaces: Vec::new(),
            editor_fields: default_editor_fields(),
            summary_fields: vec!["year".into(), "make".into(), "model".into()],
            anchor_selector: DEFAULT_ANCHOR_SELECTOR.to_string(),
            anchor_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(300),
            retry: RetryPolicy::default(),
            tag: "AI".to_string(),
            tag_refresh_interval: Duration::from_secs(5),
            snooze_field: "snooze".to_string(),
            capture_host: "leadconnectorhq.com".to_string(),
            navigation_debounce: None,
        }
    }
}

impl ScriptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base_url()?;
        for (index, workspace) in self.workspaces.iter().enumerate() {
            if workspace.workspace_id.trim().is_empty() {
                return Err(ConfigError::EmptyWorkspaceId { index });
            }
            if self.workspaces[..index]
                .iter()
                .any(|w| w.workspace_id == workspace.workspace_id)
            {
                return Err(ConfigError::DuplicateWorkspace(
                    workspace.workspace_id.clone(),
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.anchor_selector.trim().is_empty() {
            return Err(ConfigError::EmptyAnchorSelector);
        }
        Ok(())
    }

    /// Parsed [`api_base`](Self::api_base).
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        match Url::parse(self.api_base.trim()) {
            Ok(url) if !url.cannot_be_a_base() => Ok(url),
            _ => Err(ConfigError::InvalidApiBase(self.api_base.clone())),
        }
    }

    pub fn workspace_config(&self, workspace_id: &str) -> Option<&WidgetConfig> {
        self.workspaces
            .iter()
            .find(|w| w.workspace_id == workspace_id)
    }

    pub fn workspace_ids(&self) -> Vec<&str> {
        self.workspaces
            .iter()
            .map(|w| w.workspace_id.as_str())
            .collect()
    }

    // Builder methods

    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Add a workspace, replacing an existing entry with the same id.
    pub fn workspace(mut self, workspace: WidgetConfig) -> Self {
        self.workspaces
            .retain(|w| w.workspace_id != workspace.workspace_id);
        self.workspaces.push(workspace);
        self
    }

    pub fn editor_fields(mut self, fields: Vec<FieldDefinition>) -> Self {
        self.editor_fields = fields;
        self
    }

    pub fn summary_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.summary_fields = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn anchor_selector(mut self, selector: impl Into<String>) -> Self {
        self.anchor_selector = selector.into();
        self
    }

    pub fn anchor_timeout(mut self, timeout: Duration) -> Self {
        self.anchor_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn tag_refresh_interval(mut self, interval: Duration) -> Self {
        self.tag_refresh_interval = interval;
        self
    }

    pub fn snooze_field(mut self, name: impl Into<String>) -> Self {
        self.snooze_field = name.into();
        self
    }

    pub fn capture_host(mut self, host: impl Into<String>) -> Self {
        self.capture_host = host.into();
        self
    }

    pub fn navigation_debounce(mut self, window: Option<Duration>) -> Self {
        self.navigation_debounce = window;
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => {
                serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}
