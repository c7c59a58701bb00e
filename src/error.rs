//! Error handling for widget mounting and user actions.
//!
//! - [`WidgetError`]: every failure the controller, the gateway or a widget
//!   handler can produce.
//! - [`EvaluateOutcome`]: what a single [`evaluate`](crate::WidgetController::evaluate)
//!   pass did for one widget kind.
//!
//! Only [`WidgetError::Timeout`] and [`WidgetError::CredentialsUnavailable`]
//! are retryable: both usually mean the host page is still starting up.
//! Everything else ends the one user action that produced it and is shown to
//! the user as a notification.
//!
//! # Examples
//!
//! ```
//! use convo_widgets::error::WidgetError;
//!
//! let err = WidgetError::Remote { status: 500, message: "boom".into() };
//! assert!(!err.is_retryable());
//! assert_eq!(err.status(), Some(500));
//!
//! assert!(WidgetError::CredentialsUnavailable.is_retryable());
//! ```

use crate::widget::WidgetKind;
use thiserror::Error;

// ============================================================================
// WidgetError
// ============================================================================

/// Failures raised while mounting a widget or handling one of its actions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WidgetError {
    /// The anchor element never appeared.
    #[error("timed out after {waited_ms}ms waiting for `{selector}`")]
    Timeout { selector: String, waited_ms: u64 },

    /// No captured or readable credentials yet.
    #[error("credentials are not available yet")]
    CredentialsUnavailable,

    /// The conversation has no mapped contact (or the lookup failed).
    #[error("no contact found for conversation `{conversation_id}`")]
    NotFound { conversation_id: String },

    /// The gateway answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    /// Required user input is missing or malformed.
    #[error("{message}")]
    Validation { message: String },

    /// The request never produced an HTTP status.
    #[error("request could not be sent: {message}")]
    Transport { message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {message}")]
    Decode { message: String },

    /// A pending wait was abandoned because the route changed.
    #[error("wait abandoned after navigation")]
    Cancelled,

    /// The widget was unmounted while the operation was in flight.
    #[error("widget is no longer mounted")]
    Detached,
}

impl WidgetError {
    /// Shorthand for a [`Validation`](Self::Validation) error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True for failures that warrant an automatic mount retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::CredentialsUnavailable)
    }

    /// True for failures the user never needs to hear about.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Detached)
    }

    /// HTTP status for [`Remote`](Self::Remote) errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WidgetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for WidgetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// EvaluateOutcome
// ============================================================================

/// Result of evaluating one widget kind against the current route.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluateOutcome {
    /// Nothing to do: state already matches the route.
    Unchanged { kind: WidgetKind },
    /// A mount was started for the current route.
    MountStarted { kind: WidgetKind },
    /// The mounted widget was torn down.
    Unmounted { kind: WidgetKind },
    /// A mount in progress was abandoned.
    MountCancelled { kind: WidgetKind },
    /// The route does not qualify and nothing was mounted.
    Skipped { kind: WidgetKind, reason: String },
    /// The route qualifies except for a runtime condition; a retry is pending.
    RetryScheduled { kind: WidgetKind, reason: String },
}

impl EvaluateOutcome {
    /// Widget kind this outcome belongs to.
    pub fn kind(&self) -> WidgetKind {
        match self {
            Self::Unchanged { kind }
            | Self::MountStarted { kind }
            | Self::Unmounted { kind }
            | Self::MountCancelled { kind }
            | Self::Skipped { kind, .. }
            | Self::RetryScheduled { kind, .. } => *kind,
        }
    }

    /// Check if nothing changed
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }

    /// Check if a mount was started
    pub fn is_mount_started(&self) -> bool {
        matches!(self, Self::MountStarted { .. })
    }

    /// Check if the widget was unmounted
    pub fn is_unmounted(&self) -> bool {
        matches!(self, Self::Unmounted { .. })
    }

    /// Check if the route was rejected
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Check if a retry was scheduled
    pub fn is_retry_scheduled(&self) -> bool {
        matches!(self, Self::RetryScheduled { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
