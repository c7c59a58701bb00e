//! Route-aware widget injection for single-page CRM conversation views.
//!
//! The host application is a single-page app that swaps conversations
//! without reloading. This crate adds a few controls to its conversation
//! toolbar (a snooze date setter, an AI tag toggle and a contact field
//! editor) and keeps them consistent with whatever conversation is on
//! screen:
//!
//! - [`NavigationWatcher`] turns DOM mutations, history calls and
//!   `popstate` into one re-evaluation signal.
//! - [`WidgetController`] checks each widget's guards against the current
//!   [`Route`], waits for the toolbar with an [`ElementWaiter`], mounts the
//!   widget exactly once and tears it down completely on navigation.
//! - Widgets talk to the backend through a [`ContactGateway`], authorised by
//!   a [`CredentialSource`] that borrows the host's own session.
//!
//! # Features
//!
//! | Feature | Default | Effect |
//! |---------|---------|--------|
//! | `log` | yes | log through the `log` crate |
//! | `tracing` | no | log through the `tracing` crate instead |
//! | `cache` | yes | [`CachedGateway`] memoises conversation to contact lookups |
//!
//! On `wasm32` the [`web`] module provides the browser binding and the
//! `boot(config_json)` entry point.
//!
//! # Example
//!
//! ```
//! use convo_widgets::{
//!     ContentScript, HttpContactGateway, MemoryPage, ScriptConfig, StaticCredentials,
//!     WidgetConfig, WidgetContext,
//! };
//! use std::rc::Rc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScriptConfig::from_json(
//!     r#"{ "workspaces": [ { "workspaceId": "W1", "fieldMap": { "snooze": "F1" } } ] }"#,
//! )?;
//! assert_eq!(config.workspace_config("W1"), Some(&WidgetConfig::new("W1").field("snooze", "F1")));
//!
//! let credentials = Rc::new(StaticCredentials::default());
//! let gateway = HttpContactGateway::new(config.api_base_url()?, credentials.clone());
//! let page = Rc::new(MemoryPage::new("/v2/location/W1/contacts"));
//! let cx = WidgetContext::new(page.clone(), Rc::new(gateway), credentials, Rc::new(config));
//!
//! let script = ContentScript::start(cx, page);
//! assert!(script.watcher().is_history_intercepted());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod guards;
pub mod logging;
pub mod matching;
pub mod memory;
pub mod navigation;
pub mod page;
pub mod params;
pub mod route;
pub mod runtime;
pub mod script;
pub mod waiter;
#[cfg(target_arch = "wasm32")]
pub mod web;
pub mod widget;
pub mod widgets;

#[cfg(feature = "cache")]
pub use cache::{CacheStats, CachedGateway, ContactIdCache};
pub use config::{
    ConfigError, FieldDefinition, InputKind, RetryPolicy, ScriptConfig, WidgetConfig,
};
pub use controller::{WidgetController, WidgetState};
pub use credentials::{
    AuthUser, CapturedCredentials, CredentialSource, Credentials, FallbackCredentials,
    HostAuthState, StaticCredentials, TenantHeader,
};
pub use error::{EvaluateOutcome, WidgetError};
pub use gateway::{ContactGateway, CustomField, FieldValue, HttpContactGateway};
pub use guards::{guard_fn, GuardContext, Guards, MountDecision, MountGuard};
pub use matching::{match_pattern, PatternMatch};
pub use memory::MemoryPage;
pub use navigation::{HistoryApi, NavigationSignal, NavigationWatcher};
pub use page::{ElementBlueprint, EventKind, HostPage, ListenerId, NodeRef};
pub use params::RouteParams;
pub use route::{current_route, is_conversation_page, is_target_workspace, Route};
pub use script::ContentScript;
pub use waiter::ElementWaiter;
pub use widget::{Widget, WidgetAction, WidgetContext, WidgetDom, WidgetInstance, WidgetKind};
pub use widgets::{default_widgets, AiTagWidget, ContactEditorWidget, SnoozeWidget};
