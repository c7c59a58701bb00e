//! The widget abstraction.
//!
//! A [`Widget`] describes one kind of injected UI: which guards must allow it,
//! how its DOM looks, and what its actions do. The
//! [`WidgetController`](crate::WidgetController) owns everything stateful:
//! it decides when to mount, inserts the rendered DOM, attaches exactly one
//! listener per [`Binding`], runs the refresh timer and tears it all down
//! again. Widgets only ever see the mounted state through a
//! [`WidgetInstance`].
//!
//! # Action protocol
//!
//! When a bound element is clicked the controller
//!
//! 1. ignores the click if the same action is still pending,
//! 2. disables the elements bound to that action,
//! 3. calls [`Widget::prepare`] synchronously (optimistic updates go here),
//! 4. runs [`Widget::handle`] as a local task,
//! 5. re-enables the elements, and on failure calls [`Widget::rollback`] and
//!    shows `Failed to {describe}: {error}` (validation messages are shown
//!    as they are).

use crate::config::{ScriptConfig, WidgetConfig};
use crate::credentials::CredentialSource;
use crate::error::WidgetError;
use crate::gateway::{ContactGateway, CustomField};
use crate::guards::Guards;
use crate::page::{EventKind, HostPage, ListenerId, NodeRef};
use crate::route::Route;
use crate::runtime::TaskHandle;
use async_trait::async_trait;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

// ============================================================================
// Kinds and actions
// ============================================================================

/// The widget kinds this crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WidgetKind {
    Snooze,
    AiTag,
    ContactEditor,
}

impl WidgetKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snooze => "snooze",
            Self::AiTag => "ai-tag",
            Self::ContactEditor => "contact-editor",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User actions a widget reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetAction {
    Open,
    Close,
    Submit,
    Toggle,
    Minimize,
}

/// One interactive element and the action it triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub node: NodeRef,
    pub event: EventKind,
    pub action: WidgetAction,
}

// ============================================================================
// WidgetDom
// ============================================================================

/// Elements created by [`Widget::render`], not yet inserted.
///
/// `button` goes into the host toolbar, `panel` (if any) is appended to the
/// document body. Everything else hangs below one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetDom {
    pub button: NodeRef,
    pub panel: Option<NodeRef>,
    pub bindings: Vec<Binding>,
    nodes: HashMap<String, NodeRef>,
}

impl WidgetDom {
    pub fn new(button: NodeRef) -> Self {
        Self {
            button,
            panel: None,
            bindings: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn panel(mut self, panel: NodeRef) -> Self {
        self.panel = Some(panel);
        self
    }

    /// Remember a node under a name for later lookup.
    pub fn node(mut self, name: impl Into<String>, node: NodeRef) -> Self {
        self.nodes.insert(name.into(), node);
        self
    }

    /// Trigger `action` when `node` is clicked.
    pub fn on_click(mut self, node: NodeRef, action: WidgetAction) -> Self {
        self.bindings.push(Binding {
            node,
            event: EventKind::Click,
            action,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<NodeRef> {
        self.nodes.get(name).copied()
    }

    /// Top-level nodes the controller inserts and later removes.
    pub fn roots(&self) -> Vec<NodeRef> {
        std::iter::once(self.button).chain(self.panel).collect()
    }

    /// Nodes bound to `action`.
    pub fn triggers(&self, action: WidgetAction) -> Vec<NodeRef> {
        self.bindings
            .iter()
            .filter(|b| b.action == action)
            .map(|b| b.node)
            .collect()
    }
}

// ============================================================================
// WidgetInstance
// ============================================================================

/// Per-mount state widgets may read and update between awaits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Contact behind the conversation, once resolved.
    pub contact_id: Option<String>,
    /// Last field values read from or written to the gateway.
    pub fields: Vec<CustomField>,
    /// Tag state last confirmed by the gateway.
    pub confirmed_tag: bool,
    /// Tag state currently shown, possibly optimistic.
    pub displayed_tag: bool,
    /// Bumped by every toggle; reads started under an older value are stale.
    pub tag_revision: u64,
    /// Editor collapsed to its summary line.
    pub minimized: bool,
    /// Bumped when a dialog is dismissed; an open started under an older
    /// value must not reveal it.
    pub dialog_epoch: u64,
}

impl Session {
    /// Replace or add fields, keyed by id.
    pub fn merge_fields(&mut self, fields: &[CustomField]) {
        for field in fields {
            match self.fields.iter_mut().find(|f| f.id == field.id) {
                Some(existing) => existing.value = field.value.clone(),
                None => self.fields.push(field.clone()),
            }
        }
    }
}

/// Runtime state of one mounted widget. Created on mount, discarded on
/// unmount, never reused across navigations.
pub struct WidgetInstance {
    kind: WidgetKind,
    route: Route,
    workspace: WidgetConfig,
    dom: WidgetDom,
    mounted: Cell<bool>,
    listeners: RefCell<Vec<ListenerId>>,
    timers: RefCell<Vec<TaskHandle>>,
    tasks: RefCell<Vec<TaskHandle>>,
    actions: RefCell<HashMap<WidgetAction, TaskHandle>>,
    pending: RefCell<HashSet<WidgetAction>>,
    session: RefCell<Session>,
}

impl WidgetInstance {
    pub fn new(kind: WidgetKind, route: Route, workspace: WidgetConfig, dom: WidgetDom) -> Self {
        Self {
            kind,
            route,
            workspace,
            dom,
            mounted: Cell::new(true),
            listeners: RefCell::new(Vec::new()),
            timers: RefCell::new(Vec::new()),
            tasks: RefCell::new(Vec::new()),
            actions: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashSet::new()),
            session: RefCell::new(Session::default()),
        }
    }

    pub fn kind(&self) -> WidgetKind {
        self.kind
    }

    /// Route the widget was mounted for.
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn workspace(&self) -> &WidgetConfig {
        &self.workspace
    }

    pub fn dom(&self) -> &WidgetDom {
        &self.dom
    }

    /// Named node from the rendered DOM.
    pub fn node(&self, name: &str) -> Option<NodeRef> {
        self.dom.get(name)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// `Err(Detached)` once the widget was unmounted. Call after every await
    /// before touching the DOM.
    pub fn ensure_mounted(&self) -> Result<(), WidgetError> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(WidgetError::Detached)
        }
    }

    pub fn session(&self) -> Ref<'_, Session> {
        self.session.borrow()
    }

    pub fn session_mut(&self) -> RefMut<'_, Session> {
        self.session.borrow_mut()
    }

    pub fn contact_id(&self) -> Option<String> {
        self.session.borrow().contact_id.clone()
    }

    pub fn is_pending(&self, action: WidgetAction) -> bool {
        self.pending.borrow().contains(&action)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    // Controller bookkeeping

    pub(crate) fn add_listener(&self, listener: ListenerId) {
        self.listeners.borrow_mut().push(listener);
    }

    pub(crate) fn add_timer(&self, timer: TaskHandle) {
        self.timers.borrow_mut().push(timer);
    }

    pub(crate) fn add_task(&self, task: TaskHandle) {
        self.tasks.borrow_mut().push(task);
    }

    /// Track the handler task of `action`. At most one is kept per action.
    pub(crate) fn set_action_task(&self, action: WidgetAction, task: TaskHandle) {
        self.actions.borrow_mut().insert(action, task);
    }

    /// Mark `action` pending. `false` if it already was.
    pub(crate) fn begin_action(&self, action: WidgetAction) -> bool {
        self.pending.borrow_mut().insert(action)
    }

    pub(crate) fn finish_action(&self, action: WidgetAction) {
        self.pending.borrow_mut().remove(&action);
    }

    /// Flip to unmounted and hand back everything that must be released.
    pub(crate) fn detach(&self) -> (Vec<ListenerId>, Vec<TaskHandle>) {
        self.mounted.set(false);
        self.pending.borrow_mut().clear();
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        let mut handles = std::mem::take(&mut *self.timers.borrow_mut());
        handles.append(&mut self.tasks.borrow_mut());
        handles.extend(self.actions.borrow_mut().drain().map(|(_, task)| task));
        (listeners, handles)
    }
}

impl fmt::Debug for WidgetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetInstance")
            .field("kind", &self.kind)
            .field("route", &self.route)
            .field("mounted", &self.mounted.get())
            .field("listeners", &self.listener_count())
            .field("timers", &self.timer_count())
            .finish()
    }
}

// ============================================================================
// WidgetContext
// ============================================================================

/// Collaborators shared by the controller and every widget.
#[derive(Clone)]
pub struct WidgetContext {
    pub page: Rc<dyn HostPage>,
    pub gateway: Rc<dyn ContactGateway>,
    pub credentials: Rc<dyn CredentialSource>,
    pub config: Rc<ScriptConfig>,
}

impl WidgetContext {
    pub fn new(
        page: Rc<dyn HostPage>,
        gateway: Rc<dyn ContactGateway>,
        credentials: Rc<dyn CredentialSource>,
        config: Rc<ScriptConfig>,
    ) -> Self {
        Self {
            page,
            gateway,
            credentials,
            config,
        }
    }

    /// Resolve the contact behind the instance's conversation and remember it.
    pub async fn resolve_contact(&self, instance: &WidgetInstance) -> Result<String, WidgetError> {
        let conversation_id =
            instance
                .route()
                .conversation_id
                .clone()
                .ok_or_else(|| WidgetError::NotFound {
                    conversation_id: String::new(),
                })?;
        let contact_id = self.gateway.resolve_contact_id(&conversation_id).await?;
        instance.ensure_mounted()?;
        instance.session_mut().contact_id = Some(contact_id.clone());
        Ok(contact_id)
    }
}

// ============================================================================
// Widget trait
// ============================================================================

/// One kind of injected UI.
#[async_trait(?Send)]
pub trait Widget {
    fn kind(&self) -> WidgetKind;

    /// Element ids of the roots this widget creates. Leftovers with these ids
    /// are removed before mounting.
    fn dom_ids(&self) -> &'static [&'static str];

    /// Guards deciding whether the widget may mount.
    fn guards(&self, _config: &ScriptConfig) -> Guards {
        Guards::standard().build()
    }

    /// Create the widget's elements, detached from the document.
    fn render(&self, page: &dyn HostPage, cx: &WidgetContext, workspace: &WidgetConfig)
        -> WidgetDom;

    /// Period of the refresh timer, `None` for no timer.
    fn refresh_interval(&self, _config: &ScriptConfig) -> Option<Duration> {
        None
    }

    /// Runs once after mounting, as a task cancelled on unmount.
    async fn on_mounted(
        &self,
        _cx: &WidgetContext,
        _instance: &WidgetInstance,
    ) -> Result<(), WidgetError> {
        Ok(())
    }

    /// Runs on every refresh tick.
    async fn refresh(
        &self,
        _cx: &WidgetContext,
        _instance: &WidgetInstance,
    ) -> Result<(), WidgetError> {
        Ok(())
    }

    /// Synchronous part of an action, run before [`handle`](Self::handle).
    fn prepare(&self, _cx: &WidgetContext, _instance: &WidgetInstance, _action: WidgetAction) {}

    async fn handle(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
        action: WidgetAction,
    ) -> Result<(), WidgetError>;

    /// Restore the last good state after `action` failed.
    fn rollback(
        &self,
        _cx: &WidgetContext,
        _instance: &WidgetInstance,
        _action: WidgetAction,
        _error: &WidgetError,
    ) {
    }

    /// Verb phrase for error messages ("set snooze").
    fn describe(&self, action: WidgetAction) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widget_dom_roots_and_triggers() {
        let dom = WidgetDom::new(NodeRef(1))
            .panel(NodeRef(2))
            .node("input", NodeRef(3))
            .on_click(NodeRef(1), WidgetAction::Open)
            .on_click(NodeRef(4), WidgetAction::Close)
            .on_click(NodeRef(5), WidgetAction::Close);
        assert_eq!(dom.roots(), vec![NodeRef(1), NodeRef(2)]);
        assert_eq!(dom.triggers(WidgetAction::Close), vec![NodeRef(4), NodeRef(5)]);
        assert_eq!(dom.get("input"), Some(NodeRef(3)));
        assert_eq!(dom.get("missing"), None);
    }

    #[test]
    fn test_instance_detach_releases_everything() {
        let instance = WidgetInstance::new(
            WidgetKind::Snooze,
            Route::conversation("W1", "C1"),
            WidgetConfig::new("W1"),
            WidgetDom::new(NodeRef(1)),
        );
        instance.add_listener(ListenerId(7));
        assert!(instance.begin_action(WidgetAction::Open));
        assert!(!instance.begin_action(WidgetAction::Open));
        assert!(instance.ensure_mounted().is_ok());

        let (listeners, handles) = instance.detach();
        assert_eq!(listeners, vec![ListenerId(7)]);
        assert!(handles.is_empty());
        assert_eq!(instance.listener_count(), 0);
        assert!(!instance.is_pending(WidgetAction::Open));
        assert_eq!(instance.ensure_mounted(), Err(WidgetError::Detached));
    }

    #[test]
    fn test_session_merge_fields() {
        let mut session = Session::default();
        session.merge_fields(&[CustomField::new("a", "1"), CustomField::new("b", "2")]);
        session.merge_fields(&[CustomField::new("a", "3")]);
        assert_eq!(
            session.fields,
            vec![CustomField::new("a", "3"), CustomField::new("b", "2")]
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(WidgetKind::AiTag.to_string(), "ai-tag");
    }
}
