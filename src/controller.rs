//! Widget lifecycle controller.
//!
//! [`WidgetController`] owns one slot per registered [`Widget`] and moves
//! each slot between three states:
//!
//! ```text
//!              Allow                  anchor found
//! Unmounted ────────────▶ Mounting ──────────────────▶ Mounted
//!     ▲                      │                            │
//!     │   Deny / navigation  │      Deny / navigation     │
//!     └──────────────────────┴────────────────────────────┘
//! ```
//!
//! [`evaluate`](WidgetController::evaluate) is idempotent: calling it any
//! number of times for the same route leaves exactly one mounted instance
//! per qualifying widget, with one listener per binding and at most one
//! refresh timer. Every mount carries a generation number; a mount whose
//! generation is no longer current when its anchor wait completes is
//! discarded without touching the document.
//!
//! # Transitions
//!
//! | Current state | Decision | Same route | Result |
//! |---------------|----------|------------|--------|
//! | Unmounted | Allow | | start mount |
//! | Mounting | Allow | yes | nothing |
//! | Mounting | Allow | no | cancel, start mount |
//! | Mounted | Allow | yes | nothing (remount if the host removed it) |
//! | Mounted | Allow | no | unmount, start mount |
//! | any | Deny | | unmount or cancel |
//! | any | Defer | | tear down, schedule a bounded retry |
//!
//! # Example
//!
//! ```no_run
//! use convo_widgets::config::{ScriptConfig, WidgetConfig};
//! use convo_widgets::credentials::StaticCredentials;
//! use convo_widgets::gateway::HttpContactGateway;
//! use convo_widgets::memory::MemoryPage;
//! use convo_widgets::widget::WidgetContext;
//! use convo_widgets::WidgetController;
//! use std::rc::Rc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScriptConfig::new().workspace(WidgetConfig::new("W1").field("snooze", "F1"));
//! let credentials = Rc::new(StaticCredentials::default());
//! let gateway = HttpContactGateway::new(config.api_base_url()?, credentials.clone());
//! let page = Rc::new(MemoryPage::new("/v2/location/W1/conversations/C1"));
//!
//! let cx = WidgetContext::new(page, Rc::new(gateway), credentials, Rc::new(config));
//! let controller = WidgetController::with_default_widgets(cx);
//! controller.evaluate();
//! # Ok(())
//! # }
//! ```

use crate::error::{EvaluateOutcome, WidgetError};
use crate::guards::{GuardContext, Guards, MountDecision, MountGuard};
use crate::page::{EventCallback, NodeRef};
use crate::route::{current_route, Route};
use crate::runtime::{self, TaskHandle};
use crate::waiter::ElementWaiter;
use crate::widget::{Widget, WidgetAction, WidgetContext, WidgetInstance, WidgetKind};
use crate::widgets::default_widgets;
use crate::{debug_log, error_log, info_log, trace_log, warn_log};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ============================================================================
// Slot state
// ============================================================================

/// Public view of a slot's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Unmounted,
    Mounting,
    Mounted,
}

enum SlotState {
    Unmounted,
    Mounting {
        route: Route,
        generation: u64,
        task: TaskHandle,
    },
    Mounted(Rc<WidgetInstance>),
}

#[derive(Default)]
struct RetryState {
    route: Option<Route>,
    attempts: u32,
    task: Option<TaskHandle>,
    /// Budget spent for `route`; only a route change or a history signal
    /// starts over.
    gave_up: bool,
}

struct Slot {
    widget: Rc<dyn Widget>,
    guards: Guards,
    state: SlotState,
    retry: RetryState,
}

struct ControllerInner {
    cx: WidgetContext,
    waiter: ElementWaiter,
    slots: RefCell<Vec<Slot>>,
    generation: Cell<u64>,
    evaluating: Cell<bool>,
    dirty: Cell<bool>,
}

// ============================================================================
// WidgetController
// ============================================================================

/// Mounts and unmounts widgets as the host route changes.
///
/// Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct WidgetController {
    inner: Rc<ControllerInner>,
}

impl WidgetController {
    /// Controller with no widgets registered.
    pub fn new(cx: WidgetContext) -> Self {
        let waiter = ElementWaiter::new(cx.config.poll_interval);
        Self {
            inner: Rc::new(ControllerInner {
                cx,
                waiter,
                slots: RefCell::new(Vec::new()),
                generation: Cell::new(0),
                evaluating: Cell::new(false),
                dirty: Cell::new(false),
            }),
        }
    }

    /// Controller with the snooze, AI tag and contact editor widgets.
    pub fn with_default_widgets(cx: WidgetContext) -> Self {
        let controller = Self::new(cx);
        for widget in default_widgets() {
            controller.register_boxed(widget);
        }
        controller
    }

    /// Register a widget. Returns `false` if its kind is already registered.
    pub fn register<W: Widget + 'static>(&self, widget: W) -> bool {
        self.register_rc(Rc::new(widget))
    }

    pub fn register_boxed(&self, widget: Box<dyn Widget>) -> bool {
        self.register_rc(Rc::from(widget))
    }

    fn register_rc(&self, widget: Rc<dyn Widget>) -> bool {
        let kind = widget.kind();
        if self.find(kind).is_some() {
            warn_log!("widget `{}` is already registered", kind);
            return false;
        }
        let guards = widget.guards(&self.inner.cx.config);
        debug_log!("registered widget `{}` with guards {:?}", kind, guards.names());
        self.inner.slots.borrow_mut().push(Slot {
            widget,
            guards,
            state: SlotState::Unmounted,
            retry: RetryState::default(),
        });
        true
    }

    pub fn context(&self) -> &WidgetContext {
        &self.inner.cx
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> Vec<WidgetKind> {
        self.inner
            .slots
            .borrow()
            .iter()
            .map(|slot| slot.widget.kind())
            .collect()
    }

    // ========================================================================
    // Evaluate
    // ========================================================================

    /// Reconcile every widget with the current route.
    ///
    /// Safe to call at any time and any number of times. A call made while
    /// another evaluation is running is folded into that evaluation and
    /// returns no outcomes.
    pub fn evaluate(&self) -> Vec<EvaluateOutcome> {
        if self.inner.evaluating.replace(true) {
            self.inner.dirty.set(true);
            return Vec::new();
        }

        let mut outcomes;
        loop {
            self.inner.dirty.set(false);
            let route = current_route(&self.inner.cx.page.pathname());
            let count = self.inner.slots.borrow().len();
            outcomes = (0..count)
                .map(|index| self.evaluate_slot(index, &route))
                .collect::<Vec<_>>();
            if !self.inner.dirty.get() {
                break;
            }
        }
        self.inner.evaluating.set(false);

        for outcome in &outcomes {
            if !outcome.is_unchanged() {
                debug_log!("evaluate: {:?}", outcome);
            }
        }
        outcomes
    }

    fn evaluate_slot(&self, index: usize, route: &Route) -> EvaluateOutcome {
        let (kind, decision) = {
            let slots = self.inner.slots.borrow();
            let slot = &slots[index];
            let cx = &self.inner.cx;
            let guard_cx = GuardContext::new(route, &cx.config, cx.credentials.as_ref());
            (slot.widget.kind(), slot.guards.check(&guard_cx))
        };

        match decision {
            MountDecision::Allow => self.allow(index, kind, route),
            MountDecision::Deny { reason } => self.deny(index, kind, reason),
            MountDecision::Defer { reason } => self.defer(index, kind, route, reason),
        }
    }

    fn allow(&self, index: usize, kind: WidgetKind, route: &Route) -> EvaluateOutcome {
        {
            let slots = self.inner.slots.borrow();
            match &slots[index].state {
                SlotState::Mounted(instance) if instance.route() == route => {
                    if self.inner.cx.page.is_attached(instance.dom().button) {
                        return EvaluateOutcome::Unchanged { kind };
                    }
                    warn_log!("widget `{}` was removed by the host, remounting", kind);
                }
                SlotState::Mounting { route: target, .. } if target == route => {
                    return EvaluateOutcome::Unchanged { kind };
                }
                _ => {}
            }
        }

        {
            let slots = self.inner.slots.borrow();
            let retry = &slots[index].retry;
            if retry.gave_up && retry.route.as_ref() == Some(route) {
                return EvaluateOutcome::Skipped {
                    kind,
                    reason: format!("gave up after {} attempts", retry.attempts),
                };
            }
        }

        let previous = self.take_state(index);
        self.release(kind, previous);
        if let Some(task) = self.inner.slots.borrow_mut()[index].retry.task.take() {
            task.abort();
        }
        self.start_mount(index, route.clone());
        EvaluateOutcome::MountStarted { kind }
    }

    fn deny(&self, index: usize, kind: WidgetKind, reason: String) -> EvaluateOutcome {
        self.reset_retry(index);
        match self.take_state(index) {
            SlotState::Mounted(instance) => {
                self.unmount_instance(&instance);
                EvaluateOutcome::Unmounted { kind }
            }
            SlotState::Mounting { task, .. } => {
                task.abort();
                EvaluateOutcome::MountCancelled { kind }
            }
            SlotState::Unmounted => {
                trace_log!("widget `{}` skipped: {}", kind, reason);
                EvaluateOutcome::Skipped { kind, reason }
            }
        }
    }

    fn defer(&self, index: usize, kind: WidgetKind, route: &Route, reason: String) -> EvaluateOutcome {
        {
            let slots = self.inner.slots.borrow();
            if let SlotState::Mounted(instance) = &slots[index].state {
                if instance.route() == route {
                    return EvaluateOutcome::Unchanged { kind };
                }
            }
        }

        let previous = self.take_state(index);
        self.release(kind, previous);
        if self.schedule_retry(index, route, &reason) {
            EvaluateOutcome::RetryScheduled { kind, reason }
        } else {
            EvaluateOutcome::Skipped {
                kind,
                reason: format!(
                    "{reason} (gave up after {} attempts)",
                    self.inner.cx.config.retry.max_attempts
                ),
            }
        }
    }

    // ========================================================================
    // Mounting
    // ========================================================================

    fn start_mount(&self, index: usize, route: Route) {
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);

        let weak = Rc::downgrade(&self.inner);
        let cx = self.inner.cx.clone();
        let waiter = self.inner.waiter;
        let target = route.clone();
        let task = runtime::spawn(async move {
            let still_wanted = {
                let weak = weak.clone();
                let target = target.clone();
                move || {
                    weak.upgrade()
                        .is_some_and(|inner| inner.is_current(index, generation, &target))
                }
            };
            let anchor = waiter
                .wait_for(
                    cx.page.as_ref(),
                    &cx.config.anchor_selector,
                    cx.config.anchor_timeout,
                    still_wanted,
                )
                .await;
            if let Some(inner) = weak.upgrade() {
                WidgetController { inner }.finish_mount(index, generation, target, anchor);
            }
        });

        self.inner.slots.borrow_mut()[index].state = SlotState::Mounting {
            route,
            generation,
            task,
        };
    }

    fn finish_mount(
        &self,
        index: usize,
        generation: u64,
        route: Route,
        anchor: Result<NodeRef, WidgetError>,
    ) {
        let kind = {
            let slots = self.inner.slots.borrow();
            let slot = &slots[index];
            match &slot.state {
                SlotState::Mounting { generation: g, .. } if *g == generation => {}
                _ => {
                    debug_log!("discarding stale mount #{}", generation);
                    return;
                }
            }
            slot.widget.kind()
        };
        self.inner.slots.borrow_mut()[index].state = SlotState::Unmounted;

        let result = anchor.and_then(|group| self.mount_into(index, &route, group));
        match result {
            Ok(instance) => self.activate(index, instance),
            Err(WidgetError::Cancelled | WidgetError::Detached) => {
                debug_log!("mount of `{}` abandoned", kind);
            }
            Err(err) if err.is_retryable() => {
                warn_log!("mount of `{}` failed: {}", kind, err);
                if !self.schedule_retry(index, &route, &err.to_string()) {
                    error_log!("giving up on `{}` for {}", kind, route);
                }
            }
            Err(err) => {
                error_log!("mount of `{}` failed: {}", kind, err);
            }
        }
    }

    /// Render the widget and insert it next to the host toolbar buttons.
    fn mount_into(
        &self,
        index: usize,
        route: &Route,
        group: NodeRef,
    ) -> Result<Rc<WidgetInstance>, WidgetError> {
        let widget = self.inner.slots.borrow()[index].widget.clone();
        let cx = &self.inner.cx;
        let page = cx.page.as_ref();

        let workspace = route
            .workspace()
            .and_then(|id| cx.config.workspace_config(id))
            .cloned()
            .ok_or_else(|| WidgetError::validation(format!("{route} is not configured")))?;

        for id in widget.dom_ids() {
            while let Some(orphan) = page.element_by_id(id) {
                warn_log!("removing leftover `#{}` before mounting", id);
                if !page.remove(orphan) {
                    break;
                }
            }
        }

        let dom = widget.render(page, cx, &workspace);
        let children = page.children(group);
        let reference = children
            .len()
            .checked_sub(2)
            .and_then(|i| children.get(i))
            .copied();
        if !page.insert_before(group, dom.button, reference) {
            return Err(WidgetError::Detached);
        }
        if let Some(panel) = dom.panel {
            page.append_child(page.body(), panel);
        }

        let bindings = dom.bindings.clone();
        let instance = Rc::new(WidgetInstance::new(
            widget.kind(),
            route.clone(),
            workspace,
            dom,
        ));
        for binding in bindings {
            let weak_inner = Rc::downgrade(&self.inner);
            let weak_instance = Rc::downgrade(&instance);
            let action = binding.action;
            let callback: EventCallback = Rc::new(move || {
                if let (Some(inner), Some(instance)) = (weak_inner.upgrade(), weak_instance.upgrade()) {
                    WidgetController { inner }.run_action(&instance, action);
                }
            });
            if let Some(listener) = page.add_listener(binding.node, binding.event, callback) {
                instance.add_listener(listener);
            }
        }
        Ok(instance)
    }

    /// Store the mounted instance and start its background work.
    fn activate(&self, index: usize, instance: Rc<WidgetInstance>) {
        let widget = self.inner.slots.borrow()[index].widget.clone();
        let cx = self.inner.cx.clone();
        self.inner.slots.borrow_mut()[index].state = SlotState::Mounted(instance.clone());
        self.reset_retry(index);
        info_log!("mounted `{}` for {}", instance.kind(), instance.route());

        let startup = {
            let (widget, cx, instance) = (widget.clone(), cx.clone(), instance.clone());
            runtime::spawn(async move {
                if let Err(err) = widget.on_mounted(&cx, &instance).await {
                    if !err.is_silent() {
                        warn_log!("`{}` startup failed: {}", instance.kind(), err);
                    }
                }
            })
        };
        instance.add_task(startup);

        if let Some(period) = widget.refresh_interval(&cx.config) {
            let timer = {
                let instance = instance.clone();
                runtime::spawn(async move {
                    loop {
                        runtime::sleep(period).await;
                        if !instance.is_mounted() {
                            break;
                        }
                        trace_log!("refresh tick for `{}`", instance.kind());
                        if let Err(err) = widget.refresh(&cx, &instance).await {
                            if !err.is_silent() {
                                warn_log!("`{}` refresh failed: {}", instance.kind(), err);
                            }
                        }
                    }
                })
            };
            instance.add_timer(timer);
        }
    }

    // ========================================================================
    // Unmounting
    // ========================================================================

    fn take_state(&self, index: usize) -> SlotState {
        std::mem::replace(
            &mut self.inner.slots.borrow_mut()[index].state,
            SlotState::Unmounted,
        )
    }

    fn release(&self, kind: WidgetKind, state: SlotState) {
        match state {
            SlotState::Mounted(instance) => self.unmount_instance(&instance),
            SlotState::Mounting { task, generation, .. } => {
                debug_log!("cancelling mount #{} of `{}`", generation, kind);
                task.abort();
            }
            SlotState::Unmounted => {}
        }
    }

    /// Remove every listener, timer, task and element of the instance.
    fn unmount_instance(&self, instance: &WidgetInstance) {
        let page = self.inner.cx.page.as_ref();
        let (listeners, handles) = instance.detach();
        for listener in listeners {
            page.remove_listener(listener);
        }
        for handle in handles {
            handle.abort();
        }
        for root in instance.dom().roots() {
            page.remove(root);
        }
        info_log!("unmounted `{}` from {}", instance.kind(), instance.route());
    }

    /// Unmount everything and cancel pending mounts and retries.
    pub fn teardown(&self) {
        let count = self.inner.slots.borrow().len();
        for index in 0..count {
            self.reset_retry(index);
            let kind = self.inner.slots.borrow()[index].widget.kind();
            let state = self.take_state(index);
            self.release(kind, state);
        }
    }

    // ========================================================================
    // Retries
    // ========================================================================

    /// Schedule a re-evaluation for `route`. Returns `false` once the attempt
    /// budget for that route is spent.
    fn schedule_retry(&self, index: usize, route: &Route, reason: &str) -> bool {
        let policy = self.inner.cx.config.retry;
        let mut slots = self.inner.slots.borrow_mut();
        let slot = &mut slots[index];
        let retry = &mut slot.retry;

        if retry.route.as_ref() != Some(route) {
            if let Some(task) = retry.task.take() {
                task.abort();
            }
            *retry = RetryState {
                route: Some(route.clone()),
                ..RetryState::default()
            };
        }
        if retry.task.is_some() {
            return true;
        }
        if retry.attempts >= policy.max_attempts {
            if !retry.gave_up {
                retry.gave_up = true;
                warn_log!(
                    "`{}` gave up on {} after {} attempts",
                    slot.widget.kind(),
                    route,
                    retry.attempts
                );
            }
            return false;
        }
        retry.attempts += 1;
        warn_log!(
            "`{}` not ready ({}), retry {} of {} in {:?}",
            slot.widget.kind(),
            reason,
            retry.attempts,
            policy.max_attempts,
            policy.delay
        );

        let weak = Rc::downgrade(&self.inner);
        retry.task = Some(runtime::spawn(async move {
            runtime::sleep(policy.delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.slots.borrow_mut()[index].retry.task = None;
                WidgetController { inner }.evaluate();
            }
        }));
        true
    }

    /// Lift every spent retry budget so the next evaluation starts over.
    /// Pending retries are left alone.
    pub fn rearm_retries(&self) {
        for slot in self.inner.slots.borrow_mut().iter_mut() {
            if slot.retry.gave_up {
                debug_log!("re-arming retries for `{}`", slot.widget.kind());
                slot.retry = RetryState::default();
            }
        }
    }

    fn reset_retry(&self, index: usize) {
        let retry = std::mem::take(&mut self.inner.slots.borrow_mut()[index].retry);
        if let Some(task) = retry.task {
            task.abort();
        }
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Trigger `action` on the mounted widget of `kind`, as a click would.
    /// Returns `false` if nothing is mounted or the action is still pending.
    pub fn dispatch(&self, kind: WidgetKind, action: WidgetAction) -> bool {
        match self.instance(kind) {
            Some(instance) => self.run_action(&instance, action),
            None => false,
        }
    }

    fn run_action(&self, instance: &Rc<WidgetInstance>, action: WidgetAction) -> bool {
        let Some(index) = self.find(instance.kind()) else {
            return false;
        };
        if !instance.is_mounted() {
            return false;
        }
        if !instance.begin_action(action) {
            debug_log!("`{}` {:?} already in flight, ignoring", instance.kind(), action);
            return false;
        }

        let widget = self.inner.slots.borrow()[index].widget.clone();
        let cx = self.inner.cx.clone();
        let triggers = instance.dom().triggers(action);
        for trigger in &triggers {
            cx.page.set_disabled(*trigger, true);
        }
        widget.prepare(&cx, instance, action);

        let task = {
            let instance = instance.clone();
            runtime::spawn(async move {
                let result = widget.handle(&cx, &instance, action).await;
                instance.finish_action(action);
                if instance.is_mounted() {
                    for trigger in &triggers {
                        cx.page.set_disabled(*trigger, false);
                    }
                }
                let Err(err) = result else {
                    return;
                };
                if err.is_silent() || !instance.is_mounted() {
                    debug_log!("`{}` {:?} dropped: {}", instance.kind(), action, err);
                    return;
                }
                widget.rollback(&cx, &instance, action, &err);
                match &err {
                    WidgetError::Validation { message } => {
                        warn_log!("`{}` {:?} rejected: {}", instance.kind(), action, message);
                        cx.page.alert(message);
                    }
                    _ => {
                        error_log!("failed to {}: {}", widget.describe(action), err);
                        cx.page
                            .alert(&format!("Failed to {}: {}", widget.describe(action), err));
                    }
                }
            })
        };
        instance.set_action_task(action, task);
        true
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    fn find(&self, kind: WidgetKind) -> Option<usize> {
        self.inner
            .slots
            .borrow()
            .iter()
            .position(|slot| slot.widget.kind() == kind)
    }

    pub fn state(&self, kind: WidgetKind) -> Option<WidgetState> {
        let index = self.find(kind)?;
        let slots = self.inner.slots.borrow();
        Some(match slots[index].state {
            SlotState::Unmounted => WidgetState::Unmounted,
            SlotState::Mounting { .. } => WidgetState::Mounting,
            SlotState::Mounted(_) => WidgetState::Mounted,
        })
    }

    /// The mounted instance of `kind`, if any.
    pub fn instance(&self, kind: WidgetKind) -> Option<Rc<WidgetInstance>> {
        let index = self.find(kind)?;
        match &self.inner.slots.borrow()[index].state {
            SlotState::Mounted(instance) => Some(instance.clone()),
            _ => None,
        }
    }

    pub fn is_mounted(&self, kind: WidgetKind) -> bool {
        self.state(kind) == Some(WidgetState::Mounted)
    }

    /// Live refresh timers of `kind`.
    pub fn active_timers(&self, kind: WidgetKind) -> usize {
        self.instance(kind).map_or(0, |i| i.timer_count())
    }

    /// Live listeners of `kind`.
    pub fn listener_count(&self, kind: WidgetKind) -> usize {
        self.instance(kind).map_or(0, |i| i.listener_count())
    }

    /// Retries spent on the current route.
    pub fn retry_attempts(&self, kind: WidgetKind) -> u32 {
        self.find(kind)
            .map_or(0, |index| self.inner.slots.borrow()[index].retry.attempts)
    }

    pub fn has_pending_retry(&self, kind: WidgetKind) -> bool {
        self.find(kind)
            .is_some_and(|index| self.inner.slots.borrow()[index].retry.task.is_some())
    }
}

impl ControllerInner {
    /// True while `generation` is the live mount of slot `index` and the
    /// document still shows `route`.
    fn is_current(&self, index: usize, generation: u64, route: &Route) -> bool {
        let live = matches!(
            self.slots.borrow().get(index).map(|slot| &slot.state),
            Some(SlotState::Mounting { generation: g, .. }) if *g == generation
        );
        live && current_route(&self.cx.page.pathname()) == *route
    }
}

impl std::fmt::Debug for WidgetController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let states: Vec<_> = self
            .kinds()
            .into_iter()
            .map(|kind| (kind, self.state(kind)))
            .collect();
        f.debug_struct("WidgetController")
            .field("generation", &self.inner.generation.get())
            .field("widgets", &states)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
