//! SPA navigation detection.
//!
//! The host application changes views without page loads, so a change of
//! conversation is only visible through side channels. [`NavigationWatcher`]
//! coalesces them into a single signal:
//!
//! | Source | How it reaches the watcher |
//! |--------|----------------------------|
//! | DOM subtree mutations on `document.body` | host binding calls [`notify`](NavigationWatcher::notify) with [`NavigationSignal::DomMutation`] |
//! | `history.pushState` / `replaceState` | calls go through the wrapper returned by [`intercept_history`](NavigationWatcher::intercept_history) |
//! | back/forward (`popstate`) | host binding calls [`notify`](NavigationWatcher::notify) with [`NavigationSignal::PopState`] |
//!
//! Subscribers are called synchronously for every signal unless a debounce
//! window is configured, in which case a burst of signals inside the window
//! produces one delivery carrying the last signal.
//!
//! The watcher is installed once per page and never stopped. History
//! interception wraps whatever primitive it is handed and always calls
//! through to it, so overrides installed by other scripts keep working;
//! a second interception attempt returns the existing wrapper instead of
//! wrapping twice.
//!
//! # Example
//!
//! ```
//! use convo_widgets::memory::MemoryPage;
//! use convo_widgets::navigation::{HistoryApi, NavigationWatcher};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let page = Rc::new(MemoryPage::new("/"));
//! let watcher = NavigationWatcher::new();
//! let seen = Rc::new(Cell::new(0));
//! let counter = seen.clone();
//! watcher.subscribe(move |_signal| counter.set(counter.get() + 1));
//!
//! let history = watcher.intercept_history(page.clone());
//! history.push_state("/v2/location/W1/conversations/C1");
//! assert_eq!(seen.get(), 1);
//! ```

use crate::runtime::{self, TaskHandle};
use crate::{debug_log, trace_log, warn_log};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

// ============================================================================
// HistoryApi
// ============================================================================

/// The host's history primitives (`history.pushState` / `replaceState`).
pub trait HistoryApi {
    fn push_state(&self, url: &str);

    fn replace_state(&self, url: &str);
}

/// Observed navigation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationSignal {
    DomMutation,
    PushState,
    ReplaceState,
    PopState,
}

/// Identifier returned by [`NavigationWatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Rc<dyn Fn(NavigationSignal)>;

// ============================================================================
// NavigationWatcher
// ============================================================================

struct WatcherInner {
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    next_id: Cell<u64>,
    debounce: Option<Duration>,
    pending: RefCell<Option<TaskHandle>>,
    latest: Cell<Option<NavigationSignal>>,
    history: RefCell<Option<Rc<dyn HistoryApi>>>,
    delivered: Cell<u64>,
}

impl WatcherInner {
    fn deliver(&self, signal: NavigationSignal) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        self.delivered.set(self.delivered.get() + 1);
        trace_log!(
            "navigation signal {:?} -> {} subscriber(s)",
            signal,
            subscribers.len()
        );
        for subscriber in subscribers {
            subscriber(signal);
        }
    }
}

/// Coalesces SPA navigation sources into one re-evaluation signal.
#[derive(Clone)]
pub struct NavigationWatcher {
    inner: Rc<WatcherInner>,
}

impl NavigationWatcher {
    /// Watcher delivering every signal synchronously.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Watcher coalescing bursts of signals within `window`.
    pub fn with_debounce(window: Duration) -> Self {
        Self::build(Some(window).filter(|w| !w.is_zero()))
    }

    fn build(debounce: Option<Duration>) -> Self {
        Self {
            inner: Rc::new(WatcherInner {
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
                debounce,
                pending: RefCell::new(None),
                latest: Cell::new(None),
                history: RefCell::new(None),
                delivered: Cell::new(0),
            }),
        }
    }

    /// Register a callback for every (coalesced) navigation signal.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(NavigationSignal) + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Number of deliveries made to subscribers so far.
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.get()
    }

    /// Report an observed navigation source.
    pub fn notify(&self, signal: NavigationSignal) {
        let Some(window) = self.inner.debounce else {
            self.inner.deliver(signal);
            return;
        };

        self.inner.latest.set(Some(signal));
        if self.inner.pending.borrow().is_some() {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let handle = runtime::spawn(async move {
            runtime::sleep(window).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.pending.borrow_mut().take();
            if let Some(latest) = inner.latest.take() {
                inner.deliver(latest);
            }
        });
        *self.inner.pending.borrow_mut() = Some(handle);
    }

    /// Wrap the host's history primitives so every push/replace is reported.
    ///
    /// Only the first call wraps; later calls return the same wrapper, or
    /// the history passed to [`adopt_history`](Self::adopt_history).
    pub fn intercept_history(&self, history: Rc<dyn HistoryApi>) -> Rc<dyn HistoryApi> {
        if let Some(existing) = self.inner.history.borrow().as_ref() {
            debug_log!("history already intercepted, reusing it");
            return existing.clone();
        }
        let wrapper: Rc<dyn HistoryApi> = Rc::new(InterceptedHistory {
            inner: history,
            watcher: Rc::downgrade(&self.inner),
        });
        *self.inner.history.borrow_mut() = Some(wrapper.clone());
        debug_log!("history push/replace interception installed");
        wrapper
    }

    /// Register history whose calls already reach the watcher by other
    /// means, such as a patched `window.history`. It is returned as is, and
    /// later [`intercept_history`](Self::intercept_history) calls return it
    /// instead of wrapping. Returns `None` if history was already installed.
    pub fn adopt_history(&self, history: Rc<dyn HistoryApi>) -> Option<Rc<dyn HistoryApi>> {
        let mut slot = self.inner.history.borrow_mut();
        if slot.is_some() {
            warn_log!("history already intercepted, not adopting");
            return None;
        }
        *slot = Some(history.clone());
        debug_log!("externally reported history adopted");
        Some(history)
    }

    pub fn is_history_intercepted(&self) -> bool {
        self.inner.history.borrow().is_some()
    }
}

impl Default for NavigationWatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// InterceptedHistory
// ============================================================================

/// Call-through wrapper around the host's history primitives.
pub struct InterceptedHistory {
    inner: Rc<dyn HistoryApi>,
    watcher: Weak<WatcherInner>,
}

impl InterceptedHistory {
    fn report(&self, signal: NavigationSignal) {
        if let Some(inner) = self.watcher.upgrade() {
            NavigationWatcher { inner }.notify(signal);
        }
    }
}

impl HistoryApi for InterceptedHistory {
    fn push_state(&self, url: &str) {
        self.inner.push_state(url);
        self.report(NavigationSignal::PushState);
    }

    fn replace_state(&self, url: &str) {
        self.inner.replace_state(url);
        self.report(NavigationSignal::ReplaceState);
    }
}

// ============================================================================
// Tests
// ============================================================================
