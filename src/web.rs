//! Browser binding (`wasm32` only).
//!
//! [`BrowserPage`] implements [`HostPage`] over `web-sys`. [`boot`] is the
//! entry point a loader script calls once per page with the JSON
//! configuration: it installs the navigation sources, the credential capture
//! and the [`ContentScript`].
//!
//! | Navigation source | Installed by |
//! |-------------------|--------------|
//! | `MutationObserver` on `document.body` (child list, subtree) | [`install_observers`] |
//! | `popstate` on `window` | [`install_observers`] |
//! | `history.pushState` / `replaceState` | [`patch_history`] |
//!
//! Patched functions always call the function they replaced, so other
//! scripts that wrapped them first keep working. Each patched object gets a
//! marker property and is never patched twice.

#[cfg(feature = "cache")]
use crate::cache::CachedGateway;
use crate::config::ScriptConfig;
use crate::controller::WidgetController;
use crate::credentials::{AuthUser, CapturedCredentials, CredentialSource, FallbackCredentials, HostAuthState};
use crate::gateway::{ContactGateway, HttpContactGateway};
use crate::navigation::{HistoryApi, NavigationSignal, NavigationWatcher};
use crate::page::{ElementBlueprint, EventCallback, EventKind, HostPage, ListenerId, NodeRef};
use crate::script::ContentScript;
use crate::widget::WidgetContext;
use crate::{debug_log, error_log, info_log, warn_log};
use js_sys::{Array, Function, Object, Promise, Reflect};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, HtmlElement, HtmlInputElement, HtmlSelectElement, MutationObserver,
    MutationObserverInit, Node, Window,
};

/// Property set on patched objects.
const PATCH_MARKER: &str = "__convoWidgetsPatched";

thread_local! {
    static SCRIPT: RefCell<Option<ContentScript>> = const { RefCell::new(None) };
}

// ============================================================================
// BrowserPage
// ============================================================================

struct BrowserListener {
    element: Element,
    event: EventKind,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

/// [`HostPage`] over the live document.
///
/// Elements are handed out as [`NodeRef`]s from a registry; looking up the
/// same element twice yields the same handle. `NodeRef(0)` never refers to
/// anything.
pub struct BrowserPage {
    window: Window,
    document: Document,
    body: Element,
    nodes: RefCell<HashMap<u64, Element>>,
    next_node: Cell<u64>,
    listeners: RefCell<HashMap<u64, BrowserListener>>,
    next_listener: Cell<u64>,
}

impl BrowserPage {
    /// `None` when the window has no document or body yet.
    pub fn new(window: Window) -> Option<Self> {
        let document = window.document()?;
        let body: Element = document.body()?.into();
        Some(Self {
            window,
            document,
            body,
            nodes: RefCell::new(HashMap::new()),
            next_node: Cell::new(1),
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(1),
        })
    }

    fn register(&self, element: Element) -> NodeRef {
        let existing = self
            .nodes
            .borrow()
            .iter()
            .find(|(_, known)| {
                let known: &JsValue = known.as_ref();
                let candidate: &JsValue = element.as_ref();
                known == candidate
            })
            .map(|(id, _)| *id);
        if let Some(id) = existing {
            return NodeRef(id);
        }
        let id = self.next_node.get();
        self.next_node.set(id + 1);
        self.nodes.borrow_mut().insert(id, element);
        NodeRef(id)
    }

    fn element(&self, node: NodeRef) -> Option<Element> {
        self.nodes.borrow().get(&node.0).cloned()
    }

    fn html(&self, node: NodeRef) -> Option<HtmlElement> {
        self.element(node)?.dyn_into::<HtmlElement>().ok()
    }

    /// Drop registry entries for `root` and everything below it.
    fn forget_subtree(&self, root: &Element) {
        let root: &Node = root.as_ref();
        self.nodes.borrow_mut().retain(|_, element| {
            let node: &Node = element.as_ref();
            !root.contains(Some(node))
        });
    }

    fn build(&self, blueprint: &ElementBlueprint) -> Result<Element, JsValue> {
        let element = self.document.create_element(&blueprint.tag)?;
        if let Some(id) = &blueprint.id {
            element.set_id(id);
        }
        if !blueprint.classes.is_empty() {
            element.set_class_name(&blueprint.classes.join(" "));
        }
        for (name, value) in &blueprint.attributes {
            element.set_attribute(name, value)?;
        }
        if let Some(text) = &blueprint.text {
            element.set_text_content(Some(text));
        }
        if blueprint.hidden {
            if let Some(html) = element.dyn_ref::<HtmlElement>() {
                html.style().set_property("display", "none")?;
            }
        }
        Ok(element)
    }
}

impl HostPage for BrowserPage {
    fn pathname(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn query_selector(&self, selector: &str) -> Option<NodeRef> {
        let element = self.document.query_selector(selector).ok().flatten()?;
        Some(self.register(element))
    }

    fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        let element = self.document.get_element_by_id(id)?;
        Some(self.register(element))
    }

    fn children(&self, parent: NodeRef) -> Vec<NodeRef> {
        let Some(parent) = self.element(parent) else {
            return Vec::new();
        };
        let children = parent.children();
        (0..children.length())
            .filter_map(|i| children.item(i))
            .map(|child| self.register(child))
            .collect()
    }

    fn body(&self) -> NodeRef {
        self.register(self.body.clone())
    }

    fn create_element(&self, blueprint: &ElementBlueprint) -> NodeRef {
        match self.build(blueprint) {
            Ok(element) => self.register(element),
            Err(err) => {
                error_log!("could not create <{}>: {:?}", blueprint.tag, err);
                NodeRef(0)
            }
        }
    }

    fn append_child(&self, parent: NodeRef, child: NodeRef) -> bool {
        match (self.element(parent), self.element(child)) {
            (Some(parent), Some(child)) => parent.append_child(&child).is_ok(),
            _ => false,
        }
    }

    fn insert_before(&self, parent: NodeRef, node: NodeRef, reference: Option<NodeRef>) -> bool {
        let (Some(parent), Some(node)) = (self.element(parent), self.element(node)) else {
            return false;
        };
        let reference = reference.and_then(|r| self.element(r));
        let reference: Option<&Node> = reference.as_ref().map(AsRef::as_ref);
        parent.insert_before(&node, reference).is_ok()
    }

    fn remove(&self, node: NodeRef) -> bool {
        let Some(element) = self.element(node) else {
            return false;
        };
        let was_attached = element.is_connected();
        element.remove();
        self.forget_subtree(&element);
        was_attached
    }

    fn is_attached(&self, node: NodeRef) -> bool {
        self.element(node).is_some_and(|e| e.is_connected())
    }

    fn add_listener(
        &self,
        node: NodeRef,
        event: EventKind,
        callback: EventCallback,
    ) -> Option<ListenerId> {
        let element = self.element(node)?;
        let closure = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
            callback();
        });
        element
            .add_event_listener_with_callback(event.as_str(), closure.as_ref().unchecked_ref())
            .ok()?;

        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().insert(
            id,
            BrowserListener {
                element,
                event,
                closure,
            },
        );
        Some(ListenerId(id))
    }

    fn remove_listener(&self, listener: ListenerId) -> bool {
        let Some(entry) = self.listeners.borrow_mut().remove(&listener.0) else {
            return false;
        };
        let _ = entry.element.remove_event_listener_with_callback(
            entry.event.as_str(),
            entry.closure.as_ref().unchecked_ref(),
        );
        true
    }

    fn set_hidden(&self, node: NodeRef, hidden: bool) {
        if let Some(html) = self.html(node) {
            let style = html.style();
            let _ = if hidden {
                style.set_property("display", "none")
            } else {
                style.remove_property("display").map(|_| ())
            };
        }
    }

    fn set_disabled(&self, node: NodeRef, disabled: bool) {
        if let Some(element) = self.element(node) {
            let _ = if disabled {
                element.set_attribute("disabled", "")
            } else {
                element.remove_attribute("disabled")
            };
        }
    }

    fn set_text(&self, node: NodeRef, text: &str) {
        if let Some(element) = self.element(node) {
            element.set_text_content(Some(text));
        }
    }

    fn set_attribute(&self, node: NodeRef, name: &str, value: &str) {
        if let Some(element) = self.element(node) {
            let _ = element.set_attribute(name, value);
        }
    }

    fn value(&self, node: NodeRef) -> Option<String> {
        let element = self.element(node)?;
        if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
            return Some(input.value());
        }
        element.dyn_ref::<HtmlSelectElement>().map(|s| s.value())
    }

    fn set_value(&self, node: NodeRef, value: &str) {
        let Some(element) = self.element(node) else {
            return;
        };
        if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
            input.set_value(value);
        } else if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
            select.set_value(value);
        }
    }

    fn focus(&self, node: NodeRef) {
        if let Some(html) = self.html(node) {
            let _ = html.focus();
        }
    }

    fn alert(&self, message: &str) {
        let _ = self.window.alert_with_message(message);
    }
}

// ============================================================================
// History
// ============================================================================

/// `window.history` as a [`HistoryApi`].
pub struct BrowserHistory {
    history: web_sys::History,
}

impl BrowserHistory {
    pub fn new(window: &Window) -> Result<Self, JsValue> {
        Ok(Self {
            history: window.history()?,
        })
    }
}

impl HistoryApi for BrowserHistory {
    fn push_state(&self, url: &str) {
        let _ = self
            .history
            .push_state_with_url(&JsValue::NULL, "", Some(url));
    }

    fn replace_state(&self, url: &str) {
        let _ = self
            .history
            .replace_state_with_url(&JsValue::NULL, "", Some(url));
    }
}

fn is_patched(target: &JsValue) -> bool {
    Reflect::get(target, &JsValue::from_str(PATCH_MARKER)).is_ok_and(|v| v.is_truthy())
}

fn mark_patched(target: &JsValue) -> Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(PATCH_MARKER), &JsValue::TRUE).map(|_| ())
}

/// Make `history.pushState` / `replaceState` report to `watcher`.
pub fn patch_history(window: &Window, watcher: &NavigationWatcher) -> Result<(), JsValue> {
    let history: JsValue = window.history()?.into();
    if is_patched(&history) {
        warn_log!("history already patched");
        return Ok(());
    }

    for (name, signal) in [
        ("pushState", NavigationSignal::PushState),
        ("replaceState", NavigationSignal::ReplaceState),
    ] {
        let original: Function = Reflect::get(&history, &JsValue::from_str(name))?.dyn_into()?;
        let this = history.clone();
        let watcher = watcher.clone();
        let patched = Closure::<dyn Fn(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>::new(
            move |state: JsValue, title: JsValue, url: JsValue| {
                let result = original.call3(&this, &state, &title, &url);
                watcher.notify(signal);
                result
            },
        );
        Reflect::set(&history, &JsValue::from_str(name), patched.as_ref())?;
        patched.forget();
    }
    mark_patched(&history)?;
    debug_log!("history.pushState/replaceState patched");
    Ok(())
}

// ============================================================================
// Credential capture
// ============================================================================

/// Header pairs from a `Headers` object, an array of pairs or a plain
/// object.
fn header_pairs(headers: &JsValue) -> Vec<(String, String)> {
    if headers.is_undefined() || headers.is_null() {
        return Vec::new();
    }
    let entries: Vec<JsValue> = match js_sys::try_iter(headers) {
        Ok(Some(iter)) => iter.filter_map(Result::ok).collect(),
        _ if headers.is_object() => Object::entries(headers.unchecked_ref::<Object>())
            .iter()
            .collect(),
        _ => return Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| {
            let pair = entry.dyn_into::<Array>().ok()?;
            Some((pair.get(0).as_string()?, pair.get(1).as_string()?))
        })
        .collect()
}

fn request_url(input: &JsValue) -> Option<String> {
    input.as_string().or_else(|| {
        ["url", "href"]
            .iter()
            .find_map(|key| Reflect::get(input, &JsValue::from_str(key)).ok()?.as_string())
    })
}

fn observe_fetch(captured: &CapturedCredentials, input: &JsValue, init: &JsValue) {
    let Some(url) = request_url(input) else {
        return;
    };
    let mut headers = Vec::new();
    if input.is_object() {
        if let Ok(from_request) = Reflect::get(input, &JsValue::from_str("headers")) {
            headers.extend(header_pairs(&from_request));
        }
    }
    if init.is_object() {
        if let Ok(from_init) = Reflect::get(init, &JsValue::from_str("headers")) {
            headers.extend(header_pairs(&from_init));
        }
    }
    captured.observe_request(&url, headers);
}

/// Make `window.fetch` feed request headers to `captured`.
pub fn patch_fetch(window: &Window, captured: Rc<CapturedCredentials>) -> Result<(), JsValue> {
    let target: JsValue = window.clone().into();
    let original: Function = Reflect::get(&target, &JsValue::from_str("fetch"))?.dyn_into()?;
    if is_patched(&original) {
        warn_log!("fetch already patched");
        return Ok(());
    }

    let this = target.clone();
    let patched = Closure::<dyn Fn(JsValue, JsValue) -> JsValue>::new(
        move |input: JsValue, init: JsValue| {
            observe_fetch(&captured, &input, &init);
            original
                .call2(&this, &input, &init)
                .unwrap_or_else(|err| Promise::reject(&err).into())
        },
    );
    let patched_fn: JsValue = patched.as_ref().clone();
    mark_patched(&patched_fn)?;
    Reflect::set(&target, &JsValue::from_str("fetch"), &patched_fn)?;
    patched.forget();
    debug_log!("window.fetch patched");
    Ok(())
}

/// `document.querySelector("#app").__vue__.authUser`.
pub fn read_host_auth() -> Option<AuthUser> {
    let app = web_sys::window()?.document()?.query_selector("#app").ok()??;
    let vue = Reflect::get(&app, &JsValue::from_str("__vue__")).ok()?;
    let user = Reflect::get(&vue, &JsValue::from_str("authUser")).ok()?;
    if !user.is_object() {
        return None;
    }
    let field = |name: &str| {
        Reflect::get(&user, &JsValue::from_str(name))
            .ok()
            .and_then(|v| v.as_string())
            .unwrap_or_default()
    };
    Some(AuthUser {
        auth_token: field("authToken"),
        api_key: field("apiKey"),
    })
}

// ============================================================================
// Observers and boot
// ============================================================================

/// Report body mutations and `popstate` to `watcher`.
pub fn install_observers(
    window: &Window,
    page: &BrowserPage,
    watcher: &NavigationWatcher,
) -> Result<(), JsValue> {
    let on_mutation = {
        let watcher = watcher.clone();
        Closure::<dyn FnMut(Array, MutationObserver)>::new(move |_records: Array, _observer| {
            watcher.notify(NavigationSignal::DomMutation);
        })
    };
    let observer = MutationObserver::new(on_mutation.as_ref().unchecked_ref())?;
    let init = MutationObserverInit::new();
    init.set_child_list(true);
    init.set_subtree(true);
    observer.observe_with_options(&page.body, &init)?;
    on_mutation.forget();

    let on_popstate = {
        let watcher = watcher.clone();
        Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
            watcher.notify(NavigationSignal::PopState);
        })
    };
    window.add_event_listener_with_callback("popstate", on_popstate.as_ref().unchecked_ref())?;
    on_popstate.forget();
    Ok(())
}

fn gateway(config: &ScriptConfig, credentials: Rc<dyn CredentialSource>) -> Result<Rc<dyn ContactGateway>, JsValue> {
    let api_base = config
        .api_base_url()
        .map_err(|err| JsValue::from_str(&err.to_string()))?;
    let http = HttpContactGateway::new(api_base, credentials);
    #[cfg(feature = "cache")]
    let gateway: Rc<dyn ContactGateway> = Rc::new(CachedGateway::new(http));
    #[cfg(not(feature = "cache"))]
    let gateway: Rc<dyn ContactGateway> = Rc::new(http);
    Ok(gateway)
}

/// Start the widgets on this page. Later calls are ignored.
#[wasm_bindgen]
pub fn boot(config_json: &str) -> Result<(), JsValue> {
    if SCRIPT.with(|slot| slot.borrow().is_some()) {
        warn_log!("boot called twice, ignoring");
        return Ok(());
    }

    let config = ScriptConfig::from_json(config_json)
        .map_err(|err| JsValue::from_str(&err.to_string()))?;
    let window = web_sys::window().ok_or("window is unavailable")?;
    let page = Rc::new(BrowserPage::new(window.clone()).ok_or("document body is unavailable")?);

    let captured = Rc::new(CapturedCredentials::new(config.capture_host.clone()));
    patch_fetch(&window, captured.clone())?;
    let credentials: Rc<dyn CredentialSource> = Rc::new(
        FallbackCredentials::new()
            .source(Rc::new(HostAuthState::new(read_host_auth)))
            .source(captured),
    );

    // The patched `window.history` reports every push/replace, including
    // the controller's own, so its history is adopted rather than wrapped.
    let watcher = ContentScript::watcher_for(&config);
    patch_history(&window, &watcher)?;
    let history = watcher
        .adopt_history(Rc::new(BrowserHistory::new(&window)?))
        .ok_or("history is already installed")?;
    install_observers(&window, &page, &watcher)?;

    let gateway = gateway(&config, credentials.clone())?;
    let cx = WidgetContext::new(page.clone(), gateway, credentials, Rc::new(config));
    let script =
        ContentScript::start_with(WidgetController::with_default_widgets(cx), watcher, history);
    info_log!("widgets booted on {}", page.pathname());

    SCRIPT.with(|slot| *slot.borrow_mut() = Some(script));
    Ok(())
}
