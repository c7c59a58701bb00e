//! The DOM contract the widgets consume.
//!
//! [`HostPage`] is the narrow slice of the host document the controller
//! needs: find the anchor region, create and insert a handful of elements,
//! attach and detach click handlers, read and write input values, and raise
//! a blocking notification. Nodes are addressed through opaque [`NodeRef`]
//! handles so the same controller runs against the real browser document
//! ([`BrowserPage`](crate::web::BrowserPage), `wasm32` only) and the
//! in-memory [`MemoryPage`](crate::memory::MemoryPage).
//!
//! All methods take `&self`: implementations are single-threaded and use
//! interior mutability, matching the browser's event loop.

use std::fmt;
use std::rc::Rc;

/// Opaque handle to an element owned by a [`HostPage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub u64);

/// Handle returned by [`HostPage::add_listener`], used for exact removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// DOM events the widgets listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
}

impl EventKind {
    /// DOM event name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked by the page when a registered event fires.
pub type EventCallback = Rc<dyn Fn()>;

/// Description of a single element to create.
///
/// ```
/// use convo_widgets::page::ElementBlueprint;
///
/// let button = ElementBlueprint::new("button")
///     .id("snooze-btn")
///     .class("flex items-center px-2.5 py-1")
///     .attr("title", "Snooze");
/// assert_eq!(button.classes, vec!["flex", "items-center", "px-2.5", "py-1"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementBlueprint {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub hidden: bool,
}

impl ElementBlueprint {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add whitespace-separated classes.
    pub fn class(mut self, classes: &str) -> Self {
        self.classes
            .extend(classes.split_whitespace().map(String::from));
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// Host document operations used by the widget controller.
pub trait HostPage {
    /// Current `location.pathname`.
    fn pathname(&self) -> String;

    /// First attached element matching a compound selector
    /// (`tag`, `#id`, `.class` chains).
    fn query_selector(&self, selector: &str) -> Option<NodeRef>;

    /// Attached element with the given DOM id.
    fn element_by_id(&self, id: &str) -> Option<NodeRef>;

    /// Child elements of `parent` in document order.
    fn children(&self, parent: NodeRef) -> Vec<NodeRef>;

    /// The document body.
    fn body(&self) -> NodeRef;

    /// Create a detached element.
    fn create_element(&self, blueprint: &ElementBlueprint) -> NodeRef;

    /// Append `child` to `parent`. Returns `false` if either is unknown.
    fn append_child(&self, parent: NodeRef, child: NodeRef) -> bool;

    /// Insert `node` into `parent` before `reference` (append when `None`).
    fn insert_before(&self, parent: NodeRef, node: NodeRef, reference: Option<NodeRef>) -> bool;

    /// Detach `node`. Returns `false` if it was already gone.
    fn remove(&self, node: NodeRef) -> bool;

    /// True if `node` is still part of the document.
    fn is_attached(&self, node: NodeRef) -> bool;

    /// Register `callback` for `event` on `node`.
    fn add_listener(&self, node: NodeRef, event: EventKind, callback: EventCallback)
        -> Option<ListenerId>;

    /// Remove a listener. Returns `false` if it was not registered.
    fn remove_listener(&self, listener: ListenerId) -> bool;

    fn set_hidden(&self, node: NodeRef, hidden: bool);

    fn set_disabled(&self, node: NodeRef, disabled: bool);

    fn set_text(&self, node: NodeRef, text: &str);

    fn set_attribute(&self, node: NodeRef, name: &str, value: &str);

    /// Value of an input or select element.
    fn value(&self, node: NodeRef) -> Option<String>;

    fn set_value(&self, node: NodeRef, value: &str);

    fn focus(&self, _node: NodeRef) {}

    /// Blocking user notification (`window.alert`).
    fn alert(&self, message: &str);
}
