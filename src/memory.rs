//! In-memory host page.
//!
//! [`MemoryPage`] implements [`HostPage`] and [`HistoryApi`] without a
//! browser: a small element tree, a listener registry, a history stack and a
//! log of notifications. It is what the integration tests drive, and it is
//! also usable as a headless host for dry runs.
//!
//! Listener and insertion counters make leaks observable:
//!
//! ```
//! use convo_widgets::memory::MemoryPage;
//! use convo_widgets::page::{ElementBlueprint, EventKind, HostPage};
//! use std::rc::Rc;
//!
//! let page = MemoryPage::new("/v2/location/W1/conversations/C1");
//! let button = page.create_element(&ElementBlueprint::new("button").id("x"));
//! page.append_child(page.body(), button);
//! let listener = page.add_listener(button, EventKind::Click, Rc::new(|| {})).unwrap();
//! assert_eq!(page.listener_count(), 1);
//! page.remove_listener(listener);
//! assert_eq!(page.listener_count(), 0);
//! ```

use crate::navigation::HistoryApi;
use crate::page::{ElementBlueprint, EventCallback, EventKind, HostPage, ListenerId, NodeRef};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
struct MemoryNode {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, String)>,
    text: String,
    value: String,
    hidden: bool,
    disabled: bool,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<NodeRef, MemoryNode>,
    body: NodeRef,
    next_id: u64,
}

impl Tree {
    fn new() -> Self {
        let body = NodeRef(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            body,
            MemoryNode {
                tag: "body".to_string(),
                ..MemoryNode::default()
            },
        );
        Self {
            nodes,
            body,
            next_id: 1,
        }
    }

    fn create(&mut self, node: MemoryNode) -> NodeRef {
        let id = NodeRef(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn is_attached(&self, node: NodeRef) -> bool {
        let mut current = Some(node);
        let mut hops = 0usize;
        while let Some(id) = current {
            if id == self.body {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, node: NodeRef) -> bool {
        let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) else {
            return false;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|child| *child != node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = None;
        }
        true
    }

    /// Attached nodes in document order.
    fn document_order(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut stack = vec![self.body];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}

/// Compound selector: optional tag, optional `#id`, any number of `.class`.
#[derive(Debug, Default, PartialEq, Eq)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SimpleSelector {
    fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty() || selector.contains(char::is_whitespace) {
            return None;
        }

        let mut parsed = Self::default();
        let mut kind = ' ';
        let mut token = String::new();
        let flush = |kind: char, token: &mut String, parsed: &mut Self| {
            if token.is_empty() {
                return;
            }
            let value = std::mem::take(token);
            match kind {
                '#' => parsed.id = Some(value),
                '.' => parsed.classes.push(value),
                _ => parsed.tag = Some(value.to_ascii_lowercase()),
            }
        };
        for ch in selector.chars() {
            if ch == '#' || ch == '.' {
                flush(kind, &mut token, &mut parsed);
                kind = ch;
            } else {
                token.push(ch);
            }
        }
        flush(kind, &mut token, &mut parsed);
        Some(parsed)
    }

    fn matches(&self, node: &MemoryNode) -> bool {
        self.tag.as_ref().map_or(true, |tag| *tag == node.tag)
            && self
                .id
                .as_ref()
                .map_or(true, |id| node.id.as_ref() == Some(id))
            && self.classes.iter().all(|c| node.classes.contains(c))
    }
}

struct Listener {
    node: NodeRef,
    event: EventKind,
    callback: EventCallback,
}

/// Navigation history, newest entry last.
#[derive(Debug, Clone)]
struct HistoryStack {
    entries: Vec<String>,
    current: usize,
}

impl HistoryStack {
    fn new(path: String) -> Self {
        Self {
            entries: vec![path],
            current: 0,
        }
    }

    fn current_path(&self) -> &str {
        &self.entries[self.current]
    }

    fn push(&mut self, path: String) {
        self.entries.truncate(self.current + 1);
        self.entries.push(path);
        self.current += 1;
    }

    fn replace(&mut self, path: String) {
        self.entries[self.current] = path;
    }

    fn back(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    fn forward(&mut self) -> bool {
        if self.current + 1 < self.entries.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }
}

/// Headless [`HostPage`] with a browser-like history stack.
pub struct MemoryPage {
    tree: RefCell<Tree>,
    listeners: RefCell<BTreeMap<ListenerId, Listener>>,
    next_listener: Cell<u64>,
    history: RefCell<HistoryStack>,
    alerts: RefCell<Vec<String>>,
    insertions: Cell<usize>,
}

impl MemoryPage {
    /// Empty document at `pathname`.
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            tree: RefCell::new(Tree::new()),
            listeners: RefCell::new(BTreeMap::new()),
            next_listener: Cell::new(1),
            history: RefCell::new(HistoryStack::new(pathname.into())),
            alerts: RefCell::new(Vec::new()),
            insertions: Cell::new(0),
        }
    }

    /// Build the host's conversation toolbar: `div.button-group.flex` holding
    /// archive, delete and overflow buttons. Not counted as an insertion.
    pub fn add_button_group(&self) -> NodeRef {
        let mut tree = self.tree.borrow_mut();
        let body = tree.body;
        let group = tree.create(MemoryNode {
            tag: "div".to_string(),
            classes: vec!["button-group".to_string(), "flex".to_string()],
            parent: Some(body),
            ..MemoryNode::default()
        });
        for id in ["archive-btn", "delete-btn", "more-btn"] {
            let button = tree.create(MemoryNode {
                tag: "button".to_string(),
                id: Some(id.to_string()),
                parent: Some(group),
                ..MemoryNode::default()
            });
            if let Some(g) = tree.nodes.get_mut(&group) {
                g.children.push(button);
            }
        }
        if let Some(b) = tree.nodes.get_mut(&body) {
            b.children.push(group);
        }
        group
    }

    /// Change the path without touching the history stack.
    pub fn set_pathname(&self, pathname: impl Into<String>) {
        self.history.borrow_mut().replace(pathname.into());
    }

    /// Step back in history. The caller reports the `popstate`.
    pub fn back(&self) -> bool {
        self.history.borrow_mut().back()
    }

    /// Step forward in history. The caller reports the `popstate`.
    pub fn forward(&self) -> bool {
        self.history.borrow_mut().forward()
    }

    /// Number of history entries.
    pub fn history_len(&self) -> usize {
        self.history.borrow().entries.len()
    }

    /// Simulate a user click. Hidden, disabled or detached elements ignore it.
    pub fn click(&self, node: NodeRef) -> bool {
        {
            let tree = self.tree.borrow();
            let Some(n) = tree.nodes.get(&node) else {
                return false;
            };
            if n.disabled || n.hidden || !tree.is_attached(node) {
                return false;
            }
        }
        let callbacks: Vec<EventCallback> = self
            .listeners
            .borrow()
            .values()
            .filter(|l| l.node == node && l.event == EventKind::Click)
            .map(|l| l.callback.clone())
            .collect();
        for callback in &callbacks {
            callback();
        }
        !callbacks.is_empty()
    }

    /// Click the attached element with DOM id `id`.
    pub fn click_id(&self, id: &str) -> bool {
        self.element_by_id(id).is_some_and(|node| self.click(node))
    }

    /// Registered listeners across all nodes, attached or not.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Attached elements carrying DOM id `id`.
    pub fn count_by_id(&self, id: &str) -> usize {
        let tree = self.tree.borrow();
        tree.document_order()
            .into_iter()
            .filter(|n| tree.nodes.get(n).and_then(|n| n.id.as_deref()) == Some(id))
            .count()
    }

    /// Insertions into the attached document since creation.
    pub fn insertions(&self) -> usize {
        self.insertions.get()
    }

    /// Notifications raised so far.
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.borrow().clone()
    }

    /// Drain the notification log.
    pub fn take_alerts(&self) -> Vec<String> {
        std::mem::take(&mut *self.alerts.borrow_mut())
    }

    pub fn is_hidden(&self, node: NodeRef) -> bool {
        self.tree.borrow().nodes.get(&node).is_some_and(|n| n.hidden)
    }

    pub fn is_disabled(&self, node: NodeRef) -> bool {
        self.tree
            .borrow()
            .nodes
            .get(&node)
            .is_some_and(|n| n.disabled)
    }

    pub fn text(&self, node: NodeRef) -> Option<String> {
        self.tree.borrow().nodes.get(&node).map(|n| n.text.clone())
    }

    pub fn attribute(&self, node: NodeRef, name: &str) -> Option<String> {
        self.tree.borrow().nodes.get(&node).and_then(|n| {
            n.attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
    }

    fn with_node(&self, node: NodeRef, f: impl FnOnce(&mut MemoryNode)) {
        if let Some(n) = self.tree.borrow_mut().nodes.get_mut(&node) {
            f(n);
        }
    }

    fn count_insertion(&self, parent: NodeRef) {
        if self.tree.borrow().is_attached(parent) {
            self.insertions.set(self.insertions.get() + 1);
        }
    }
}

impl HostPage for MemoryPage {
    fn pathname(&self) -> String {
        self.history.borrow().current_path().to_string()
    }

    fn query_selector(&self, selector: &str) -> Option<NodeRef> {
        let selector = SimpleSelector::parse(selector)?;
        let tree = self.tree.borrow();
        tree.document_order()
            .into_iter()
            .filter(|id| *id != tree.body)
            .find(|id| tree.nodes.get(id).is_some_and(|n| selector.matches(n)))
    }

    fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        let tree = self.tree.borrow();
        tree.document_order()
            .into_iter()
            .find(|n| tree.nodes.get(n).and_then(|n| n.id.as_deref()) == Some(id))
    }

    fn children(&self, parent: NodeRef) -> Vec<NodeRef> {
        self.tree
            .borrow()
            .nodes
            .get(&parent)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn body(&self) -> NodeRef {
        self.tree.borrow().body
    }

    fn create_element(&self, blueprint: &ElementBlueprint) -> NodeRef {
        let node = MemoryNode {
            tag: blueprint.tag.to_ascii_lowercase(),
            id: blueprint.id.clone(),
            classes: blueprint.classes.clone(),
            attributes: blueprint.attributes.clone(),
            text: blueprint.text.clone().unwrap_or_default(),
            hidden: blueprint.hidden,
            ..MemoryNode::default()
        };
        self.tree.borrow_mut().create(node)
    }

    fn append_child(&self, parent: NodeRef, child: NodeRef) -> bool {
        self.insert_before(parent, child, None)
    }

    fn insert_before(&self, parent: NodeRef, node: NodeRef, reference: Option<NodeRef>) -> bool {
        {
            let mut tree = self.tree.borrow_mut();
            if parent == node || !tree.nodes.contains_key(&parent) || !tree.nodes.contains_key(&node)
            {
                return false;
            }
            tree.detach(node);
            let Some(p) = tree.nodes.get_mut(&parent) else {
                return false;
            };
            let index = reference
                .and_then(|r| p.children.iter().position(|c| *c == r))
                .unwrap_or(p.children.len());
            p.children.insert(index, node);
            if let Some(n) = tree.nodes.get_mut(&node) {
                n.parent = Some(parent);
            }
        }
        self.count_insertion(parent);
        true
    }

    fn remove(&self, node: NodeRef) -> bool {
        self.tree.borrow_mut().detach(node)
    }

    fn is_attached(&self, node: NodeRef) -> bool {
        let tree = self.tree.borrow();
        tree.nodes.contains_key(&node) && tree.is_attached(node)
    }

    fn add_listener(
        &self,
        node: NodeRef,
        event: EventKind,
        callback: EventCallback,
    ) -> Option<ListenerId> {
        if !self.tree.borrow().nodes.contains_key(&node) {
            return None;
        }
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().insert(
            id,
            Listener {
                node,
                event,
                callback,
            },
        );
        Some(id)
    }

    fn remove_listener(&self, listener: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(&listener).is_some()
    }

    fn set_hidden(&self, node: NodeRef, hidden: bool) {
        self.with_node(node, |n| n.hidden = hidden);
    }

    fn set_disabled(&self, node: NodeRef, disabled: bool) {
        self.with_node(node, |n| n.disabled = disabled);
    }

    fn set_text(&self, node: NodeRef, text: &str) {
        self.with_node(node, |n| n.text = text.to_string());
    }

    fn set_attribute(&self, node: NodeRef, name: &str, value: &str) {
        self.with_node(node, |n| {
            if let Some(slot) = n.attributes.iter_mut().find(|(k, _)| k == name) {
                slot.1 = value.to_string();
            } else {
                n.attributes.push((name.to_string(), value.to_string()));
            }
        });
    }

    fn value(&self, node: NodeRef) -> Option<String> {
        self.tree.borrow().nodes.get(&node).map(|n| n.value.clone())
    }

    fn set_value(&self, node: NodeRef, value: &str) {
        self.with_node(node, |n| n.value = value.to_string());
    }

    fn alert(&self, message: &str) {
        self.alerts.borrow_mut().push(message.to_string());
    }
}

impl HistoryApi for MemoryPage {
    fn push_state(&self, url: &str) {
        self.history.borrow_mut().push(url.to_string());
    }

    fn replace_state(&self, url: &str) {
        self.history.borrow_mut().replace(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_selector_parse() {
        let s = SimpleSelector::parse(".button-group.flex").unwrap();
        assert_eq!(s.classes, vec!["button-group", "flex"]);
        assert!(s.tag.is_none());

        let s = SimpleSelector::parse("button#snooze-btn").unwrap();
        assert_eq!(s.tag.as_deref(), Some("button"));
        assert_eq!(s.id.as_deref(), Some("snooze-btn"));

        assert!(SimpleSelector::parse("div .child").is_none());
    }

    #[test]
    fn test_query_selector_finds_button_group() {
        let page = MemoryPage::new("/");
        assert!(page.query_selector(".button-group.flex").is_none());
        let group = page.add_button_group();
        assert_eq!(page.query_selector(".button-group.flex"), Some(group));
        assert_eq!(page.children(group).len(), 3);
        assert_eq!(page.insertions(), 0);
    }

    #[test]
    fn test_insert_before_and_remove() {
        let page = MemoryPage::new("/");
        let group = page.add_button_group();
        let delete = page.element_by_id("delete-btn").unwrap();
        let node = page.create_element(&ElementBlueprint::new("button").id("mine"));
        assert!(!page.is_attached(node));

        assert!(page.insert_before(group, node, Some(delete)));
        assert_eq!(page.children(group)[1], node);
        assert_eq!(page.insertions(), 1);

        assert!(page.remove(node));
        assert!(!page.remove(node));
        assert_eq!(page.count_by_id("mine"), 0);
    }

    #[test]
    fn test_detached_subtree_insertions_not_counted() {
        let page = MemoryPage::new("/");
        let modal = page.create_element(&ElementBlueprint::new("div"));
        let input = page.create_element(&ElementBlueprint::new("input"));
        page.append_child(modal, input);
        assert_eq!(page.insertions(), 0);
        page.append_child(page.body(), modal);
        assert_eq!(page.insertions(), 1);
        assert!(page.is_attached(input));
    }

    #[test]
    fn test_click_respects_disabled() {
        let page = MemoryPage::new("/");
        let button = page.create_element(&ElementBlueprint::new("button"));
        page.append_child(page.body(), button);
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        page.add_listener(button, EventKind::Click, Rc::new(move || counter.set(counter.get() + 1)));

        assert!(page.click(button));
        page.set_disabled(button, true);
        assert!(!page.click(button));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_history_stack() {
        let page = MemoryPage::new("/v2/location/W1/conversations/C1");
        page.push_state("/v2/location/W1/contacts");
        page.push_state("/v2/location/W1/conversations/C2");
        assert_eq!(page.history_len(), 3);

        assert!(page.back());
        assert_eq!(page.pathname(), "/v2/location/W1/contacts");

        page.push_state("/settings");
        assert_eq!(page.history_len(), 3);
        assert!(!page.forward());

        page.replace_state("/v2/location/W2");
        assert_eq!(page.pathname(), "/v2/location/W2");
    }
}
