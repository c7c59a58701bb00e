//! Test fixtures shared by the integration tests.
//!
//! [`FakeGateway`] keeps contacts, fields and tags in memory, records every
//! call, and can be scripted to fail or to hold a call until released.

#![allow(dead_code)]

use async_trait::async_trait;
use convo_widgets::*;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;

pub const W1_C1: &str = "/v2/location/W1/conversations/C1";
pub const W1_C2: &str = "/v2/location/W1/conversations/C2";
pub const W1_CONTACTS: &str = "/v2/location/W1/contacts";
pub const W2_C9: &str = "/v2/location/W2/conversations/C9";

/// Gateway operations, for scripting failures and holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Resolve,
    GetFields,
    Update,
    GetTags,
    AddTag,
    RemoveTag,
}

/// A recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Resolve(String),
    GetFields(String),
    Update(String, Vec<CustomField>),
    GetTags(String),
    AddTag(String, String),
    RemoveTag(String, String),
}

#[derive(Default)]
pub struct FakeGateway {
    contacts: RefCell<HashMap<String, String>>,
    fields: RefCell<HashMap<String, Vec<CustomField>>>,
    tags: RefCell<HashMap<String, BTreeSet<String>>>,
    calls: RefCell<Vec<Call>>,
    failures: RefCell<HashMap<Op, VecDeque<WidgetError>>>,
    holds: RefCell<HashMap<Op, Rc<Notify>>>,
}

impl FakeGateway {
    /// Conversations C1 and C2 mapped to contacts K1 and K2.
    pub fn new() -> Self {
        let gateway = Self::default();
        gateway.map_contact("C1", "K1");
        gateway.map_contact("C2", "K2");
        gateway
    }

    pub fn map_contact(&self, conversation_id: &str, contact_id: &str) {
        self.contacts
            .borrow_mut()
            .insert(conversation_id.to_string(), contact_id.to_string());
    }

    pub fn set_fields(&self, contact_id: &str, fields: Vec<CustomField>) {
        self.fields.borrow_mut().insert(contact_id.to_string(), fields);
    }

    pub fn fields(&self, contact_id: &str) -> Vec<CustomField> {
        self.fields.borrow().get(contact_id).cloned().unwrap_or_default()
    }

    pub fn set_tags(&self, contact_id: &str, tags: &[&str]) {
        self.tags.borrow_mut().insert(
            contact_id.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn tags(&self, contact_id: &str) -> BTreeSet<String> {
        self.tags.borrow().get(contact_id).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call_op(call) == op)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: Op, err: WidgetError) {
        self.failures.borrow_mut().entry(op).or_default().push_back(err);
    }

    /// Hold every call of `op` until the returned handle is notified (once
    /// per held call).
    pub fn hold(&self, op: Op) -> Rc<Notify> {
        let notify = Rc::new(Notify::new());
        self.holds.borrow_mut().insert(op, notify.clone());
        notify
    }

    pub fn release(&self, op: Op) {
        if let Some(notify) = self.holds.borrow_mut().remove(&op) {
            notify.notify_one();
        }
    }

    async fn enter(&self, call: Call) -> Result<(), WidgetError> {
        let op = call_op(&call);
        self.calls.borrow_mut().push(call);
        let hold = self.holds.borrow().get(&op).cloned();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        match self.failures.borrow_mut().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn call_op(call: &Call) -> Op {
    match call {
        Call::Resolve(_) => Op::Resolve,
        Call::GetFields(_) => Op::GetFields,
        Call::Update(..) => Op::Update,
        Call::GetTags(_) => Op::GetTags,
        Call::AddTag(..) => Op::AddTag,
        Call::RemoveTag(..) => Op::RemoveTag,
    }
}

#[async_trait(?Send)]
impl ContactGateway for FakeGateway {
    async fn resolve_contact_id(&self, conversation_id: &str) -> Result<String, WidgetError> {
        self.enter(Call::Resolve(conversation_id.to_string())).await?;
        self.contacts
            .borrow()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| WidgetError::NotFound {
                conversation_id: conversation_id.to_string(),
            })
    }

    async fn get_custom_fields(&self, contact_id: &str) -> Result<Vec<CustomField>, WidgetError> {
        self.enter(Call::GetFields(contact_id.to_string())).await?;
        Ok(self.fields(contact_id))
    }

    async fn update_custom_fields(
        &self,
        contact_id: &str,
        fields: &[CustomField],
    ) -> Result<(), WidgetError> {
        self.enter(Call::Update(contact_id.to_string(), fields.to_vec()))
            .await?;
        let mut stored = self.fields.borrow_mut();
        let current = stored.entry(contact_id.to_string()).or_default();
        for field in fields {
            match current.iter_mut().find(|f| f.id == field.id) {
                Some(existing) => existing.value = field.value.clone(),
                None => current.push(field.clone()),
            }
        }
        Ok(())
    }

    async fn get_tags(&self, contact_id: &str) -> Result<BTreeSet<String>, WidgetError> {
        self.enter(Call::GetTags(contact_id.to_string())).await?;
        Ok(self.tags(contact_id))
    }

    async fn add_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        self.enter(Call::AddTag(contact_id.to_string(), tag.to_string()))
            .await?;
        self.tags
            .borrow_mut()
            .entry(contact_id.to_string())
            .or_default()
            .insert(tag.to_string());
        Ok(())
    }

    async fn remove_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        self.enter(Call::RemoveTag(contact_id.to_string(), tag.to_string()))
            .await?;
        if let Some(tags) = self.tags.borrow_mut().get_mut(contact_id) {
            tags.retain(|t| !t.eq_ignore_ascii_case(tag));
        }
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Workspace W1 maps the snooze field and the vehicle fields.
pub fn test_config() -> ScriptConfig {
    ScriptConfig::new().workspace(
        WidgetConfig::new("W1")
            .field("snooze", "F_SNOOZE")
            .field("year", "F_YEAR")
            .field("make", "F_MAKE")
            .field("model", "F_MODEL")
            .field("mileage", "F_MILEAGE"),
    )
}

pub fn test_credentials() -> Credentials {
    Credentials::new("token", TenantHeader::TokenId, "token-id")
}

pub struct Harness {
    pub page: Rc<MemoryPage>,
    pub gateway: Rc<FakeGateway>,
    pub credentials: Rc<StaticCredentials>,
    pub controller: WidgetController,
}

impl Harness {
    pub fn new(path: &str) -> Self {
        Self::with_config(path, test_config())
    }

    pub fn with_config(path: &str, config: ScriptConfig) -> Self {
        let page = Rc::new(MemoryPage::new(path));
        let gateway = Rc::new(FakeGateway::new());
        let credentials = Rc::new(StaticCredentials::new(Some(test_credentials())));
        let cx = WidgetContext::new(
            page.clone(),
            gateway.clone(),
            credentials.clone(),
            Rc::new(config),
        );
        let controller = WidgetController::with_default_widgets(cx);
        Self {
            page,
            gateway,
            credentials,
            controller,
        }
    }

    /// Change the path and re-evaluate, as a navigation signal would.
    pub fn navigate(&self, path: &str) -> Vec<EvaluateOutcome> {
        self.page.set_pathname(path);
        self.controller.evaluate()
    }

    pub fn node(&self, id: &str) -> NodeRef {
        self.page
            .element_by_id(id)
            .unwrap_or_else(|| panic!("#{id} is not attached"))
    }

    pub fn click(&self, id: &str) -> bool {
        self.page.click_id(id)
    }

    pub fn set_value(&self, id: &str, value: &str) {
        self.page.set_value(self.node(id), value);
    }

    pub fn value(&self, id: &str) -> String {
        self.page.value(self.node(id)).unwrap_or_default()
    }

    pub fn text(&self, id: &str) -> String {
        self.page.text(self.node(id)).unwrap_or_default()
    }
}

/// Let spawned tasks run. Time is paused in tests, so this is instant.
pub async fn settle() {
    convo_widgets::runtime::sleep(Duration::from_millis(10)).await;
}

pub async fn sleep(duration: Duration) {
    convo_widgets::runtime::sleep(duration).await;
}

/// Run `f` inside a `LocalSet` so local tasks can be spawned.
pub async fn run_local<F: Future<Output = ()>>(f: F) {
    tokio::task::LocalSet::new().run_until(f).await;
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
