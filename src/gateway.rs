//! Contact records behind a conversation.
//!
//! [`ContactGateway`] is the only way widgets talk to the host application's
//! backend. [`HttpContactGateway`] implements it over `reqwest`:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`resolve_contact_id`](ContactGateway::resolve_contact_id) | `GET {api_base}/conversations/{id}` → `{ contactId }` |
//! | [`get_custom_fields`](ContactGateway::get_custom_fields) | `GET {api_base}/contacts/{id}` → `{ contact: { customFields } }` |
//! | [`update_custom_fields`](ContactGateway::update_custom_fields) | `PUT {api_base}/contacts/{id}` |
//! | [`get_tags`](ContactGateway::get_tags) | `GET {api_base}/contacts/{id}` → `{ contact: { tags } }` |
//! | [`add_tag`](ContactGateway::add_tag) / [`remove_tag`](ContactGateway::remove_tag) | `POST` / `DELETE {api_base}/contacts/{id}/tags` |
//!
//! Every call asks the [`CredentialSource`] first and fails with
//! [`WidgetError::CredentialsUnavailable`] before any I/O when it has
//! nothing to offer.

use crate::credentials::{CredentialSource, Credentials};
use crate::error::WidgetError;
use crate::{debug_log, trace_log};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use url::Url;

/// `Version` header expected by the host API.
pub const API_VERSION: &str = "2021-07-28";

// ============================================================================
// Field values
// ============================================================================

/// Value of a contact custom field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    /// Convert a value as returned by the API. Arrays and objects are not
    /// representable and yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::Bool(b) => Some(Self::Text(b.to_string())),
            _ => None,
        }
    }

    /// Text suitable for pre-filling an input element.
    pub fn as_input_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_input_text())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One custom field of a contact, keyed by field id.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomField {
    pub id: String,
    pub value: FieldValue,
}

impl CustomField {
    pub fn new(id: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Look up a field by id.
pub fn find_field<'a>(fields: &'a [CustomField], id: &str) -> Option<&'a FieldValue> {
    fields.iter().find(|f| f.id == id).map(|f| &f.value)
}

/// Case-insensitive tag membership.
pub fn has_tag(tags: &BTreeSet<String>, tag: &str) -> bool {
    tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

// ============================================================================
// ContactGateway
// ============================================================================

/// Backend operations the widgets need.
#[async_trait(?Send)]
pub trait ContactGateway {
    /// Contact mapped to a conversation. Missing mappings and failed lookups
    /// are both reported as [`WidgetError::NotFound`].
    async fn resolve_contact_id(&self, conversation_id: &str) -> Result<String, WidgetError>;

    async fn get_custom_fields(&self, contact_id: &str) -> Result<Vec<CustomField>, WidgetError>;

    async fn update_custom_fields(
        &self,
        contact_id: &str,
        fields: &[CustomField],
    ) -> Result<(), WidgetError>;

    async fn get_tags(&self, contact_id: &str) -> Result<BTreeSet<String>, WidgetError>;

    async fn add_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError>;

    async fn remove_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError>;
}

#[async_trait(?Send)]
impl<G: ContactGateway + ?Sized> ContactGateway for Rc<G> {
    async fn resolve_contact_id(&self, conversation_id: &str) -> Result<String, WidgetError> {
        (**self).resolve_contact_id(conversation_id).await
    }

    async fn get_custom_fields(&self, contact_id: &str) -> Result<Vec<CustomField>, WidgetError> {
        (**self).get_custom_fields(contact_id).await
    }

    async fn update_custom_fields(
        &self,
        contact_id: &str,
        fields: &[CustomField],
    ) -> Result<(), WidgetError> {
        (**self).update_custom_fields(contact_id, fields).await
    }

    async fn get_tags(&self, contact_id: &str) -> Result<BTreeSet<String>, WidgetError> {
        (**self).get_tags(contact_id).await
    }

    async fn add_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        (**self).add_tag(contact_id, tag).await
    }

    async fn remove_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        (**self).remove_tag(contact_id, tag).await
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationResponse {
    #[serde(default)]
    contact_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactResponse {
    contact: ContactRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactRecord {
    #[serde(default)]
    custom_fields: Vec<RemoteField>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteField {
    id: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateContactRequest<'a> {
    custom_fields: Vec<FieldUpdate<'a>>,
    dirty: bool,
    skip_trigger: bool,
}

#[derive(Debug, Serialize)]
struct FieldUpdate<'a> {
    id: &'a str,
    field_value: &'a FieldValue,
}

#[derive(Debug, Serialize)]
struct TagsRequest<'a> {
    tags: [&'a str; 1],
}

impl ContactRecord {
    fn into_fields(self) -> Vec<CustomField> {
        self.custom_fields
            .into_iter()
            .filter_map(|field| {
                FieldValue::from_json(&field.value).map(|value| CustomField {
                    id: field.id,
                    value,
                })
            })
            .collect()
    }
}

/// Request body for `PUT /contacts/{id}`.
pub fn update_body(fields: &[CustomField]) -> Value {
    let request = UpdateContactRequest {
        custom_fields: fields
            .iter()
            .map(|f| FieldUpdate {
                id: &f.id,
                field_value: &f.value,
            })
            .collect(),
        dirty: true,
        skip_trigger: false,
    };
    serde_json::to_value(request).unwrap_or(Value::Null)
}

/// Headers sent with every request.
pub fn request_headers(credentials: &Credentials) -> Vec<(&'static str, String)> {
    vec![
        ("Authorization", credentials.bearer()),
        (
            credentials.tenant_header.header_name(),
            credentials.tenant_value.clone(),
        ),
        ("Channel", "APP".to_string()),
        ("Source", "WEB_USER".to_string()),
        ("Version", API_VERSION.to_string()),
        ("Content-Type", "application/json".to_string()),
    ]
}

// ============================================================================
// HttpContactGateway
// ============================================================================

/// [`ContactGateway`] over the host application's REST API.
pub struct HttpContactGateway {
    http: reqwest::Client,
    api_base: Url,
    credentials: Rc<dyn CredentialSource>,
}

impl HttpContactGateway {
    pub fn new(api_base: Url, credentials: Rc<dyn CredentialSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base,
            credentials,
        }
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// `{api_base}/{segments...}`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, WidgetError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| WidgetError::Transport {
                message: format!("`{}` cannot be used as a base url", self.api_base),
            })?
            .pop_if_empty()
            .extend(segments.iter().map(|s| s.trim()));
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, WidgetError> {
        let credentials = self
            .credentials
            .credentials()
            .ok_or(WidgetError::CredentialsUnavailable)?;
        let url = self.endpoint(segments)?;
        trace_log!("{} {}", method, url);
        let mut request = self.http.request(method, url);
        for (name, value) in request_headers(&credentials) {
            request = request.header(name, value);
        }
        Ok(request)
    }

    async fn fetch_contact(&self, contact_id: &str) -> Result<ContactRecord, WidgetError> {
        let response = self
            .request(reqwest::Method::GET, &["contacts", contact_id])?
            .send()
            .await?;
        let body: ContactResponse = decode_json_response(response).await?;
        Ok(body.contact)
    }
}

#[async_trait(?Send)]
impl ContactGateway for HttpContactGateway {
    async fn resolve_contact_id(&self, conversation_id: &str) -> Result<String, WidgetError> {
        let not_found = || WidgetError::NotFound {
            conversation_id: conversation_id.to_string(),
        };
        let request = self.request(reqwest::Method::GET, &["conversations", conversation_id])?;
        let response = request.send().await.map_err(|err| {
            debug_log!("conversation lookup failed: {}", err);
            not_found()
        })?;
        let body: ConversationResponse = decode_json_response(response).await.map_err(|err| {
            debug_log!("conversation lookup failed: {}", err);
            not_found()
        })?;
        body.contact_id
            .filter(|id| !id.is_empty())
            .ok_or_else(not_found)
    }

    async fn get_custom_fields(&self, contact_id: &str) -> Result<Vec<CustomField>, WidgetError> {
        Ok(self.fetch_contact(contact_id).await?.into_fields())
    }

    async fn update_custom_fields(
        &self,
        contact_id: &str,
        fields: &[CustomField],
    ) -> Result<(), WidgetError> {
        let response = self
            .request(reqwest::Method::PUT, &["contacts", contact_id])?
            .json(&update_body(fields))
            .send()
            .await?;
        ensure_success(response).await
    }

    async fn get_tags(&self, contact_id: &str) -> Result<BTreeSet<String>, WidgetError> {
        Ok(self
            .fetch_contact(contact_id)
            .await?
            .tags
            .into_iter()
            .collect())
    }

    async fn add_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        let response = self
            .request(reqwest::Method::POST, &["contacts", contact_id, "tags"])?
            .json(&TagsRequest { tags: [tag] })
            .send()
            .await?;
        ensure_success(response).await
    }

    async fn remove_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        let response = self
            .request(reqwest::Method::DELETE, &["contacts", contact_id, "tags"])?
            .json(&TagsRequest { tags: [tag] })
            .send()
            .await?;
        ensure_success(response).await
    }
}

/// Map a non-success status and body to [`WidgetError::Remote`].
pub fn format_http_error(status: u16, body: &[u8]) -> WidgetError {
    let message = String::from_utf8_lossy(body).trim().to_string();
    WidgetError::Remote {
        status,
        message: if message.is_empty() {
            "<empty>".to_string()
        } else {
            message
        },
    }
}

async fn read_checked(response: reqwest::Response) -> Result<Vec<u8>, WidgetError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(format_http_error(status.as_u16(), &bytes));
    }
    Ok(bytes.to_vec())
}

async fn ensure_success(response: reqwest::Response) -> Result<(), WidgetError> {
    read_checked(response).await.map(|_| ())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, WidgetError>
where
    T: for<'de> Deserialize<'de>,
{
    let bytes = read_checked(response).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
