//! Multi-field contact editor.
//!
//! Opens a form generated from
//! [`ScriptConfig::editor_fields`](crate::config::ScriptConfig::editor_fields),
//! limited to the fields the workspace maps. Only non-empty inputs are sent;
//! numeric inputs are sent as numbers. The form can be minimised to a one
//! line summary of [`ScriptConfig::summary_fields`](crate::config::ScriptConfig::summary_fields)
//! and restored without losing what was typed.

use super::toolbar_button;
use crate::config::{FieldDefinition, InputKind, ScriptConfig, WidgetConfig};
use crate::error::WidgetError;
use crate::gateway::{find_field, CustomField, FieldValue};
use crate::guards::{guard_fn, Guards, MountDecision};
use crate::page::{ElementBlueprint, HostPage, NodeRef};
use crate::widget::{Widget, WidgetAction, WidgetContext, WidgetDom, WidgetInstance, WidgetKind};
use crate::{debug_log, info_log};
use async_trait::async_trait;

pub(crate) const BUTTON_ID: &str = "details-btn";
pub(crate) const MODAL_ID: &str = "custom-modal";
pub(crate) const FORM_ID: &str = "custom-update-form";
pub(crate) const STATUS_ID: &str = "custom-modal-status";
pub(crate) const SUMMARY_ID: &str = "custom-modal-summary";
pub(crate) const MINIMIZE_ID: &str = "custom-modal-minimize";
pub(crate) const CLOSE_ID: &str = "custom-modal-close";
pub(crate) const CANCEL_ID: &str = "custom-modal-cancel";
pub(crate) const SUBMIT_ID: &str = "custom-modal-submit";

const INPUT_CLASS: &str = "border border-gray-300 rounded w-full p-2 text-sm mt-1";

/// Element id of the input for a logical field.
pub fn input_id(field: &str) -> String {
    format!("custom-field-{field}")
}

/// Edits the mapped custom fields of the contact.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactEditorWidget;

/// Editor fields the workspace maps, in configured order.
fn mapped_fields<'a>(
    config: &'a ScriptConfig,
    workspace: &'a WidgetConfig,
) -> impl Iterator<Item = (&'a FieldDefinition, &'a str)> + 'a {
    config
        .editor_fields
        .iter()
        .filter_map(move |def| workspace.field_id(&def.name).map(|id| (def, id)))
}

fn parse_input(def: &FieldDefinition, raw: &str) -> Result<FieldValue, WidgetError> {
    match def.input {
        InputKind::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FieldValue::Number)
            .ok_or_else(|| WidgetError::validation(format!("{} must be a number", def.label))),
        _ => Ok(FieldValue::Text(raw.to_string())),
    }
}

/// `Year: 2019 · Make: Ford · Model: N/A`
fn summary_line(config: &ScriptConfig, workspace: &WidgetConfig, fields: &[CustomField]) -> String {
    config
        .summary_fields
        .iter()
        .map(|name| {
            let label = config
                .editor_fields
                .iter()
                .find(|def| &def.name == name)
                .map_or(name.as_str(), |def| def.label.as_str());
            let value = workspace
                .field_id(name)
                .and_then(|id| find_field(fields, id))
                .map(FieldValue::as_input_text)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "N/A".to_string());
            format!("{label}: {value}")
        })
        .collect::<Vec<_>>()
        .join(" · ")
}

/// Show either the form or the summary.
fn set_minimized(page: &dyn HostPage, instance: &WidgetInstance, minimized: bool) {
    if let Some(form) = instance.node(FORM_ID) {
        page.set_hidden(form, minimized);
    }
    if let Some(summary) = instance.node(SUMMARY_ID) {
        page.set_hidden(summary, !minimized);
    }
    if let Some(submit) = instance.node(SUBMIT_ID) {
        page.set_hidden(submit, minimized);
    }
    instance.session_mut().minimized = minimized;
}

fn close(page: &dyn HostPage, instance: &WidgetInstance) {
    if let Some(modal) = instance.node(MODAL_ID) {
        page.set_hidden(modal, true);
    }
    set_minimized(page, instance, false);
}

impl ContactEditorWidget {
    async fn open(&self, cx: &WidgetContext, instance: &WidgetInstance) -> Result<(), WidgetError> {
        let page = cx.page.as_ref();
        let (Some(modal), Some(form), Some(status), Some(submit)) = (
            instance.node(MODAL_ID),
            instance.node(FORM_ID),
            instance.node(STATUS_ID),
            instance.node(SUBMIT_ID),
        ) else {
            return Err(WidgetError::Detached);
        };

        set_minimized(page, instance, false);
        page.set_text(status, "Loading…");
        page.set_hidden(status, false);
        page.set_hidden(form, true);
        page.set_disabled(submit, true);
        page.set_hidden(modal, false);

        let contact_id = cx.resolve_contact(instance).await?;
        let fields = cx.gateway.get_custom_fields(&contact_id).await?;
        instance.ensure_mounted()?;

        for (def, field_id) in mapped_fields(&cx.config, instance.workspace()) {
            if let Some(input) = instance.node(&input_id(&def.name)) {
                let value = find_field(&fields, field_id)
                    .map(FieldValue::as_input_text)
                    .unwrap_or_default();
                page.set_value(input, &value);
            }
        }
        debug_log!(
            "editor loaded {} field(s) for contact {}",
            fields.len(),
            contact_id
        );
        instance.session_mut().fields = fields;

        page.set_hidden(status, true);
        page.set_hidden(form, false);
        page.set_disabled(submit, false);
        Ok(())
    }

    async fn submit(&self, cx: &WidgetContext, instance: &WidgetInstance) -> Result<(), WidgetError> {
        let page = cx.page.as_ref();
        let mut updates = Vec::new();
        for (def, field_id) in mapped_fields(&cx.config, instance.workspace()) {
            let raw = instance
                .node(&input_id(&def.name))
                .and_then(|input| page.value(input))
                .unwrap_or_default();
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            updates.push(CustomField::new(field_id, parse_input(def, raw)?));
        }
        if updates.is_empty() {
            return Err(WidgetError::validation("No changes to save"));
        }
        let contact_id = instance
            .contact_id()
            .ok_or_else(|| WidgetError::validation("No contact loaded, reopen the editor"))?;

        cx.gateway.update_custom_fields(&contact_id, &updates).await?;
        instance.ensure_mounted()?;

        instance.session_mut().merge_fields(&updates);
        info_log!("updated {} field(s) on contact {}", updates.len(), contact_id);
        page.alert("Contact updated");
        close(page, instance);
        Ok(())
    }

    fn toggle_minimized(&self, cx: &WidgetContext, instance: &WidgetInstance) {
        let minimized = !instance.session().minimized;
        if minimized {
            if let Some(summary) = instance.node(SUMMARY_ID) {
                let line = summary_line(&cx.config, instance.workspace(), &instance.session().fields);
                cx.page.set_text(summary, &line);
            }
        }
        set_minimized(cx.page.as_ref(), instance, minimized);
    }
}

fn render_input(page: &dyn HostPage, def: &FieldDefinition) -> NodeRef {
    let id = input_id(&def.name);
    match def.input.html_type() {
        Some(kind) => page.create_element(
            &ElementBlueprint::new("input")
                .id(id)
                .attr("type", kind)
                .attr("name", def.name.as_str())
                .class(INPUT_CLASS),
        ),
        None => {
            let select = page.create_element(
                &ElementBlueprint::new("select")
                    .id(id)
                    .attr("name", def.name.as_str())
                    .class(INPUT_CLASS),
            );
            let blank = page.create_element(&ElementBlueprint::new("option").attr("value", ""));
            page.append_child(select, blank);
            for option in &def.options {
                let node = page.create_element(
                    &ElementBlueprint::new("option")
                        .attr("value", option.as_str())
                        .text(option.as_str()),
                );
                page.append_child(select, node);
            }
            select
        }
    }
}

fn header_button(page: &dyn HostPage, id: &str, label: &str) -> NodeRef {
    page.create_element(
        &ElementBlueprint::new("button")
            .id(id)
            .attr("type", "button")
            .attr("title", label)
            .class("text-gray-500 hover:text-gray-700 p-1 rounded hover:bg-gray-100")
            .text(label),
    )
}

#[async_trait(?Send)]
impl Widget for ContactEditorWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::ContactEditor
    }

    fn dom_ids(&self) -> &'static [&'static str] {
        &[BUTTON_ID, MODAL_ID]
    }

    fn guards(&self, _config: &ScriptConfig) -> Guards {
        Guards::standard()
            .guard(guard_fn(|cx| {
                let any_mapped = cx
                    .workspace()
                    .is_some_and(|w| mapped_fields(cx.config, w).next().is_some());
                if any_mapped {
                    MountDecision::Allow
                } else {
                    MountDecision::deny("no editor field is mapped")
                }
            }))
            .build()
    }

    fn render(&self, page: &dyn HostPage, cx: &WidgetContext, workspace: &WidgetConfig) -> WidgetDom {
        let button = page.create_element(&toolbar_button(BUTTON_ID, "Vehicle Details", "Details"));
        let modal = page.create_element(
            &ElementBlueprint::new("div")
                .id(MODAL_ID)
                .class("fixed z-[999]")
                .hidden(true),
        );
        let container = page.create_element(
            &ElementBlueprint::new("div")
                .id("custom-modal-container")
                .class("bg-white rounded-lg shadow-xl w-full max-w-4xl flex flex-col relative"),
        );

        let header = page.create_element(
            &ElementBlueprint::new("div").class("flex items-center justify-between p-4"),
        );
        let title = page.create_element(
            &ElementBlueprint::new("h3")
                .class("text-lg font-semibold")
                .text("Vehicle Details"),
        );
        let minimize = header_button(page, MINIMIZE_ID, "Minimize");
        let close_button = header_button(page, CLOSE_ID, "Close");
        for child in [title, minimize, close_button] {
            page.append_child(header, child);
        }

        let status = page.create_element(
            &ElementBlueprint::new("p")
                .id(STATUS_ID)
                .class("text-center p-6")
                .text("Loading…"),
        );
        let summary = page.create_element(
            &ElementBlueprint::new("div")
                .id(SUMMARY_ID)
                .class("p-4 text-center font-semibold")
                .hidden(true),
        );
        let form = page.create_element(
            &ElementBlueprint::new("form")
                .id(FORM_ID)
                .class("grid grid-cols-2 gap-4 p-6")
                .hidden(true),
        );

        let mut dom = WidgetDom::new(button);
        for (def, _) in mapped_fields(&cx.config, workspace) {
            let row = page.create_element(&ElementBlueprint::new("div").class("space-y-1"));
            let label = page.create_element(
                &ElementBlueprint::new("label")
                    .class("text-sm text-gray-600")
                    .text(def.label.as_str()),
            );
            let input = render_input(page, def);
            page.append_child(row, label);
            page.append_child(row, input);
            page.append_child(form, row);
            dom = dom.node(input_id(&def.name), input);
        }

        let footer = page.create_element(
            &ElementBlueprint::new("div").class("p-4 flex justify-end gap-3 border-t"),
        );
        let cancel = page.create_element(
            &ElementBlueprint::new("button")
                .id(CANCEL_ID)
                .attr("type", "button")
                .class("hover:bg-gray-100 text-gray-700 py-2 px-6 rounded")
                .text("Cancel"),
        );
        let submit = page.create_element(
            &ElementBlueprint::new("button")
                .id(SUBMIT_ID)
                .attr("type", "button")
                .class("bg-blue-600 text-white py-2 px-6 rounded disabled:opacity-50")
                .text("Update"),
        );
        page.set_disabled(submit, true);
        page.append_child(footer, cancel);
        page.append_child(footer, submit);

        for child in [header, status, summary, form, footer] {
            page.append_child(container, child);
        }
        page.append_child(modal, container);

        dom.panel(modal)
            .node(MODAL_ID, modal)
            .node(FORM_ID, form)
            .node(STATUS_ID, status)
            .node(SUMMARY_ID, summary)
            .node(SUBMIT_ID, submit)
            .on_click(button, WidgetAction::Open)
            .on_click(minimize, WidgetAction::Minimize)
            .on_click(close_button, WidgetAction::Close)
            .on_click(cancel, WidgetAction::Close)
            .on_click(submit, WidgetAction::Submit)
    }

    async fn handle(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
        action: WidgetAction,
    ) -> Result<(), WidgetError> {
        match action {
            WidgetAction::Open => self.open(cx, instance).await,
            WidgetAction::Submit => self.submit(cx, instance).await,
            WidgetAction::Minimize => {
                self.toggle_minimized(cx, instance);
                Ok(())
            }
            WidgetAction::Close => {
                close(cx.page.as_ref(), instance);
                Ok(())
            }
            WidgetAction::Toggle => Ok(()),
        }
    }

    fn rollback(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
        action: WidgetAction,
        _error: &WidgetError,
    ) {
        if action == WidgetAction::Open && instance.is_mounted() {
            close(cx.page.as_ref(), instance);
        }
    }

    fn describe(&self, action: WidgetAction) -> &'static str {
        match action {
            WidgetAction::Open => "load contact details",
            WidgetAction::Submit => "update contact",
            _ => "update the editor",
        }
    }
}
