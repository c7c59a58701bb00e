//! Snooze date setter.
//!
//! A toolbar button opens a small dialog with a date input pre-filled from
//! the contact's snooze field. Submitting writes the date back.

use super::toolbar_button;
use crate::config::{ScriptConfig, WidgetConfig};
use crate::error::WidgetError;
use crate::gateway::{find_field, CustomField};
use crate::guards::{FieldMappedGuard, Guards};
use crate::page::{ElementBlueprint, HostPage};
use crate::widget::{Widget, WidgetAction, WidgetContext, WidgetDom, WidgetInstance, WidgetKind};
use crate::{debug_log, info_log};
use async_trait::async_trait;

pub(crate) const BUTTON_ID: &str = "snooze-btn";
pub(crate) const MODAL_ID: &str = "snooze-modal";
pub(crate) const INPUT_ID: &str = "snooze-time";
pub(crate) const SUBMIT_ID: &str = "submit-snooze";
pub(crate) const CLOSE_ID: &str = "cancel-snooze";

/// Sets the contact's snooze date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnoozeWidget;

impl SnoozeWidget {
    fn field_id(cx: &WidgetContext, instance: &WidgetInstance) -> Result<String, WidgetError> {
        instance
            .workspace()
            .field_id(&cx.config.snooze_field)
            .map(str::to_string)
            .ok_or_else(|| {
                WidgetError::validation(format!(
                    "Field `{}` is not configured for this location",
                    cx.config.snooze_field
                ))
            })
    }

    async fn open(&self, cx: &WidgetContext, instance: &WidgetInstance) -> Result<(), WidgetError> {
        let field_id = Self::field_id(cx, instance)?;
        let epoch = instance.session().dialog_epoch;
        let contact_id = cx.resolve_contact(instance).await?;
        let fields = cx.gateway.get_custom_fields(&contact_id).await?;
        instance.ensure_mounted()?;
        if instance.session().dialog_epoch != epoch {
            debug_log!("snooze dialog closed while loading, staying hidden");
            return Ok(());
        }

        let value = find_field(&fields, &field_id)
            .map(|v| v.as_input_text())
            .unwrap_or_default();
        instance.session_mut().fields = fields;
        debug_log!("snooze dialog opened for contact {}", contact_id);

        if let (Some(input), Some(modal)) = (instance.node(INPUT_ID), instance.node(MODAL_ID)) {
            cx.page.set_value(input, &value);
            cx.page.set_hidden(modal, false);
            cx.page.focus(input);
        }
        Ok(())
    }

    async fn submit(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
    ) -> Result<(), WidgetError> {
        let date = instance
            .node(INPUT_ID)
            .and_then(|input| cx.page.value(input))
            .unwrap_or_default();
        let date = date.trim();
        if date.is_empty() {
            return Err(WidgetError::validation("Please select a date"));
        }
        let contact_id = instance
            .contact_id()
            .ok_or_else(|| WidgetError::validation("No contact loaded, reopen the dialog"))?;
        let field_id = Self::field_id(cx, instance)?;

        let update = [CustomField::new(field_id, date)];
        cx.gateway.update_custom_fields(&contact_id, &update).await?;
        instance.ensure_mounted()?;

        instance.session_mut().merge_fields(&update);
        info_log!("snooze set to {} for contact {}", date, contact_id);
        cx.page.alert("Snooze set!");
        close(cx.page.as_ref(), instance);
        Ok(())
    }
}

fn close(page: &dyn HostPage, instance: &WidgetInstance) {
    if let Some(modal) = instance.node(MODAL_ID) {
        page.set_hidden(modal, true);
    }
}

#[async_trait(?Send)]
impl Widget for SnoozeWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Snooze
    }

    fn dom_ids(&self) -> &'static [&'static str] {
        &[BUTTON_ID, MODAL_ID]
    }

    fn guards(&self, config: &ScriptConfig) -> Guards {
        Guards::standard()
            .guard(FieldMappedGuard::new(config.snooze_field.clone()))
            .build()
    }

    fn render(&self, page: &dyn HostPage, _cx: &WidgetContext, _workspace: &WidgetConfig) -> WidgetDom {
        let button = page.create_element(&toolbar_button(BUTTON_ID, "Snooze", "Snooze"));
        let modal = page.create_element(
            &ElementBlueprint::new("div")
                .id(MODAL_ID)
                .class("fixed inset-0 z-[9999] flex items-center justify-center")
                .hidden(true),
        );
        let content = page.create_element(
            &ElementBlueprint::new("div").class("modal-content bg-white rounded-lg shadow-xl w-80 p-6"),
        );
        let title = page.create_element(
            &ElementBlueprint::new("h3")
                .class("text-lg font-medium text-gray-900 mb-4")
                .text("Snooze For"),
        );
        let input = page.create_element(
            &ElementBlueprint::new("input")
                .id(INPUT_ID)
                .attr("type", "date")
                .class("w-full px-3 py-2 border border-gray-300 rounded-md mb-4"),
        );
        let actions = page.create_element(&ElementBlueprint::new("div").class("flex justify-end space-x-3"));
        let close_button = page.create_element(
            &ElementBlueprint::new("button")
                .id(CLOSE_ID)
                .class("px-4 py-2 text-gray-700 hover:bg-gray-100 rounded-md")
                .text("Close"),
        );
        let submit = page.create_element(
            &ElementBlueprint::new("button")
                .id(SUBMIT_ID)
                .class("px-4 py-2 bg-blue-600 text-white hover:bg-blue-700 rounded-md")
                .text("Submit"),
        );

        page.append_child(actions, close_button);
        page.append_child(actions, submit);
        for child in [title, input, actions] {
            page.append_child(content, child);
        }
        page.append_child(modal, content);

        WidgetDom::new(button)
            .panel(modal)
            .node(MODAL_ID, modal)
            .node(INPUT_ID, input)
            .node(SUBMIT_ID, submit)
            .on_click(button, WidgetAction::Open)
            .on_click(close_button, WidgetAction::Close)
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
            WidgetAction::Close => {
                instance.session_mut().dialog_epoch += 1;
                close(cx.page.as_ref(), instance);
                Ok(())
            }
            WidgetAction::Toggle | WidgetAction::Minimize => Ok(()),
        }
    }

    fn rollback(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
        action: WidgetAction,
        _error: &WidgetError,
    ) {
        // A failed open must not leave the dialog half-open; a failed submit
        // keeps it open with the typed date.
        if action == WidgetAction::Open {
            close(cx.page.as_ref(), instance);
        }
    }

    fn describe(&self, action: WidgetAction) -> &'static str {
        match action {
            WidgetAction::Open => "open snooze",
            WidgetAction::Submit => "save snooze",
            _ => "update snooze",
        }
    }
}
