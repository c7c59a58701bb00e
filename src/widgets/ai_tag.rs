//! AI tag toggle.
//!
//! A single toolbar button shows whether the contact carries the configured
//! tag and toggles it. The button flips as soon as it is clicked; the tag
//! state last confirmed by the backend is kept separately in
//! [`Session::confirmed_tag`](crate::widget::Session::confirmed_tag) so a
//! failed call rolls back to exactly that state.
//!
//! A refresh timer re-reads the tag so changes made elsewhere show up. A tick
//! that overlaps a pending toggle is skipped, and a read that was started
//! before a toggle is discarded.

use super::toolbar_button;
use crate::config::{ScriptConfig, WidgetConfig};
use crate::error::WidgetError;
use crate::gateway::has_tag;
use crate::guards::{CredentialsGuard, Guards};
use crate::page::HostPage;
use crate::widget::{Widget, WidgetAction, WidgetContext, WidgetDom, WidgetInstance, WidgetKind};
use crate::{debug_log, trace_log, warn_log};
use async_trait::async_trait;
use std::time::Duration;

pub(crate) const BUTTON_ID: &str = "ai-tag-btn";

const ADD_LABEL: &str = "Add AI tag";
const REMOVE_LABEL: &str = "Remove AI tag";

/// Adds or removes the configured tag on the contact.
#[derive(Debug, Clone, Copy, Default)]
pub struct AiTagWidget;

fn show(cx: &WidgetContext, instance: &WidgetInstance, has_tag: bool) {
    let button = instance.dom().button;
    cx.page
        .set_text(button, if has_tag { REMOVE_LABEL } else { ADD_LABEL });
    cx.page
        .set_attribute(button, "data-has-tag", if has_tag { "true" } else { "false" });
}

impl AiTagWidget {
    /// Read the tag from the backend and show it, unless a toggle started
    /// in the meantime.
    async fn sync(&self, cx: &WidgetContext, instance: &WidgetInstance) -> Result<(), WidgetError> {
        if instance.is_pending(WidgetAction::Toggle) {
            trace_log!("tag refresh skipped, toggle in flight");
            return Ok(());
        }
        let revision = instance.session().tag_revision;
        let contact_id = match instance.contact_id() {
            Some(id) => id,
            None => cx.resolve_contact(instance).await?,
        };
        let tags = cx.gateway.get_tags(&contact_id).await?;
        instance.ensure_mounted()?;
        if instance.is_pending(WidgetAction::Toggle) || instance.session().tag_revision != revision {
            debug_log!("discarding tag refresh that raced a toggle");
            return Ok(());
        }

        let present = has_tag(&tags, &cx.config.tag);
        {
            let mut session = instance.session_mut();
            session.confirmed_tag = present;
            session.displayed_tag = present;
        }
        show(cx, instance, present);
        Ok(())
    }
}

#[async_trait(?Send)]
impl Widget for AiTagWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::AiTag
    }

    fn dom_ids(&self) -> &'static [&'static str] {
        &[BUTTON_ID]
    }

    fn guards(&self, _config: &ScriptConfig) -> Guards {
        // The tag state is read right after mounting.
        Guards::standard().guard(CredentialsGuard).build()
    }

    fn render(&self, page: &dyn HostPage, _cx: &WidgetContext, _workspace: &WidgetConfig) -> WidgetDom {
        let button = page.create_element(
            &toolbar_button(BUTTON_ID, "Toggle AI Tag", ADD_LABEL).attr("data-has-tag", "false"),
        );
        WidgetDom::new(button).on_click(button, WidgetAction::Toggle)
    }

    fn refresh_interval(&self, config: &ScriptConfig) -> Option<Duration> {
        Some(config.tag_refresh_interval).filter(|d| !d.is_zero())
    }

    async fn on_mounted(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
    ) -> Result<(), WidgetError> {
        self.sync(cx, instance).await
    }

    async fn refresh(&self, cx: &WidgetContext, instance: &WidgetInstance) -> Result<(), WidgetError> {
        self.sync(cx, instance).await
    }

    fn prepare(&self, cx: &WidgetContext, instance: &WidgetInstance, action: WidgetAction) {
        if action != WidgetAction::Toggle {
            return;
        }
        let target = {
            let mut session = instance.session_mut();
            session.displayed_tag = !session.displayed_tag;
            session.tag_revision += 1;
            session.displayed_tag
        };
        show(cx, instance, target);
    }

    async fn handle(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
        action: WidgetAction,
    ) -> Result<(), WidgetError> {
        if action != WidgetAction::Toggle {
            return Ok(());
        }
        let target = instance.session().displayed_tag;
        let contact_id = match instance.contact_id() {
            Some(id) => id,
            None => cx.resolve_contact(instance).await?,
        };

        if target {
            cx.gateway.add_tag(&contact_id, &cx.config.tag).await?;
        } else {
            cx.gateway.remove_tag(&contact_id, &cx.config.tag).await?;
        }
        instance.ensure_mounted()?;
        instance.session_mut().confirmed_tag = target;

        // Confirm against the backend rather than trusting the optimistic
        // state. The write already succeeded, so a failed read keeps it.
        let present = match cx.gateway.get_tags(&contact_id).await {
            Ok(tags) => has_tag(&tags, &cx.config.tag),
            Err(err) if !err.is_silent() => {
                warn_log!("could not confirm tag `{}`: {}", cx.config.tag, err);
                target
            }
            Err(err) => return Err(err),
        };
        instance.ensure_mounted()?;
        {
            let mut session = instance.session_mut();
            session.confirmed_tag = present;
            session.displayed_tag = present;
        }
        show(cx, instance, present);
        debug_log!(
            "tag `{}` {} on contact {}",
            cx.config.tag,
            if present { "present" } else { "absent" },
            contact_id
        );
        Ok(())
    }

    fn rollback(
        &self,
        cx: &WidgetContext,
        instance: &WidgetInstance,
        action: WidgetAction,
        _error: &WidgetError,
    ) {
        if action != WidgetAction::Toggle || !instance.is_mounted() {
            return;
        }
        let confirmed = {
            let mut session = instance.session_mut();
            session.displayed_tag = session.confirmed_tag;
            session.confirmed_tag
        };
        show(cx, instance, confirmed);
    }

    fn describe(&self, _action: WidgetAction) -> &'static str {
        "toggle AI tag"
    }
}
