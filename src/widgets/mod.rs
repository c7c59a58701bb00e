//! The widget kinds shipped with the crate.
//!
//! | Widget | Toolbar button | Panel | Refresh timer |
//! |--------|----------------|-------|---------------|
//! | [`SnoozeWidget`] | `#snooze-btn` | `#snooze-modal` | none |
//! | [`AiTagWidget`] | `#ai-tag-btn` | none | every `tag_refresh_interval` |
//! | [`ContactEditorWidget`] | `#details-btn` | `#custom-modal` | none |

mod ai_tag;
mod contact_editor;
mod snooze;

pub use ai_tag::AiTagWidget;
pub use contact_editor::ContactEditorWidget;
pub use snooze::SnoozeWidget;

use crate::page::ElementBlueprint;
use crate::widget::Widget;

/// Classes matching the host toolbar's own buttons.
pub(crate) const TOOLBAR_BUTTON_CLASS: &str =
    "flex items-center px-2.5 py-1 border border-gray-300 border-l-0";

pub(crate) fn toolbar_button(id: &str, title: &str, label: &str) -> ElementBlueprint {
    ElementBlueprint::new("button")
        .id(id)
        .class(TOOLBAR_BUTTON_CLASS)
        .attr("type", "button")
        .attr("title", title)
        .text(label)
}

/// All three widgets, in toolbar order.
pub fn default_widgets() -> Vec<Box<dyn Widget>> {
    vec![
        Box::new(SnoozeWidget),
        Box::new(AiTagWidget),
        Box::new(ContactEditorWidget),
    ]
}
