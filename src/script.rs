//! Page bootstrap.
//!
//! [`ContentScript`] is what a host binding starts once per page load: it
//! creates the [`NavigationWatcher`], subscribes the [`WidgetController`]
//! to it, wraps the host's history primitives and runs the first
//! evaluation. From then on every navigation signal re-evaluates every
//! widget.

use crate::config::ScriptConfig;
use crate::controller::WidgetController;
use crate::error::EvaluateOutcome;
use crate::navigation::{HistoryApi, NavigationSignal, NavigationWatcher, SubscriptionId};
use crate::widget::WidgetContext;
use crate::{info_log, trace_log};
use std::rc::Rc;

/// The running script: watcher, controller and intercepted history.
pub struct ContentScript {
    controller: WidgetController,
    watcher: NavigationWatcher,
    history: Rc<dyn HistoryApi>,
    subscription: SubscriptionId,
}

impl ContentScript {
    /// Start with the default widgets and a watcher configured from
    /// [`ScriptConfig::navigation_debounce`](crate::config::ScriptConfig::navigation_debounce).
    pub fn start(cx: WidgetContext, history: Rc<dyn HistoryApi>) -> Self {
        let watcher = Self::watcher_for(&cx.config);
        Self::start_with(WidgetController::with_default_widgets(cx), watcher, history)
    }

    /// Watcher with the configured debounce window.
    pub fn watcher_for(config: &ScriptConfig) -> NavigationWatcher {
        match config.navigation_debounce {
            Some(window) => NavigationWatcher::with_debounce(window),
            None => NavigationWatcher::new(),
        }
    }

    /// Start with a prepared controller and watcher. History already
    /// registered with [`NavigationWatcher::adopt_history`] is used as is.
    pub fn start_with(
        controller: WidgetController,
        watcher: NavigationWatcher,
        history: Rc<dyn HistoryApi>,
    ) -> Self {
        let subscriber = controller.clone();
        let subscription = watcher.subscribe(move |signal| {
            trace_log!("re-evaluating after {:?}", signal);
            if signal != NavigationSignal::DomMutation {
                subscriber.rearm_retries();
            }
            subscriber.evaluate();
        });
        let history = watcher.intercept_history(history);

        let outcomes = controller.evaluate();
        info_log!(
            "content script started, {} widget(s), {} mounting",
            outcomes.len(),
            outcomes.iter().filter(|o| o.is_mount_started()).count()
        );

        Self {
            controller,
            watcher,
            history,
            subscription,
        }
    }

    pub fn controller(&self) -> &WidgetController {
        &self.controller
    }

    pub fn watcher(&self) -> &NavigationWatcher {
        &self.watcher
    }

    /// History primitives that report to the watcher. Host code navigating
    /// through these triggers a re-evaluation.
    pub fn history(&self) -> Rc<dyn HistoryApi> {
        self.history.clone()
    }

    /// Forward a navigation source observed by the host binding.
    pub fn notify(&self, signal: NavigationSignal) {
        self.watcher.notify(signal);
    }

    /// Re-evaluate immediately, bypassing the watcher.
    pub fn evaluate(&self) -> Vec<EvaluateOutcome> {
        self.controller.evaluate()
    }

    /// Stop reacting to navigation and remove every widget.
    pub fn shutdown(self) {
        self.watcher.unsubscribe(self.subscription);
        self.controller.teardown();
        info_log!("content script stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WidgetConfig;
    use crate::credentials::StaticCredentials;
    use crate::gateway::HttpContactGateway;
    use crate::memory::MemoryPage;
    use crate::runtime::sleep;
    use crate::widget::WidgetKind;
    use std::time::Duration;

    fn context(page: Rc<MemoryPage>, config: ScriptConfig) -> WidgetContext {
        let credentials = Rc::new(StaticCredentials::default());
        let api_base = config.api_base_url().expect("default api base");
        let gateway = HttpContactGateway::new(api_base, credentials.clone());
        WidgetContext::new(page, Rc::new(gateway), credentials, Rc::new(config))
    }

    fn config() -> ScriptConfig {
        ScriptConfig::new().workspace(WidgetConfig::new("W1").field("snooze", "F_SNOOZE"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_state_mounts_and_unmounts() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let page = Rc::new(MemoryPage::new("/v2/location/W1/contacts"));
                page.add_button_group();
                let script = ContentScript::start(context(page.clone(), config()), page.clone());
                assert!(script.watcher().is_history_intercepted());
                assert!(!script.controller().is_mounted(WidgetKind::Snooze));

                script
                    .history()
                    .push_state("/v2/location/W1/conversations/C1");
                sleep(Duration::from_millis(10)).await;
                assert!(script.controller().is_mounted(WidgetKind::Snooze));
                assert_eq!(page.count_by_id("snooze-btn"), 1);

                script.history().push_state("/v2/location/W1/contacts");
                assert!(!script.controller().is_mounted(WidgetKind::Snooze));
                assert_eq!(page.count_by_id("snooze-btn"), 0);
                assert_eq!(page.listener_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_signals_coalesce() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let page = Rc::new(MemoryPage::new("/v2/location/W1/contacts"));
                let config = config().navigation_debounce(Some(Duration::from_millis(50)));
                let script = ContentScript::start(context(page.clone(), config), page.clone());

                for _ in 0..10 {
                    script.notify(NavigationSignal::DomMutation);
                }
                sleep(Duration::from_millis(100)).await;
                assert_eq!(script.watcher().delivered(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_removes_widgets() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let page = Rc::new(MemoryPage::new("/v2/location/W1/conversations/C1"));
                page.add_button_group();
                let script = ContentScript::start(context(page.clone(), config()), page.clone());
                sleep(Duration::from_millis(10)).await;
                assert_eq!(page.count_by_id("snooze-btn"), 1);

                let watcher = script.watcher().clone();
                script.shutdown();
                assert_eq!(watcher.subscriber_count(), 0);
                assert_eq!(page.count_by_id("snooze-btn"), 0);
                assert_eq!(page.listener_count(), 0);
            })
            .await;
    }
}
