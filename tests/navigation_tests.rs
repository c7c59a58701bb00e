//! End-to-end navigation through a running [`ContentScript`].

mod common;

use common::*;
use convo_widgets::*;
use std::rc::Rc;
use std::time::Duration;

fn start(h: &Harness, debounce: Option<Duration>) -> ContentScript {
    let watcher = match debounce {
        Some(window) => NavigationWatcher::with_debounce(window),
        None => NavigationWatcher::new(),
    };
    ContentScript::start_with(h.controller.clone(), watcher, h.page.clone())
}

#[tokio::test(start_paused = true)]
async fn test_history_navigation_follows_conversation() {
    init_logging();
    run_local(async {
        let h = Harness::new(W1_CONTACTS);
        h.page.add_button_group();
        let script = start(&h, None);
        assert!(!h.controller.is_mounted(WidgetKind::Snooze));

        script.history().push_state(W1_C1);
        settle().await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
        let first = h.controller.instance(WidgetKind::AiTag);
        assert_eq!(first.and_then(|i| i.contact_id()).as_deref(), Some("K1"));

        script.history().push_state(W1_C2);
        settle().await;
        let second = h.controller.instance(WidgetKind::AiTag);
        assert_eq!(second.and_then(|i| i.contact_id()).as_deref(), Some("K2"));
        assert_eq!(h.page.history_len(), 3);

        // Back to C1: the host reports popstate.
        assert!(h.page.back());
        script.notify(NavigationSignal::PopState);
        settle().await;
        let back = h.controller.instance(WidgetKind::AiTag);
        assert_eq!(back.map(|i| i.route().clone()), Some(Route::from_path(W1_C1)));
        assert_eq!(h.page.count_by_id("ai-tag-btn"), 1);

        script.history().replace_state(W1_CONTACTS);
        assert!(!h.controller.is_mounted(WidgetKind::AiTag));
        assert_eq!(h.page.listener_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_toolbar_rendered_after_navigation() {
    run_local(async {
        let h = Harness::new(W1_CONTACTS);
        let script = start(&h, None);

        // The route changes first; the toolbar shows up a moment later.
        script.history().push_state(W1_C1);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(h.controller.state(WidgetKind::Snooze), Some(WidgetState::Mounting));

        h.page.add_button_group();
        script.notify(NavigationSignal::DomMutation);
        sleep(Duration::from_millis(400)).await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
        assert_eq!(h.page.count_by_id("snooze-btn"), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_mutation_storm_is_harmless() {
    run_local(async {
        let h = Harness::new(W1_C1);
        h.page.add_button_group();
        let script = start(&h, Some(Duration::from_millis(100)));
        settle().await;
        let insertions = h.page.insertions();

        for _ in 0..50 {
            script.notify(NavigationSignal::DomMutation);
            sleep(Duration::from_millis(20)).await;
        }
        sleep(Duration::from_millis(200)).await;

        assert!(script.watcher().delivered() < 50);
        assert_eq!(h.page.insertions(), insertions);
        assert_eq!(h.gateway.count(common::Op::Resolve), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_history_is_wrapped_once() {
    run_local(async {
        let h = Harness::new(W1_CONTACTS);
        let watcher = NavigationWatcher::new();
        let wrapped = watcher.intercept_history(h.page.clone());
        let again = watcher.intercept_history(h.page.clone());
        assert!(watcher.is_history_intercepted());

        let seen = Rc::new(std::cell::Cell::new(0));
        let counter = seen.clone();
        watcher.subscribe(move |_| counter.set(counter.get() + 1));

        wrapped.push_state(W1_C1);
        again.push_state(W1_C2);
        assert_eq!(seen.get(), 2);
        assert_eq!(h.page.pathname(), W1_C2);
    })
    .await;
}

/// History that reports its own calls, like a patched `window.history`.
struct ReportingHistory {
    page: Rc<MemoryPage>,
    watcher: NavigationWatcher,
}

impl HistoryApi for ReportingHistory {
    fn push_state(&self, url: &str) {
        self.page.push_state(url);
        self.watcher.notify(NavigationSignal::PushState);
    }

    fn replace_state(&self, url: &str) {
        self.page.replace_state(url);
        self.watcher.notify(NavigationSignal::ReplaceState);
    }
}

#[tokio::test(start_paused = true)]
async fn test_adopted_history_reports_each_push_once() {
    run_local(async {
        let h = Harness::new(W1_CONTACTS);
        h.page.add_button_group();
        let watcher = NavigationWatcher::new();
        let reporting = Rc::new(ReportingHistory {
            page: h.page.clone(),
            watcher: watcher.clone(),
        });
        let adopted = watcher.adopt_history(reporting);
        assert!(adopted.is_some());
        let script = ContentScript::start_with(h.controller.clone(), watcher, h.page.clone());

        let before = script.watcher().delivered();
        script.history().push_state(W1_C1);
        assert_eq!(script.watcher().delivered(), before + 1);
        settle().await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
        assert_eq!(h.page.count_by_id("snooze-btn"), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_history_signal_restarts_spent_budget() {
    run_local(async {
        let config = test_config()
            .anchor_timeout(Duration::from_secs(1))
            .retry(RetryPolicy::new(Duration::from_secs(1), 2));
        let h = Harness::with_config(W1_C1, config);
        let script = start(&h, None);
        sleep(Duration::from_secs(20)).await;
        assert!(!h.controller.has_pending_retry(WidgetKind::Snooze));

        h.page.add_button_group();
        script.notify(NavigationSignal::DomMutation);
        settle().await;
        assert_eq!(h.controller.state(WidgetKind::Snooze), Some(WidgetState::Unmounted));

        script.history().replace_state(W1_C1);
        settle().await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_reacting() {
    run_local(async {
        let h = Harness::new(W1_C1);
        h.page.add_button_group();
        let script = start(&h, None);
        settle().await;
        let watcher = script.watcher().clone();
        let history = script.history();

        script.shutdown();
        assert_eq!(h.page.count_by_id("snooze-btn"), 0);

        history.push_state(W1_C2);
        watcher.notify(NavigationSignal::PopState);
        settle().await;
        assert!(!h.controller.is_mounted(WidgetKind::Snooze));
        assert_eq!(h.page.listener_count(), 0);
    })
    .await;
}
