//! Mount lifecycle: idempotent evaluation, teardown on navigation, retries.

mod common;

use common::*;
use convo_widgets::*;
use std::time::Duration;

const WIDGET_IDS: [&str; 3] = ["snooze-btn", "ai-tag-btn", "details-btn"];

/// Listeners of all three widgets: 3 snooze, 1 tag, 5 editor.
const MOUNTED_LISTENERS: usize = 9;

#[tokio::test(start_paused = true)]
async fn test_repeated_evaluate_mounts_once() {
    init_logging();
    run_local(async {
        let h = Harness::new(W1_C1);
        h.page.add_button_group();

        let outcomes = h.controller.evaluate();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(EvaluateOutcome::is_mount_started));
        settle().await;

        let insertions = h.page.insertions();
        for _ in 0..20 {
            let outcomes = h.controller.evaluate();
            assert!(outcomes.iter().all(EvaluateOutcome::is_unchanged));
        }
        settle().await;

        assert_eq!(h.page.insertions(), insertions);
        for id in WIDGET_IDS {
            assert_eq!(h.page.count_by_id(id), 1, "#{id}");
        }
        assert_eq!(h.page.listener_count(), MOUNTED_LISTENERS);
        assert_eq!(h.controller.active_timers(WidgetKind::AiTag), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_buttons_land_before_host_trailing_buttons() {
    run_local(async {
        let h = Harness::new(W1_C1);
        let group = h.page.add_button_group();
        h.controller.evaluate();
        settle().await;

        let known = ["archive-btn", "delete-btn", "more-btn"]
            .into_iter()
            .chain(WIDGET_IDS);
        let by_node: Vec<(NodeRef, &str)> = known
            .filter_map(|id| h.page.element_by_id(id).map(|node| (node, id)))
            .collect();
        let ids: Vec<&str> = h
            .page
            .children(group)
            .into_iter()
            .filter_map(|child| by_node.iter().find(|(n, _)| *n == child).map(|(_, id)| *id))
            .collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(ids.first(), Some(&"archive-btn"));
        assert_eq!(ids.last(), Some(&"more-btn"));
        assert_eq!(ids[ids.len() - 2], "delete-btn");
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_resources_bounded_across_navigation() {
    run_local(async {
        let h = Harness::new(W1_C1);
        h.page.add_button_group();
        h.controller.evaluate();
        settle().await;

        for round in 0..10 {
            let (next, contact) = if round % 2 == 0 { (W1_C2, "K2") } else { (W1_C1, "K1") };
            let outcomes = h.navigate(next);
            assert!(outcomes.iter().all(EvaluateOutcome::is_mount_started));
            settle().await;

            assert_eq!(h.page.listener_count(), MOUNTED_LISTENERS);
            assert_eq!(h.controller.active_timers(WidgetKind::AiTag), 1);
            for id in WIDGET_IDS {
                assert_eq!(h.page.count_by_id(id), 1, "#{id} in round {round}");
            }
            let instance = h.controller.instance(WidgetKind::AiTag);
            assert_eq!(instance.and_then(|i| i.contact_id()).as_deref(), Some(contact));
        }

        let outcomes = h.navigate(W1_CONTACTS);
        assert!(outcomes.iter().all(EvaluateOutcome::is_unmounted));
        assert_eq!(h.page.listener_count(), 0);
        assert_eq!(h.controller.active_timers(WidgetKind::AiTag), 0);
        for id in WIDGET_IDS {
            assert_eq!(h.page.count_by_id(id), 0);
        }
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_timer_stops_after_unmount() {
    run_local(async {
        let h = Harness::new(W1_C1);
        h.page.add_button_group();
        h.controller.evaluate();
        settle().await;

        sleep(Duration::from_secs(11)).await;
        let reads = h.gateway.count(common::Op::GetTags);
        assert_eq!(reads, 3, "one on mount and one per 5s tick");

        h.navigate(W1_CONTACTS);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.gateway.count(common::Op::GetTags), reads);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_workspace_is_left_alone() {
    run_local(async {
        let h = Harness::new(W2_C9);
        h.page.add_button_group();

        let outcomes = h.controller.evaluate();
        assert!(outcomes.iter().all(EvaluateOutcome::is_skipped));
        sleep(Duration::from_secs(30)).await;

        for id in WIDGET_IDS {
            assert_eq!(h.page.count_by_id(id), 0);
        }
        assert_eq!(h.page.insertions(), 0);
        assert!(h.gateway.calls().is_empty());
        assert!(!h.controller.has_pending_retry(WidgetKind::Snooze));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_non_conversation_routes_are_skipped() {
    run_local(async {
        for path in ["/", "/v2/location/W1", W1_CONTACTS, "/v2/location/W1/conversations"] {
            let h = Harness::new(path);
            h.page.add_button_group();
            let outcomes = h.controller.evaluate();
            assert!(outcomes.iter().all(EvaluateOutcome::is_skipped), "{path}");
        }
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_navigation_during_anchor_wait_cancels_mount() {
    run_local(async {
        let h = Harness::new(W1_C1);
        h.controller.evaluate();
        sleep(Duration::from_secs(1)).await;

        let outcomes = h.navigate(W1_CONTACTS);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, EvaluateOutcome::MountCancelled { .. })));

        h.page.add_button_group();
        sleep(Duration::from_secs(15)).await;
        for id in WIDGET_IDS {
            assert_eq!(h.page.count_by_id(id), 0);
        }
        assert!(h.gateway.calls().is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_anchor_timeout_schedules_retry() {
    run_local(async {
        let h = Harness::new(W1_C1);
        h.controller.evaluate();

        sleep(Duration::from_secs(11)).await;
        assert_eq!(h.controller.state(WidgetKind::Snooze), Some(WidgetState::Unmounted));
        assert!(h.controller.has_pending_retry(WidgetKind::Snooze));
        assert_eq!(h.controller.retry_attempts(WidgetKind::Snooze), 1);

        h.page.add_button_group();
        sleep(Duration::from_secs(2)).await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
        assert_eq!(h.page.count_by_id("snooze-btn"), 1);
        assert_eq!(h.controller.retry_attempts(WidgetKind::Snooze), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_retries_give_up_after_budget() {
    run_local(async {
        let config = test_config()
            .anchor_timeout(Duration::from_secs(1))
            .retry(RetryPolicy::new(Duration::from_secs(1), 2));
        let h = Harness::with_config(W1_C1, config);
        h.controller.evaluate();

        sleep(Duration::from_secs(20)).await;
        assert_eq!(h.controller.state(WidgetKind::Snooze), Some(WidgetState::Unmounted));
        assert!(!h.controller.has_pending_retry(WidgetKind::Snooze));
        assert_eq!(h.controller.retry_attempts(WidgetKind::Snooze), 2);

        // A new route gets a fresh budget.
        h.page.add_button_group();
        h.navigate(W1_C2);
        settle().await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_spent_budget_ignores_mutations_on_same_route() {
    run_local(async {
        let config = test_config()
            .anchor_timeout(Duration::from_secs(1))
            .retry(RetryPolicy::new(Duration::from_secs(1), 2));
        let h = Harness::with_config(W1_C1, config);
        h.controller.evaluate();
        sleep(Duration::from_secs(20)).await;

        // The toolbar shows up late; mutations alone must not start a wait.
        h.page.add_button_group();
        let insertions = h.page.insertions();
        for _ in 0..5 {
            let outcomes = h.controller.evaluate();
            assert!(outcomes.iter().all(EvaluateOutcome::is_skipped), "{outcomes:?}");
        }
        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.controller.state(WidgetKind::Snooze), Some(WidgetState::Unmounted));
        assert_eq!(h.page.insertions(), insertions);

        h.controller.rearm_retries();
        assert!(h.controller.evaluate().iter().all(EvaluateOutcome::is_mount_started));
        settle().await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
        assert_eq!(h.controller.retry_attempts(WidgetKind::Snooze), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_defer_tag_widget() {
    run_local(async {
        let h = Harness::new(W1_C1);
        h.credentials.clear();
        h.page.add_button_group();

        let outcomes = h.controller.evaluate();
        let tag = outcomes
            .iter()
            .find(|o| o.kind() == WidgetKind::AiTag)
            .cloned();
        assert!(tag.is_some_and(|o| o.is_retry_scheduled()));
        settle().await;
        assert!(h.controller.is_mounted(WidgetKind::Snooze));
        assert!(!h.controller.is_mounted(WidgetKind::AiTag));

        h.credentials.set(test_credentials());
        sleep(Duration::from_secs(3)).await;
        assert!(h.controller.is_mounted(WidgetKind::AiTag));
        assert_eq!(h.page.count_by_id("ai-tag-btn"), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_host_rerender_triggers_remount() {
    run_local(async {
        let h = Harness::new(W1_C1);
        let group = h.page.add_button_group();
        h.controller.evaluate();
        settle().await;

        // The host replaces its toolbar, dropping our buttons with it.
        assert!(h.page.remove(group));
        h.page.add_button_group();
        let outcomes = h.controller.evaluate();
        assert!(outcomes.iter().all(EvaluateOutcome::is_mount_started));
        settle().await;

        for id in WIDGET_IDS {
            assert_eq!(h.page.count_by_id(id), 1);
        }
        assert_eq!(h.page.listener_count(), MOUNTED_LISTENERS);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_leftover_elements_are_replaced() {
    run_local(async {
        let h = Harness::new(W1_C1);
        let group = h.page.add_button_group();
        let stale = h
            .page
            .create_element(&ElementBlueprint::new("button").id("snooze-btn"));
        h.page.append_child(group, stale);

        h.controller.evaluate();
        settle().await;

        assert_eq!(h.page.count_by_id("snooze-btn"), 1);
        assert!(!h.page.is_attached(stale));
    })
    .await;
}
