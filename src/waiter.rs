//! Polling wait for host elements.
//!
//! The host SPA renders its toolbar some time after the route changes and
//! exposes no event for it, so [`ElementWaiter`] polls the document on a
//! fixed interval until the selector matches or the timeout elapses.
//!
//! Waits are cancellable through a liveness predicate checked before every
//! poll: when the route that started the wait is no longer current the wait
//! resolves to [`WidgetError::Cancelled`] instead of an element.

use crate::error::WidgetError;
use crate::page::{HostPage, NodeRef};
use crate::runtime::sleep;
use crate::trace_log;
use std::time::Duration;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Polls a [`HostPage`] for a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementWaiter {
    interval: Duration,
}

impl ElementWaiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for `selector` to match, giving up after `timeout`.
    ///
    /// `still_wanted` is checked before each poll; once it returns `false`
    /// the wait ends with [`WidgetError::Cancelled`].
    pub async fn wait_for<F>(
        &self,
        page: &dyn HostPage,
        selector: &str,
        timeout: Duration,
        still_wanted: F,
    ) -> Result<NodeRef, WidgetError>
    where
        F: Fn() -> bool,
    {
        let mut waited = Duration::ZERO;
        loop {
            if !still_wanted() {
                trace_log!("wait for `{}` abandoned after {:?}", selector, waited);
                return Err(WidgetError::Cancelled);
            }
            if let Some(node) = page.query_selector(selector) {
                return Ok(node);
            }
            if waited >= timeout {
                return Err(WidgetError::Timeout {
                    selector: selector.to_string(),
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
            sleep(self.interval).await;
            waited += self.interval;
        }
    }
}

impl Default for ElementWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPage;
    use crate::runtime::spawn;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn run_local<F: std::future::Future<Output = ()>>(f: F) -> impl std::future::Future<Output = ()> {
        async move { tokio::task::LocalSet::new().run_until(f).await }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_when_present() {
        let page = MemoryPage::new("/");
        let group = page.add_button_group();
        let waiter = ElementWaiter::default();
        let found = waiter
            .wait_for(&page, ".button-group.flex", Duration::from_secs(1), || true)
            .await;
        assert_eq!(found, Ok(group));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let page = MemoryPage::new("/");
        let waiter = ElementWaiter::new(Duration::from_millis(250));
        let result = waiter
            .wait_for(&page, ".button-group.flex", Duration::from_millis(1000), || true)
            .await;
        assert_eq!(
            result,
            Err(WidgetError::Timeout {
                selector: ".button-group.flex".into(),
                waited_ms: 1000
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_when_element_appears_later() {
        run_local(async {
            let page = Rc::new(MemoryPage::new("/"));
            let result = Rc::new(RefCell::new(None));

            let (p, r) = (page.clone(), result.clone());
            spawn(async move {
                let found = ElementWaiter::default()
                    .wait_for(&*p, ".button-group.flex", Duration::from_secs(10), || true)
                    .await;
                *r.borrow_mut() = Some(found);
            });

            sleep(Duration::from_millis(1000)).await;
            assert!(result.borrow().is_none());
            let group = page.add_button_group();
            sleep(Duration::from_millis(400)).await;
            assert_eq!(*result.borrow(), Some(Ok(group)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_when_no_longer_wanted() {
        run_local(async {
            let page = Rc::new(MemoryPage::new("/"));
            let wanted = Rc::new(Cell::new(true));
            let result = Rc::new(RefCell::new(None));

            let (p, w, r) = (page.clone(), wanted.clone(), result.clone());
            spawn(async move {
                let found = ElementWaiter::default()
                    .wait_for(&*p, ".button-group.flex", Duration::from_secs(10), || w.get())
                    .await;
                *r.borrow_mut() = Some(found);
            });

            sleep(Duration::from_millis(500)).await;
            wanted.set(false);
            page.add_button_group();
            sleep(Duration::from_millis(400)).await;
            assert_eq!(*result.borrow(), Some(Err(WidgetError::Cancelled)));
        })
        .await;
    }
}
