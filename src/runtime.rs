//! Local task spawning and timers.
//!
//! Everything runs on one thread: UI callbacks, timer ticks and network
//! completions interleave on the host's event loop. On `wasm32` that loop is
//! the browser's (`wasm-bindgen-futures`, `gloo-timers`); natively it is a
//! tokio `LocalSet`, which callers must be running inside.
//!
//! Spawned tasks are wrapped in [`futures::future::Abortable`] so the
//! controller can stop them through a [`TaskHandle`] regardless of backend.

use futures::future::{AbortHandle, Abortable};
use std::future::Future;
use std::time::Duration;

/// Handle to a spawned local task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    abort: AbortHandle,
}

impl TaskHandle {
    /// Stop the task at its next suspension point. Idempotent.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// True once [`abort`](Self::abort) was called.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Spawn `future` on the current thread's event loop.
pub fn spawn<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + 'static,
{
    let (abort, registration) = AbortHandle::new_pair();
    let task = Abortable::new(future, registration);
    spawn_local(async move {
        let _ = task.await;
    });
    TaskHandle { abort }
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    tokio::task::spawn_local(future);
}

#[cfg(target_arch = "wasm32")]
fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Suspend the current task for `duration`.
pub async fn sleep(duration: Duration) {
    #[cfg(not(target_arch = "wasm32"))]
    tokio::time::sleep(duration).await;
    #[cfg(target_arch = "wasm32")]
    gloo_timers::future::sleep(duration).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[tokio::test(start_paused = true)]
    async fn test_spawned_task_runs() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                spawn(async move { flag.set(true) });
                sleep(Duration::from_millis(1)).await;
                assert!(ran.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_task_stops() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let ticks = Rc::new(Cell::new(0));
                let counter = ticks.clone();
                let handle = spawn(async move {
                    loop {
                        sleep(Duration::from_millis(100)).await;
                        counter.set(counter.get() + 1);
                    }
                });
                sleep(Duration::from_millis(350)).await;
                handle.abort();
                let seen = ticks.get();
                sleep(Duration::from_millis(1000)).await;
                assert_eq!(ticks.get(), seen);
                assert!(handle.is_aborted());
            })
            .await;
    }
}
