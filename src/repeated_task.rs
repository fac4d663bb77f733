//! Cancellable, condition-gated periodic executor.
//!
//! A task runs its action immediately and then on every interval tick while the
//! continue-condition holds. When the condition turns false the task calls its
//! `on_condition_false` callback once and exits. Errors and panics in one tick are
//! logged and the loop carries on with the next tick.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::AgentResult;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a running [`RepeatedTask`]. Dropping the handle stops the task.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    name: &'static str,
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Stop scheduling further ticks.
    ///
    /// Once this returns no new invocation of the action begins; one already in
    /// flight runs to completion. Calling it again is a no-op.
    pub fn stop(&self) {
        let was_stopped = self.cancel.send_replace(true);
        if !was_stopped {
            tracing::debug!("Stopping repeated task '{}' ({})", self.name, self.id);
        }
    }

    /// False once stopped or once the loop has exited on its own.
    pub fn is_running(&self) -> bool {
        !*self.cancel.borrow() && !self.join.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

pub struct RepeatedTask;

impl RepeatedTask {
    pub fn start<A, Fut, C, F>(
        name: &'static str,
        interval: Duration,
        mut action: A,
        condition: C,
        on_condition_false: F,
    ) -> TaskHandle
    where
        A: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = AgentResult<()>> + Send + 'static,
        C: Fn() -> bool + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let (cancel, mut cancelled) = watch::channel(false);
        tracing::debug!("Creating repeated task '{}' ({}) every {:?}", name, id, interval);

        let join = tokio::spawn(async move {
            let mut on_condition_false = Some(on_condition_false);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => {}
                    _ = ticker.tick() => {}
                }
                // The cancel flag stays borrowed until the action has been invoked, so
                // a concurrent stop() either lands before this check or after the
                // invocation began.
                let tick = {
                    let stopped = cancelled.borrow();
                    if *stopped {
                        break;
                    }
                    if condition() { Some(action()) } else { None }
                };
                let Some(tick) = tick else {
                    if let Some(callback) = on_condition_false.take() {
                        callback();
                    }
                    break;
                };
                match AssertUnwindSafe(tick).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!("Repeated task '{}' tick failed: {}", name, e),
                    Err(_) => tracing::error!("Repeated task '{}' tick panicked", name),
                }
            }
            tracing::debug!("Repeated task '{}' ({}) finished", name, id);
        });

        TaskHandle { id, name, cancel, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn test_runs_immediately_and_repeats() {
        let count = counter();
        let c = count.clone();
        let handle = RepeatedTask::start(
            "test",
            Duration::from_millis(20),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            || true,
            || {},
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(count.load(Ordering::SeqCst) >= 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(count.load(Ordering::SeqCst) >= 3);
        assert!(handle.is_running());

        handle.stop();
        assert!(!handle.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
        handle.stop();
    }

    #[tokio::test]
    async fn test_condition_false_calls_callback_once() {
        let count = counter();
        let callbacks = counter();
        let c = count.clone();
        let cb = callbacks.clone();
        let handle = RepeatedTask::start(
            "gated",
            Duration::from_millis(10),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            || false,
            move || {
                cb.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_failing_ticks_keep_the_loop_alive() {
        let count = counter();
        let c = count.clone();
        let _handle = RepeatedTask::start(
            "failing",
            Duration::from_millis(10),
            move || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n == 1 {
                        panic!("tick {} exploded", n);
                    }
                    Err(AgentError::CoordinatorGone)
                }
            },
            || true,
            || {},
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_tick_finish() {
        let finished = Arc::new(AtomicBool::new(false));
        let count = counter();
        let f = finished.clone();
        let c = count.clone();
        let handle = RepeatedTask::start(
            "slow",
            Duration::from_millis(10),
            move || {
                let f = f.clone();
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    f.store(true, Ordering::SeqCst);
                    Ok(())
                }
            },
            || true,
            || {},
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
