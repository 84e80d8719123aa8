// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bounded background tasks.
//!
//! Detached work is spawned through a shared [`TaskTracker`]. Best-effort work
//! (DNS propagation checks) goes through [`BackgroundTasks::spawn`] and is
//! dropped once the in-flight cap is reached. Hook-triggered provisioning runs
//! go through [`BackgroundTasks::spawn_uncapped`]: they are tracked for
//! shutdown but never count against, or get dropped by, the cap. Nothing
//! awaits these tasks on the main path; `shutdown` gives the process a bounded
//! window to let them finish before exit.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    capped: Arc<AtomicUsize>,
    max_in_flight: usize,
}

/// Releases a capped slot when the task finishes or is dropped
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BackgroundTasks {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            capped: Arc::new(AtomicUsize::new(0)),
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Spawn best-effort `task` unless the cap is reached; returns whether it was spawned
    pub fn spawn<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            warn!(task = name, "Background tasks are shutting down; task dropped");
            return false;
        }
        let reserved = self
            .capped
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max_in_flight).then_some(n + 1));
        if reserved.is_err() {
            warn!(task = name, limit = self.max_in_flight, "Background task limit reached; task dropped");
            return false;
        }
        let guard = SlotGuard(self.capped.clone());
        debug!(task = name, "Spawning background task");
        self.tracker.spawn(async move {
            let _guard = guard;
            task.await;
        });
        true
    }

    /// Spawn `task` regardless of the cap. Only refused once shutdown has begun.
    pub fn spawn_uncapped<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            warn!(task = name, "Background tasks are shutting down; task dropped");
            return false;
        }
        debug!(task = name, "Spawning background task");
        self.tracker.spawn(task);
        true
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting tasks and wait up to `grace` for running ones.
    /// Returns false if tasks were still running when the grace period ended.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(remaining = self.tracker.len(), "Background tasks still running at shutdown");
                false
            }
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_respects_limit() {
        let tasks = BackgroundTasks::new(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        assert!(tasks.spawn("blocked", async move {
            let _ = rx.await;
        }));
        assert!(!tasks.spawn("rejected", async {}));
        assert_eq!(tasks.in_flight(), 1);

        tx.send(()).unwrap();
        assert!(tasks.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_uncapped_tasks_ignore_limit() {
        let tasks = BackgroundTasks::new(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        assert!(tasks.spawn("dns-verification", async move {
            let _ = rx.await;
        }));

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        assert!(tasks.spawn_uncapped("provision-client", async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        // Uncapped work does not take the capped slot either
        assert!(!tasks.spawn("dns-verification", async {}));

        tx.send(()).unwrap();
        assert!(tasks.shutdown(Duration::from_secs(1)).await);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!tasks.spawn_uncapped("late", async {}));
    }

    #[tokio::test]
    async fn test_capped_slot_is_released_on_completion() {
        let tasks = BackgroundTasks::new(1);
        assert!(tasks.spawn("quick", async {}));
        for _ in 0..100 {
            if tasks.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(tasks.spawn("next", async {}));
        assert!(tasks.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_tasks() {
        let tasks = BackgroundTasks::new(4);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            tasks.spawn("counter", async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(tasks.shutdown(Duration::from_secs(1)).await);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(!tasks.spawn("late", async {}));
    }

    #[tokio::test]
    async fn test_shutdown_grace_expires() {
        let tasks = BackgroundTasks::new(1);
        tasks.spawn("slow", tokio::time::sleep(Duration::from_secs(5)));
        assert!(!tasks.shutdown(Duration::from_millis(10)).await);
    }
}
