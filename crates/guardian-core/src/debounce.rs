//! Per-channel debounce scheduler.
//!
//! Each [`Channel`] holds at most one pending action. Scheduling on a channel
//! replaces (and cancels) whatever was pending there, so a burst of edits
//! collapses into the action captured by the last one.
//!
//! Once a timer elapses its action is detached from the scheduler: cancelling
//! the channel afterwards does not abort an action that is already running.
//! `take_pending` detaches every waiting action at once without running it.
//!
//! Timers are tokio tasks, so every method that starts one must be called from
//! within a tokio runtime.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

/// Independent collapsing-timer lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// Persist the original content
    SaveOriginal,
    /// Persist hand-edited sanitized content
    SaveSanitized,
    /// Persist the original content, then re-derive the sanitized preview
    DeriveSanitized,
}

impl Channel {
    pub const ALL: [Channel; 3] = [
        Channel::SaveOriginal,
        Channel::SaveSanitized,
        Channel::DeriveSanitized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::SaveOriginal => "save-original",
            Channel::SaveSanitized => "save-sanitized",
            Channel::DeriveSanitized => "derive-sanitized",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Pending {
    id: u64,
    timer: AbortHandle,
    action: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct Slots {
    next_id: u64,
    pending: HashMap<Channel, Pending>,
}

/// Cheap to clone; clones share the same timers.
#[derive(Clone, Default)]
pub struct DebounceScheduler {
    slots: Arc<Mutex<Slots>>,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
        slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `action` after `delay` unless the channel is rescheduled or
    /// cancelled first.
    pub fn schedule<F>(&self, channel: Channel, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slots = Self::lock(&self.slots);
        slots.next_id += 1;
        let id = slots.next_id;

        let shared = Arc::clone(&self.slots);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let action = {
                let mut slots = Self::lock(&shared);
                match slots.pending.get(&channel) {
                    Some(pending) if pending.id == id => {
                        slots.pending.remove(&channel).map(|p| p.action)
                    }
                    _ => None,
                }
            };
            if let Some(action) = action {
                debug!("Debounce fired on {}", channel);
                action.await;
            }
        });

        let replaced = slots.pending.insert(
            channel,
            Pending {
                id,
                timer: timer.abort_handle(),
                action: action.boxed(),
            },
        );
        if let Some(old) = replaced {
            old.timer.abort();
            debug!("Rescheduled {} ({:?})", channel, delay);
        }
    }

    /// Cancel the pending action on `channel`. Returns whether one was pending.
    pub fn cancel(&self, channel: Channel) -> bool {
        let removed = Self::lock(&self.slots).pending.remove(&channel);
        match removed {
            Some(pending) => {
                pending.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending action without running it.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Pending> = Self::lock(&self.slots)
            .pending
            .drain()
            .map(|(_, pending)| pending)
            .collect();
        for pending in &drained {
            pending.timer.abort();
        }
        drained.len()
    }

    /// Cancel every timer and hand back the actions that were waiting on
    /// them. The caller decides when they run.
    pub fn take_pending(&self) -> Vec<BoxFuture<'static, ()>> {
        let drained: Vec<(Channel, Pending)> = Self::lock(&self.slots).pending.drain().collect();
        drained
            .into_iter()
            .map(|(channel, pending)| {
                pending.timer.abort();
                debug!("Took pending {}", channel);
                pending.action
            })
            .collect()
    }

    /// Cancel every timer and run the pending actions to completion.
    pub async fn drain(&self) -> usize {
        let actions = self.take_pending();
        let count = actions.len();
        futures::future::join_all(actions).await;
        count
    }

    pub fn is_pending(&self, channel: Channel) -> bool {
        Self::lock(&self.slots).pending.contains_key(&channel)
    }

    pub fn pending_count(&self) -> usize {
        Self::lock(&self.slots).pending.len()
    }
}

impl fmt::Debug for DebounceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = Self::lock(&self.slots);
        let mut channels: Vec<&Channel> = slots.pending.keys().collect();
        channels.sort_by_key(|c| c.as_str());
        f.debug_struct("DebounceScheduler")
            .field("pending", &channels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> BoxFuture<'static, ()>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&log);
        let make = move |value: &str| {
            let log = Arc::clone(&shared);
            let value = value.to_string();
            async move {
                log.lock().unwrap().push(value);
            }
            .boxed()
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_action() {
        let scheduler = DebounceScheduler::new();
        let (log, make) = recorder();
        let delay = Duration::from_millis(100);

        for value in ["a", "ab", "abc"] {
            scheduler.schedule(Channel::SaveOriginal, delay, make(value));
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        assert!(log.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*log.lock().unwrap(), vec!["abc".to_string()]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_are_independent() {
        let scheduler = DebounceScheduler::new();
        let (log, make) = recorder();

        scheduler.schedule(Channel::SaveOriginal, Duration::from_millis(150), make("save"));
        scheduler.schedule(Channel::DeriveSanitized, Duration::from_millis(80), make("derive"));
        assert_eq!(scheduler.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*log.lock().unwrap(), vec!["derive".to_string()]);
        assert!(scheduler.is_pending(Channel::SaveOriginal));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["derive".to_string(), "save".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_drops_pending_actions() {
        let scheduler = DebounceScheduler::new();
        let (log, make) = recorder();

        scheduler.schedule(Channel::SaveOriginal, Duration::from_millis(50), make("a"));
        scheduler.schedule(Channel::SaveSanitized, Duration::from_millis(50), make("b"));

        assert_eq!(scheduler.cancel_all(), 2);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(log.lock().unwrap().is_empty());
        assert!(!scheduler.cancel(Channel::SaveOriginal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_taken_actions_run_only_when_awaited() {
        let scheduler = DebounceScheduler::new();
        let (log, make) = recorder();

        scheduler.schedule(Channel::SaveOriginal, Duration::from_secs(10), make("taken"));
        let actions = scheduler.take_pending();
        assert_eq!(actions.len(), 1);
        assert!(!scheduler.is_pending(Channel::SaveOriginal));

        // The timer is gone: nothing runs on its own.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(log.lock().unwrap().is_empty());

        futures::future::join_all(actions).await;
        assert_eq!(*log.lock().unwrap(), vec!["taken".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_awaits_pending_actions() {
        let scheduler = DebounceScheduler::new();
        let (log, make) = recorder();

        scheduler.schedule(Channel::SaveOriginal, Duration::from_secs(10), make("a"));
        scheduler.schedule(Channel::SaveSanitized, Duration::from_secs(10), make("b"));

        assert_eq!(scheduler.drain().await, 2);
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_does_not_abort_running_action() {
        let scheduler = DebounceScheduler::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);

        scheduler.schedule(Channel::DeriveSanitized, Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!scheduler.cancel(Channel::DeriveSanitized));
        scheduler.cancel_all();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
