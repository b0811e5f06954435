//! Live view counter.
//!
//! [`LiveCounter::spawn`] drives a [`CounterDisplay`] from a subscription
//! to the counter document. Every notification replaces the displayed
//! count; a change away from a non-zero count lights a short pulse. The
//! initial notification, arriving while the display still shows 0, never
//! pulses.
//!
//! ```text
//!   subscription ──► LiveCounter task ──► CounterDisplay
//!                         │                 count: 6
//!                         │                 pulse_until: now + 500ms
//!                         ▼
//!                   ProtocolStats (live_updates, pulses, subscription_errors)
//! ```
//!
//! The task runs until its [`LiveCounterHandle`] is stopped or dropped, at
//! which point the subscription is released.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use atomic_time::AtomicOptionDuration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::document::ViewCount;
use crate::stats::ProtocolStats;
use crate::store::Subscription;

/// How long a pulse stays lit unless configured otherwise.
pub const DEFAULT_PULSE: Duration = Duration::from_millis(500);

/// What the page shows: the count and whether it is pulsing.
///
/// Readers poll [`count`](Self::count) and [`is_pulsing`](Self::is_pulsing),
/// or wait on [`watch`](Self::watch) for count changes.
///
/// The pulse deadline is kept as an offset from the moment the display was
/// created. Instants earlier than that count as the creation time.
pub struct CounterDisplay {
    shown: watch::Sender<u64>,
    created: Instant,
    pulse_until: AtomicOptionDuration,
    pulse: Duration,
}

impl CounterDisplay {
    /// A display showing 0 with the default pulse length.
    pub fn new() -> Self {
        Self::with_pulse(DEFAULT_PULSE)
    }

    /// A display showing 0 with a custom pulse length.
    pub fn with_pulse(pulse: Duration) -> Self {
        let (shown, _) = watch::channel(0);
        Self {
            shown,
            created: Instant::now(),
            pulse_until: AtomicOptionDuration::none(),
            pulse,
        }
    }

    fn offset(&self, at: Instant) -> Duration {
        at.saturating_duration_since(self.created)
    }

    /// The displayed count. 0 until the first notification.
    pub fn count(&self) -> u64 {
        *self.shown.borrow()
    }

    /// Pulse length.
    pub fn pulse(&self) -> Duration {
        self.pulse
    }

    /// Shows `value`. Returns `true` if this raised a pulse.
    pub fn apply(&self, value: u64) -> bool {
        self.apply_at(value, Instant::now())
    }

    /// Shows `value` as of `now`. Returns `true` if this raised a pulse.
    ///
    /// A pulse is raised when the value differs from the previously shown
    /// one and the previous one was not the initial 0. A new pulse restarts
    /// the timer.
    pub fn apply_at(&self, value: u64, now: Instant) -> bool {
        let previous = self.shown.send_replace(value);
        let pulse = previous != 0 && previous != value;
        if pulse {
            let until = self.offset(now + self.pulse);
            self.pulse_until.store(Some(until), Ordering::Relaxed);
        }
        pulse
    }

    /// Returns `true` while a pulse is lit.
    pub fn is_pulsing(&self) -> bool {
        self.is_pulsing_at(Instant::now())
    }

    /// Returns `true` if a pulse is lit at `now`.
    pub fn is_pulsing_at(&self, now: Instant) -> bool {
        matches!(
            self.pulse_until.load(Ordering::Relaxed),
            Some(until) if self.offset(now) < until
        )
    }

    /// End of the current or last pulse, if any pulse was raised.
    pub fn pulse_until(&self) -> Option<Instant> {
        self.pulse_until
            .load(Ordering::Relaxed)
            .map(|offset| self.created + offset)
    }

    /// A receiver that observes every shown count.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shown.subscribe()
    }
}

impl fmt::Debug for CounterDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterDisplay")
            .field("count", &self.count())
            .field("pulse_until", &self.pulse_until())
            .field("pulse", &self.pulse)
            .finish()
    }
}

impl Default for CounterDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the task that feeds a display from a subscription.
#[derive(Debug, Clone, Copy)]
pub struct LiveCounter;

impl LiveCounter {
    /// Starts consuming `subscription` on the current tokio runtime.
    pub fn spawn(
        subscription: Subscription,
        display: Arc<CounterDisplay>,
        stats: Arc<ProtocolStats>,
    ) -> LiveCounterHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(subscription, display, stats, stop_rx));
        LiveCounterHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

async fn run(
    mut subscription: Subscription,
    display: Arc<CounterDisplay>,
    stats: Arc<ProtocolStats>,
    mut stop: oneshot::Receiver<()>,
) {
    let path = subscription.path().clone();
    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(%path, "live counter stopped");
                break;
            }
            event = subscription.next() => match event {
                Some(Ok(Some(doc))) => match ViewCount::from_document(&path, &doc) {
                    Ok(view) => {
                        stats.live_updates.add(1);
                        if display.apply(view.count) {
                            stats.pulses.add(1);
                        }
                    }
                    Err(e) => {
                        stats.subscription_errors.add(1);
                        warn!(%path, error = %e, "ignoring malformed counter update");
                    }
                },
                Some(Ok(None)) => debug!(%path, "counter document does not exist yet"),
                Some(Err(e)) => {
                    stats.subscription_errors.add(1);
                    warn!(%path, error = %e, "view count subscription error");
                }
                None => {
                    debug!(%path, "view count subscription closed");
                    break;
                }
            }
        }
    }
    subscription.unsubscribe();
}

/// Cancellation handle for a running live counter.
///
/// Dropping the handle aborts the task; [`stop`](Self::stop) shuts it down
/// and waits for it.
#[derive(Debug)]
pub struct LiveCounterHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveCounterHandle {
    /// Stops the task and waits until the subscription is released.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "live counter task ended abnormally");
            }
        }
    }

    /// Returns `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for LiveCounterHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentPath};
    use crate::stats::Observable;
    use crate::store::{DocumentStore, MemoryStore};
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn counter() -> DocumentPath {
        DocumentPath::new("viewCounts", "profile").unwrap()
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[test]
    fn test_initial_value_never_pulses() {
        let display = CounterDisplay::new();
        let t0 = Instant::now();
        assert!(!display.apply_at(42, t0));
        assert_eq!(display.count(), 42);
        assert!(!display.is_pulsing_at(t0));
    }

    #[test]
    fn test_change_pulses_then_fades() {
        let display = CounterDisplay::new();
        let t0 = Instant::now();
        display.apply_at(5, t0);

        assert!(display.apply_at(6, t0));
        assert!(display.is_pulsing_at(t0));
        assert!(display.is_pulsing_at(t0 + Duration::from_millis(499)));
        assert!(!display.is_pulsing_at(t0 + Duration::from_millis(500)));
        assert_eq!(display.count(), 6);
    }

    #[test]
    fn test_same_value_never_pulses() {
        let display = CounterDisplay::new();
        let t0 = Instant::now();
        display.apply_at(5, t0);
        assert!(!display.apply_at(5, t0));
        assert!(!display.is_pulsing_at(t0));
    }

    #[test]
    fn test_new_pulse_restarts_timer() {
        let display = CounterDisplay::with_pulse(Duration::from_millis(100));
        let t0 = Instant::now();
        display.apply_at(1, t0);
        display.apply_at(2, t0);
        display.apply_at(3, t0 + Duration::from_millis(80));
        assert!(display.is_pulsing_at(t0 + Duration::from_millis(150)));
        assert!(!display.is_pulsing_at(t0 + Duration::from_millis(180)));
    }

    #[test]
    fn test_pulse_independent_of_other_displays() {
        let t0 = Instant::now();
        let a = CounterDisplay::new();
        let b = CounterDisplay::new();

        a.apply_at(1, t0 + Duration::from_secs(10));
        a.apply_at(2, t0 + Duration::from_secs(10));
        assert!(a.is_pulsing_at(t0 + Duration::from_secs(10)));

        b.apply_at(1, t0);
        assert!(b.apply_at(2, t0));
        assert!(!b.is_pulsing_at(t0 + Duration::from_secs(1)));
        assert!(!b.is_pulsing_at(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_pulse_until() {
        let display = CounterDisplay::new();
        let t0 = Instant::now();
        assert_eq!(display.pulse_until(), None);

        display.apply_at(1, t0);
        display.apply_at(2, t0);
        assert_eq!(display.pulse_until(), Some(t0 + DEFAULT_PULSE));
    }

    #[test]
    fn test_debug_shows_count() {
        let display = CounterDisplay::new();
        display.apply(4);
        let text = format!("{:?}", display);
        assert!(text.contains("count: 4"));
        assert!(text.contains("pulse_until: None"));
    }

    #[test]
    fn test_watch_sees_updates() {
        let display = CounterDisplay::new();
        let rx = display.watch();
        display.apply(9);
        assert_eq!(*rx.borrow(), 9);
    }

    #[tokio::test]
    async fn test_live_updates_and_pulse() {
        let store = Arc::new(MemoryStore::new());
        store.insert(counter(), doc(json!({"count": 5})));
        let display = Arc::new(CounterDisplay::new());
        let stats = Arc::new(ProtocolStats::new());

        let handle = LiveCounter::spawn(
            store.subscribe(&counter()).unwrap(),
            Arc::clone(&display),
            Arc::clone(&stats),
        );

        let mut rx = display.watch();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| *c == 5))
            .await
            .unwrap()
            .unwrap();
        assert!(!display.is_pulsing());

        store
            .increment(&counter(), "count", 1, Document::new())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| *c == 6))
            .await
            .unwrap()
            .unwrap();
        assert!(display.is_pulsing());

        eventually(|| stats.pulses.value() == 1).await;
        assert_eq!(stats.live_updates.value(), 2);

        handle.stop().await;
        assert_eq!(store.subscriber_count(&counter()), 0);
    }

    #[tokio::test]
    async fn test_live_pulse_turns_off() {
        let store = Arc::new(MemoryStore::new());
        store.insert(counter(), doc(json!({"count": 5})));
        let pulse = Duration::from_millis(100);
        let display = Arc::new(CounterDisplay::with_pulse(pulse));
        let handle = LiveCounter::spawn(
            store.subscribe(&counter()).unwrap(),
            Arc::clone(&display),
            Arc::new(ProtocolStats::new()),
        );

        let mut rx = display.watch();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| *c == 5))
            .await
            .unwrap()
            .unwrap();
        store
            .increment(&counter(), "count", 1, Document::new())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| *c == 6))
            .await
            .unwrap()
            .unwrap();
        assert!(display.is_pulsing());
        let until = display.pulse_until().unwrap();

        eventually(|| !display.is_pulsing()).await;
        assert!(Instant::now() >= until);
        tokio::time::sleep(pulse).await;
        assert!(!display.is_pulsing());
        assert_eq!(display.count(), 6);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_absent_document_keeps_display() {
        let store = Arc::new(MemoryStore::new());
        let display = Arc::new(CounterDisplay::new());
        let stats = Arc::new(ProtocolStats::new());
        let handle = LiveCounter::spawn(
            store.subscribe(&counter()).unwrap(),
            Arc::clone(&display),
            Arc::clone(&stats),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(display.count(), 0);
        assert_eq!(stats.live_updates.value(), 0);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_subscription_error_keeps_last_value() {
        let store = Arc::new(MemoryStore::new());
        store.insert(counter(), doc(json!({"count": 3})));
        let display = Arc::new(CounterDisplay::new());
        let stats = Arc::new(ProtocolStats::new());
        let handle = LiveCounter::spawn(
            store.subscribe(&counter()).unwrap(),
            Arc::clone(&display),
            Arc::clone(&stats),
        );

        eventually(|| display.count() == 3).await;
        store.push_error(&counter(), "permission denied");
        eventually(|| stats.subscription_errors.value() == 1).await;
        assert_eq!(display.count(), 3);

        store.insert(counter(), doc(json!({"count": "garbage"})));
        eventually(|| stats.subscription_errors.value() == 2).await;
        assert_eq!(display.count(), 3);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let store = Arc::new(MemoryStore::new());
        let handle = LiveCounter::spawn(
            store.subscribe(&counter()).unwrap(),
            Arc::new(CounterDisplay::new()),
            Arc::new(ProtocolStats::new()),
        );
        assert_eq!(store.subscriber_count(&counter()), 1);

        drop(handle);
        eventually(|| store.subscriber_count(&counter()) == 0).await;
    }

    #[tokio::test]
    async fn test_task_ends_when_stream_closes() {
        let (sink, subscription) = crate::store::channel(counter());
        let handle = LiveCounter::spawn(
            subscription,
            Arc::new(CounterDisplay::new()),
            Arc::new(ProtocolStats::new()),
        );
        drop(sink);
        eventually(|| handle.is_finished()).await;
    }
}
