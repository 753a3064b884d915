// Per-space debouncer — §4.F.
//
// Grounded on `services/search/pkg/search/debouncer.go`'s two-timer
// control flow (`sync.Mutex` -> generation counter, `sync.Map` ->
// `dashmap`), reshaped around `tokio::time::sleep`-driven tasks rather
// than `time.AfterFunc` callbacks.

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Trigger = Arc<dyn Fn(String) -> BoxFuture + Send + Sync>;
pub type AckFn = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

pub const DEFAULT_AFTER: Duration = Duration::from_millis(100);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingEntry {
    generation: AtomicU64,
    deadline: Instant,
}

/// Collapses bursts of per-space indexing requests into at most one
/// callback per `after` window of quiescence, with a hard ceiling of
/// `timeout` even under continuous re-debounce.
pub struct SpaceDebouncer {
    after: Duration,
    timeout: Duration,
    trigger: Trigger,
    pending: DashMap<String, Arc<PendingEntry>>,
    in_progress: DashMap<String, ()>,
}

impl SpaceDebouncer {
    pub fn new(after: Duration, timeout: Duration, trigger: Trigger) -> Arc<Self> {
        Arc::new(Self {
            after,
            timeout,
            trigger,
            pending: DashMap::new(),
            in_progress: DashMap::new(),
        })
    }

    /// Debounce a trigger for `space`. If a pending item already exists,
    /// `ack` fires immediately (the earlier trigger will process this
    /// space) and the quiet timer resets; otherwise a new pending item is
    /// scheduled.
    pub fn debounce(self: &Arc<Self>, space: String, ack: Option<AckFn>) {
        if let Some(entry) = self.pending.get(&space) {
            entry.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(ack) = ack {
                tokio::spawn(ack());
            }
            return;
        }

        let entry = Arc::new(PendingEntry {
            generation: AtomicU64::new(0),
            deadline: Instant::now() + self.timeout,
        });
        self.pending.insert(space.clone(), entry.clone());

        let me = Arc::clone(self);
        tokio::spawn(async move {
            let mut seen_generation = entry.generation.load(Ordering::SeqCst);
            loop {
                let now = Instant::now();
                if now >= entry.deadline {
                    break;
                }
                let remaining_deadline = entry.deadline - now;
                let sleep_for = me.after.min(remaining_deadline);
                tokio::time::sleep(sleep_for).await;

                let current_generation = entry.generation.load(Ordering::SeqCst);
                if Instant::now() >= entry.deadline {
                    debug!(space = %space, "debounce deadline reached, firing");
                    break;
                }
                if current_generation != seen_generation {
                    seen_generation = current_generation;
                    continue;
                }
                break;
            }
            me.fire(space, ack).await;
        });
    }

    async fn fire(self: Arc<Self>, space: String, ack: Option<AckFn>) {
        loop {
            if self.in_progress.contains_key(&space) {
                // Another run is in flight: reschedule after it finishes
                // rather than running concurrently for the same space.
                tokio::time::sleep(self.after).await;
                continue;
            }
            self.pending.remove(&space);
            self.in_progress.insert(space.clone(), ());
            break;
        }

        (self.trigger)(space.clone()).await;
        self.in_progress.remove(&space);

        if let Some(ack) = ack {
            tokio::spawn(async move {
                ack().await;
            });
        } else {
            debug!(space = %space, "debounce trigger completed with no ack");
        }
    }

    pub fn is_in_progress(&self, space: &str) -> bool {
        self.in_progress.contains_key(space)
    }

    pub fn has_pending(&self, space: &str) -> bool {
        self.pending.contains_key(space)
    }
}

pub fn log_ack_error(result: Result<(), String>) {
    if let Err(e) = result {
        warn!("error while acknowledging event: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn counting_trigger(counter: Arc<AtomicUsize>) -> Trigger {
        Arc::new(move |_space: String| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_debounce_calls_fires_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let debouncer = SpaceDebouncer::new(
            Duration::from_millis(50),
            Duration::from_secs(5),
            counting_trigger(counter.clone()),
        );

        for _ in 0..5 {
            debouncer.debounce("space1".to_string(), None);
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_redebounce_still_fires_by_deadline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let debouncer = SpaceDebouncer::new(
            Duration::from_millis(100),
            Duration::from_millis(250),
            counting_trigger(counter.clone()),
        );

        for _ in 0..6 {
            debouncer.debounce("space1".to_string(), None);
            tokio::time::advance(Duration::from_millis(50)).await;
        }
        tokio::time::advance(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;

        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acks_fire_for_every_debounce_call() {
        let ack_count = Arc::new(AtomicUsize::new(0));
        let debouncer = SpaceDebouncer::new(
            Duration::from_millis(50),
            Duration::from_secs(5),
            counting_trigger(Arc::new(AtomicUsize::new(0))),
        );

        let notify = Arc::new(Notify::new());
        for _ in 0..3 {
            let ack_count = Arc::clone(&ack_count);
            let ack: AckFn = Arc::new(move || {
                let ack_count = Arc::clone(&ack_count);
                Box::pin(async move {
                    ack_count.fetch_add(1, Ordering::SeqCst);
                })
            });
            debouncer.debounce("space1".to_string(), Some(ack));
            tokio::time::advance(Duration::from_millis(5)).await;
        }
        let _ = &notify;
        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        assert_eq!(ack_count.load(Ordering::SeqCst), 3);
    }
}
