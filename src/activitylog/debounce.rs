// Per-resource write-buffer debouncer for activity batches — §4.H step 4.
//
// A simpler sibling of `crate::debounce::SpaceDebouncer`: instead of
// re-running a caller-supplied trigger closure, this accumulates the
// actual payloads (activities) emitted against a key while the buffer is
// open, then hands the whole batch to the sink exactly once when the
// single write-buffer timer fires. Grounded on
// `services/activitylog/pkg/service/service.go`'s `Debouncer` (a
// `sync.Map` of pending `queueItem{activities, timer}` plus an
// in-progress guard per key) — reshaped around `tokio::time::sleep`
// tasks rather than `time.AfterFunc`.

use crate::resource::Activity;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Sink = Arc<dyn Fn(String, Vec<Activity>) -> BoxFuture + Send + Sync>;

struct PendingBatch {
    activities: Mutex<Vec<Activity>>,
    generation: AtomicU64,
}

/// Collapses concurrent `debounce(key, activity)` calls into a single
/// sink invocation per `after` window of quiescence, carrying the
/// accumulated batch rather than just re-running a trigger.
pub struct ActivityDebouncer {
    after: Duration,
    sink: Sink,
    pending: DashMap<String, Arc<PendingBatch>>,
    in_progress: DashMap<String, ()>,
}

impl ActivityDebouncer {
    pub fn new(after: Duration, sink: Sink) -> Arc<Self> {
        Arc::new(Self {
            after,
            sink,
            pending: DashMap::new(),
            in_progress: DashMap::new(),
        })
    }

    /// Queue `activity` under `key`. `after == 0` bypasses buffering
    /// entirely and fires synchronously, mirroring the source's `if
    /// d.after == 0` fast path (`d.f(id, []RawActivity{ra})` called
    /// inline, not via a goroutine).
    pub async fn debounce(self: &Arc<Self>, key: String, activity: Activity) {
        if self.after.is_zero() {
            (self.sink)(key, vec![activity]).await;
            return;
        }

        if let Some(entry) = self.pending.get(&key) {
            entry.activities.lock().unwrap().push(activity);
            entry.generation.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let entry = Arc::new(PendingBatch {
            activities: Mutex::new(vec![activity]),
            generation: AtomicU64::new(0),
        });
        self.pending.insert(key.clone(), entry.clone());

        let me = Arc::clone(self);
        tokio::spawn(async move {
            let mut seen_generation = entry.generation.load(Ordering::SeqCst);
            loop {
                tokio::time::sleep(me.after).await;
                let current_generation = entry.generation.load(Ordering::SeqCst);
                if current_generation != seen_generation {
                    seen_generation = current_generation;
                    continue;
                }
                break;
            }
            me.fire(key).await;
        });
    }

    async fn fire(self: Arc<Self>, key: String) {
        loop {
            if self.in_progress.contains_key(&key) {
                tokio::time::sleep(self.after).await;
                continue;
            }
            break;
        }

        let Some((_, entry)) = self.pending.remove(&key) else {
            return;
        };
        self.in_progress.insert(key.clone(), ());
        let activities = std::mem::take(&mut *entry.activities.lock().unwrap());
        (self.sink)(key.clone(), activities).await;
        self.in_progress.remove(&key);
    }
}
