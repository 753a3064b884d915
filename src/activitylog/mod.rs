// Activity-log service — §3 / §4.H.
//
// A secondary, append-style log of activities per resource, propagated
// up the parent chain, with write-buffer debouncing, a size-capped
// eviction policy, and a TTL parent-id cache. Grounded on
// `examples/original_source/services/activitylog/pkg/service/service.go`
// for the debounce/parent-walk control flow and
// `.../migrations.go` for the composite-key format (see DESIGN.md Open
// Question 4 for why the composite scheme wins over `service.go`'s own
// simpler single-key variant).

pub mod debounce;
pub mod migration;
pub mod store;

use crate::contracts::{GetResource, ResourceInfo, ResourceReference};
use crate::errors::{Error, Result};
use crate::metrics::SearchMetrics;
use crate::resource::{Activity, ResourceId};
use chrono::{DateTime, Utc};
use debounce::ActivityDebouncer;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::KeyValueStore;
use tokio::sync::RwLock;
use tracing::warn;

/// Default cap on activities retained per resource (§3).
pub const DEFAULT_CAP: usize = 6000;
/// Default write-buffer debounce window (§4.H step 4).
pub const DEFAULT_WRITE_BUFFER: Duration = Duration::from_millis(100);
/// Default TTL for the parent-id cache (§4.H step 3).
pub const DEFAULT_PARENT_CACHE_TTL: Duration = Duration::from_secs(30);

/// A single parsed `<prefix>.<count>.<nanos>` batch key.
struct BatchKey {
    key: String,
    count: usize,
    nanos: i64,
}

fn parse_batch_suffix(key: &str, prefix: &str) -> Option<BatchKey> {
    let suffix = key.strip_prefix(prefix)?;
    let (count, nanos) = suffix.split_once('.')?;
    Some(BatchKey {
        key: key.to_string(),
        count: count.parse().ok()?,
        nanos: nanos.parse().ok()?,
    })
}

struct ParentCacheEntry {
    parent_id: ResourceId,
    expires_at: Instant,
}

/// TTL-bounded cache from resource id to its direct parent id (§4.H step 3).
struct ParentCache {
    ttl: Duration,
    entries: RwLock<std::collections::HashMap<ResourceId, ParentCacheEntry>>,
}

impl ParentCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(std::collections::HashMap::new()),
        }
    }

    async fn get(&self, id: &ResourceId) -> Option<ResourceId> {
        let entries = self.entries.read().await;
        entries.get(id).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.parent_id.clone())
            } else {
                None
            }
        })
    }

    async fn insert(&self, id: ResourceId, parent_id: ResourceId) {
        self.entries.write().await.insert(
            id,
            ParentCacheEntry {
                parent_id,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn remove(&self, id: &ResourceId) {
        self.entries.write().await.remove(id);
    }
}

pub struct ActivityLogConfig {
    pub cap: usize,
    pub write_buffer: Duration,
    pub parent_cache_ttl: Duration,
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            cap: DEFAULT_CAP,
            write_buffer: DEFAULT_WRITE_BUFFER,
            parent_cache_ttl: DEFAULT_PARENT_CACHE_TTL,
        }
    }
}

/// Per-resource activity log with ancestry propagation (§4.H).
///
/// # Invariants
/// - `Activities` takes a read lock; writes (`storeActivity`,
///   `RemoveActivities`, `RemoveResource`) take a write lock; cap
///   enforcement runs under the write lock (§5).
pub struct ActivityLogService {
    store: Arc<dyn KeyValueStore>,
    resolver: Arc<dyn GetResource>,
    metrics: Arc<SearchMetrics>,
    cap: usize,
    parent_cache: ParentCache,
    debouncer: Arc<ActivityDebouncer>,
    lock: RwLock<()>,
}

impl ActivityLogService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        resolver: Arc<dyn GetResource>,
        metrics: Arc<SearchMetrics>,
        config: ActivityLogConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let sink_metrics = metrics.clone();
            let sink: debounce::Sink = Arc::new(move |key, activities| {
                let weak = weak.clone();
                let metrics = sink_metrics.clone();
                Box::pin(async move {
                    let Some(me) = weak.upgrade() else { return };
                    let Ok(resource_id) = ResourceId::parse(&key) else {
                        warn!(key = %key, "activity batch sink: key is not a valid resource id");
                        return;
                    };
                    match me.store_batch(&resource_id, activities).await {
                        Ok(()) => metrics.activitylog_write("ok"),
                        Err(e) => {
                            warn!(error = %e, "activity batch write failed");
                            metrics.activitylog_write("error");
                        }
                    }
                })
            });

            Self {
                store,
                resolver,
                metrics,
                cap: config.cap.max(1),
                parent_cache: ParentCache::new(config.parent_cache_ttl),
                debouncer: ActivityDebouncer::new(config.write_buffer, sink),
                lock: RwLock::new(()),
            }
        })
    }

    /// Resolve `reference` to a concrete resource id, consulting the
    /// external `GetResource` contract when only a path is given.
    async fn resolve_id(&self, reference: &ResourceReference) -> Result<ResourceId> {
        if reference.path.is_some() {
            let info: ResourceInfo = self.resolver.get_resource(reference).await?;
            return Ok(info.id);
        }
        reference
            .resource_id
            .clone()
            .ok_or_else(|| Error::Validation("reference has neither id nor path".into()))
    }

    /// §4.H `AddActivity`: emit an activity at `reference` and walk up
    /// the parent chain, emitting one per ancestor until the space root.
    pub async fn add_activity(
        &self,
        reference: ResourceReference,
        parent_hint: Option<ResourceId>,
        event_id: String,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let current_id = self.resolve_id(&reference).await?;
        self.walk_ancestry(current_id, 0, parent_hint, event_id, ts).await
    }

    /// Emit an activity at `start_id` (depth `start_depth`) and every
    /// ancestor above it up to and including the space root, incrementing
    /// depth once per hop. `parent_hint`, if given, short-circuits the
    /// very first parent lookup only — every hop above that resolves via
    /// the parent-id cache or `GetResource`, same as `add_activity`.
    async fn walk_ancestry(
        &self,
        mut current_id: ResourceId,
        mut depth: u32,
        parent_hint: Option<ResourceId>,
        event_id: String,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let mut parent_hint = parent_hint;

        loop {
            self.debouncer
                .debounce(current_id.to_string(), Activity::new(event_id.clone(), depth, ts))
                .await;

            if current_id.is_space_root() {
                return Ok(());
            }

            let parent_id = if let Some(hint) = parent_hint.take() {
                hint
            } else if let Some(cached) = self.parent_cache.get(&current_id).await {
                cached
            } else {
                let info = self
                    .resolver
                    .get_resource(&ResourceReference::by_id(current_id.clone()))
                    .await?;
                let parent = info
                    .parent_id
                    .ok_or_else(|| Error::NotFound(format!("no parent for {current_id}")))?;
                self.parent_cache.insert(current_id.clone(), parent.clone()).await;
                parent
            };

            depth += 1;
            current_id = parent_id;
        }
    }

    /// §4.H `AddActivityTrashed`: persists an immediate (non-debounced)
    /// activity at `trashed_id` itself (depth 0), then resumes the
    /// ancestry walk at its former parent starting at depth 1 — the
    /// trashed item's own depth-0 slot is already filled by the direct
    /// write above, so the walk must not revisit it.
    pub async fn add_activity_trashed(
        &self,
        trashed_id: ResourceId,
        reference: ResourceReference,
        parent_hint: Option<ResourceId>,
        event_id: String,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.store_batch(&trashed_id, vec![Activity::new(event_id.clone(), 0, ts)])
            .await?;

        if trashed_id.is_space_root() {
            return Ok(());
        }

        let parent_id = if let Some(hint) = parent_hint {
            hint
        } else if let Some(cached) = self.parent_cache.get(&trashed_id).await {
            cached
        } else {
            let info = self.resolver.get_resource(&reference).await?;
            let parent = info
                .parent_id
                .ok_or_else(|| Error::NotFound(format!("no parent for {trashed_id}")))?;
            self.parent_cache.insert(trashed_id.clone(), parent.clone()).await;
            parent
        };

        self.walk_ancestry(parent_id, 1, None, event_id, ts).await
    }

    /// §4.H `AddSpaceActivity`: one immediate activity at the space root.
    pub async fn add_space_activity(&self, space_root_id: ResourceId, event_id: String, ts: DateTime<Utc>) -> Result<()> {
        self.store_batch(&space_root_id, vec![Activity::new(event_id, 0, ts)])
            .await
    }

    /// Persist `activities` under a fresh composite key for `resource_id`
    /// and run cap enforcement. Used both by the debounce sink and by
    /// the two immediate-write entry points above.
    async fn store_batch(&self, resource_id: &ResourceId, activities: Vec<Activity>) -> Result<()> {
        if activities.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.write().await;

        let prefix = resource_id.to_base32();
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let key = format!("{prefix}.{}.{}", activities.len(), nanos);
        let bytes = rmp_serde::to_vec(&activities)?;
        self.store.put(&key, bytes).await?;

        self.enforce_cap_locked(resource_id).await
    }

    /// §4.H cap enforcement: sum batch sizes (read from the key suffix,
    /// never from decoding values) sorted oldest-first, and delete whole
    /// batches until the resource's total activity count is under `cap`.
    async fn enforce_cap_locked(&self, resource_id: &ResourceId) -> Result<()> {
        let prefix = format!("{}.", resource_id.to_base32());
        let mut batches: Vec<BatchKey> = self
            .store
            .keys_with_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|k| {
                let parsed = parse_batch_suffix(&k, &prefix);
                if parsed.is_none() {
                    warn!(key = %k, "activity log: unparsable batch key, skipping in cap enforcement");
                }
                parsed
            })
            .collect();
        batches.sort_by_key(|b| b.nanos);

        let mut total: usize = batches.iter().map(|b| b.count).sum();
        let mut idx = 0;
        while total > self.cap && idx < batches.len() {
            let batch = &batches[idx];
            self.store.delete(&batch.key).await?;
            total = total.saturating_sub(batch.count);
            idx += 1;
            self.metrics.activitylog_eviction("ok");
        }
        Ok(())
    }

    /// §4.H `Activities`: collect all batches for `resource_id`, decoded
    /// oldest-first, flattened in storage order.
    pub async fn activities(&self, resource_id: &ResourceId) -> Result<Vec<Activity>> {
        let _guard = self.lock.read().await;
        self.activities_locked(resource_id).await
    }

    async fn activities_locked(&self, resource_id: &ResourceId) -> Result<Vec<Activity>> {
        let prefix = format!("{}.", resource_id.to_base32());
        let mut batches: Vec<BatchKey> = self
            .store
            .keys_with_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|k| parse_batch_suffix(&k, &prefix))
            .collect();
        batches.sort_by_key(|b| b.nanos);

        let mut all = Vec::new();
        for batch in batches {
            let Some(bytes) = self.store.get(&batch.key).await? else {
                continue;
            };
            match decode_activities(&bytes) {
                Some(mut activities) => all.append(&mut activities),
                None => warn!(key = %batch.key, "activity log: batch value is neither msgpack nor JSON, skipping"),
            }
        }
        Ok(all)
    }

    /// §4.H `RemoveActivities`: rewrite the resource's full activity
    /// history (across however many physical batch keys it spans) as a
    /// single fresh batch omitting the matching event ids.
    pub async fn remove_activities(&self, resource_id: &ResourceId, event_ids: &HashSet<String>) -> Result<()> {
        let _guard = self.lock.write().await;

        let remaining: Vec<Activity> = self
            .activities_locked(resource_id)
            .await?
            .into_iter()
            .filter(|a| !event_ids.contains(&a.event_id))
            .collect();

        let prefix = format!("{}.", resource_id.to_base32());
        for key in self.store.keys_with_prefix(&prefix).await? {
            self.store.delete(&key).await?;
        }

        if !remaining.is_empty() {
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let key = format!("{prefix}{}.{}", remaining.len(), nanos);
            self.store.put(&key, rmp_serde::to_vec(&remaining)?).await?;
        }
        Ok(())
    }

    /// §4.H `RemoveResource`: delete every batch for `resource_id`.
    pub async fn remove_resource(&self, resource_id: &ResourceId) -> Result<()> {
        let _guard = self.lock.write().await;
        let prefix = format!("{}.", resource_id.to_base32());
        for key in self.store.keys_with_prefix(&prefix).await? {
            self.store.delete(&key).await?;
        }
        self.parent_cache.remove(resource_id).await;
        Ok(())
    }

    /// Run the one-time legacy migration (§4.H / §9), idempotent.
    pub async fn run_migration(&self) -> Result<migration::MigrationReport> {
        let report = migration::run(self.store.as_ref()).await?;
        for _ in 0..report.skipped {
            self.metrics.migration_skipped_key("unparsable");
        }
        Ok(report)
    }
}

fn decode_activities(bytes: &[u8]) -> Option<Vec<Activity>> {
    rmp_serde::from_slice(bytes)
        .ok()
        .or_else(|| serde_json::from_slice(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::fakes::FakeResourceResolver;
    use crate::activitylog::store::InMemoryStore;
    use tokio::time::advance;

    fn rid(opaque: &str) -> ResourceId {
        ResourceId::new("storage1", "space1", opaque)
    }

    async fn new_service(cap: usize) -> (Arc<ActivityLogService>, Arc<FakeResourceResolver>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let resolver = Arc::new(FakeResourceResolver::new());
        let metrics = Arc::new(SearchMetrics::new().unwrap());
        let svc = ActivityLogService::new(
            store,
            resolver.clone() as Arc<dyn GetResource>,
            metrics,
            ActivityLogConfig {
                cap,
                write_buffer: Duration::from_millis(0),
                parent_cache_ttl: Duration::from_secs(30),
            },
        );
        (svc, resolver)
    }

    #[tokio::test]
    async fn add_activity_walks_to_space_root() {
        let (svc, resolver) = new_service(DEFAULT_CAP).await;
        let root = rid("space1");
        let child = rid("child");
        let grandchild = rid("grandchild");
        resolver.set_parent(child.clone(), Some(root.clone())).await;
        resolver.set_parent(grandchild.clone(), Some(child.clone())).await;

        svc.add_activity(
            ResourceReference::by_id(grandchild.clone()),
            None,
            "ev1".to_string(),
            Utc::now(),
        )
        .await
        .unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let grandchild_activities = svc.activities(&grandchild).await.unwrap();
        assert_eq!(grandchild_activities.len(), 1);
        assert_eq!(grandchild_activities[0].depth, 0);

        let child_activities = svc.activities(&child).await.unwrap();
        assert_eq!(child_activities[0].depth, 1);

        let root_activities = svc.activities(&root).await.unwrap();
        assert_eq!(root_activities[0].depth, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cap_enforcement_keeps_only_the_most_recent_activities() {
        let (svc, _resolver) = new_service(4).await;
        let root = rid("space1");

        for i in 0..5 {
            svc.add_activity(
                ResourceReference::by_id(root.clone()),
                None,
                format!("ev{i}"),
                Utc::now(),
            )
            .await
            .unwrap();
            advance(Duration::from_millis(1)).await;
            tokio::task::yield_now().await;
        }

        let activities = svc.activities(&root).await.unwrap();
        assert_eq!(activities.len(), 4);
        let ids: Vec<&str> = activities.iter().map(|a| a.event_id.as_str()).collect();
        assert_eq!(ids, vec!["ev1", "ev2", "ev3", "ev4"]);
    }

    #[tokio::test]
    async fn remove_activities_omits_matching_event_ids() {
        let (svc, _resolver) = new_service(DEFAULT_CAP).await;
        let root = rid("space1");
        svc.add_activity(ResourceReference::by_id(root.clone()), None, "ev1".to_string(), Utc::now())
            .await
            .unwrap();
        svc.add_activity(ResourceReference::by_id(root.clone()), None, "ev2".to_string(), Utc::now())
            .await
            .unwrap();

        let mut to_remove = HashSet::new();
        to_remove.insert("ev1".to_string());
        svc.remove_activities(&root, &to_remove).await.unwrap();

        let remaining = svc.activities(&root).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_id, "ev2");
    }

    #[tokio::test]
    async fn remove_resource_deletes_every_batch() {
        let (svc, _resolver) = new_service(DEFAULT_CAP).await;
        let root = rid("space1");
        svc.add_activity(ResourceReference::by_id(root.clone()), None, "ev1".to_string(), Utc::now())
            .await
            .unwrap();
        svc.remove_resource(&root).await.unwrap();
        assert_eq!(svc.activities(&root).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn add_activity_trashed_stores_immediate_plus_ancestry() {
        let (svc, resolver) = new_service(DEFAULT_CAP).await;
        let root = rid("space1");
        let trashed = rid("trashed");
        resolver.set_parent(trashed.clone(), Some(root.clone())).await;

        svc.add_activity_trashed(
            trashed.clone(),
            ResourceReference {
                resource_id: Some(trashed.clone()),
                path: None,
            },
            Some(root.clone()),
            "ev-trash".to_string(),
            Utc::now(),
        )
        .await
        .unwrap();

        let trashed_activities = svc.activities(&trashed).await.unwrap();
        assert_eq!(trashed_activities.len(), 1);
        let root_activities = svc.activities(&root).await.unwrap();
        assert_eq!(root_activities.len(), 1);
        assert_eq!(root_activities[0].depth, 1);
    }

    #[tokio::test]
    async fn migration_runs_through_the_service() {
        let (svc, _resolver) = new_service(DEFAULT_CAP).await;
        let report = svc.run_migration().await.unwrap();
        assert_eq!(report, migration::MigrationReport::default());
        let second = svc.run_migration().await.unwrap();
        assert_eq!(second, migration::MigrationReport::default());
    }

    proptest::proptest! {
        /// §3/§4.H: the cap is a hard ceiling on activities retained per
        /// resource. As long as no single batch write exceeds the cap on
        /// its own, eviction always brings the stored total back under
        /// the cap after every write, regardless of how many batches or
        /// what order their sizes arrive in.
        #[test]
        fn cap_is_never_exceeded_across_arbitrary_batch_sequences(
            cap in 5usize..30,
            batch_sizes in proptest::collection::vec(1usize..5, 1..12),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let stored_len = rt.block_on(async {
                let (svc, _resolver) = new_service(cap).await;
                let resource = rid("capped");
                for (i, size) in batch_sizes.iter().enumerate() {
                    let activities = (0..*size)
                        .map(|j| Activity::new(format!("ev-{i}-{j}"), 0, Utc::now()))
                        .collect();
                    svc.store_batch(&resource, activities).await.unwrap();
                }
                svc.activities(&resource).await.unwrap().len()
            });
            proptest::prop_assert!(stored_len <= cap);
        }
    }
}
