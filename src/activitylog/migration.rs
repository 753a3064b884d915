// Legacy-to-composite-key migration (version 1) — §4.H / §9.
//
// Grounded on
// `examples/original_source/services/activitylog/pkg/service/migrations.go`:
// read a version key, and if absent, walk every key in the store,
// parsing each value as a legacy `{key, data, metadata}` envelope whose
// `data` is a msgpack-or-JSON list of activities, and rewrite it under
// the composite `base32(resourceID).<count>.<nanos>` key this crate's
// `ActivityLogService` otherwise writes. Preserves the original's
// tolerance for malformed keys (log + skip, never fail the overall
// pass) and additionally exposes a skipped-item counter, per the spec's
// explicit ask in §9.

use crate::activitylog::store::KeyValueStore;
use crate::errors::Result;
use crate::resource::{Activity, ResourceId};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

pub const VERSION_KEY: &str = "activitylog.version";
pub const CURRENT_VERSION: &str = "1";

/// Outcome of a migration pass — how many legacy keys were rewritten vs.
/// skipped because they could not be parsed or relocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: usize,
}

/// The go-micro-era envelope legacy keys were stored under.
#[derive(Debug, Deserialize)]
struct LegacyEnvelope {
    key: String,
    data: Vec<u8>,
    #[allow(dead_code)]
    #[serde(default)]
    metadata: serde_json::Value,
}

fn decode_activities(bytes: &[u8]) -> Option<Vec<Activity>> {
    rmp_serde::from_slice(bytes)
        .ok()
        .or_else(|| serde_json::from_slice(bytes).ok())
}

/// Run the migration if (and only if) it has not run before. Idempotent:
/// a second call finds the version marker already set to
/// [`CURRENT_VERSION`] and returns a zeroed report.
pub async fn run(store: &dyn KeyValueStore) -> Result<MigrationReport> {
    if let Some(existing) = store.get(VERSION_KEY).await? {
        let version = String::from_utf8_lossy(&existing).to_string();
        if version == CURRENT_VERSION {
            return Ok(MigrationReport::default());
        }
        warn!(version = %version, "activitylog store has an unexpected version marker, skipping migration");
        return Ok(MigrationReport::default());
    }

    info!("activitylog version key not found, running migration to v1");
    migrate_to_v1(store).await
}

async fn migrate_to_v1(store: &dyn KeyValueStore) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    for key in store.all_keys().await? {
        if key == VERSION_KEY {
            continue;
        }

        let Some(bytes) = store.get(&key).await? else {
            report.skipped += 1;
            continue;
        };

        let Ok(envelope) = serde_json::from_slice::<LegacyEnvelope>(&bytes) else {
            warn!(key = %key, "migrateToV1: value is not a legacy envelope, skipping");
            report.skipped += 1;
            continue;
        };

        let Some(activities) = decode_activities(&envelope.data) else {
            warn!(key = %key, "migrateToV1: envelope data is neither msgpack nor JSON activities, skipping");
            report.skipped += 1;
            continue;
        };

        let Ok(resource_id) = ResourceId::parse(&envelope.key) else {
            warn!(key = %key, envelope_key = %envelope.key, "migrateToV1: envelope key is not a valid resource id, skipping");
            report.skipped += 1;
            continue;
        };

        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let new_key = format!("{}.{}.{}", resource_id.to_base32(), activities.len(), nanos);

        let Ok(new_value) = rmp_serde::to_vec(&activities) else {
            warn!(key = %key, "migrateToV1: failed to re-encode activities, skipping");
            report.skipped += 1;
            continue;
        };

        if store.put(&new_key, new_value).await.is_err() {
            warn!(new_key = %new_key, "migrateToV1: failed to write new key, skipping");
            report.skipped += 1;
            continue;
        }
        if store.delete(&key).await.is_err() {
            warn!(key = %key, "migrateToV1: failed to delete old key after migration");
        }
        report.migrated += 1;
    }

    store
        .put(VERSION_KEY, CURRENT_VERSION.as_bytes().to_vec())
        .await?;

    info!(migrated = report.migrated, skipped = report.skipped, "migration to v1 complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activitylog::store::InMemoryStore;
    use chrono::Utc;

    async fn seed_legacy_key(store: &InMemoryStore, resource_id: &str, activities: &[Activity]) {
        let data = rmp_serde::to_vec(activities).unwrap();
        let envelope = serde_json::json!({
            "key": resource_id,
            "data": data,
            "metadata": {},
        });
        store
            .put(resource_id, serde_json::to_vec(&envelope).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn migrates_legacy_envelopes_to_composite_keys() {
        let store = InMemoryStore::new();
        let activities = vec![Activity::new("ev1", 0, Utc::now())];
        seed_legacy_key(&store, "s$sp!r1", &activities).await;

        let report = run(&store).await.unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(report.skipped, 0);

        let rid = ResourceId::parse("s$sp!r1").unwrap();
        let remaining = store.keys_with_prefix(&format!("{}.", rid.to_base32())).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(store.get("s$sp!r1").await.unwrap().is_none());
        assert_eq!(
            store.get(VERSION_KEY).await.unwrap().unwrap(),
            CURRENT_VERSION.as_bytes().to_vec()
        );
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let store = InMemoryStore::new();
        seed_legacy_key(&store, "s$sp!r1", &[Activity::new("ev1", 0, Utc::now())]).await;
        run(&store).await.unwrap();

        let second = run(&store).await.unwrap();
        assert_eq!(second, MigrationReport::default());
        assert_eq!(
            store.get(VERSION_KEY).await.unwrap().unwrap(),
            CURRENT_VERSION.as_bytes().to_vec()
        );
    }

    #[tokio::test]
    async fn malformed_keys_are_skipped_not_fatal() {
        let store = InMemoryStore::new();
        store.put("garbage", b"not json".to_vec()).await.unwrap();
        seed_legacy_key(&store, "s$sp!r1", &[Activity::new("ev1", 0, Utc::now())]).await;

        let report = run(&store).await.unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(report.skipped, 1);
    }
}
