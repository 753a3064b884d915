// External collaborator contracts — §1.
//
// The search-indexing core treats user/identity resolution, the object
// storage layer, and the transport surface as collaborators it only
// consumes narrow contracts from. This module carries the one contract
// this crate actually calls into: `GetResource(Reference) -> ResourceInfo`,
// resolved by the underlying object/metadata storage the core does not
// own. Grounded on this crate's old `Storage`/`Index` trait shape (a
// single async trait, doc-commented pre/postconditions, fallible
// construction) — generalized here from a document-store interface to
// the one read-only external lookup §4.H's activity-log walk depends on.

use crate::errors::Result;
use crate::resource::{ResourceId, SpacePath};
use async_trait::async_trait;

/// A reference to a resource, either by id directly or by a path that
/// must be resolved. Mirrors the CS3-style `Reference{ResourceId, Path}`
/// shape consumed throughout §4.H.
#[derive(Debug, Clone)]
pub struct ResourceReference {
    pub resource_id: Option<ResourceId>,
    pub path: Option<SpacePath>,
}

impl ResourceReference {
    pub fn by_id(id: ResourceId) -> Self {
        Self {
            resource_id: Some(id),
            path: None,
        }
    }

    pub fn by_path(id: ResourceId, path: SpacePath) -> Self {
        Self {
            resource_id: Some(id),
            path: Some(path),
        }
    }
}

/// The subset of resource metadata the activity-log parent-walk needs:
/// the resource's own id and its direct parent, if any.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub parent_id: Option<ResourceId>,
}

/// The external `GetResource(Reference) -> ResourceInfo` contract (§1).
/// In production this is backed by the object/metadata storage service;
/// here it is an injected collaborator so the activity log and dispatcher
/// can be tested against fakes (§10.O).
///
/// # Preconditions
/// - `reference.resource_id` or `reference.path` is set (callers never
///   pass a fully empty reference).
///
/// # Postconditions
/// - On success, `ResourceInfo.parent_id` is `None` only when the
///   resolved resource is its own space root.
#[async_trait]
pub trait GetResource: Send + Sync {
    async fn get_resource(&self, reference: &ResourceReference) -> Result<ResourceInfo>;
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use crate::errors::Error;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// An in-memory `GetResource` fake keyed by resource id, for tests
    /// exercising the activity-log parent walk without a real storage
    /// backend.
    #[derive(Default)]
    pub struct FakeResourceResolver {
        parents: RwLock<HashMap<ResourceId, Option<ResourceId>>>,
    }

    impl FakeResourceResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set_parent(&self, id: ResourceId, parent: Option<ResourceId>) {
            self.parents.write().await.insert(id, parent);
        }
    }

    #[async_trait]
    impl GetResource for FakeResourceResolver {
        async fn get_resource(&self, reference: &ResourceReference) -> Result<ResourceInfo> {
            let id = reference
                .resource_id
                .clone()
                .ok_or_else(|| Error::Validation("reference has no resource id".into()))?;
            let parents = self.parents.read().await;
            let parent_id = parents
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            Ok(ResourceInfo { id, parent_id })
        }
    }
}
