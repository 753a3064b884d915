// Engine interface & backends — §4.D.
//
// Mirrors the `Storage`/`Index` trait shape in `contracts.rs`: documented
// pre/postconditions as doc-comments, fallible returns rather than panics.

pub mod embedded;
pub mod remote;
pub mod traced;

use crate::errors::Result;
use crate::resource::{Resource, ResourceId, SpacePath};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// All hits up to this hard cap — Open Question 1 in DESIGN.md.
pub const ALL_HITS_CAP: usize = 1000;
/// `page_size == 0` means this default.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// A search scope restricting results to a subtree.
#[derive(Debug, Clone)]
pub struct SearchReference {
    pub root_id: ResourceId,
    /// Relative path within the space; `.` is the root itself.
    pub path: SpacePath,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub reference: Option<SearchReference>,
    /// `-1` = all up to `ALL_HITS_CAP`; `0` = `DEFAULT_PAGE_SIZE`; else honoured.
    pub page_size: i32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            reference: None,
            page_size: 0,
        }
    }

    pub fn reference(mut self, reference: SearchReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Resolve `page_size` to an effective hit count per §4.D.
    pub fn effective_page_size(&self) -> usize {
        match self.page_size {
            -1 => ALL_HITS_CAP,
            0 => DEFAULT_PAGE_SIZE,
            n if n > 0 => n as usize,
            _ => DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub score: f32,
    pub entity: Resource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub matches: Vec<Match>,
    pub total_matches: i32,
}

/// A search/index backend: embedded single-node or remote cluster.
///
/// # Invariants
/// - Move/Delete/Restore/Purge never partially apply across descendants:
///   either the whole subtree mutation succeeds or the caller sees an
///   error with no applied change.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run a query against the index.
    ///
    /// # Preconditions
    /// - `request.query` is raw KQL text; implementors compile it with
    ///   `crate::kql::compile` before evaluating or forwarding it.
    ///
    /// # Postconditions
    /// - Highlighting is enabled on `Content` with `<mark>…</mark>` tags.
    /// - When `request.reference` is set, hits are filtered to `RootID ==
    ///   reference.root_id` and post-filtered to paths equal to or a
    ///   descendant of `reference.path`.
    async fn search(&self, request: SearchRequest) -> Result<SearchResult>;

    /// Index (or reindex) a resource.
    async fn upsert(&self, resource: &Resource) -> Result<()>;

    /// Rewrite `id`'s path (and all descendants') to live under
    /// `new_parent_id` at `new_path`.
    ///
    /// # Postconditions
    /// - `id`'s own `ParentID`/`Name`/`Path` reflect the move.
    /// - Every descendant's `Path` is rewritten preserving its suffix
    ///   relative to the old root path.
    async fn move_resource(
        &self,
        id: &ResourceId,
        new_parent_id: &ResourceId,
        new_path: &SpacePath,
    ) -> Result<()>;

    /// Mark `id` and all descendants `Deleted = true`.
    async fn delete(&self, id: &ResourceId) -> Result<()>;

    /// Mark `id` and all descendants `Deleted = false`.
    async fn restore(&self, id: &ResourceId) -> Result<()>;

    /// Permanently remove `id` and all descendants from the index.
    async fn purge(&self, id: &ResourceId) -> Result<()>;

    /// Count of non-deleted documents in the index.
    async fn doc_count(&self) -> Result<u64>;
}
