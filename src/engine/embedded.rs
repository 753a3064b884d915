// EmbeddedEngine — an in-process single-node backend.
//
// Structural idiom (inverted index + append-only WAL for durability)
// grounded on `trigram_index.rs`'s `RwLock<HashMap<...>>` + `wal_writer`
// shape, rebuilt from scratch against the Resource schema of §3 rather
// than `trigram_index.rs`'s own Document/Query contracts.

use crate::engine::{Engine, Match, SearchRequest, SearchResult};
use crate::errors::{Error, Result};
use crate::kql;
use crate::resource::{Resource, ResourceId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A single WAL record: enough to replay the mutation on restart.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
enum WalEntry {
    Upsert(Resource),
    Delete(String),
    Restore(String),
    Purge(String),
}

pub struct EmbeddedEngine {
    documents: RwLock<HashMap<ResourceId, Resource>>,
    wal_path: Option<PathBuf>,
    wal_writer: RwLock<Option<fs::File>>,
}

impl EmbeddedEngine {
    /// An in-memory engine with no durability — used in tests.
    pub fn in_memory() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            wal_path: None,
            wal_writer: RwLock::new(None),
        }
    }

    /// An engine that appends every mutation to `wal_path`, replaying it
    /// on open if the file already exists.
    pub async fn open(wal_path: PathBuf) -> Result<Self> {
        let mut documents = HashMap::new();
        if wal_path.exists() {
            let contents = fs::read_to_string(&wal_path)
                .await
                .map_err(|e| Error::Transport(e.into()))?;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WalEntry>(line) {
                    Ok(WalEntry::Upsert(r)) => {
                        documents.insert(r.id.clone(), r);
                    }
                    Ok(WalEntry::Delete(id)) => {
                        if let Some(r) = documents.get_mut(&ResourceId::parse(&id)?) {
                            r.deleted = true;
                        }
                    }
                    Ok(WalEntry::Restore(id)) => {
                        if let Some(r) = documents.get_mut(&ResourceId::parse(&id)?) {
                            r.deleted = false;
                        }
                    }
                    Ok(WalEntry::Purge(id)) => {
                        documents.remove(&ResourceId::parse(&id)?);
                    }
                    Err(e) => warn!("skipping malformed WAL line: {e}"),
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .await
            .map_err(|e| Error::Transport(e.into()))?;

        Ok(Self {
            documents: RwLock::new(documents),
            wal_path: Some(wal_path),
            wal_writer: RwLock::new(Some(file)),
        })
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<()> {
        if self.wal_path.is_none() {
            return Ok(());
        }
        let mut guard = self.wal_writer.write().await;
        if let Some(file) = guard.as_mut() {
            let mut line = serde_json::to_string(entry)?;
            line.push('\n');
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| Error::Transport(e.into()))?;
            file.flush().await.map_err(|e| Error::Transport(e.into()))?;
        }
        Ok(())
    }

    fn is_descendant_or_self(resource: &Resource, id: &ResourceId) -> bool {
        &resource.id == id
    }
}

#[async_trait]
impl Engine for EmbeddedEngine {
    async fn search(&self, request: SearchRequest) -> Result<SearchResult> {
        let builder = kql::compile(&request.query)?;
        let root = crate::dsl::RootQuery::new(builder).options(crate::dsl::RootQueryOptions {
            highlight: Some(crate::dsl::RootQueryHighlight::content_marks()),
        });
        let query_json = root.to_json()?;
        let query_body = query_json.get("query").cloned().unwrap_or(Value::Null);

        let docs = self.documents.read().await;
        let mut matches: Vec<Match> = Vec::new();

        for resource in docs.values() {
            if resource.deleted {
                continue;
            }
            if let Some(reference) = &request.reference {
                if resource.root_id != reference.root_id {
                    continue;
                }
                if !resource.path.is_self_or_descendant_of(&reference.path)
                    && !reference.path.is_root()
                {
                    continue;
                }
            }
            if evaluate(&query_body, resource) {
                matches.push(Match {
                    score: 1.0,
                    entity: resource.clone(),
                });
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        let total_matches = matches.len() as i32;
        matches.truncate(request.effective_page_size());

        debug!(total = total_matches, "embedded search completed");
        Ok(SearchResult {
            matches,
            total_matches,
        })
    }

    async fn upsert(&self, resource: &Resource) -> Result<()> {
        resource.validate_root_invariant()?;
        self.append_wal(&WalEntry::Upsert(resource.clone())).await?;
        self.documents
            .write()
            .await
            .insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn move_resource(
        &self,
        id: &ResourceId,
        new_parent_id: &ResourceId,
        new_path: &crate::resource::SpacePath,
    ) -> Result<()> {
        let mut docs = self.documents.write().await;
        let old_path = docs
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?
            .path
            .clone();

        let mut rewrites = Vec::new();
        for (rid, resource) in docs.iter() {
            if rid == id {
                rewrites.push((rid.clone(), new_path.clone(), Some(new_parent_id.clone())));
            } else if resource.path.is_self_or_descendant_of(&old_path) {
                let rewritten = resource.path.rewrite_prefix(&old_path, new_path)?;
                rewrites.push((rid.clone(), rewritten, None));
            }
        }

        for (rid, path, parent) in rewrites {
            if let Some(resource) = docs.get_mut(&rid) {
                resource.path = path;
                if let Some(p) = parent {
                    resource.parent_id = Some(p);
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        self.append_wal(&WalEntry::Delete(id.to_string())).await?;
        let mut docs = self.documents.write().await;
        let root_path = docs
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?
            .path
            .clone();
        for resource in docs.values_mut() {
            if Self::is_descendant_or_self(resource, id) || resource.path.is_self_or_descendant_of(&root_path) {
                resource.deleted = true;
            }
        }
        Ok(())
    }

    async fn restore(&self, id: &ResourceId) -> Result<()> {
        self.append_wal(&WalEntry::Restore(id.to_string())).await?;
        let mut docs = self.documents.write().await;
        let root_path = docs
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?
            .path
            .clone();
        for resource in docs.values_mut() {
            if Self::is_descendant_or_self(resource, id) || resource.path.is_self_or_descendant_of(&root_path) {
                resource.deleted = false;
            }
        }
        Ok(())
    }

    async fn purge(&self, id: &ResourceId) -> Result<()> {
        self.append_wal(&WalEntry::Purge(id.to_string())).await?;
        let mut docs = self.documents.write().await;
        let root_path = docs
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?
            .path
            .clone();
        docs.retain(|rid, resource| rid != id && !resource.path.is_self_or_descendant_of(&root_path));
        Ok(())
    }

    async fn doc_count(&self) -> Result<u64> {
        let docs = self.documents.read().await;
        Ok(docs.values().filter(|r| !r.deleted).count() as u64)
    }
}

/// Evaluate a rendered DSL query tree against a resource's fields.
/// Structural interpreter, not a scored retrieval model — sufficient
/// for the embedded single-node backend's correctness contract.
fn evaluate(query: &Value, resource: &Resource) -> bool {
    let Some(obj) = query.as_object() else {
        return true;
    };

    if let Some(bool_body) = obj.get("bool") {
        return evaluate_bool(bool_body, resource);
    }
    if let Some(term_body) = obj.get("term") {
        return evaluate_term(term_body, resource);
    }
    if let Some(wildcard_body) = obj.get("wildcard") {
        return evaluate_wildcard(wildcard_body, resource);
    }
    if let Some(phrase_body) = obj.get("match_phrase") {
        return evaluate_match_phrase(phrase_body, resource);
    }
    if let Some(range_body) = obj.get("range") {
        return evaluate_range(range_body, resource);
    }
    if let Some(ids_body) = obj.get("ids") {
        return evaluate_ids(ids_body, resource);
    }
    true
}

fn evaluate_bool(body: &Value, resource: &Resource) -> bool {
    let all = |key: &str| -> bool {
        body.get(key)
            .and_then(Value::as_array)
            .map(|clauses| clauses.iter().all(|c| evaluate(c, resource)))
            .unwrap_or(true)
    };
    let any = |key: &str| -> Option<bool> {
        body.get(key)
            .and_then(Value::as_array)
            .map(|clauses| clauses.iter().any(|c| evaluate(c, resource)))
    };
    let none = |key: &str| -> bool {
        body.get(key)
            .and_then(Value::as_array)
            .map(|clauses| !clauses.iter().any(|c| evaluate(c, resource)))
            .unwrap_or(true)
    };

    all("must") && all("filter") && none("must_not") && any("should").unwrap_or(true)
}

fn field_as_str(resource: &Resource, key: &str) -> Option<String> {
    resource.field(key).and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn evaluate_term(body: &Value, resource: &Resource) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    for (field, spec) in obj {
        let value = spec.get("value").cloned().unwrap_or(Value::Null);
        let Some(actual) = resource.field(field) else {
            return false;
        };
        let case_insensitive = spec
            .get("case_insensitive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let matched = match (&value, &actual) {
            (Value::Bool(want), Value::Bool(got)) => want == got,
            (Value::String(want), Value::String(got)) if case_insensitive => {
                want.to_lowercase() == got.to_lowercase()
            }
            (want, got) => want == got,
        };
        if !matched {
            return false;
        }
    }
    true
}

fn evaluate_wildcard(body: &Value, resource: &Resource) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    for (field, spec) in obj {
        let pattern = spec.get("value").and_then(Value::as_str).unwrap_or("");
        let Some(actual) = field_as_str(resource, field) else {
            return false;
        };
        if !wildcard_match(pattern, &actual) {
            return false;
        }
    }
    true
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(pos) = rest.find(part) {
            rest = &rest[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}

fn evaluate_match_phrase(body: &Value, resource: &Resource) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    for (field, spec) in obj {
        let query = spec.get("query").and_then(Value::as_str).unwrap_or("");
        let Some(actual) = field_as_str(resource, field) else {
            return false;
        };
        if !actual.to_lowercase().contains(&query.to_lowercase()) {
            return false;
        }
    }
    true
}

fn evaluate_range(body: &Value, resource: &Resource) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    for (field, spec) in obj {
        let Some(actual) = field_as_str(resource, field) else {
            return false;
        };
        if let Some(gt) = spec.get("gt").and_then(Value::as_str) {
            if actual.as_str() <= gt {
                return false;
            }
        }
        if let Some(gte) = spec.get("gte").and_then(Value::as_str) {
            if actual.as_str() < gte {
                return false;
            }
        }
        if let Some(lt) = spec.get("lt").and_then(Value::as_str) {
            if actual.as_str() >= lt {
                return false;
            }
        }
        if let Some(lte) = spec.get("lte").and_then(Value::as_str) {
            if actual.as_str() > lte {
                return false;
            }
        }
    }
    true
}

fn evaluate_ids(body: &Value, resource: &Resource) -> bool {
    let Some(values) = body.get("values").and_then(Value::as_array) else {
        return false;
    };
    let id = resource.id.to_string();
    values.iter().any(|v| v.as_str() == Some(id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceType, SpacePath};
    use chrono::Utc;

    fn make_resource(opaque: &str, path: &str, parent: Option<&str>) -> Resource {
        Resource {
            id: ResourceId::new("storage", "space1", opaque),
            root_id: ResourceId::new("storage", "space1", "space1"),
            parent_id: parent.map(|p| ResourceId::new("storage", "space1", p)),
            path: SpacePath::new(path).unwrap(),
            size: 10,
            mtime: Utc::now(),
            mime_type: "text/plain".to_string(),
            resource_type: ResourceType::File,
            tags: Default::default(),
            deleted: false,
            hidden: false,
            content: Some("hello world".to_string()),
            audio: None,
            image: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_search_finds_resource() {
        let engine = EmbeddedEngine::in_memory();
        let r = make_resource("space1", "./", None);
        engine.upsert(&r).await.unwrap();

        let result = engine
            .search(SearchRequest::new("name:space1"))
            .await
            .unwrap();
        assert_eq!(result.total_matches, 1);
    }

    #[tokio::test]
    async fn delete_then_search_excludes_resource() {
        let engine = EmbeddedEngine::in_memory();
        let root = make_resource("space1", "./", None);
        engine.upsert(&root).await.unwrap();
        engine.delete(&root.id).await.unwrap();

        let result = engine
            .search(SearchRequest::new("name:space1"))
            .await
            .unwrap();
        assert_eq!(result.total_matches, 0);
    }

    #[tokio::test]
    async fn move_rewrites_descendant_paths() {
        let engine = EmbeddedEngine::in_memory();
        let root = make_resource("space1", "./", None);
        let a = make_resource("a", "./a", Some("space1"));
        let b = make_resource("b", "./a/b", Some("a"));
        engine.upsert(&root).await.unwrap();
        engine.upsert(&a).await.unwrap();
        engine.upsert(&b).await.unwrap();

        let new_path = SpacePath::new("./x").unwrap();
        engine
            .move_resource(&a.id, &root.id, &new_path)
            .await
            .unwrap();

        let docs = engine.documents.read().await;
        assert_eq!(docs.get(&b.id).unwrap().path.as_str(), "./x/b");
    }

    #[tokio::test]
    async fn purge_is_idempotent_returning_not_found_second_time() {
        let engine = EmbeddedEngine::in_memory();
        let r = make_resource("space1", "./", None);
        engine.upsert(&r).await.unwrap();
        engine.purge(&r.id).await.unwrap();
        assert!(engine.purge(&r.id).await.is_err());
    }

    #[test]
    fn wildcard_matches_prefix_and_suffix() {
        assert!(wildcard_match("rep*", "report"));
        assert!(wildcard_match("*ort", "report"));
        assert!(!wildcard_match("rep*", "document"));
    }
}
