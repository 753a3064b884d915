// RemoteEngine — an HTTP client against a distributed search cluster,
// mirroring the request/response shapes of §4.C (the backend-DSL JSON
// body) and §6's Search RPC contract.

use crate::engine::{Engine, Match, SearchRequest, SearchResult};
use crate::errors::{Error, Result};
use crate::kql;
use crate::resource::{Resource, ResourceId, SpacePath};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct RemoteEngineConfig {
    pub base_url: String,
    pub index_name: String,
    pub request_timeout: Duration,
}

impl Default for RemoteEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            index_name: "resources".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct RemoteEngine {
    client: Client,
    config: RemoteEngineConfig,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    total: HitsTotal,
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct HitsTotal {
    value: i32,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: Resource,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl RemoteEngine {
    pub fn new(config: RemoteEngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Transport(e.into()))?;
        Ok(Self { client, config })
    }

    /// Verify the cluster is reachable and reports a usable status,
    /// bounded to a 5-second window per §4.D.
    pub async fn check_health(&self) -> Result<()> {
        let url = format!("{}/_cluster/health", self.config.base_url);
        let resp = tokio::time::timeout(Duration::from_secs(5), self.client.get(&url).send())
            .await
            .map_err(|_| Error::UnhealthyCluster("health check timed out".to_string()))?
            .map_err(|e| Error::UnhealthyCluster(e.to_string()))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::UnhealthyCluster(e.to_string()))?;
        let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("");
        if status != "green" && status != "yellow" {
            return Err(Error::UnhealthyCluster(format!(
                "cluster status is {status}"
            )));
        }
        Ok(())
    }

    fn doc_url(&self, id: &ResourceId) -> String {
        format!(
            "{}/{}/_doc/{}",
            self.config.base_url,
            self.config.index_name,
            id.to_base32()
        )
    }

    /// Read back `id`'s current `Path`, needed to scope the path-prefix
    /// queries that drive Move/Delete/Restore/Purge (§4.D).
    async fn fetch_path(&self, id: &ResourceId) -> Result<SpacePath> {
        let resp = self
            .client
            .get(self.doc_url(id))
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(id.to_string()));
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| Error::Transport(e.into()))?;
        #[derive(Deserialize)]
        struct GetDoc {
            #[serde(rename = "_source")]
            source: Resource,
        }
        let doc: GetDoc = resp.json().await.map_err(|e| Error::Transport(e.into()))?;
        Ok(doc.source.path)
    }

    /// A query matching the root's own document plus every descendant by
    /// path prefix — the path set that Delete/Restore/Purge mutate as a
    /// single batch (§4.D).
    fn path_set_query(root_path: &SpacePath) -> serde_json::Value {
        let descendant_pattern = if root_path.is_root() {
            "./*".to_string()
        } else {
            format!("{}/*", root_path.as_str())
        };
        json!({
            "bool": {
                "should": [
                    { "term": { "Path": { "value": root_path.as_str() } } },
                    { "wildcard": { "Path": { "value": descendant_pattern } } },
                ],
                "minimum_should_match": 1,
            }
        })
    }

    async fn update_by_query(&self, body: serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/{}/_update_by_query",
            self.config.base_url, self.config.index_name
        );
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?
            .error_for_status()
            .map_err(|e| Error::Transport(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl Engine for RemoteEngine {
    #[instrument(skip(self))]
    async fn search(&self, request: SearchRequest) -> Result<SearchResult> {
        let builder = kql::compile(&request.query)?;
        let mut inner = builder;

        if let Some(reference) = &request.reference {
            let scoped = crate::dsl::BoolQuery::new()
                .must(inner)
                .filter(Box::new(
                    crate::dsl::TermQuery::new("RootID").value(reference.root_id.to_string()),
                ));
            inner = Box::new(scoped);
        }

        let root = crate::dsl::RootQuery::new(inner).options(crate::dsl::RootQueryOptions {
            highlight: Some(crate::dsl::RootQueryHighlight::content_marks()),
        });
        let mut body = root.to_json()?;
        if let serde_json::Value::Object(ref mut obj) = body {
            obj.insert(
                "size".to_string(),
                json!(request.effective_page_size()),
            );
        }

        let url = format!("{}/{}/_search", self.config.base_url, self.config.index_name);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(anyhow::anyhow!(
                "search request failed with status {}",
                resp.status()
            )));
        }

        let parsed: SearchResponseBody = resp
            .json()
            .await
            .map_err(|e| Error::Transport(e.into()))?;

        let matches = parsed
            .hits
            .hits
            .into_iter()
            .filter(|hit| {
                request
                    .reference
                    .as_ref()
                    .map(|r| path_in_scope(&hit.source.path, &r.path))
                    .unwrap_or(true)
            })
            .map(|hit| Match {
                score: hit.score.unwrap_or(0.0),
                entity: hit.source,
            })
            .collect();

        Ok(SearchResult {
            matches,
            total_matches: parsed.hits.total.value,
        })
    }

    async fn upsert(&self, resource: &Resource) -> Result<()> {
        let url = self.doc_url(&resource.id);
        self.client
            .put(&url)
            .json(resource)
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?
            .error_for_status()
            .map_err(|e| Error::Transport(e.into()))?;
        Ok(())
    }

    async fn move_resource(
        &self,
        id: &ResourceId,
        new_parent_id: &ResourceId,
        new_path: &SpacePath,
    ) -> Result<()> {
        let old_path = self.fetch_path(id).await?;
        let body = json!({
            "query": Self::path_set_query(&old_path),
            "script": {
                "source": "if (ctx._source.ID == params.id) { ctx._source.Path = params.new_path; ctx._source.ParentID = params.parent; ctx._source.Name = params.name; } else { ctx._source.Path = params.new_path + ctx._source.Path.substring(params.old_path.length()); }",
                "params": {
                    "id": id.to_string(),
                    "old_path": old_path.as_str(),
                    "new_path": new_path.as_str(),
                    "parent": new_parent_id.to_string(),
                    "name": new_path.name(),
                }
            }
        });
        self.update_by_query(body).await
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        let root_path = self.fetch_path(id).await?;
        let body = json!({
            "query": Self::path_set_query(&root_path),
            "script": { "source": "ctx._source.Deleted = true" }
        });
        self.update_by_query(body).await
    }

    async fn restore(&self, id: &ResourceId) -> Result<()> {
        let root_path = self.fetch_path(id).await?;
        let body = json!({
            "query": Self::path_set_query(&root_path),
            "script": { "source": "ctx._source.Deleted = false" }
        });
        self.update_by_query(body).await
    }

    async fn purge(&self, id: &ResourceId) -> Result<()> {
        let root_path = self.fetch_path(id).await?;
        let url = format!(
            "{}/{}/_delete_by_query",
            self.config.base_url, self.config.index_name
        );
        let body = json!({ "query": Self::path_set_query(&root_path) });
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?
            .error_for_status()
            .map_err(|e| Error::Transport(e.into()))?;
        Ok(())
    }

    async fn doc_count(&self) -> Result<u64> {
        let url = format!("{}/{}/_count", self.config.base_url, self.config.index_name);
        let body = json!({ "query": { "term": { "Deleted": false } } });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.into()))?;
        let parsed: CountResponse = resp.json().await.map_err(|e| Error::Transport(e.into()))?;
        Ok(parsed.count)
    }
}

fn path_in_scope(path: &SpacePath, scope: &SpacePath) -> bool {
    scope.is_root() || path.is_self_or_descendant_of(scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_localhost() {
        let config = RemoteEngineConfig::default();
        assert_eq!(config.base_url, "http://localhost:9200");
    }

    #[test]
    fn path_in_scope_accepts_root_scope() {
        let scope = SpacePath::new("./").unwrap();
        let path = SpacePath::new("./a/b").unwrap();
        assert!(path_in_scope(&path, &scope));
    }
}
