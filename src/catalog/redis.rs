//! Redis catalog.
//!
//! Keys, under a configurable prefix:
//!
//! ```text
//! {prefix}:projects        hash  name -> uuid
//! {prefix}:project:{uuid}  string, JSON Project
//! ```
//!
//! A name is bound to its uuid with `HSETNX`, so racing creators agree on one
//! id. Commits read the project, merge the release locally and write it back
//! through a compare-and-swap script; a lost race re-reads and retries.
//! Upserts move the project's index entry to its new name in the same script
//! that writes the document, and a commit that finds the document renamed
//! under it resolves the name again.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{debug, instrument, warn};

use super::{Catalog, CatalogError, Result, merge_release};
use crate::config::RedisCatalogConfig;
use crate::types::{Project, ProjectId, Release};

/// Replaces `KEYS[1]` with `ARGV[3]` only if it still holds `ARGV[2]`
/// (or is still absent when `ARGV[1]` is "1"). Returns 1 on success.
const COMPARE_AND_SWAP: &str = r"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current then return 0 end
elseif current ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3])
return 1
";

/// Writes project `ARGV[3]` to `KEYS[1]` and binds name `ARGV[2]` to it in
/// the index `KEYS[2]`, dropping the index entry for the name the stored
/// document had before.
const REPLACE_PROJECT: &str = r"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, doc = pcall(cjson.decode, current)
  if ok and type(doc) == 'table' and type(doc['name']) == 'string'
      and doc['name'] ~= ARGV[2]
      and redis.call('HGET', KEYS[2], doc['name']) == ARGV[3] then
    redis.call('HDEL', KEYS[2], doc['name'])
  end
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2], ARGV[2], ARGV[3])
return 1
";

/// Catalog backed by a Redis server.
pub struct RedisCatalog {
    client: redis::Client,
    prefix: String,
    timeout: Duration,
    max_retries: u32,
    cas: redis::Script,
    replace: redis::Script,
}

impl fmt::Debug for RedisCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCatalog")
            .field("prefix", &self.prefix)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl RedisCatalog {
    /// Creates a catalog client. Does not connect.
    pub fn from_config(config: &RedisCatalogConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CatalogError::Unavailable(format!("invalid redis url: {}", e)))?;

        Ok(RedisCatalog {
            client,
            prefix: config.prefix.clone(),
            timeout: config.timeout(),
            max_retries: config.max_retries.max(1),
            cas: redis::Script::new(COMPARE_AND_SWAP),
            replace: redis::Script::new(REPLACE_PROJECT),
        })
    }

    fn names_key(&self) -> String {
        format!("{}:projects", self.prefix)
    }

    fn project_key(&self, id: &ProjectId) -> String {
        format!("{}:project:{}", self.prefix, id)
    }

    /// Runs a catalog operation under the configured timeout.
    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CatalogError::Unavailable("redis operation timed out".to_string()))?
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// The id bound to `name`, binding a fresh one if there is none.
    async fn resolve(
        &self,
        con: &mut MultiplexedConnection,
        name: &str,
    ) -> Result<Option<ProjectId>> {
        let names_key = self.names_key();
        let candidate = ProjectId::generate();
        let created: bool = con.hset_nx(&names_key, name, candidate.as_str()).await?;
        if created {
            debug!(id = %candidate, "Created project");
        }
        let id: Option<String> = con.hget(&names_key, name).await?;
        Ok(id.map(ProjectId::new))
    }

    async fn commit_once(
        &self,
        con: &mut MultiplexedConnection,
        name: &str,
        release: Release,
    ) -> Result<Project> {
        for attempt in 1..=self.max_retries {
            // Unbound again by a concurrent rename.
            let Some(id) = self.resolve(con, name).await? else {
                continue;
            };

            let key = self.project_key(&id);
            let current: Option<String> = con.get(&key).await?;
            let existing = current
                .as_deref()
                .map(|json| decode(&id, json))
                .transpose()?;
            if existing.as_ref().is_some_and(|project| project.name != name) {
                debug!(attempt, id = %id, "Project renamed concurrently, resolving name again");
                continue;
            }

            let project = merge_release(existing, id.clone(), name, release.clone());
            let encoded = encode(&project)?;

            let swapped: i32 = self
                .cas
                .key(&key)
                .arg(if current.is_none() { "1" } else { "0" })
                .arg(current.as_deref().unwrap_or_default())
                .arg(&encoded)
                .invoke_async(con)
                .await?;

            if swapped == 1 {
                return Ok(project);
            }
            debug!(attempt, "Project changed concurrently, retrying commit");
        }

        Err(CatalogError::Conflict {
            name: name.to_string(),
            attempts: self.max_retries,
        })
    }
}

impl Catalog for RedisCatalog {
    async fn exists(&self, id: &ProjectId) -> Result<bool> {
        self.bounded(async {
            let mut con = self.connection().await?;
            let exists: bool = con.exists(self.project_key(id)).await?;
            Ok::<_, CatalogError>(exists)
        })
        .await
    }

    async fn get(&self, id: &ProjectId) -> Result<Project> {
        self.bounded(async {
            let mut con = self.connection().await?;
            let json: Option<String> = con.get(self.project_key(id)).await?;
            match json {
                Some(json) => decode(id, &json),
                None => Err(CatalogError::NotFound(id.clone())),
            }
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Project>> {
        self.bounded(async {
            let mut con = self.connection().await?;
            let ids: Vec<String> = con.hvals(self.names_key()).await?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let ids = unique_ids(ids);
            let keys: Vec<String> = ids.iter().map(|id| self.project_key(id)).collect();
            let documents: Vec<Option<String>> =
                redis::cmd("MGET").arg(&keys).query_async(&mut con).await?;

            let mut projects = Vec::with_capacity(documents.len());
            for (id, json) in ids.iter().zip(documents) {
                // Name reserved but first commit not written yet.
                let Some(json) = json else { continue };
                match decode(id, &json) {
                    Ok(project) => projects.push(project),
                    Err(e) => warn!(error = %e, "Skipping corrupt project record"),
                }
            }
            Ok::<_, CatalogError>(projects)
        })
        .await
    }

    #[instrument(skip_all, fields(project = %project.name, id = %project.id))]
    async fn upsert(&self, project: &Project) -> Result<()> {
        let encoded = encode(project)?;
        self.bounded(async {
            let mut con = self.connection().await?;
            let _: i32 = self
                .replace
                .key(self.project_key(&project.id))
                .key(self.names_key())
                .arg(&encoded)
                .arg(&project.name)
                .arg(project.id.as_str())
                .invoke_async(&mut con)
                .await?;
            Ok::<_, CatalogError>(())
        })
        .await
    }

    #[instrument(skip(self, release), fields(version = %release.version))]
    async fn commit_release(&self, name: &str, release: Release) -> Result<Project> {
        self.bounded(async {
            let mut con = self.connection().await?;
            self.commit_once(&mut con, name, release).await
        })
        .await
    }
}

impl From<redis::RedisError> for CatalogError {
    fn from(e: redis::RedisError) -> Self {
        CatalogError::Unavailable(e.to_string())
    }
}

/// Index values in first-seen order with duplicates removed.
fn unique_ids(ids: Vec<String>) -> Vec<ProjectId> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .map(ProjectId::new)
        .collect()
}

fn encode(project: &Project) -> Result<String> {
    serde_json::to_string(project).map_err(|e| CatalogError::Corrupt {
        id: project.id.to_string(),
        reason: e.to_string(),
    })
}

fn decode(id: &ProjectId, json: &str) -> Result<Project> {
    serde_json::from_str(json).map_err(|e| CatalogError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisCatalogConfig;
    use chrono::Utc;

    fn unreachable_config() -> RedisCatalogConfig {
        RedisCatalogConfig {
            // Port 1 is never a Redis server.
            url: "redis://127.0.0.1:1/0".to_string(),
            timeout_ms: 500,
            ..RedisCatalogConfig::default()
        }
    }

    #[test]
    fn keys_use_prefix() {
        let catalog = RedisCatalog::from_config(&RedisCatalogConfig {
            prefix: "test".to_string(),
            ..RedisCatalogConfig::default()
        })
        .unwrap();

        assert_eq!(catalog.names_key(), "test:projects");
        assert_eq!(catalog.project_key(&ProjectId::new("U")), "test:project:U");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = RedisCatalog::from_config(&RedisCatalogConfig {
            url: "not a url".to_string(),
            ..RedisCatalogConfig::default()
        });

        assert!(matches!(result, Err(CatalogError::Unavailable(_))));
    }

    #[test]
    fn decode_reports_corrupt_document() {
        let result = decode(&ProjectId::new("U"), "{\"id\":");
        assert!(matches!(result, Err(CatalogError::Corrupt { id, .. }) if id == "U"));
    }

    #[test]
    fn index_entries_for_one_project_list_it_once() {
        let ids = unique_ids(vec!["U".to_string(), "V".to_string(), "U".to_string()]);
        assert_eq!(ids, vec![ProjectId::new("U"), ProjectId::new("V")]);
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let catalog = RedisCatalog::from_config(&unreachable_config()).unwrap();

        assert!(matches!(
            catalog.list().await,
            Err(CatalogError::Unavailable(_))
        ));
        assert!(matches!(
            catalog
                .commit_release("app", Release::new("v1", Utc::now(), vec![]))
                .await,
            Err(CatalogError::Unavailable(_))
        ));
    }

    /// Needs a scratch Redis at `RABBIT_TEST_REDIS_URL`.
    #[tokio::test]
    #[ignore]
    async fn concurrent_commits_against_live_redis() {
        let Ok(url) = std::env::var("RABBIT_TEST_REDIS_URL") else {
            return;
        };
        let catalog = std::sync::Arc::new(
            RedisCatalog::from_config(&RedisCatalogConfig {
                url,
                prefix: format!("rabbit-test-{}", uuid::Uuid::new_v4().simple()),
                ..RedisCatalogConfig::default()
            })
            .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let catalog = std::sync::Arc::clone(&catalog);
                tokio::spawn(async move {
                    catalog
                        .commit_release("app", Release::new(format!("v{i}"), Utc::now(), vec![]))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let projects = catalog.list().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].releases.len(), 8);
    }

    /// Needs a scratch Redis at `RABBIT_TEST_REDIS_URL`.
    #[tokio::test]
    #[ignore]
    async fn rename_moves_index_entry_against_live_redis() {
        let Ok(url) = std::env::var("RABBIT_TEST_REDIS_URL") else {
            return;
        };
        let catalog = RedisCatalog::from_config(&RedisCatalogConfig {
            url,
            prefix: format!("rabbit-test-{}", uuid::Uuid::new_v4().simple()),
            ..RedisCatalogConfig::default()
        })
        .unwrap();

        let mut project = catalog
            .commit_release("app", Release::new("v1", Utc::now(), vec![]))
            .await
            .unwrap();
        project.name = "app2".to_string();
        catalog.upsert(&project).await.unwrap();

        let projects = catalog.list().await.unwrap();
        assert_eq!(projects, vec![project.clone()]);

        let fresh = catalog
            .commit_release("app", Release::new("v2", Utc::now(), vec![]))
            .await
            .unwrap();
        assert_ne!(fresh.id, project.id);
        assert_eq!(catalog.get(&project.id).await.unwrap(), project);
    }
}
