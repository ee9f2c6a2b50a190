//! OSV API client: batched queries with paging, per-vulnerability fetch,
//! and npm-registry version listing.

use crate::cache::OsvCache;
use crate::{OsvVulnerability, PackageQuery, VulnerabilityProvider, VulnRef};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const OSV_API_BASE: &str = "https://api.osv.dev/v1";
const NPM_REGISTRY_BASE: &str = "https://registry.npmjs.org";
const BATCH_LIMIT: usize = 256;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct OsvBatchRequest {
    queries: Vec<OsvQuery>,
}

#[derive(Debug, Serialize)]
struct OsvQuery {
    package: OsvQueryPackage,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct OsvQueryPackage {
    ecosystem: &'static str,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OsvBatchResponse {
    #[serde(default)]
    results: Vec<OsvBatchResult>,
}

#[derive(Debug, Default, Deserialize)]
struct OsvBatchResult {
    #[serde(default)]
    vulns: Option<Vec<VulnRef>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistryPackument {
    #[serde(default)]
    versions: HashMap<String, serde_json::Value>,
}

pub struct OsvClient {
    api_base: String,
    registry_base: String,
    cache: OsvCache,
    offline: bool,
    /// Registry lookups are memoized per process.
    versions_memo: Mutex<HashMap<String, Option<Vec<String>>>>,
}

impl OsvClient {
    pub fn new(cache: OsvCache, offline: bool) -> Self {
        Self {
            api_base: OSV_API_BASE.to_string(),
            registry_base: NPM_REGISTRY_BASE.to_string(),
            cache,
            offline,
            versions_memo: Mutex::new(HashMap::new()),
        }
    }

    /// Override the endpoints, for tests and mirrors.
    pub fn with_endpoints(mut self, api_base: &str, registry_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.registry_base = registry_base.trim_end_matches('/').to_string();
        self
    }

    pub fn cache(&self) -> &OsvCache {
        &self.cache
    }

    fn query_offline(
        &self,
        unique: &[PackageQuery],
    ) -> Result<HashMap<String, Vec<VulnRef>>> {
        let mut results = HashMap::new();
        let mut missing = Vec::new();
        for query in unique {
            match self.cache.read_query(&query.name, &query.version) {
                Some(refs) => {
                    results.insert(query.key(), refs);
                }
                None => missing.push(query.key()),
            }
        }
        if !missing.is_empty() {
            let shown: Vec<&String> = missing.iter().take(5).collect();
            anyhow::bail!(
                "offline mode: {} package(s) missing from the query cache (e.g. {})",
                missing.len(),
                shown
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(results)
    }

    /// Run one batch to completion, following per-query page tokens until
    /// every query has drained.
    fn drain_batch(
        &self,
        batch: &[PackageQuery],
        results: &mut HashMap<String, Vec<VulnRef>>,
    ) -> Result<()> {
        // (index into `batch`, continuation token)
        let mut pending: Vec<(usize, Option<String>)> =
            (0..batch.len()).map(|i| (i, None)).collect();
        for query in batch {
            results.entry(query.key()).or_default();
        }

        while !pending.is_empty() {
            let request = OsvBatchRequest {
                queries: pending
                    .iter()
                    .map(|(i, token)| OsvQuery {
                        package: OsvQueryPackage {
                            ecosystem: "npm",
                            name: batch[*i].name.clone(),
                        },
                        version: batch[*i].version.clone(),
                        page_token: token.clone(),
                    })
                    .collect(),
            };
            let url = format!("{}/querybatch", self.api_base);
            let response: OsvBatchResponse = ureq::post(&url)
                .timeout(REQUEST_TIMEOUT)
                .send_json(&request)
                .context("OSV batch query failed")?
                .into_json()
                .context("failed to parse OSV batch response")?;

            // Results must align 1:1 with the request; anything else means a
            // broken provider.
            if response.results.len() != pending.len() {
                anyhow::bail!(
                    "OSV batch response mismatch: sent {} queries, got {} results",
                    pending.len(),
                    response.results.len()
                );
            }

            let mut next_pending = Vec::new();
            for ((index, _), result) in pending.iter().zip(response.results) {
                let key = batch[*index].key();
                if let Some(vulns) = result.vulns {
                    let acc = results.entry(key).or_default();
                    for vuln in vulns {
                        if !acc.iter().any(|have| have.id == vuln.id) {
                            acc.push(vuln);
                        }
                    }
                }
                if let Some(token) = result.next_page_token {
                    next_pending.push((*index, Some(token)));
                }
            }
            pending = next_pending;
        }

        for query in batch {
            let refs = results.get(&query.key()).cloned().unwrap_or_default();
            if let Err(e) = self.cache.write_query(&query.name, &query.version, &refs) {
                debug!("failed to cache query {}: {e}", query.key());
            }
        }
        Ok(())
    }
}

impl VulnerabilityProvider for OsvClient {
    fn query_packages(&self, packages: &[PackageQuery]) -> Result<HashMap<String, Vec<VulnRef>>> {
        // Dedupe by key, preserving first-seen order.
        let mut unique: Vec<PackageQuery> = Vec::new();
        for query in packages {
            if !unique.iter().any(|have| have.key() == query.key()) {
                unique.push(query.clone());
            }
        }
        if self.offline {
            return self.query_offline(&unique);
        }

        let mut results = HashMap::new();
        for batch in unique.chunks(BATCH_LIMIT) {
            self.drain_batch(batch, &mut results)?;
        }
        Ok(results)
    }

    fn get_vuln(&self, id: &str, modified: Option<&str>) -> Result<OsvVulnerability> {
        if let Some(modified) = modified {
            if let Some(vuln) = self.cache.read_vuln(id, modified) {
                return Ok(vuln);
            }
            if self.offline {
                // Fall back to the newest cached record for the id.
                return self
                    .cache
                    .read_vuln_newest(id)
                    .with_context(|| format!("offline mode: {id} is not cached"));
            }
        } else {
            if let Some(vuln) = self.cache.read_vuln_newest(id) {
                return Ok(vuln);
            }
            if self.offline {
                anyhow::bail!("offline mode: {id} is not cached");
            }
        }

        let url = format!("{}/vulns/{}", self.api_base, id);
        let vuln: OsvVulnerability = ureq::get(&url)
            .timeout(REQUEST_TIMEOUT)
            .call()
            .with_context(|| format!("failed to fetch {id} from OSV"))?
            .into_json()
            .with_context(|| format!("failed to parse OSV record for {id}"))?;
        if let Err(e) = self.cache.write_vuln(&vuln) {
            debug!("failed to cache {id}: {e}");
        }
        Ok(vuln)
    }

    fn list_package_versions(&self, name: &str) -> Result<Option<Vec<String>>> {
        if self.offline {
            return Ok(None);
        }
        if let Some(memoized) = self
            .versions_memo
            .lock()
            .expect("versions memo lock")
            .get(name)
        {
            return Ok(memoized.clone());
        }
        let url = format!("{}/{}", self.registry_base, name);
        let fetched = match ureq::get(&url).timeout(REQUEST_TIMEOUT).call() {
            Ok(response) => {
                let packument: RegistryPackument = response
                    .into_json()
                    .with_context(|| format!("failed to parse registry metadata for {name}"))?;
                let mut versions: Vec<String> = packument.versions.into_keys().collect();
                versions.sort();
                Some(versions)
            }
            Err(e) => {
                debug!("registry lookup for {name} failed: {e}");
                None
            }
        };
        self.versions_memo
            .lock()
            .expect("versions memo lock")
            .insert(name.to_string(), fetched.clone());
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn offline_reads_cache_and_names_missing_keys() {
        let temp = TempDir::new().unwrap();
        let cache = OsvCache::new(temp.path());
        cache
            .write_query(
                "express",
                "4.0.0",
                &[VulnRef {
                    id: "GHSA-demo".to_string(),
                    modified: None,
                }],
            )
            .unwrap();
        let client = OsvClient::new(OsvCache::new(temp.path()), true);

        let hit = client
            .query_packages(&[PackageQuery::new("express", "4.0.0")])
            .unwrap();
        assert_eq!(hit["express@4.0.0"].len(), 1);

        let err = client
            .query_packages(&[
                PackageQuery::new("express", "4.0.0"),
                PackageQuery::new("left-pad", "1.0.0"),
            ])
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("left-pad@1.0.0"), "{message}");
    }

    #[test]
    fn offline_get_vuln_falls_back_to_newest() {
        let temp = TempDir::new().unwrap();
        let cache = OsvCache::new(temp.path());
        cache
            .write_vuln(&OsvVulnerability {
                id: "GHSA-demo".to_string(),
                modified: Some("2024-05-01T00:00:00Z".to_string()),
                ..Default::default()
            })
            .unwrap();
        let client = OsvClient::new(OsvCache::new(temp.path()), true);

        // Exact (id, modified) miss, newest cached record wins.
        let vuln = client
            .get_vuln("GHSA-demo", Some("2024-06-01T00:00:00Z"))
            .unwrap();
        assert_eq!(vuln.modified.as_deref(), Some("2024-05-01T00:00:00Z"));

        assert!(client.get_vuln("GHSA-unknown", None).is_err());
    }

    #[test]
    fn offline_version_listing_is_none() {
        let temp = TempDir::new().unwrap();
        let client = OsvClient::new(OsvCache::new(temp.path()), true);
        assert_eq!(client.list_package_versions("express").unwrap(), None);
    }

    #[test]
    fn queries_dedupe_by_key() {
        let temp = TempDir::new().unwrap();
        let cache = OsvCache::new(temp.path());
        cache.write_query("a", "1.0.0", &[]).unwrap();
        let client = OsvClient::new(OsvCache::new(temp.path()), true);
        let results = client
            .query_packages(&[
                PackageQuery::new("a", "1.0.0"),
                PackageQuery::new("a", "1.0.0"),
            ])
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
