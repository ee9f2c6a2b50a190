//! OSV vulnerability data access for npmvulncheck
//!
//! Wire types for the OSV API, a batch-query client with paging and an
//! on-disk cache, npm-registry version listing for fix discovery, and the
//! CVSS 3.x severity model.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod cache;
pub mod osv;
pub mod severity;

pub use cache::OsvCache;
pub use osv::OsvClient;

/// One package instance to query, keyed `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageQuery {
    pub name: String,
    pub version: String,
}

impl PackageQuery {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// A vulnerability id plus its last-modified stamp, as returned by batch
/// queries and stored in the query cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VulnRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvVulnerability {
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default)]
    pub severity: Vec<OsvSeverity>,
    #[serde(default)]
    pub affected: Vec<OsvAffected>,
    #[serde(default)]
    pub references: Vec<OsvReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsvSeverity {
    #[serde(rename = "type")]
    pub severity_type: String,
    pub score: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvAffected {
    #[serde(default)]
    pub package: OsvPackageInfo,
    #[serde(default)]
    pub ranges: Vec<OsvRange>,
    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvPackageInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ecosystem: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvRange {
    #[serde(rename = "type", default)]
    pub range_type: String,
    #[serde(default)]
    pub events: Vec<OsvEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsvEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduced: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_affected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsvReference {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ref_type: Option<String>,
    pub url: String,
}

impl OsvVulnerability {
    /// All `fixed` version events across the affected ranges for `package`.
    pub fn fixed_versions_for(&self, package: &str) -> Vec<String> {
        let mut fixed = Vec::new();
        for affected in &self.affected {
            if affected.package.name != package {
                continue;
            }
            for range in &affected.ranges {
                for event in &range.events {
                    if let Some(v) = &event.fixed {
                        if !fixed.contains(v) {
                            fixed.push(v.clone());
                        }
                    }
                }
            }
        }
        fixed
    }
}

/// The vulnerability database as the scanner consumes it. `OsvClient` is the
/// production implementation; tests substitute their own.
pub trait VulnerabilityProvider {
    /// Batch-query the database. The result maps every input's
    /// `name@version` key to its (possibly empty) match list.
    fn query_packages(&self, packages: &[PackageQuery]) -> Result<HashMap<String, Vec<VulnRef>>>;

    /// Fetch one vulnerability, preferring the `(id, modified)` cache entry.
    fn get_vuln(&self, id: &str, modified: Option<&str>) -> Result<OsvVulnerability>;

    /// Registry version list for a package; `None` when unavailable
    /// (offline).
    fn list_package_versions(&self, name: &str) -> Result<Option<Vec<String>>>;
}
