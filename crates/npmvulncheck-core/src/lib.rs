//! Scan orchestration core for npmvulncheck
//!
//! Ties the lockfile graph, reachability analysis, and the vulnerability
//! provider together into a `ScanResult`, and selects verified fix versions
//! per finding.

use npmvulncheck_advisories::severity::SeverityLevel;
use npmvulncheck_advisories::OsvReference;
use npmvulncheck_graph::DependencyFlags;
use npmvulncheck_lockfiles::PackageManager;
use npmvulncheck_reachability::{ReachabilityLevel, UnresolvedImport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod fix;
pub mod ignore;
pub mod priority;
pub mod scan;

pub use fix::FixSelector;
pub use ignore::IgnorePolicy;
pub use scan::run_scan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Lockfile,
    Installed,
    Source,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Lockfile => "lockfile",
            ScanMode::Installed => "installed",
            ScanMode::Source => "source",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub mode: ScanMode,
    pub entries: Vec<PathBuf>,
    pub conditions: Vec<String>,
    pub include_type_imports: bool,
    pub explain_resolve: bool,
    pub include_dev: bool,
    pub severity_threshold: Option<SeverityLevel>,
    pub offline: bool,
    pub ignore_file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            mode: ScanMode::Lockfile,
            entries: Vec::new(),
            conditions: Vec::new(),
            include_type_imports: false,
            explain_resolve: false,
            include_dev: false,
            severity_threshold: None,
            offline: false,
            ignore_file: None,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMeta {
    pub tool: String,
    pub version: String,
    pub mode: ScanMode,
    pub format: String,
    pub db: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<PackageManager>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_analysis: Option<SourceAnalysisMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAnalysisMeta {
    pub entries_scanned: usize,
    pub has_unknown_imports: bool,
    pub complete_coverage: bool,
    /// Populated only under explain-resolve.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_imports: Vec<UnresolvedImport>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub nodes: usize,
    pub edges: usize,
    pub queried_packages: usize,
    pub vulnerabilities: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReachabilityState {
    Reachable,
    Unreachable,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedReachability {
    pub state: ReachabilityState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ReachabilityLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FixSuggestion {
    pub fixed_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedPackage {
    pub name: String,
    pub version: String,
    pub node_id: String,
    /// Direct dependency of the root importer.
    pub direct: bool,
    #[serde(default)]
    pub flags: DependencyFlags,
    /// Up to three shortest root-to-node paths, as name chains.
    pub paths: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachability: Option<AffectedReachability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixSuggestion>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityReason {
    Reachable,
    UnknownReachability,
    Unreachable,
    Severity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Priority {
    pub level: PriorityLevel,
    pub reason: PriorityReason,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub vuln_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<OsvReference>,
    pub affected: Vec<AffectedPackage>,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub meta: ScanMeta,
    /// Sorted by priority score descending, vuln id ascending.
    pub findings: Vec<Finding>,
    pub stats: ScanStats,
}

impl ScanResult {
    pub fn vuln_ids(&self) -> Vec<String> {
        self.findings.iter().map(|f| f.vuln_id.clone()).collect()
    }
}
