//! Remediation planning and application for npmvulncheck
//!
//! Converts a scan result into a typed plan of manifest overrides and direct
//! upgrades under a policy, writes the plan through manager-specific override
//! providers with snapshot/rollback, regenerates the lockfile, and verifies
//! by rescanning.

use npmvulncheck_lockfiles::PackageManager;
use serde::{Deserialize, Serialize};

pub mod apply;
pub mod overrides;
pub mod planner;

pub use apply::{apply_plan, ApplyOptions, ApplyReport, VerifyOutcome};
pub use planner::{plan, RemediationPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Override,
    Direct,
    /// Reserved; currently aliases `auto`.
    InPlace,
    Auto,
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "override" => Ok(Strategy::Override),
            "direct" => Ok(Strategy::Direct),
            "in-place" => Ok(Strategy::InPlace),
            "auto" => Ok(Strategy::Auto),
            other => anyhow::bail!("unknown strategy {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScopePolicy {
    Global,
    ByParent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeLevel {
    Patch,
    Minor,
    Major,
    Any,
}

/// Where an override applies: everywhere, or only under one parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChangeScope {
    Global,
    Parent {
        parent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_version: Option<String>,
    },
}

impl Default for ChangeScope {
    fn default() -> Self {
        ChangeScope::Global
    }
}

impl ChangeScope {
    /// Stable key used for sorting and conflict detection.
    pub fn key(&self) -> String {
        match self {
            ChangeScope::Global => "global".to_string(),
            ChangeScope::Parent {
                parent,
                parent_version: Some(version),
            } => format!("{parent}@{version}"),
            ChangeScope::Parent {
                parent,
                parent_version: None,
            } => parent.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OverrideChange {
    pub package: String,
    /// Joined from-versions.
    pub from: String,
    pub to: String,
    pub scope: ChangeScope,
    pub why: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum DependencyField {
    Dependencies,
    DevDependencies,
    OptionalDependencies,
}

impl Default for DependencyField {
    fn default() -> Self {
        DependencyField::Dependencies
    }
}

impl DependencyField {
    pub fn manifest_key(&self) -> &'static str {
        match self {
            DependencyField::Dependencies => "dependencies",
            DependencyField::DevDependencies => "devDependencies",
            DependencyField::OptionalDependencies => "optionalDependencies",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectUpgrade {
    pub package: String,
    pub field: DependencyField,
    pub from: String,
    pub to: String,
    pub vuln_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Operation {
    ManifestOverride {
        manager: PackageManager,
        changes: Vec<OverrideChange>,
    },
    ManifestDirectUpgrade {
        upgrades: Vec<DirectUpgrade>,
    },
    Relock {
        command: Vec<String>,
    },
    Verify,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFixes {
    pub fixed_vulnerabilities: Vec<String>,
    pub remaining_vulnerabilities: Vec<String>,
    #[serde(default)]
    pub introduced_vulnerabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonedChoice {
    pub risk: RiskLevel,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub reasoned_top_choices: Vec<ReasonedChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationPlan {
    pub strategy: Strategy,
    pub package_manager: PackageManager,
    /// Project root the plan applies to.
    pub target: String,
    pub operations: Vec<Operation>,
    pub fixes: PlanFixes,
    pub summary: PlanSummary,
}

/// The lockfile-only install invocation for a manager.
pub fn relock_command(manager: PackageManager) -> Vec<String> {
    let parts: &[&str] = match manager {
        PackageManager::Npm => &["npm", "install", "--package-lock-only"],
        PackageManager::Pnpm => &["pnpm", "install", "--lockfile-only"],
        PackageManager::Yarn => &["yarn", "install", "--mode=update-lockfile"],
    };
    parts.iter().map(|s| s.to_string()).collect()
}

/// The lockfile a relock rewrites.
pub fn lockfile_name(manager: PackageManager) -> &'static str {
    match manager {
        PackageManager::Npm => "package-lock.json",
        PackageManager::Pnpm => "pnpm-lock.yaml",
        PackageManager::Yarn => "yarn.lock",
    }
}
