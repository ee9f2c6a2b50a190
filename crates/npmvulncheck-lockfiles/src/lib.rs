//! Lockfile providers for npmvulncheck
//!
//! Each package-manager dialect (npm, pnpm v5/v9, yarn classic/berry) loads
//! its lockfile into the shared [`npmvulncheck_graph::DepGraph`] shape and
//! exposes a dialect-specific resolver. The registry picks the provider that
//! matches a project root.

use anyhow::Result;
use npmvulncheck_graph::{DepGraph, PackageResolver};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod exports;
pub mod manifest;
pub mod npm;
pub mod pnpm;
pub mod registry;
pub mod workspaces;
pub mod yarn;

pub use registry::{load_project, ProjectLoad};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of probing a project root for one dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResult {
    pub manager: PackageManager,
    /// The lockfile that matched. In installed mode this is the literal
    /// `node_modules` sentinel, not a real file.
    pub lockfile_path: PathBuf,
    pub details: String,
}

/// Which resolution strategies a loaded provider supports.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub lockfile_resolver: bool,
    pub fs_resolver: bool,
    pub pnp_resolver: bool,
}

/// A loaded project: detection info, the normalized graph, and the resolver.
pub struct ProviderContext {
    pub detect: DetectResult,
    pub graph: DepGraph,
    pub capabilities: Capabilities,
    pub resolver: Box<dyn PackageResolver + Send + Sync>,
}

/// One lockfile dialect.
pub trait LockfileProvider {
    fn manager(&self) -> PackageManager;
    /// Probe `root` without loading anything expensive.
    fn detect(&self, root: &Path) -> Option<DetectResult>;
    /// Parse the lockfile(s) and build the graph plus resolver.
    fn load(&self, root: &Path) -> Result<ProviderContext>;
}

pub(crate) fn rel_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
