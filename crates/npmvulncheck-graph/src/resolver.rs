//! Resolver interface between a dependency graph and its provider.
//!
//! Providers keep dialect-specific lookup state (descriptor aliases, importer
//! maps, installed-tree paths) out of the serializable graph and expose it
//! through this trait instead.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How an import site referenced the specifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    EsmImport,
    CjsRequire,
    EsmDynamicImport,
}

/// Outcome of resolving a bare specifier against the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to a node id.
    Resolved(String),
    /// Resolution is explicitly refused, e.g. the subpath is not exported.
    Blocked,
    /// No installation found for the specifier.
    Unresolved,
}

impl Resolution {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

/// Dialect-specific resolution callbacks paired with a [`crate::DepGraph`].
pub trait PackageResolver {
    /// Resolve a bare specifier issued from `from_file` to a node id.
    fn resolve_package(
        &self,
        specifier: &str,
        from_file: Option<&Path>,
        import_kind: ImportKind,
        conditions: &[String],
    ) -> Resolution;

    /// Candidate node ids for an ambiguous specifier, best match first.
    fn resolve_package_candidates(
        &self,
        _specifier: &str,
        _from_file: Option<&Path>,
    ) -> Vec<String> {
        Vec::new()
    }

    /// Expand a `#` internal import to the bare specifier it targets, if the
    /// manifest's `imports` map resolves it to a dependency.
    fn resolve_internal_import(
        &self,
        _specifier: &str,
        _from_file: Option<&Path>,
        _conditions: &[String],
    ) -> Option<String> {
        None
    }
}
