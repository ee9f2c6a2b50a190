//! Dependency graph data structures for npmvulncheck
//!
//! This crate provides the unified graph representation every lockfile
//! dialect (npm, pnpm, yarn) is normalized into. The graph is a plain value:
//! nodes keyed by id, an ordered edge list, and a precomputed adjacency map
//! for BFS. Resolution callbacks live on the [`resolver::PackageResolver`]
//! trait, paired with the graph by the provider that built it, so the graph
//! itself stays serializable.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

pub mod resolver;
pub mod specifier;

pub use resolver::{ImportKind, PackageResolver, Resolution};

/// Where an installed package instance came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageSource {
    Registry,
    Workspace,
    Link,
    File,
    Git,
    Patch,
    Portal,
    Unknown,
}

/// Dependency classification flags carried on a node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyFlags {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub peer: bool,
}

/// One installed (or lockfile-declared) package instance.
///
/// `(name, version, source, location)` uniquely identifies a node within a
/// graph. The same `name@version` installed at two locations is two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageNode {
    /// Stable within one graph. Path-like for file-tree providers,
    /// descriptor-like for content-addressed providers.
    pub id: String,
    pub name: String,
    /// `"0.0.0"` sentinel when the dialect does not record a version.
    pub version: String,
    /// Provider-defined origin: a path, lockfile key, or descriptor.
    pub location: String,
    pub source: PackageSource,
    #[serde(default)]
    pub flags: DependencyFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

impl PackageNode {
    /// The `name@version` key used for inventory dedup and OSV queries.
    pub fn package_key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Prod,
    Dev,
    Optional,
    Peer,
}

/// Directed edge `from -> to`, annotated with the specifier the parent uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    /// The name the parent refers to the child by (alias-aware).
    pub name: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

/// The normalized multi-importer dependency graph.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DepGraph {
    /// The primary importer node.
    pub root_id: String,
    pub nodes: HashMap<String, PackageNode>,
    pub edges: Vec<DependencyEdge>,
    /// Workspace key -> importer node id, for multi-workspace projects.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub importers: BTreeMap<String, String>,
    /// Nodes directly depended on by the root importer.
    #[serde(default)]
    pub root_direct_node_ids: BTreeSet<String>,
    #[serde(skip)]
    edges_by_from: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    edge_keys: HashSet<(String, String, String, EdgeType)>,
}

impl DepGraph {
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            ..Default::default()
        }
    }

    pub fn add_node(&mut self, node: PackageNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn node(&self, id: &str) -> Option<&PackageNode> {
        self.nodes.get(id)
    }

    /// Insert an edge, collapsing duplicates with an identical
    /// `(from, to, name, type)` tuple.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        name: impl Into<String>,
        edge_type: EdgeType,
    ) {
        let (from, to, name) = (from.into(), to.into(), name.into());
        let key = (from.clone(), to.clone(), name.clone(), edge_type);
        if !self.edge_keys.insert(key) {
            return;
        }
        let index = self.edges.len();
        self.edges.push(DependencyEdge {
            from: from.clone(),
            to: to.clone(),
            name,
            edge_type,
        });
        self.edges_by_from.entry(from.clone()).or_default().push(index);
        if from == self.root_id {
            self.root_direct_node_ids.insert(to);
        }
    }

    /// Outgoing edges of a node, in insertion order.
    pub fn edges_from(&self, id: &str) -> impl Iterator<Item = &DependencyEdge> {
        self.edges_by_from
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    /// Rebuild the adjacency and dedup indexes after deserialization.
    pub fn rebuild_indexes(&mut self) {
        self.edges_by_from.clear();
        self.edge_keys.clear();
        for (index, edge) in self.edges.iter().enumerate() {
            self.edges_by_from
                .entry(edge.from.clone())
                .or_default()
                .push(index);
            self.edge_keys.insert((
                edge.from.clone(),
                edge.to.clone(),
                edge.name.clone(),
                edge.edge_type,
            ));
        }
    }

    /// Up to `limit` shortest root-to-node id paths, found by BFS.
    ///
    /// Cycles are handled by never revisiting a node within its own path and
    /// by capping how often a node may be expanded across paths.
    pub fn shortest_paths_to(&self, target: &str, limit: usize) -> Vec<Vec<String>> {
        let mut found = Vec::new();
        if limit == 0 || !self.nodes.contains_key(target) {
            return found;
        }
        let mut expansions: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<Vec<String>> = VecDeque::new();
        queue.push_back(vec![self.root_id.clone()]);
        while let Some(path) = queue.pop_front() {
            let last = path.last().expect("paths are non-empty").clone();
            if last == target {
                found.push(path);
                if found.len() >= limit {
                    break;
                }
                continue;
            }
            let seen = expansions.entry(self.node_key(&last)).or_insert(0);
            if *seen >= limit {
                continue;
            }
            *seen += 1;
            for edge in self.edges_from(&last) {
                if path.contains(&edge.to) {
                    continue;
                }
                let mut next = path.clone();
                next.push(edge.to.clone());
                queue.push_back(next);
            }
        }
        found
    }

    fn node_key<'a>(&'a self, id: &str) -> &'a str {
        // Borrow the owned key so the expansion map does not clone per visit.
        self.nodes
            .get_key_value(id)
            .map(|(k, _)| k.as_str())
            .unwrap_or(&self.root_id)
    }
}

/// Display path for an affected package: node names along a root-to-node path.
pub fn path_names(graph: &DepGraph, path: &[String]) -> Vec<String> {
    path.iter()
        .filter_map(|id| graph.node(id).map(|n| n.name.clone()))
        .collect()
}
