//! Reachability seeding and graph propagation.
//!
//! Seeding walks project source files breadth-first from the entry files,
//! turning each import site into either package-level evidence (bare
//! specifiers resolved through the graph) or another source file to visit.
//! Propagation then runs a serial BFS over the dependency graph, recording
//! one propagation evidence per traversed edge and up to five distinct
//! traces per node.

use crate::imports::parse_imports;
use crate::resolver::{is_in_dependency, ModuleFileResolver};
use npmvulncheck_graph::{
    specifier, DepGraph, EdgeType, ImportKind, PackageResolver, Resolution,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_TRACES_PER_NODE: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct ReachabilityOptions {
    pub conditions: Vec<String>,
    pub include_type_imports: bool,
    pub explain_resolve: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReachabilityLevel {
    /// Directly imported by project source.
    Import,
    /// Reached through dependency edges from an imported package.
    Transitive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Evidence {
    Import {
        file: String,
        line: usize,
        column: usize,
        specifier: String,
        import_text: String,
        import_kind: ImportKind,
        type_only: bool,
        resolved_package_node_id: String,
    },
    Propagation {
        via_node_id: String,
        via_edge_name: String,
        via_edge_type: EdgeType,
        resolved_package_node_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityRecord {
    pub level: ReachabilityLevel,
    pub evidences: Vec<Evidence>,
    /// Name chains from an imported package to this node, capped and
    /// pairwise distinct.
    pub traces: Vec<Vec<String>>,
}

impl ReachabilityRecord {
    fn push_trace(&mut self, trace: Vec<String>) {
        if self.traces.len() >= MAX_TRACES_PER_NODE {
            return;
        }
        if self.traces.iter().any(|t| t == &trace) {
            return;
        }
        self.traces.push(trace);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedImport {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub specifier: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ReachabilityAnalysis {
    pub by_node_id: HashMap<String, ReachabilityRecord>,
    pub entries_scanned: usize,
    pub has_unknown_imports: bool,
    /// Populated only under explain-resolve.
    pub unresolved_imports: Vec<UnresolvedImport>,
}

impl ReachabilityAnalysis {
    /// Source coverage is complete iff at least one entry was scanned and no
    /// import site was unknown.
    pub fn complete_coverage(&self) -> bool {
        self.entries_scanned > 0 && !self.has_unknown_imports
    }
}

pub fn analyze(
    root: &Path,
    graph: &DepGraph,
    resolver: &(dyn PackageResolver + Send + Sync),
    entries: &[PathBuf],
    options: &ReachabilityOptions,
) -> ReachabilityAnalysis {
    let mut analysis = ReachabilityAnalysis {
        entries_scanned: entries.len(),
        ..Default::default()
    };
    let file_resolver = ModuleFileResolver::new(root);

    // Source-file BFS.
    let mut queue: VecDeque<PathBuf> = entries.iter().cloned().collect();
    let mut visited_files: HashSet<PathBuf> = entries.iter().cloned().collect();
    while let Some(file) = queue.pop_front() {
        let imports = match parse_imports(&file) {
            Ok(imports) => imports,
            Err(e) => {
                debug!("treating {} as unknown: {e}", file.display());
                analysis.has_unknown_imports = true;
                continue;
            }
        };
        for import in imports {
            if import.type_only && !options.include_type_imports {
                continue;
            }
            let Some(raw_specifier) = import.specifier.clone() else {
                analysis.has_unknown_imports = true;
                continue;
            };
            if import.unknown {
                analysis.has_unknown_imports = true;
                continue;
            }
            if specifier::is_builtin(&raw_specifier) {
                continue;
            }

            // `#` internal imports expand through the manifest's imports map.
            let effective = if specifier::is_internal(&raw_specifier) {
                match resolver.resolve_internal_import(
                    &raw_specifier,
                    Some(&file),
                    &options.conditions,
                ) {
                    Some(bare) => bare,
                    None => {
                        record_unresolved(
                            &mut analysis,
                            options,
                            &file,
                            &import,
                            &raw_specifier,
                            "internal import did not resolve to a package",
                        );
                        continue;
                    }
                }
            } else {
                raw_specifier.clone()
            };

            if specifier::parse_bare(&effective).is_some() {
                match resolver.resolve_package(
                    &effective,
                    Some(&file),
                    import.kind,
                    &options.conditions,
                ) {
                    Resolution::Resolved(node_id) => {
                        let record = analysis
                            .by_node_id
                            .entry(node_id.clone())
                            .or_insert_with(|| ReachabilityRecord {
                                level: ReachabilityLevel::Import,
                                evidences: Vec::new(),
                                traces: Vec::new(),
                            });
                        record.level = ReachabilityLevel::Import;
                        record.evidences.push(Evidence::Import {
                            file: file.display().to_string(),
                            line: import.line,
                            column: import.column,
                            specifier: raw_specifier.clone(),
                            import_text: import.text.clone(),
                            import_kind: import.kind,
                            type_only: import.type_only,
                            resolved_package_node_id: node_id.clone(),
                        });
                        if let Some(node) = graph.node(&node_id) {
                            record.push_trace(vec![node.name.clone()]);
                        }
                    }
                    Resolution::Blocked => {
                        // Blocked by exports: still unresolved, not unknown.
                        record_unresolved(
                            &mut analysis,
                            options,
                            &file,
                            &import,
                            &raw_specifier,
                            "subpath is not exported",
                        );
                    }
                    Resolution::Unresolved => {
                        record_unresolved(
                            &mut analysis,
                            options,
                            &file,
                            &import,
                            &raw_specifier,
                            "no installation found",
                        );
                    }
                }
                continue;
            }

            // Relative or absolute: a project source file to traverse, or a
            // file inside a dependency package, which the package-level
            // analysis already covers.
            let resolved =
                file_resolver.resolve(&effective, &file, import.kind, &options.conditions);
            match resolved.resolved_file_path {
                Some(path) if is_in_dependency(&path) => {}
                Some(path) => {
                    if path.starts_with(root) && visited_files.insert(path.clone()) {
                        queue.push_back(path);
                    }
                }
                None => {
                    record_unresolved(
                        &mut analysis,
                        options,
                        &file,
                        &import,
                        &raw_specifier,
                        "module file not found",
                    );
                }
            }
        }
    }

    propagate(graph, &mut analysis);
    analysis
}

/// BFS across dependency edges from every seeded node.
fn propagate(graph: &DepGraph, analysis: &mut ReachabilityAnalysis) {
    let mut seeds: Vec<String> = analysis.by_node_id.keys().cloned().collect();
    seeds.sort();
    let mut visited: HashSet<String> = seeds.iter().cloned().collect();
    let mut queue: VecDeque<String> = seeds.into();

    while let Some(parent_id) = queue.pop_front() {
        let parent_traces = analysis
            .by_node_id
            .get(&parent_id)
            .map(|r| r.traces.clone())
            .unwrap_or_default();
        for edge in graph.edges_from(&parent_id) {
            let child_id = edge.to.clone();
            let record = analysis
                .by_node_id
                .entry(child_id.clone())
                .or_insert_with(|| ReachabilityRecord {
                    level: ReachabilityLevel::Transitive,
                    evidences: Vec::new(),
                    traces: Vec::new(),
                });
            record.evidences.push(Evidence::Propagation {
                via_node_id: parent_id.clone(),
                via_edge_name: edge.name.clone(),
                via_edge_type: edge.edge_type,
                resolved_package_node_id: child_id.clone(),
            });
            let child_name = graph
                .node(&child_id)
                .map(|n| n.name.clone())
                .unwrap_or_else(|| child_id.clone());
            for trace in &parent_traces {
                let mut extended = trace.clone();
                extended.push(child_name.clone());
                record.push_trace(extended);
            }
            if visited.insert(child_id.clone()) {
                queue.push_back(child_id);
            }
        }
    }
}

fn record_unresolved(
    analysis: &mut ReachabilityAnalysis,
    options: &ReachabilityOptions,
    file: &Path,
    import: &crate::imports::ParsedImport,
    raw_specifier: &str,
    reason: &str,
) {
    if !options.explain_resolve {
        return;
    }
    analysis.unresolved_imports.push(UnresolvedImport {
        file: file.display().to_string(),
        line: import.line,
        column: import.column,
        specifier: raw_specifier.to_string(),
        reason: reason.to_string(),
    });
}
