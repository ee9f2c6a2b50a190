//! Scan orchestration: graph load, reachability, batched vulnerability
//! lookup, fix selection, filtering, and prioritization.

use crate::fix::FixSelector;
use crate::ignore::{IgnorePolicy, DEFAULT_IGNORE_FILE};
use crate::{
    priority, AffectedPackage, AffectedReachability, Finding, FixSuggestion, Priority,
    ReachabilityState, ScanMeta, ScanMode, ScanOptions, ScanResult, ScanStats, SourceAnalysisMeta,
};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use npmvulncheck_advisories::severity::severity_of;
use npmvulncheck_advisories::{OsvVulnerability, PackageQuery, VulnerabilityProvider};
use npmvulncheck_graph::{path_names, DependencyFlags, PackageNode, PackageSource};
use npmvulncheck_lockfiles::load_project;
use npmvulncheck_reachability::{discover_entries, ReachabilityAnalysis, ReachabilityOptions};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const MAX_PATHS_PER_AFFECTED: usize = 3;

struct InventoryEntry {
    name: String,
    version: String,
    node_ids: Vec<String>,
}

/// Run a full scan of `options.root`.
pub fn run_scan(
    options: &ScanOptions,
    provider: &dyn VulnerabilityProvider,
) -> Result<ScanResult> {
    let load = load_project(&options.root, options.mode == ScanMode::Installed)?;
    let mut graph = load.context.graph;
    let resolver = load.context.resolver;
    let warnings = load.warnings;

    // Providers are expected to emit a root importer; synthesize one if not.
    if !graph.nodes.contains_key(&graph.root_id) {
        let root_id = graph.root_id.clone();
        graph.add_node(PackageNode {
            id: root_id.clone(),
            name: "(root)".to_string(),
            version: "0.0.0".to_string(),
            location: String::new(),
            source: PackageSource::Workspace,
            flags: DependencyFlags::default(),
            purl: None,
            integrity: None,
            resolved: None,
        });
    }

    // Source-level reachability.
    let analysis: Option<ReachabilityAnalysis> = if options.mode == ScanMode::Source {
        let entries = discover_entries(&options.root, &options.entries);
        info!("analyzing {} entry file(s)", entries.len());
        Some(npmvulncheck_reachability::analyze(
            &options.root,
            &graph,
            resolver.as_ref(),
            &entries,
            &ReachabilityOptions {
                conditions: options.conditions.clone(),
                include_type_imports: options.include_type_imports,
                explain_resolve: options.explain_resolve,
            },
        ))
    } else {
        None
    };

    // Inventory: non-root registry nodes passing the dev policy, deduped by
    // name@version.
    let mut inventory: BTreeMap<String, InventoryEntry> = BTreeMap::new();
    for node in graph.nodes.values() {
        if node.id == graph.root_id
            || node.source != PackageSource::Registry
            || (!options.include_dev && node.flags.dev)
        {
            continue;
        }
        let entry = inventory
            .entry(node.package_key())
            .or_insert_with(|| InventoryEntry {
                name: node.name.clone(),
                version: node.version.clone(),
                node_ids: Vec::new(),
            });
        entry.node_ids.push(node.id.clone());
    }
    for entry in inventory.values_mut() {
        entry.node_ids.sort();
    }

    let queries: Vec<PackageQuery> = inventory
        .values()
        .map(|entry| PackageQuery::new(entry.name.clone(), entry.version.clone()))
        .collect();
    info!("querying {} unique package version(s)", queries.len());
    let matches = provider.query_packages(&queries)?;

    let ignore_path = options
        .ignore_file
        .clone()
        .unwrap_or_else(|| options.root.join(DEFAULT_IGNORE_FILE));
    let ignore = IgnorePolicy::load(&ignore_path)?;

    let selector = FixSelector::new(provider);
    let mut details: HashMap<String, OsvVulnerability> = HashMap::new();
    let mut drafts: BTreeMap<String, (OsvVulnerability, Vec<AffectedPackage>)> = BTreeMap::new();

    for (key, entry) in &inventory {
        let Some(refs) = matches.get(key) else { continue };
        let mut refs = refs.clone();
        refs.sort_by(|a, b| a.id.cmp(&b.id));
        for vuln_ref in refs {
            if ignore.is_ignored(&vuln_ref.id) {
                debug!("{} ignored by policy", vuln_ref.id);
                continue;
            }
            let detail = match details.get(&vuln_ref.id) {
                Some(detail) => detail.clone(),
                None => {
                    let detail = provider
                        .get_vuln(&vuln_ref.id, vuln_ref.modified.as_deref())
                        .with_context(|| format!("failed to load detail for {}", vuln_ref.id))?;
                    details.insert(vuln_ref.id.clone(), detail.clone());
                    detail
                }
            };
            let fix = selector.suggest(&detail, &entry.name, &entry.version);
            let draft = drafts
                .entry(vuln_ref.id.clone())
                .or_insert_with(|| (detail.clone(), Vec::new()));
            for node_id in &entry.node_ids {
                draft.1.push(build_affected(
                    &graph,
                    node_id,
                    entry,
                    analysis.as_ref(),
                    fix.clone(),
                ));
            }
        }
    }

    // Severity filter, priority, ordering.
    let mut findings = Vec::new();
    for (vuln_id, (detail, affected)) in drafts {
        let severity = severity_of(&detail.severity);
        if let Some(threshold) = options.severity_threshold {
            if severity.is_some_and(|s| s.rank() < threshold.rank()) {
                continue;
            }
        }
        let priority: Priority = priority::compute(options.mode, &affected, severity);
        findings.push(Finding {
            vuln_id,
            aliases: detail.aliases,
            summary: detail.summary,
            details: detail.details,
            severity,
            modified: detail.modified,
            published: detail.published,
            references: detail.references,
            affected,
            priority,
        });
    }
    findings.sort_by(|a, b| {
        b.priority
            .score
            .cmp(&a.priority.score)
            .then_with(|| a.vuln_id.cmp(&b.vuln_id))
    });

    let stats = ScanStats {
        nodes: graph.nodes.len(),
        edges: graph.edges.len(),
        queried_packages: inventory.len(),
        vulnerabilities: findings.len(),
    };

    let source_analysis = analysis.map(|a| SourceAnalysisMeta {
        entries_scanned: a.entries_scanned,
        has_unknown_imports: a.has_unknown_imports,
        complete_coverage: a.complete_coverage(),
        unresolved_imports: a.unresolved_imports,
    });

    Ok(ScanResult {
        meta: ScanMeta {
            tool: "npmvulncheck".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: options.mode,
            format: "json".to_string(),
            db: "osv.dev".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            package_manager: Some(load.context.detect.manager),
            source_analysis,
            warnings,
        },
        findings,
        stats,
    })
}

fn build_affected(
    graph: &npmvulncheck_graph::DepGraph,
    node_id: &str,
    entry: &InventoryEntry,
    analysis: Option<&ReachabilityAnalysis>,
    fix: Option<FixSuggestion>,
) -> AffectedPackage {
    let paths: Vec<Vec<String>> = graph
        .shortest_paths_to(node_id, MAX_PATHS_PER_AFFECTED)
        .iter()
        .map(|p| path_names(graph, p))
        .collect();
    let reachability = analysis.map(|a| match a.by_node_id.get(node_id) {
        Some(record) => AffectedReachability {
            state: ReachabilityState::Reachable,
            level: Some(record.level),
            traces: record.traces.clone(),
        },
        None => AffectedReachability {
            state: if a.complete_coverage() {
                ReachabilityState::Unreachable
            } else {
                ReachabilityState::Unknown
            },
            level: None,
            traces: Vec::new(),
        },
    });
    let node = graph.node(node_id);
    AffectedPackage {
        name: entry.name.clone(),
        version: entry.version.clone(),
        node_id: node_id.to_string(),
        direct: graph.root_direct_node_ids.contains(node_id),
        flags: node.map(|n| n.flags).unwrap_or_default(),
        paths,
        reachability,
        fix,
    }
}
