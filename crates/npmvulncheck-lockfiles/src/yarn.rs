//! yarn provider: classic (`# yarn lockfile v1`) and berry (YAML with
//! `__metadata`).
//!
//! Classic entries are keyed by comma-separated descriptor lists; the first
//! descriptor names the package, every descriptor becomes a resolution
//! alias. Berry entries are keyed the same way but carry protocol-qualified
//! descriptors and a `resolution` locator that doubles as the node id, so
//! virtual (peer-specialized) resolutions stay distinct nodes.

use crate::manifest::PackageManifest;
use crate::workspaces::discover_members;
use crate::{Capabilities, DetectResult, LockfileProvider, PackageManager, ProviderContext};
use anyhow::{Context, Result};
use npmvulncheck_graph::{
    specifier, DepGraph, DependencyFlags, EdgeType, ImportKind, PackageNode, PackageResolver,
    PackageSource, Resolution,
};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct YarnProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YarnFlavor {
    Classic,
    Berry,
}

impl LockfileProvider for YarnProvider {
    fn manager(&self) -> PackageManager {
        PackageManager::Yarn
    }

    fn detect(&self, root: &Path) -> Option<DetectResult> {
        let path = root.join("yarn.lock");
        if !path.is_file() {
            return None;
        }
        let flavor = sniff_flavor(&path);
        Some(DetectResult {
            manager: PackageManager::Yarn,
            lockfile_path: path,
            details: match flavor {
                YarnFlavor::Classic => "yarn.lock (classic)".to_string(),
                YarnFlavor::Berry => "yarn.lock (berry)".to_string(),
            },
        })
    }

    fn load(&self, root: &Path) -> Result<ProviderContext> {
        let detect = self
            .detect(root)
            .context("yarn provider selected but yarn.lock is missing")?;
        let content = fs::read_to_string(&detect.lockfile_path)
            .with_context(|| format!("failed to read {}", detect.lockfile_path.display()))?;
        let manifest = PackageManifest::read_dir(root)?.unwrap_or_default();
        let flavor = sniff_flavor(&detect.lockfile_path);

        let (graph, aliases) = match flavor {
            YarnFlavor::Classic => build_classic(root, &content, &manifest)?,
            YarnFlavor::Berry => build_berry(root, &content, &manifest)?,
        };

        let pnp = load_pnp_data(root);
        let has_node_modules = root.join("node_modules").is_dir();
        let capabilities = Capabilities {
            lockfile_resolver: true,
            fs_resolver: has_node_modules,
            pnp_resolver: pnp.is_some() || root.join(".pnp.cjs").is_file(),
        };
        let resolver = YarnResolver::new(root.to_path_buf(), &graph, aliases, pnp, has_node_modules);
        Ok(ProviderContext {
            detect,
            graph,
            capabilities,
            resolver: Box::new(resolver),
        })
    }
}

fn sniff_flavor(path: &Path) -> YarnFlavor {
    match fs::read_to_string(path) {
        Ok(content) if content.contains("__metadata") => YarnFlavor::Berry,
        _ => YarnFlavor::Classic,
    }
}

/// Split a descriptor or locator into `(name, reference)`, scope-aware.
fn split_descriptor(descriptor: &str) -> (String, String) {
    if descriptor.len() < 2 {
        return (descriptor.to_string(), String::new());
    }
    match descriptor[1..].rfind('@') {
        Some(i) => (
            descriptor[..i + 1].to_string(),
            descriptor[i + 2..].to_string(),
        ),
        None => (descriptor.to_string(), String::new()),
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches('"')
}

// ---------------------------------------------------------------------------
// classic
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClassicEntry {
    descriptors: Vec<String>,
    version: Option<String>,
    resolved: Option<String>,
    integrity: Option<String>,
    dependencies: Vec<(String, String)>,
    optional_dependencies: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassicSection {
    None,
    Dependencies,
    OptionalDependencies,
}

fn parse_classic(content: &str) -> Vec<ClassicEntry> {
    let mut entries = Vec::new();
    let mut current: Option<ClassicEntry> = None;
    let mut section = ClassicSection::None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') && !line.starts_with('\t') && trimmed.ends_with(':') {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            section = ClassicSection::None;
            let descriptors = trimmed
                .trim_end_matches(':')
                .split(',')
                .map(|d| strip_quotes(d).to_string())
                .filter(|d| !d.is_empty())
                .collect();
            current = Some(ClassicEntry {
                descriptors,
                ..Default::default()
            });
            continue;
        }
        let Some(entry) = current.as_mut() else { continue };
        let deep = line.starts_with("    ") || line.starts_with("\t\t");
        if deep && section != ClassicSection::None {
            // `    "@babel/highlight" "^7.18.6"`
            let mut parts = trimmed.splitn(2, ' ');
            let name = strip_quotes(parts.next().unwrap_or_default()).to_string();
            let range = strip_quotes(parts.next().unwrap_or_default()).to_string();
            if !name.is_empty() {
                match section {
                    ClassicSection::Dependencies => entry.dependencies.push((name, range)),
                    ClassicSection::OptionalDependencies => {
                        entry.optional_dependencies.push((name, range))
                    }
                    ClassicSection::None => {}
                }
            }
            continue;
        }
        section = ClassicSection::None;
        if let Some(rest) = trimmed.strip_prefix("version ") {
            entry.version = Some(strip_quotes(rest).to_string());
        } else if let Some(rest) = trimmed.strip_prefix("resolved ") {
            entry.resolved = Some(strip_quotes(rest).to_string());
        } else if let Some(rest) = trimmed.strip_prefix("integrity ") {
            entry.integrity = Some(strip_quotes(rest).to_string());
        } else if trimmed == "dependencies:" {
            section = ClassicSection::Dependencies;
        } else if trimmed == "optionalDependencies:" {
            section = ClassicSection::OptionalDependencies;
        }
    }
    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

fn classic_source(entry: &ClassicEntry, range: &str) -> PackageSource {
    if range.starts_with("file:") {
        PackageSource::File
    } else if range.starts_with("link:") {
        PackageSource::Link
    } else if range.starts_with("workspace:") {
        PackageSource::Workspace
    } else if entry
        .resolved
        .as_deref()
        .is_some_and(|r| r.starts_with("git") || r.contains("codeload.github.com"))
    {
        PackageSource::Git
    } else {
        PackageSource::Registry
    }
}

fn build_classic(
    root: &Path,
    content: &str,
    manifest: &PackageManifest,
) -> Result<(DepGraph, HashMap<String, String>)> {
    let entries = parse_classic(content);
    let root_id = "importer:.".to_string();
    let mut graph = DepGraph::new(root_id.clone());
    let mut aliases: HashMap<String, String> = HashMap::new();

    // Nodes first so every alias is known before edges resolve.
    let mut ids = Vec::with_capacity(entries.len());
    for entry in &entries {
        let Some(first) = entry.descriptors.first() else {
            ids.push(None);
            continue;
        };
        let (name, range) = split_descriptor(first);
        let version = entry.version.clone().unwrap_or_else(|| "0.0.0".to_string());
        let mut id = format!("{name}@{version}");
        let mut n = 1;
        while graph.nodes.contains_key(&id) {
            id = format!("{name}@{version}#{n}");
            n += 1;
        }
        graph.add_node(PackageNode {
            id: id.clone(),
            name: name.clone(),
            version,
            location: first.clone(),
            source: classic_source(entry, &range),
            flags: DependencyFlags::default(),
            purl: None,
            integrity: entry.integrity.clone(),
            resolved: entry.resolved.clone(),
        });
        for descriptor in &entry.descriptors {
            aliases.insert(descriptor.clone(), id.clone());
        }
        ids.push(Some(id));
    }

    let by_name = name_index(&graph);
    for (entry, id) in entries.iter().zip(&ids) {
        let Some(id) = id else { continue };
        for (dep_name, range) in &entry.dependencies {
            add_alias_edge(&mut graph, &aliases, &by_name, id, dep_name, range, EdgeType::Prod);
        }
        for (dep_name, range) in &entry.optional_dependencies {
            add_alias_edge(
                &mut graph,
                &aliases,
                &by_name,
                id,
                dep_name,
                range,
                EdgeType::Optional,
            );
        }
    }

    add_importers(&mut graph, &aliases, &by_name, root, manifest)?;
    Ok((graph, aliases))
}

// ---------------------------------------------------------------------------
// berry
// ---------------------------------------------------------------------------

fn yaml_str(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn berry_source(reference: &str) -> PackageSource {
    if reference.starts_with("npm:") || reference.starts_with("virtual:") {
        PackageSource::Registry
    } else if reference.starts_with("workspace:") {
        PackageSource::Workspace
    } else if reference.starts_with("patch:") {
        PackageSource::Patch
    } else if reference.starts_with("portal:") {
        PackageSource::Portal
    } else if reference.starts_with("link:") {
        PackageSource::Link
    } else if reference.starts_with("file:") {
        PackageSource::File
    } else if reference.starts_with("git") || reference.starts_with("https://") {
        PackageSource::Git
    } else {
        PackageSource::Unknown
    }
}

fn build_berry(
    root: &Path,
    content: &str,
    manifest: &PackageManifest,
) -> Result<(DepGraph, HashMap<String, String>)> {
    let doc: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(content).context("failed to parse berry yarn.lock")?;

    let mut graph = DepGraph::new(String::new());
    let mut aliases: HashMap<String, String> = HashMap::new();
    let mut entry_deps: Vec<(String, Vec<(String, String)>, Vec<(String, String)>)> = Vec::new();

    for (key, value) in &doc {
        if key == "__metadata" {
            continue;
        }
        let Some(map) = value.as_mapping() else { continue };
        let get = |field: &str| {
            map.get(serde_yaml::Value::String(field.to_string()))
        };
        let resolution = match get("resolution").and_then(yaml_str) {
            Some(r) => r,
            None => {
                debug!("yarn berry: entry {key} has no resolution");
                continue;
            }
        };
        let (name, reference) = split_descriptor(&resolution);
        let version = get("version")
            .and_then(yaml_str)
            .unwrap_or_else(|| "0.0.0".to_string());
        let source = berry_source(&reference);
        let id = resolution.clone();
        graph.add_node(PackageNode {
            id: id.clone(),
            name,
            version,
            location: resolution.clone(),
            source,
            flags: DependencyFlags::default(),
            purl: None,
            integrity: get("checksum").and_then(yaml_str),
            resolved: Some(resolution.clone()),
        });
        for descriptor in key.split(',').map(str::trim) {
            aliases.insert(strip_quotes(descriptor).to_string(), id.clone());
        }
        aliases.insert(resolution.clone(), id.clone());

        if source == PackageSource::Workspace {
            let path = reference.trim_start_matches("workspace:").to_string();
            if path == "." {
                graph.root_id = id.clone();
            }
            graph.importers.insert(path, id.clone());
        }

        let collect = |field: &str| -> Vec<(String, String)> {
            get(field)
                .and_then(|v| v.as_mapping())
                .map(|deps| {
                    deps.iter()
                        .filter_map(|(k, v)| Some((yaml_str(k)?, yaml_str(v)?)))
                        .collect()
                })
                .unwrap_or_default()
        };
        entry_deps.push((id, collect("dependencies"), collect("peerDependencies")));
    }

    if graph.root_id.is_empty() {
        // No workspace entries; synthesize the root importer.
        let id = "importer:.".to_string();
        graph.root_id = id.clone();
        graph.add_node(PackageNode {
            id: id.clone(),
            name: manifest
                .name
                .clone()
                .unwrap_or_else(|| "(root)".to_string()),
            version: manifest
                .version
                .clone()
                .unwrap_or_else(|| "0.0.0".to_string()),
            location: ".".to_string(),
            source: PackageSource::Workspace,
            flags: DependencyFlags::default(),
            purl: None,
            integrity: None,
            resolved: None,
        });
        graph.importers.insert(".".to_string(), id);
    }

    let by_name = name_index(&graph);
    for (from, deps, peer_deps) in entry_deps {
        // Berry stores ranges without the protocol; descriptors carry it.
        for (dep_name, range) in deps {
            add_berry_edge(&mut graph, &aliases, &by_name, &from, &dep_name, &range, EdgeType::Prod);
        }
        for (dep_name, range) in peer_deps {
            add_berry_edge(&mut graph, &aliases, &by_name, &from, &dep_name, &range, EdgeType::Peer);
        }
    }

    // Root-manifest dev dependencies are not part of berry workspace entry
    // dependency maps with their type, so mark known dev names.
    for dep_name in manifest.dev_dependencies.keys() {
        if let Some(edge) = graph
            .edges
            .iter()
            .position(|e| e.from == graph.root_id && &e.name == dep_name)
        {
            let to = graph.edges[edge].to.clone();
            if let Some(node) = graph.nodes.get_mut(&to) {
                node.flags.dev = true;
            }
        }
    }

    Ok((graph, aliases))
}

fn add_berry_edge(
    graph: &mut DepGraph,
    aliases: &HashMap<String, String>,
    by_name: &HashMap<String, Vec<String>>,
    from: &str,
    dep_name: &str,
    range: &str,
    edge_type: EdgeType,
) {
    let candidates = [
        format!("{dep_name}@{range}"),
        format!("{dep_name}@npm:{range}"),
    ];
    for candidate in &candidates {
        if let Some(target) = aliases.get(candidate) {
            graph.add_edge(from.to_string(), target.clone(), dep_name.to_string(), edge_type);
            return;
        }
    }
    if let Some(ids) = by_name.get(dep_name) {
        graph.add_edge(from.to_string(), ids[0].clone(), dep_name.to_string(), edge_type);
    } else {
        debug!("yarn: dangling dependency {dep_name}@{range}");
    }
}

// ---------------------------------------------------------------------------
// shared
// ---------------------------------------------------------------------------

fn name_index(graph: &DepGraph) -> HashMap<String, Vec<String>> {
    let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
    for node in graph.nodes.values() {
        by_name.entry(node.name.clone()).or_default().push(node.id.clone());
    }
    for ids in by_name.values_mut() {
        ids.sort();
    }
    by_name
}

fn add_alias_edge(
    graph: &mut DepGraph,
    aliases: &HashMap<String, String>,
    by_name: &HashMap<String, Vec<String>>,
    from: &str,
    dep_name: &str,
    range: &str,
    edge_type: EdgeType,
) {
    let descriptor = format!("{dep_name}@{range}");
    if let Some(target) = aliases.get(&descriptor) {
        graph.add_edge(from.to_string(), target.clone(), dep_name.to_string(), edge_type);
    } else if let Some(ids) = by_name.get(dep_name) {
        graph.add_edge(from.to_string(), ids[0].clone(), dep_name.to_string(), edge_type);
    } else {
        debug!("yarn: dangling dependency {descriptor}");
    }
}

/// Root and workspace-member importers for a classic lockfile, whose entries
/// never include the project itself.
fn add_importers(
    graph: &mut DepGraph,
    aliases: &HashMap<String, String>,
    by_name: &HashMap<String, Vec<String>>,
    root: &Path,
    manifest: &PackageManifest,
) -> Result<()> {
    let root_id = graph.root_id.clone();
    graph.add_node(PackageNode {
        id: root_id.clone(),
        name: manifest
            .name
            .clone()
            .unwrap_or_else(|| "(root)".to_string()),
        version: manifest
            .version
            .clone()
            .unwrap_or_else(|| "0.0.0".to_string()),
        location: ".".to_string(),
        source: PackageSource::Workspace,
        flags: DependencyFlags::default(),
        purl: None,
        integrity: None,
        resolved: None,
    });
    graph.importers.insert(".".to_string(), root_id.clone());

    let mut importer_manifests: Vec<(String, PackageManifest)> = Vec::new();
    for member in discover_members(root, manifest)? {
        importer_manifests.push((member.key, member.manifest));
    }

    let manifest_sections = |m: &PackageManifest| {
        [
            (m.dependencies.clone(), EdgeType::Prod),
            (m.dev_dependencies.clone(), EdgeType::Dev),
            (m.optional_dependencies.clone(), EdgeType::Optional),
            (m.peer_dependencies.clone(), EdgeType::Peer),
        ]
    };

    for (deps, edge_type) in manifest_sections(manifest) {
        for (dep_name, range) in deps {
            add_alias_edge(graph, aliases, by_name, &root_id, &dep_name, &range, edge_type);
        }
    }
    for (key, member_manifest) in importer_manifests {
        let importer_id = format!("importer:{key}");
        graph.add_node(PackageNode {
            id: importer_id.clone(),
            name: member_manifest
                .name
                .clone()
                .unwrap_or_else(|| key.clone()),
            version: member_manifest
                .version
                .clone()
                .unwrap_or_else(|| "0.0.0".to_string()),
            location: key.clone(),
            source: PackageSource::Workspace,
            flags: DependencyFlags::default(),
            purl: None,
            integrity: None,
            resolved: None,
        });
        graph.importers.insert(key.clone(), importer_id.clone());
        for (deps, edge_type) in manifest_sections(&member_manifest) {
            for (dep_name, range) in deps {
                add_alias_edge(graph, aliases, by_name, &importer_id, &dep_name, &range, edge_type);
            }
        }
    }
    Ok(())
}

/// Locator table from `.pnp.data.json`, when the project uses PnP with the
/// JSON data file. The `.pnp.cjs` script form only flags the capability.
fn load_pnp_data(root: &Path) -> Option<HashMap<String, Vec<String>>> {
    let content = fs::read_to_string(root.join(".pnp.data.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    let registry = value.get("packageRegistryData")?.as_array()?;
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for pair in registry {
        let pair = pair.as_array()?;
        let Some(name) = pair.first().and_then(|n| n.as_str()) else {
            continue;
        };
        if let Some(refs) = pair.get(1).and_then(|r| r.as_array()) {
            for reference in refs {
                if let Some(r) = reference
                    .as_array()
                    .and_then(|entry| entry.first())
                    .and_then(|r| r.as_str())
                {
                    map.entry(name.to_string()).or_default().push(r.to_string());
                }
            }
        }
    }
    Some(map)
}

/// PnP data first, the installed tree second, the lockfile graph last.
pub struct YarnResolver {
    root: PathBuf,
    aliases: HashMap<String, String>,
    by_name: HashMap<String, Vec<String>>,
    by_name_version: HashMap<(String, String), String>,
    root_direct: HashMap<String, String>,
    pnp: Option<HashMap<String, Vec<String>>>,
    has_node_modules: bool,
}

impl YarnResolver {
    fn new(
        root: PathBuf,
        graph: &DepGraph,
        aliases: HashMap<String, String>,
        pnp: Option<HashMap<String, Vec<String>>>,
        has_node_modules: bool,
    ) -> Self {
        let by_name = name_index(graph);
        let mut by_name_version = HashMap::new();
        for node in graph.nodes.values() {
            by_name_version
                .entry((node.name.clone(), node.version.clone()))
                .or_insert(node.id.clone());
        }
        let mut root_direct = HashMap::new();
        for edge in graph.edges_from(&graph.root_id) {
            root_direct.entry(edge.name.clone()).or_insert(edge.to.clone());
        }
        Self {
            root,
            aliases,
            by_name,
            by_name_version,
            root_direct,
            pnp,
            has_node_modules,
        }
    }

    fn resolve_via_pnp(&self, name: &str) -> Option<String> {
        let references = self.pnp.as_ref()?.get(name)?;
        for reference in references {
            if let Some(id) = self.aliases.get(&format!("{name}@{reference}")) {
                return Some(id.clone());
            }
        }
        None
    }

    fn resolve_via_fs(&self, name: &str, from_file: Option<&Path>) -> Option<String> {
        if !self.has_node_modules {
            return None;
        }
        let mut dir = from_file.and_then(Path::parent).unwrap_or(&self.root);
        loop {
            if let Ok(Some(pkg)) = PackageManifest::read_dir(&dir.join("node_modules").join(name)) {
                if let Some(version) = pkg.version {
                    if let Some(id) = self.by_name_version.get(&(name.to_string(), version)) {
                        return Some(id.clone());
                    }
                }
            }
            if dir == self.root {
                return None;
            }
            dir = dir.parent()?;
            if !dir.starts_with(&self.root) {
                return None;
            }
        }
    }
}

impl PackageResolver for YarnResolver {
    fn resolve_package(
        &self,
        spec: &str,
        from_file: Option<&Path>,
        _import_kind: ImportKind,
        _conditions: &[String],
    ) -> Resolution {
        let Some(bare) = specifier::parse_bare(spec) else {
            return Resolution::Unresolved;
        };
        if let Some(id) = self.resolve_via_pnp(&bare.package_name) {
            return Resolution::Resolved(id);
        }
        if let Some(id) = self.resolve_via_fs(&bare.package_name, from_file) {
            return Resolution::Resolved(id);
        }
        if let Some(id) = self.root_direct.get(&bare.package_name) {
            return Resolution::Resolved(id.clone());
        }
        if let Some(ids) = self.by_name.get(&bare.package_name) {
            return Resolution::Resolved(ids[0].clone());
        }
        Resolution::Unresolved
    }

    fn resolve_package_candidates(&self, spec: &str, _from_file: Option<&Path>) -> Vec<String> {
        match specifier::parse_bare(spec) {
            Some(bare) => self.by_name.get(&bare.package_name).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CLASSIC: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/code-frame@^7.0.0":
  version "7.18.6"
  resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.18.6.tgz"
  integrity sha512-abc
  dependencies:
    "@babel/highlight" "^7.18.6"

"@babel/highlight@^7.18.6":
  version "7.18.6"
  resolved "https://registry.yarnpkg.com/@babel/highlight/-/highlight-7.18.6.tgz"
  integrity sha512-def

express@^4.0.0, express@~4.0.0:
  version "4.0.0"
  resolved "https://registry.yarnpkg.com/express/-/express-4.0.0.tgz"
  integrity sha512-express
  dependencies:
    body-parser "^1.0.0"
  optionalDependencies:
    etag "^1.0.0"

body-parser@^1.0.0:
  version "1.0.0"
  resolved "https://registry.yarnpkg.com/body-parser/-/body-parser-1.0.0.tgz"
  integrity sha512-bp

etag@^1.0.0:
  version "1.0.0"
  resolved "https://registry.yarnpkg.com/etag/-/etag-1.0.0.tgz"
  integrity sha512-etag
"#;

    const BERRY: &str = r#"
__metadata:
  version: 8
  cacheKey: 10c0

"demo@workspace:.":
  version: 0.0.0-use.local
  resolution: "demo@workspace:."
  dependencies:
    lodash: "npm:^4.17.21"
  languageName: unknown
  linkType: soft

"lodash@npm:^4.17.20, lodash@npm:^4.17.21":
  version: 4.17.21
  resolution: "lodash@npm:4.17.21"
  checksum: 10c0/abc
  languageName: node
  linkType: hard
"#;

    fn write_classic(temp: &TempDir) {
        fs::write(
            temp.path().join("package.json"),
            r#"{"name": "demo", "version": "1.0.0", "dependencies": {"express": "^4.0.0"}}"#,
        )
        .unwrap();
        fs::write(temp.path().join("yarn.lock"), CLASSIC).unwrap();
    }

    #[test]
    fn classic_entries_parse_with_aliases() {
        let entries = parse_classic(CLASSIC);
        assert_eq!(entries.len(), 5);
        let express = entries.iter().find(|e| e.descriptors[0].starts_with("express")).unwrap();
        assert_eq!(express.descriptors.len(), 2);
        assert_eq!(express.version.as_deref(), Some("4.0.0"));
        assert_eq!(express.dependencies, [("body-parser".to_string(), "^1.0.0".to_string())]);
        assert_eq!(express.optional_dependencies.len(), 1);
    }

    #[test]
    fn classic_graph_and_root_edges() {
        let temp = TempDir::new().unwrap();
        write_classic(&temp);
        let ctx = YarnProvider.load(temp.path()).unwrap();
        assert!(ctx.graph.nodes.contains_key("express@4.0.0"));
        assert!(ctx.graph.root_direct_node_ids.contains("express@4.0.0"));
        let optional = ctx.graph.edges.iter().find(|e| e.name == "etag").unwrap();
        assert_eq!(optional.edge_type, EdgeType::Optional);
        let scoped = ctx
            .graph
            .edges
            .iter()
            .find(|e| e.name == "@babel/highlight")
            .unwrap();
        assert_eq!(scoped.from, "@babel/code-frame@7.18.6");
    }

    #[test]
    fn classic_resolver_uses_root_direct_first() {
        let temp = TempDir::new().unwrap();
        write_classic(&temp);
        let ctx = YarnProvider.load(temp.path()).unwrap();
        let from = temp.path().join("src/index.ts");
        let resolved =
            ctx.resolver
                .resolve_package("express", Some(&from), ImportKind::EsmImport, &[]);
        assert_eq!(resolved, Resolution::Resolved("express@4.0.0".to_string()));
    }

    #[test]
    fn berry_graph_uses_resolution_ids() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"name": "demo", "version": "1.0.0"}"#,
        )
        .unwrap();
        fs::write(temp.path().join("yarn.lock"), BERRY).unwrap();
        let ctx = YarnProvider.load(temp.path()).unwrap();
        assert_eq!(ctx.graph.root_id, "demo@workspace:.");
        assert!(ctx.graph.nodes.contains_key("lodash@npm:4.17.21"));
        assert!(ctx.graph.root_direct_node_ids.contains("lodash@npm:4.17.21"));
        let lodash = &ctx.graph.nodes["lodash@npm:4.17.21"];
        assert_eq!(lodash.version, "4.17.21");
        assert_eq!(lodash.source, PackageSource::Registry);
    }

    #[test]
    fn detect_reports_flavor() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("yarn.lock"), BERRY).unwrap();
        let detect = YarnProvider.detect(temp.path()).unwrap();
        assert!(detect.details.contains("berry"));
    }
}
