//! pnpm provider: pnpm-lock.yaml, v5 through v9.
//!
//! v5 inventories packages under `/name/version` keys (peer suffixes after
//! `_` or in parentheses); v9 splits instance identity (`snapshots:`,
//! peer-decorated keys) from base metadata (`packages:`). Every workspace
//! member in `importers:` becomes an `importer:<key>` node, so two members
//! can resolve the same dependency name to different instances.

use crate::exports::resolve_imports;
use crate::manifest::PackageManifest;
use crate::{rel_key, Capabilities, DetectResult, LockfileProvider, PackageManager, ProviderContext};
use anyhow::{Context, Result};
use npmvulncheck_graph::{
    specifier, DepGraph, DependencyFlags, EdgeType, ImportKind, PackageNode, PackageResolver,
    PackageSource, Resolution,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PnpmLockfile {
    lockfile_version: serde_yaml::Value,
    #[serde(default)]
    importers: BTreeMap<String, PnpmImporter>,
    #[serde(default)]
    packages: BTreeMap<String, PnpmPackageInfo>,
    #[serde(default)]
    snapshots: BTreeMap<String, PnpmSnapshot>,
    // Single-project v5 lockfiles keep the root sections at the top level.
    #[serde(default)]
    dependencies: BTreeMap<String, PnpmDepRef>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, PnpmDepRef>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, PnpmDepRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PnpmImporter {
    #[serde(default)]
    dependencies: BTreeMap<String, PnpmDepRef>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, PnpmDepRef>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, PnpmDepRef>,
}

/// v5 records plain `name: version` pairs; v6+ records
/// `name: {specifier, version}` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PnpmDepRef {
    Detailed {
        #[allow(dead_code)]
        specifier: Option<String>,
        version: String,
    },
    Plain(String),
}

impl PnpmDepRef {
    fn version(&self) -> &str {
        match self {
            PnpmDepRef::Detailed { version, .. } => version,
            PnpmDepRef::Plain(version) => version,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PnpmPackageInfo {
    name: Option<String>,
    version: Option<String>,
    resolution: Option<PnpmResolution>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct PnpmResolution {
    integrity: Option<String>,
    tarball: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PnpmSnapshot {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
}

pub struct PnpmProvider;

impl LockfileProvider for PnpmProvider {
    fn manager(&self) -> PackageManager {
        PackageManager::Pnpm
    }

    fn detect(&self, root: &Path) -> Option<DetectResult> {
        let path = root.join("pnpm-lock.yaml");
        if path.is_file() {
            Some(DetectResult {
                manager: PackageManager::Pnpm,
                lockfile_path: path,
                details: "pnpm-lock.yaml".to_string(),
            })
        } else {
            None
        }
    }

    fn load(&self, root: &Path) -> Result<ProviderContext> {
        let detect = self
            .detect(root)
            .context("pnpm provider selected but pnpm-lock.yaml is missing")?;
        let content = fs::read_to_string(&detect.lockfile_path)
            .with_context(|| format!("failed to read {}", detect.lockfile_path.display()))?;
        let lock: PnpmLockfile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse {}", detect.lockfile_path.display()))?;
        let manifest = PackageManifest::read_dir(root)?.unwrap_or_default();

        let builder = GraphBuilder::new(root, &lock, &manifest);
        let (graph, resolver) = builder.build()?;
        Ok(ProviderContext {
            detect,
            graph,
            capabilities: Capabilities {
                lockfile_resolver: true,
                fs_resolver: false,
                pnp_resolver: false,
            },
            resolver: Box::new(resolver),
        })
    }
}

fn major_version(version: &serde_yaml::Value) -> u32 {
    match version {
        serde_yaml::Value::Number(n) => n.as_f64().unwrap_or(5.0) as u32,
        serde_yaml::Value::String(s) => s
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .unwrap_or(5),
        _ => 5,
    }
}

/// Truncate a version at the first peer decoration (`(…)` or `_…`).
fn strip_peer_suffix(version: &str) -> &str {
    let end = version
        .find('(')
        .into_iter()
        .chain(version.find('_'))
        .min()
        .unwrap_or(version.len());
    &version[..end]
}

/// `name@version` (scope-aware), ignoring peer decorations for the version.
fn parse_name_at_version(key: &str) -> Option<(String, String)> {
    let base = match key.find('(') {
        Some(i) => &key[..i],
        None => key,
    };
    let at = base[1..].rfind('@').map(|i| i + 1)?;
    let (name, version) = (&base[..at], &base[at + 1..]);
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

/// v5 `/name/version` (or v6 `/name@version`) inventory keys.
fn parse_v5_key(key: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix('/')?;
    if let Some(i) = rest.rfind('/') {
        let (name, version) = (&rest[..i], &rest[i + 1..]);
        if version.starts_with(|c: char| c.is_ascii_digit()) {
            return Some((name.to_string(), strip_peer_suffix(version).to_string()));
        }
    }
    parse_name_at_version(rest)
}

fn local_source(reference: &str) -> Option<PackageSource> {
    if reference.starts_with("workspace:") {
        Some(PackageSource::Workspace)
    } else if reference.starts_with("link:") {
        Some(PackageSource::Link)
    } else if reference.starts_with("file:") {
        Some(PackageSource::File)
    } else if reference.starts_with("patch:") {
        Some(PackageSource::Patch)
    } else if reference.starts_with("portal:") {
        Some(PackageSource::Portal)
    } else if reference.starts_with("git") {
        Some(PackageSource::Git)
    } else {
        None
    }
}

fn importer_node_id(key: &str) -> String {
    format!("importer:{key}")
}

struct GraphBuilder<'a> {
    root: &'a Path,
    lock: &'a PnpmLockfile,
    manifest: &'a PackageManifest,
    major: u32,
}

impl<'a> GraphBuilder<'a> {
    fn new(root: &'a Path, lock: &'a PnpmLockfile, manifest: &'a PackageManifest) -> Self {
        let major = major_version(&lock.lockfile_version);
        Self {
            root,
            lock,
            manifest,
            major,
        }
    }

    fn build(self) -> Result<(DepGraph, PnpmResolver)> {
        let mut graph = DepGraph::new(importer_node_id("."));

        // Importer nodes. A lockfile without an importers map is a
        // single-project v5 file whose root sections live at the top level.
        let mut importer_sections: Vec<(String, [(&BTreeMap<String, PnpmDepRef>, EdgeType); 3])> =
            Vec::new();
        if self.lock.importers.is_empty() {
            importer_sections.push((
                ".".to_string(),
                [
                    (&self.lock.dependencies, EdgeType::Prod),
                    (&self.lock.dev_dependencies, EdgeType::Dev),
                    (&self.lock.optional_dependencies, EdgeType::Optional),
                ],
            ));
        } else {
            for (key, importer) in &self.lock.importers {
                importer_sections.push((
                    key.clone(),
                    [
                        (&importer.dependencies, EdgeType::Prod),
                        (&importer.dev_dependencies, EdgeType::Dev),
                        (&importer.optional_dependencies, EdgeType::Optional),
                    ],
                ));
            }
        }
        let mut importer_keys: Vec<String> =
            importer_sections.iter().map(|(k, _)| k.clone()).collect();
        if !importer_keys.iter().any(|k| k == ".") {
            importer_keys.insert(0, ".".to_string());
        }

        for key in &importer_keys {
            let id = importer_node_id(key);
            let name = if key == "." {
                self.manifest
                    .name
                    .clone()
                    .unwrap_or_else(|| "(root)".to_string())
            } else {
                key.clone()
            };
            graph.add_node(PackageNode {
                id: id.clone(),
                name,
                version: self
                    .manifest
                    .version
                    .clone()
                    .filter(|_| key == ".")
                    .unwrap_or_else(|| "0.0.0".to_string()),
                location: key.clone(),
                source: PackageSource::Workspace,
                flags: DependencyFlags::default(),
                purl: None,
                integrity: None,
                resolved: None,
            });
            graph.importers.insert(key.clone(), id);
        }

        // Inventory nodes.
        if self.major >= 9 {
            for (key, snapshot) in &self.lock.snapshots {
                let _ = snapshot;
                let Some((name, version)) = parse_name_at_version(key) else {
                    debug!("pnpm: skipping unparseable snapshot key {key}");
                    continue;
                };
                let base = format!("{name}@{version}");
                let info = self.lock.packages.get(&base);
                self.add_package_node(&mut graph, key, name, version, info);
            }
            for (key, info) in &self.lock.packages {
                if self
                    .lock
                    .snapshots
                    .keys()
                    .any(|s| s == key || s.starts_with(&format!("{key}(")))
                {
                    continue;
                }
                let Some((name, version)) = parse_name_at_version(key) else {
                    continue;
                };
                self.add_package_node(&mut graph, key, name, version, Some(info));
            }
        } else {
            for (key, info) in &self.lock.packages {
                let Some((name, version)) = parse_v5_key(key) else {
                    debug!("pnpm: skipping unparseable package key {key}");
                    continue;
                };
                self.add_package_node(&mut graph, key, name, version, Some(info));
            }
        }

        // Importer edges.
        for (key, sections) in &importer_sections {
            let from = importer_node_id(key);
            for (deps, edge_type) in sections {
                for (dep_name, dep_ref) in deps.iter() {
                    self.add_ref_edge(&mut graph, &from, key, dep_name, dep_ref.version(), *edge_type);
                }
            }
        }

        // Package / snapshot edges.
        if self.major >= 9 {
            for (key, snapshot) in &self.lock.snapshots {
                let from = format!("pnpm:{key}");
                for (dep_name, reference) in &snapshot.dependencies {
                    self.add_ref_edge(&mut graph, &from, ".", dep_name, reference, EdgeType::Prod);
                }
                for (dep_name, reference) in &snapshot.optional_dependencies {
                    self.add_ref_edge(&mut graph, &from, ".", dep_name, reference, EdgeType::Optional);
                }
            }
        } else {
            for (key, info) in &self.lock.packages {
                let from = format!("pnpm:{key}");
                for (dep_name, reference) in &info.dependencies {
                    self.add_ref_edge(&mut graph, &from, ".", dep_name, reference, EdgeType::Prod);
                }
                for (dep_name, reference) in &info.optional_dependencies {
                    self.add_ref_edge(&mut graph, &from, ".", dep_name, reference, EdgeType::Optional);
                }
            }
        }

        let resolver = PnpmResolver::new(self.root.to_path_buf(), &graph)?;
        Ok((graph, resolver))
    }

    fn add_package_node(
        &self,
        graph: &mut DepGraph,
        key: &str,
        name: String,
        version: String,
        info: Option<&PnpmPackageInfo>,
    ) {
        let id = format!("pnpm:{key}");
        let integrity = info
            .and_then(|i| i.resolution.as_ref())
            .and_then(|r| r.integrity.clone());
        let resolved = info
            .and_then(|i| i.resolution.as_ref())
            .and_then(|r| r.tarball.clone());
        graph.add_node(PackageNode {
            id: id.clone(),
            name: info.and_then(|i| i.name.clone()).unwrap_or(name),
            version: info
                .and_then(|i| i.version.clone())
                .unwrap_or(version),
            location: key.to_string(),
            source: PackageSource::Registry,
            flags: DependencyFlags {
                dev: info.is_some_and(|i| i.dev),
                ..Default::default()
            },
            purl: None,
            integrity,
            resolved,
        });
    }

    /// Resolve one dependency reference to a node (synthesizing local nodes
    /// for `workspace:` / `link:` / `file:` / `patch:` / `portal:` / git
    /// refs) and add the edge.
    fn add_ref_edge(
        &self,
        graph: &mut DepGraph,
        from: &str,
        importer_key: &str,
        dep_name: &str,
        reference: &str,
        edge_type: EdgeType,
    ) {
        if let Some(source) = local_source(reference) {
            // A link into another workspace member resolves to its importer.
            if source == PackageSource::Link {
                let target = reference.trim_start_matches("link:");
                let joined = normalize_join(importer_key, target);
                if let Some(importer_id) = graph.importers.get(&joined).cloned() {
                    graph.add_edge(from.to_string(), importer_id, dep_name.to_string(), edge_type);
                    return;
                }
            }
            let id = format!("pnpm:local:{dep_name}@{reference}");
            if !graph.nodes.contains_key(&id) {
                graph.add_node(PackageNode {
                    id: id.clone(),
                    name: dep_name.to_string(),
                    version: "0.0.0".to_string(),
                    location: reference.to_string(),
                    source,
                    flags: DependencyFlags::default(),
                    purl: None,
                    integrity: None,
                    resolved: Some(reference.to_string()),
                });
            }
            graph.add_edge(from.to_string(), id, dep_name.to_string(), edge_type);
            return;
        }

        let key = self.ref_to_key(dep_name, reference);
        let target = format!("pnpm:{key}");
        if graph.nodes.contains_key(&target) {
            graph.add_edge(from.to_string(), target, dep_name.to_string(), edge_type);
        } else {
            debug!("pnpm: dangling ref {dep_name} -> {reference}");
        }
    }

    fn ref_to_key(&self, dep_name: &str, reference: &str) -> String {
        if self.major >= 9 {
            if reference
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
            {
                format!("{dep_name}@{reference}")
            } else {
                // Aliased dependency: the reference embeds the real name.
                reference.to_string()
            }
        } else if let Some(rest) = reference.strip_prefix("npm:") {
            match parse_name_at_version(rest) {
                Some((name, version)) => format!("/{name}/{version}"),
                None => reference.to_string(),
            }
        } else if reference.starts_with('/') {
            reference.to_string()
        } else {
            format!("/{dep_name}/{reference}")
        }
    }
}

fn normalize_join(importer_key: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = if importer_key == "." {
        Vec::new()
    } else {
        importer_key.split('/').collect()
    };
    for comp in relative.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Resolver: importing workspace's direct edges by name, then the
/// `(name, version)` index, then name only.
pub struct PnpmResolver {
    root: PathBuf,
    /// Importer keys, longest first, for issuer matching.
    importer_keys: Vec<String>,
    /// Importer key -> dependency name -> node id.
    direct: HashMap<String, HashMap<String, String>>,
    by_name_version: HashMap<(String, String), Vec<String>>,
    by_name: HashMap<String, Vec<String>>,
    /// Importer key -> manifest `imports` map, for `#` specifiers.
    imports_maps: HashMap<String, serde_json::Value>,
}

impl PnpmResolver {
    fn new(root: PathBuf, graph: &DepGraph) -> Result<Self> {
        let mut importer_keys: Vec<String> = graph.importers.keys().cloned().collect();
        importer_keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

        let mut direct: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (key, importer_id) in &graph.importers {
            let mut edges = HashMap::new();
            for edge in graph.edges_from(importer_id) {
                edges.entry(edge.name.clone()).or_insert(edge.to.clone());
            }
            direct.insert(key.clone(), edges);
        }

        let mut by_name_version: HashMap<(String, String), Vec<String>> = HashMap::new();
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        for node in graph.nodes.values() {
            by_name_version
                .entry((node.name.clone(), node.version.clone()))
                .or_default()
                .push(node.id.clone());
            by_name.entry(node.name.clone()).or_default().push(node.id.clone());
        }
        for ids in by_name_version.values_mut() {
            ids.sort();
        }
        for ids in by_name.values_mut() {
            ids.sort();
        }

        let mut imports_maps = HashMap::new();
        for key in graph.importers.keys() {
            let dir = if key == "." {
                root.clone()
            } else {
                root.join(key)
            };
            if let Ok(Some(manifest)) = PackageManifest::read_dir(&dir) {
                if let Some(imports) = manifest.imports {
                    imports_maps.insert(key.clone(), imports);
                }
            }
        }

        Ok(Self {
            root,
            importer_keys,
            direct,
            by_name_version,
            by_name,
            imports_maps,
        })
    }

    /// The workspace member a source file belongs to (longest key wins).
    fn workspace_for(&self, from_file: Option<&Path>) -> String {
        let Some(file) = from_file else {
            return ".".to_string();
        };
        let rel = rel_key(&self.root, file);
        for key in &self.importer_keys {
            if key == "." {
                continue;
            }
            if rel.starts_with(&format!("{key}/")) {
                return key.clone();
            }
        }
        ".".to_string()
    }
}

impl PackageResolver for PnpmResolver {
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
        let workspace = self.workspace_for(from_file);
        if let Some(id) = self
            .direct
            .get(&workspace)
            .and_then(|edges| edges.get(&bare.package_name))
        {
            return Resolution::Resolved(id.clone());
        }
        // Not a direct dependency of the issuing workspace; fall back to the
        // (name, version) index, then name only.
        let mut versions: Vec<&(String, String)> = self
            .by_name_version
            .keys()
            .filter(|(name, _)| name == &bare.package_name)
            .collect();
        versions.sort();
        if let Some(first) = versions.first() {
            if let Some(ids) = self.by_name_version.get(*first) {
                return Resolution::Resolved(ids[0].clone());
            }
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

    fn resolve_internal_import(
        &self,
        spec: &str,
        from_file: Option<&Path>,
        conditions: &[String],
    ) -> Option<String> {
        let workspace = self.workspace_for(from_file);
        let imports = self
            .imports_maps
            .get(&workspace)
            .or_else(|| self.imports_maps.get("."))?;
        let mut conds = vec!["node".to_string(), "import".to_string()];
        conds.extend(conditions.iter().cloned());
        let target = resolve_imports(imports, spec, &conds)?;
        if target.starts_with('.') || target.starts_with('/') {
            return None;
        }
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const V9_LOCKFILE: &str = r#"
lockfileVersion: '9.0'

importers:
  .:
    dependencies:
      express:
        specifier: ^4.0.0
        version: 4.0.0
  packages/a:
    dependencies:
      dep-a:
        specifier: ^1.0.0
        version: 1.0.0(x@2.0.0)

packages:
  dep-a@1.0.0:
    resolution: {integrity: sha512-depa}
  express@4.0.0:
    resolution: {integrity: sha512-express}
  x@2.0.0:
    resolution: {integrity: sha512-x}

snapshots:
  dep-a@1.0.0(x@2.0.0):
    dependencies:
      x: 2.0.0
  express@4.0.0: {}
  x@2.0.0: {}
"#;

    const V5_LOCKFILE: &str = r#"
lockfileVersion: 5.4

dependencies:
  express: 4.0.0

devDependencies:
  vitest: 1.0.0

packages:
  /express/4.0.0:
    resolution: {integrity: sha512-express}
    dependencies:
      body-parser: 1.0.0
  /body-parser/1.0.0:
    resolution: {integrity: sha512-bp}
  /vitest/1.0.0:
    resolution: {integrity: sha512-vitest}
    dev: true
"#;

    #[test]
    fn v5_keys_parse() {
        assert_eq!(
            parse_v5_key("/express/4.0.0"),
            Some(("express".to_string(), "4.0.0".to_string()))
        );
        assert_eq!(
            parse_v5_key("/@scope/pkg/1.2.3"),
            Some(("@scope/pkg".to_string(), "1.2.3".to_string()))
        );
        assert_eq!(
            parse_v5_key("/foo/1.0.0_bar@2.0.0"),
            Some(("foo".to_string(), "1.0.0".to_string()))
        );
        assert_eq!(
            parse_v5_key("/foo@1.0.0(bar@2.0.0)"),
            Some(("foo".to_string(), "1.0.0".to_string()))
        );
    }

    #[test]
    fn v9_snapshot_keys_parse() {
        assert_eq!(
            parse_name_at_version("dep-a@1.0.0(x@2.0.0)"),
            Some(("dep-a".to_string(), "1.0.0".to_string()))
        );
        assert_eq!(
            parse_name_at_version("@scope/a@0.5.0"),
            Some(("@scope/a".to_string(), "0.5.0".to_string()))
        );
    }

    #[test]
    fn v5_graph_shape() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("pnpm-lock.yaml"), V5_LOCKFILE).unwrap();
        let ctx = PnpmProvider.load(temp.path()).unwrap();
        assert!(ctx.graph.nodes.contains_key("pnpm:/express/4.0.0"));
        assert!(ctx.graph.nodes.contains_key("importer:."));
        let dev_node = &ctx.graph.nodes["pnpm:/vitest/1.0.0"];
        assert!(dev_node.flags.dev);
        let nested = ctx
            .graph
            .edges
            .iter()
            .find(|e| e.name == "body-parser")
            .unwrap();
        assert_eq!(nested.from, "pnpm:/express/4.0.0");
    }

    #[test]
    fn v9_multi_importer_resolution() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("pnpm-lock.yaml"), V9_LOCKFILE).unwrap();
        let ctx = PnpmProvider.load(temp.path()).unwrap();

        assert!(ctx.graph.importers.contains_key("."));
        assert!(ctx.graph.importers.contains_key("packages/a"));
        assert!(ctx.graph.nodes.contains_key("pnpm:dep-a@1.0.0(x@2.0.0)"));

        // A file inside packages/a resolves dep-a through its own importer.
        let from = temp.path().join("packages/a/src/index.ts");
        let resolved =
            ctx.resolver
                .resolve_package("dep-a", Some(&from), ImportKind::EsmImport, &[]);
        assert_eq!(
            resolved,
            Resolution::Resolved("pnpm:dep-a@1.0.0(x@2.0.0)".to_string())
        );

        // The root importer has no dep-a edge but the name index still finds
        // the instance.
        let root_file = temp.path().join("src/index.ts");
        let via_root =
            ctx.resolver
                .resolve_package("express", Some(&root_file), ImportKind::EsmImport, &[]);
        assert_eq!(
            via_root,
            Resolution::Resolved("pnpm:express@4.0.0".to_string())
        );
    }

    #[test]
    fn workspace_links_resolve_to_importers() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("pnpm-lock.yaml"),
            r#"
lockfileVersion: '9.0'
importers:
  .:
    dependencies:
      pkg-a:
        specifier: workspace:*
        version: link:packages/a
  packages/a: {}
packages: {}
snapshots: {}
"#,
        )
        .unwrap();
        let ctx = PnpmProvider.load(temp.path()).unwrap();
        let edge = ctx.graph.edges.iter().find(|e| e.name == "pkg-a").unwrap();
        assert_eq!(edge.to, "importer:packages/a");
    }
}
