//! npm provider: package-lock.json v2/v3, npm-shrinkwrap.json, or an
//! installed `node_modules` tree.
//!
//! The lockfile's `packages` map is already shaped like the installed file
//! tree, so node ids are the lockfile keys (`""` for the root,
//! `node_modules/a`, `packages/app`, ...). Dependency edges and the resolver
//! both use the nearest-installation walk the npm loader itself performs.

use crate::exports::{resolve_exports, resolve_imports};
use crate::manifest::PackageManifest;
use crate::{rel_key, Capabilities, DetectResult, LockfileProvider, PackageManager, ProviderContext};
use anyhow::{Context, Result};
use npmvulncheck_graph::{
    specifier, DepGraph, DependencyFlags, EdgeType, ImportKind, PackageNode, PackageResolver,
    PackageSource, Resolution,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PackageLockJson {
    name: Option<String>,
    #[serde(rename = "lockfileVersion")]
    lockfile_version: Option<u32>,
    #[serde(default)]
    packages: BTreeMap<String, LockEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockEntry {
    name: Option<String>,
    version: Option<String>,
    resolved: Option<String>,
    integrity: Option<String>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    dev_optional: bool,
    #[serde(default)]
    peer: bool,
    #[serde(default)]
    link: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, String>,
}

pub struct NpmProvider {
    /// Walk `node_modules` instead of reading a lockfile.
    pub installed: bool,
}

impl LockfileProvider for NpmProvider {
    fn manager(&self) -> PackageManager {
        PackageManager::Npm
    }

    fn detect(&self, root: &Path) -> Option<DetectResult> {
        if self.installed {
            let tree = root.join("node_modules");
            if tree.is_dir() {
                return Some(DetectResult {
                    manager: PackageManager::Npm,
                    // Sentinel: a directory, not a lockfile.
                    lockfile_path: tree,
                    details: "installed node_modules tree".to_string(),
                });
            }
            return None;
        }
        for candidate in ["package-lock.json", "npm-shrinkwrap.json"] {
            let path = root.join(candidate);
            if path.is_file() {
                return Some(DetectResult {
                    manager: PackageManager::Npm,
                    lockfile_path: path,
                    details: candidate.to_string(),
                });
            }
        }
        None
    }

    fn load(&self, root: &Path) -> Result<ProviderContext> {
        let detect = self
            .detect(root)
            .context("npm provider selected but nothing to load")?;
        let manifest = PackageManifest::read_dir(root)?.unwrap_or_default();
        let (graph, entries) = if self.installed {
            load_installed_tree(root, &manifest)?
        } else {
            load_lockfile(&detect.lockfile_path, &manifest)?
        };
        let resolver = NpmResolver::new(root.to_path_buf(), &graph, entries, manifest);
        Ok(ProviderContext {
            detect,
            graph,
            capabilities: Capabilities {
                lockfile_resolver: true,
                fs_resolver: self.installed || root.join("node_modules").is_dir(),
                pnp_resolver: false,
            },
            resolver: Box::new(resolver),
        })
    }
}

/// Per-node data the resolver needs beyond the graph itself.
struct TreeEntries {
    /// Lockfile key -> resolved link target key, for `link: true` entries.
    link_targets: HashMap<String, String>,
}

fn load_lockfile(
    lockfile_path: &Path,
    manifest: &PackageManifest,
) -> Result<(DepGraph, TreeEntries)> {
    let content = fs::read_to_string(lockfile_path)
        .with_context(|| format!("failed to read {}", lockfile_path.display()))?;
    let lock: PackageLockJson = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", lockfile_path.display()))?;
    if lock.packages.is_empty() {
        anyhow::bail!(
            "{} has no packages map (lockfileVersion {:?}); only v2/v3 lockfiles are supported",
            lockfile_path.display(),
            lock.lockfile_version
        );
    }

    let mut graph = DepGraph::new("");
    let keys: HashSet<String> = lock.packages.keys().cloned().collect();
    let mut link_targets = HashMap::new();

    for (key, entry) in &lock.packages {
        let name = entry
            .name
            .clone()
            .or_else(|| derive_name(key))
            .or_else(|| {
                if key.is_empty() {
                    manifest.name.clone().or_else(|| lock.name.clone())
                } else {
                    None
                }
            })
            .unwrap_or_else(|| "(root)".to_string());
        let source = classify_source(key, entry);
        if entry.link {
            if let Some(target) = &entry.resolved {
                if keys.contains(target) {
                    link_targets.insert(key.clone(), target.clone());
                }
            }
        }
        graph.add_node(PackageNode {
            id: key.clone(),
            name,
            version: entry.version.clone().unwrap_or_else(|| "0.0.0".to_string()),
            location: key.clone(),
            source,
            flags: DependencyFlags {
                dev: entry.dev || entry.dev_optional,
                optional: entry.optional || entry.dev_optional,
                peer: entry.peer,
            },
            purl: None,
            integrity: entry.integrity.clone(),
            resolved: entry.resolved.clone(),
        });
        if key.is_empty() {
            graph.importers.insert(".".to_string(), key.clone());
        } else if source == PackageSource::Workspace {
            graph.importers.insert(key.clone(), key.clone());
        }
    }

    for (key, entry) in &lock.packages {
        let sections: [(&BTreeMap<String, String>, EdgeType); 4] = [
            (&entry.dependencies, EdgeType::Prod),
            (&entry.dev_dependencies, EdgeType::Dev),
            (&entry.optional_dependencies, EdgeType::Optional),
            (&entry.peer_dependencies, EdgeType::Peer),
        ];
        for (deps, edge_type) in sections {
            for dep_name in deps.keys() {
                match find_dep(&keys, key, dep_name) {
                    Some(target) => {
                        let target = link_targets.get(&target).cloned().unwrap_or(target);
                        graph.add_edge(key.clone(), target, dep_name.clone(), edge_type);
                    }
                    None => debug!("npm: no installation of {dep_name} visible from {key:?}"),
                }
            }
        }
    }

    Ok((graph, TreeEntries { link_targets }))
}

fn load_installed_tree(
    root: &Path,
    manifest: &PackageManifest,
) -> Result<(DepGraph, TreeEntries)> {
    let mut graph = DepGraph::new("");
    let mut manifests: BTreeMap<String, PackageManifest> = BTreeMap::new();

    graph.add_node(PackageNode {
        id: String::new(),
        name: manifest
            .name
            .clone()
            .unwrap_or_else(|| "(root)".to_string()),
        version: manifest
            .version
            .clone()
            .unwrap_or_else(|| "0.0.0".to_string()),
        location: String::new(),
        source: PackageSource::Workspace,
        flags: DependencyFlags::default(),
        purl: None,
        integrity: None,
        resolved: None,
    });
    graph.importers.insert(".".to_string(), String::new());

    collect_installed(root, &root.join("node_modules"), &mut graph, &mut manifests)?;

    let keys: HashSet<String> = graph.nodes.keys().cloned().collect();
    let mut all: Vec<(String, &PackageManifest)> = vec![(String::new(), manifest)];
    all.extend(manifests.iter().map(|(k, m)| (k.clone(), m)));
    for (key, pkg_manifest) in all {
        let sections: [(&BTreeMap<String, String>, EdgeType); 4] = [
            (&pkg_manifest.dependencies, EdgeType::Prod),
            (&pkg_manifest.dev_dependencies, EdgeType::Dev),
            (&pkg_manifest.optional_dependencies, EdgeType::Optional),
            (&pkg_manifest.peer_dependencies, EdgeType::Peer),
        ];
        for (deps, edge_type) in sections {
            for dep_name in deps.keys() {
                if let Some(target) = find_dep(&keys, &key, dep_name) {
                    graph.add_edge(key.clone(), target, dep_name.clone(), edge_type);
                }
            }
        }
    }

    Ok((
        graph,
        TreeEntries {
            link_targets: HashMap::new(),
        },
    ))
}

fn collect_installed(
    root: &Path,
    modules_dir: &Path,
    graph: &mut DepGraph,
    manifests: &mut BTreeMap<String, PackageManifest>,
) -> Result<()> {
    if !modules_dir.is_dir() {
        return Ok(());
    }
    let mut package_dirs = Vec::new();
    for entry in fs::read_dir(modules_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if name.starts_with('@') {
            for scoped in fs::read_dir(&path)? {
                let scoped = scoped?;
                if scoped.path().is_dir() {
                    package_dirs.push(scoped.path());
                }
            }
        } else {
            package_dirs.push(path);
        }
    }
    package_dirs.sort();

    for dir in package_dirs {
        let Some(pkg_manifest) = PackageManifest::read_dir(&dir)? else {
            continue;
        };
        let key = rel_key(root, &dir);
        let is_link = fs::symlink_metadata(&dir)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        graph.add_node(PackageNode {
            id: key.clone(),
            name: pkg_manifest
                .name
                .clone()
                .or_else(|| derive_name(&key))
                .unwrap_or_else(|| key.clone()),
            version: pkg_manifest
                .version
                .clone()
                .unwrap_or_else(|| "0.0.0".to_string()),
            location: key.clone(),
            source: if is_link {
                PackageSource::Link
            } else {
                PackageSource::Registry
            },
            flags: DependencyFlags::default(),
            purl: None,
            integrity: None,
            resolved: None,
        });
        let nested = dir.join("node_modules");
        collect_installed(root, &nested, graph, manifests)?;
        manifests.insert(key, pkg_manifest);
    }
    Ok(())
}

fn classify_source(key: &str, entry: &LockEntry) -> PackageSource {
    if entry.link {
        return PackageSource::Link;
    }
    if !key.is_empty() && !key.contains("node_modules/") {
        return PackageSource::Workspace;
    }
    if key.is_empty() {
        return PackageSource::Workspace;
    }
    match entry.resolved.as_deref() {
        Some(r) if r.starts_with("git") => PackageSource::Git,
        Some(r) if r.starts_with("file:") => PackageSource::File,
        _ => PackageSource::Registry,
    }
}

/// Package name from a file-tree key: the segment after the last
/// `node_modules/`, including a scope when present.
fn derive_name(key: &str) -> Option<String> {
    let idx = key.rfind("node_modules/")?;
    let rest = &key[idx + "node_modules/".len()..];
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// Nearest-installation walk: from `from`'s directory, probe
/// `<base>/node_modules/<name>` and climb one `node_modules` level (or fall
/// back to the root) per step.
fn find_dep(keys: &HashSet<String>, from: &str, name: &str) -> Option<String> {
    let mut base = from.to_string();
    loop {
        let candidate = if base.is_empty() {
            format!("node_modules/{name}")
        } else {
            format!("{base}/node_modules/{name}")
        };
        if keys.contains(&candidate) {
            return Some(candidate);
        }
        if base.is_empty() {
            return None;
        }
        base = match base.rfind("/node_modules/") {
            Some(i) => base[..i].to_string(),
            None => String::new(),
        };
    }
}

/// Module-resolution-style resolver over the virtual (or installed) tree.
pub struct NpmResolver {
    root: PathBuf,
    keys: HashSet<String>,
    link_targets: HashMap<String, String>,
    by_name: HashMap<String, Vec<String>>,
    root_manifest: PackageManifest,
}

impl NpmResolver {
    fn new(
        root: PathBuf,
        graph: &DepGraph,
        entries: TreeEntries,
        root_manifest: PackageManifest,
    ) -> Self {
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        for node in graph.nodes.values() {
            by_name.entry(node.name.clone()).or_default().push(node.id.clone());
        }
        for ids in by_name.values_mut() {
            ids.sort();
        }
        Self {
            root,
            keys: graph.nodes.keys().cloned().collect(),
            link_targets: entries.link_targets,
            by_name,
            root_manifest,
        }
    }

    /// Lockfile key of the package directory containing `file`.
    fn issuer_key(&self, file: Option<&Path>) -> String {
        let Some(file) = file else {
            return String::new();
        };
        let mut dir = file.parent();
        while let Some(d) = dir {
            if !d.starts_with(&self.root) {
                break;
            }
            let key = rel_key(&self.root, d);
            if key.is_empty() {
                return key;
            }
            if self.keys.contains(&key) || d.join("package.json").is_file() {
                return key;
            }
            dir = d.parent();
        }
        String::new()
    }

    fn effective_conditions(&self, import_kind: ImportKind, conditions: &[String]) -> Vec<String> {
        let mut out: Vec<String> = match import_kind {
            ImportKind::CjsRequire => vec!["node".to_string(), "require".to_string()],
            _ => vec!["node".to_string(), "import".to_string()],
        };
        for c in conditions {
            if !out.iter().any(|have| have == c) {
                out.push(c.clone());
            }
        }
        out
    }
}

impl PackageResolver for NpmResolver {
    fn resolve_package(
        &self,
        spec: &str,
        from_file: Option<&Path>,
        import_kind: ImportKind,
        conditions: &[String],
    ) -> Resolution {
        let Some(bare) = specifier::parse_bare(spec) else {
            return Resolution::Unresolved;
        };
        let issuer = self.issuer_key(from_file);
        let Some(found) = find_dep(&self.keys, &issuer, &bare.package_name) else {
            return Resolution::Unresolved;
        };
        let target = self.link_targets.get(&found).cloned().unwrap_or(found);

        // Enforce subpath exports when the installed manifest declares them.
        let target_dir = self.root.join(&target);
        if let Ok(Some(pkg_manifest)) = PackageManifest::read_dir(&target_dir) {
            if let Some(exports) = &pkg_manifest.exports {
                let conds = self.effective_conditions(import_kind, conditions);
                if resolve_exports(exports, &bare.subpath, &conds).is_none() {
                    return Resolution::Blocked;
                }
            }
        }
        Resolution::Resolved(target)
    }

    fn resolve_package_candidates(&self, spec: &str, _from_file: Option<&Path>) -> Vec<String> {
        match specifier::parse_bare(spec) {
            Some(bare) => self
                .by_name
                .get(&bare.package_name)
                .cloned()
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn resolve_internal_import(
        &self,
        spec: &str,
        from_file: Option<&Path>,
        conditions: &[String],
    ) -> Option<String> {
        // `#` imports resolve against the issuing package's manifest; project
        // source uses the root (or workspace member) manifest.
        let issuer = self.issuer_key(from_file);
        let imports_owner = if issuer.is_empty() {
            None
        } else {
            PackageManifest::read_dir(&self.root.join(&issuer)).ok().flatten()
        };
        let conds = self.effective_conditions(ImportKind::EsmImport, conditions);
        let imports = match &imports_owner {
            Some(m) if m.imports.is_some() => m.imports.as_ref(),
            _ => self.root_manifest.imports.as_ref(),
        }?;
        let target = resolve_imports(imports, spec, &conds)?;
        // Only bare package targets re-enter graph resolution.
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

    const LOCKFILE: &str = r#"{
        "name": "demo",
        "lockfileVersion": 3,
        "packages": {
            "": {
                "name": "demo",
                "version": "1.0.0",
                "dependencies": { "express": "^4.0.0" },
                "devDependencies": { "vitest": "^1.0.0" }
            },
            "node_modules/express": {
                "version": "4.0.0",
                "resolved": "https://registry.npmjs.org/express/-/express-4.0.0.tgz",
                "dependencies": { "body-parser": "^1.0.0" }
            },
            "node_modules/body-parser": {
                "version": "1.0.0",
                "resolved": "https://registry.npmjs.org/body-parser/-/body-parser-1.0.0.tgz"
            },
            "node_modules/vitest": {
                "version": "1.0.0",
                "dev": true,
                "resolved": "https://registry.npmjs.org/vitest/-/vitest-1.0.0.tgz"
            }
        }
    }"#;

    fn write_project(temp: &TempDir) {
        fs::write(
            temp.path().join("package.json"),
            r#"{"name": "demo", "version": "1.0.0"}"#,
        )
        .unwrap();
        fs::write(temp.path().join("package-lock.json"), LOCKFILE).unwrap();
    }

    #[test]
    fn detect_prefers_package_lock() {
        let temp = TempDir::new().unwrap();
        write_project(&temp);
        let provider = NpmProvider { installed: false };
        let detect = provider.detect(temp.path()).unwrap();
        assert_eq!(detect.manager, PackageManager::Npm);
        assert!(detect.lockfile_path.ends_with("package-lock.json"));
    }

    #[test]
    fn lockfile_graph_shape() {
        let temp = TempDir::new().unwrap();
        write_project(&temp);
        let ctx = NpmProvider { installed: false }.load(temp.path()).unwrap();
        assert_eq!(ctx.graph.nodes.len(), 4);
        assert!(ctx.graph.root_direct_node_ids.contains("node_modules/express"));
        assert!(ctx.graph.root_direct_node_ids.contains("node_modules/vitest"));
        let dev_edge = ctx
            .graph
            .edges
            .iter()
            .find(|e| e.name == "vitest")
            .unwrap();
        assert_eq!(dev_edge.edge_type, EdgeType::Dev);
        let nested = ctx
            .graph
            .edges
            .iter()
            .find(|e| e.name == "body-parser")
            .unwrap();
        assert_eq!(nested.from, "node_modules/express");
        assert_eq!(nested.edge_type, EdgeType::Prod);
    }

    #[test]
    fn resolver_picks_nearest_installation() {
        let temp = TempDir::new().unwrap();
        write_project(&temp);
        let ctx = NpmProvider { installed: false }.load(temp.path()).unwrap();
        let from = temp.path().join("src/index.ts");
        let resolved = ctx.resolver.resolve_package(
            "express",
            Some(&from),
            ImportKind::EsmImport,
            &[],
        );
        assert_eq!(
            resolved,
            Resolution::Resolved("node_modules/express".to_string())
        );
        let missing =
            ctx.resolver
                .resolve_package("left-pad", Some(&from), ImportKind::EsmImport, &[]);
        assert_eq!(missing, Resolution::Unresolved);
    }

    #[test]
    fn exports_enforcement_blocks_unlisted_subpath() {
        let temp = TempDir::new().unwrap();
        write_project(&temp);
        let pkg_dir = temp.path().join("node_modules/express");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(
            pkg_dir.join("package.json"),
            r#"{
                "name": "express",
                "version": "4.0.0",
                "exports": { ".": "./index.js" }
            }"#,
        )
        .unwrap();
        let ctx = NpmProvider { installed: false }.load(temp.path()).unwrap();
        let from = temp.path().join("src/index.ts");
        let blocked = ctx.resolver.resolve_package(
            "express/internal/router",
            Some(&from),
            ImportKind::EsmImport,
            &[],
        );
        assert_eq!(blocked, Resolution::Blocked);
        let ok = ctx
            .resolver
            .resolve_package("express", Some(&from), ImportKind::EsmImport, &[]);
        assert_eq!(ok, Resolution::Resolved("node_modules/express".to_string()));
    }

    #[test]
    fn internal_imports_expand_to_bare() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r##"{
                "name": "demo",
                "imports": { "#db": { "node": "express", "default": "./db/stub.js" } }
            }"##,
        )
        .unwrap();
        fs::write(temp.path().join("package-lock.json"), LOCKFILE).unwrap();
        let ctx = NpmProvider { installed: false }.load(temp.path()).unwrap();
        let from = temp.path().join("src/index.ts");
        let target = ctx
            .resolver
            .resolve_internal_import("#db", Some(&from), &[]);
        assert_eq!(target.as_deref(), Some("express"));
    }

    #[test]
    fn installed_mode_walks_tree() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"name": "demo", "version": "1.0.0", "dependencies": {"left-pad": "^1.0.0"}}"#,
        )
        .unwrap();
        let dir = temp.path().join("node_modules/left-pad");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("package.json"),
            r#"{"name": "left-pad", "version": "1.3.0"}"#,
        )
        .unwrap();
        let provider = NpmProvider { installed: true };
        let detect = provider.detect(temp.path()).unwrap();
        assert!(detect.lockfile_path.ends_with("node_modules"));
        let ctx = provider.load(temp.path()).unwrap();
        assert!(ctx.graph.nodes.contains_key("node_modules/left-pad"));
        assert!(ctx
            .graph
            .root_direct_node_ids
            .contains("node_modules/left-pad"));
    }
}
