//! Manager-specific override providers: validation plus manifest writes.
//!
//! npm writes `overrides` and expands scoped keys into nested objects; pnpm
//! writes flat keys under `pnpm.overrides`; yarn writes `resolutions` with
//! `/`-separated scoped keys.

use crate::{ChangeScope, OverrideChange};
use anyhow::{Context, Result};
use npmvulncheck_lockfiles::PackageManager;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub trait OverrideProvider {
    fn manager(&self) -> PackageManager;

    /// The manifest key for one change.
    fn override_key(&self, change: &OverrideChange) -> String;

    /// Reject plans the manager would fail to install.
    fn validate(&self, root: &Path, changes: &[OverrideChange]) -> Result<()>;

    /// Merge the changes into `package.json`.
    fn apply(&self, root: &Path, changes: &[OverrideChange]) -> Result<()>;
}

pub fn provider_for(manager: PackageManager) -> Box<dyn OverrideProvider> {
    match manager {
        PackageManager::Npm => Box::new(NpmOverrides),
        PackageManager::Pnpm => Box::new(PnpmOverrides),
        PackageManager::Yarn => Box::new(YarnOverrides),
    }
}

fn read_manifest(root: &Path) -> Result<Value> {
    let path = root.join("package.json");
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_manifest(root: &Path, manifest: &Value) -> Result<()> {
    let path = root.join("package.json");
    let formatted = serde_json::to_string_pretty(manifest)
        .context("failed to serialize package.json")?;
    fs::write(&path, formatted + "\n")
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// `>`-joined key: `pkg`, `parent>pkg`, or `parent@ver>pkg`.
fn angle_key(change: &OverrideChange) -> String {
    match &change.scope {
        ChangeScope::Global => change.package.clone(),
        ChangeScope::Parent {
            parent,
            parent_version,
        } => match parent_version {
            Some(version) => format!("{parent}@{version}>{}", change.package),
            None => format!("{parent}>{}", change.package),
        },
    }
}

/// Same-key changes with different targets cannot be merged into one
/// manifest.
fn detect_key_conflicts(
    provider: &dyn OverrideProvider,
    changes: &[OverrideChange],
) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for change in changes {
        let key = provider.override_key(change);
        if let Some(existing) = seen.get(&key) {
            if *existing != change.to {
                anyhow::bail!(
                    "conflicting override values for {key:?}: {existing} vs {}",
                    change.to
                );
            }
        }
        seen.insert(key, &change.to);
    }
    Ok(())
}

fn ensure_object<'a>(parent: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    if !parent.get(key).map(Value::is_object).unwrap_or(false) {
        parent.insert(key.to_string(), Value::Object(Map::new()));
    }
    parent
        .get_mut(key)
        .and_then(Value::as_object_mut)
        .expect("just inserted an object")
}

pub struct NpmOverrides;

impl OverrideProvider for NpmOverrides {
    fn manager(&self) -> PackageManager {
        PackageManager::Npm
    }

    fn override_key(&self, change: &OverrideChange) -> String {
        angle_key(change)
    }

    fn validate(&self, root: &Path, changes: &[OverrideChange]) -> Result<()> {
        detect_key_conflicts(self, changes)?;
        // npm refuses an override for a top-level direct dependency whose
        // declared spec differs from the override target.
        let manifest = read_manifest(root)?;
        if let Some(deps) = manifest.get("dependencies").and_then(Value::as_object) {
            for change in changes {
                if !matches!(change.scope, ChangeScope::Global) {
                    continue;
                }
                if let Some(spec) = deps.get(&change.package).and_then(Value::as_str) {
                    let declared = spec.trim_start_matches(['^', '~', '=', 'v']);
                    if declared != change.to {
                        anyhow::bail!(
                            "override for {} ({}) conflicts with direct dependency spec {spec:?}; \
                             npm would refuse to install",
                            change.package,
                            change.to
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&self, root: &Path, changes: &[OverrideChange]) -> Result<()> {
        let mut manifest = read_manifest(root)?;
        let top = manifest
            .as_object_mut()
            .context("package.json is not an object")?;
        let overrides = ensure_object(top, "overrides");
        for change in changes {
            let key = self.override_key(change);
            match key.split_once('>') {
                None => {
                    overrides.insert(key, Value::String(change.to.clone()));
                }
                Some((parent_key, child_key)) => {
                    // Scoped keys expand into nested objects. An existing
                    // string value at the parent survives under ".".
                    if let Some(Value::String(existing)) = overrides.get(parent_key).cloned() {
                        let mut nested = Map::new();
                        nested.insert(".".to_string(), Value::String(existing));
                        overrides.insert(parent_key.to_string(), Value::Object(nested));
                    }
                    let nested = ensure_object(overrides, parent_key);
                    nested.insert(child_key.to_string(), Value::String(change.to.clone()));
                }
            }
        }
        write_manifest(root, &manifest)
    }
}

pub struct PnpmOverrides;

impl OverrideProvider for PnpmOverrides {
    fn manager(&self) -> PackageManager {
        PackageManager::Pnpm
    }

    fn override_key(&self, change: &OverrideChange) -> String {
        angle_key(change)
    }

    fn validate(&self, _root: &Path, changes: &[OverrideChange]) -> Result<()> {
        detect_key_conflicts(self, changes)
    }

    fn apply(&self, root: &Path, changes: &[OverrideChange]) -> Result<()> {
        let mut manifest = read_manifest(root)?;
        let top = manifest
            .as_object_mut()
            .context("package.json is not an object")?;
        let pnpm = ensure_object(top, "pnpm");
        let overrides = ensure_object(pnpm, "overrides");
        for change in changes {
            overrides.insert(
                self.override_key(change),
                Value::String(change.to.clone()),
            );
        }
        write_manifest(root, &manifest)
    }
}

pub struct YarnOverrides;

impl OverrideProvider for YarnOverrides {
    fn manager(&self) -> PackageManager {
        PackageManager::Yarn
    }

    fn override_key(&self, change: &OverrideChange) -> String {
        // yarn resolutions separate the parent with a slash.
        match &change.scope {
            ChangeScope::Global => change.package.clone(),
            ChangeScope::Parent {
                parent,
                parent_version,
            } => match parent_version {
                Some(version) => format!("{parent}@{version}/{}", change.package),
                None => format!("{parent}/{}", change.package),
            },
        }
    }

    fn validate(&self, _root: &Path, changes: &[OverrideChange]) -> Result<()> {
        detect_key_conflicts(self, changes)
    }

    fn apply(&self, root: &Path, changes: &[OverrideChange]) -> Result<()> {
        let mut manifest = read_manifest(root)?;
        let top = manifest
            .as_object_mut()
            .context("package.json is not an object")?;
        let resolutions = ensure_object(top, "resolutions");
        for change in changes {
            resolutions.insert(
                self.override_key(change),
                Value::String(change.to.clone()),
            );
        }
        write_manifest(root, &manifest)
    }
}
