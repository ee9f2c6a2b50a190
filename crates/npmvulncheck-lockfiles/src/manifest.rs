//! package.json model shared by the providers and the reachability engine.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    /// Corepack-style `name@version` declaration, e.g. `pnpm@9.1.0`.
    pub package_manager: Option<String>,
    pub workspaces: Option<Workspaces>,
    pub main: Option<String>,
    pub module: Option<String>,
    pub bin: Option<Bin>,
    /// Raw `exports` map; interpreted by [`crate::exports`].
    pub exports: Option<serde_json::Value>,
    /// Raw `imports` (`#` specifier) map; interpreted by [`crate::exports`].
    pub imports: Option<serde_json::Value>,
    #[serde(default)]
    pub overrides: Option<serde_json::Value>,
    #[serde(default)]
    pub resolutions: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum Workspaces {
    Globs(Vec<String>),
    Config {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl Workspaces {
    pub fn globs(&self) -> &[String] {
        match self {
            Workspaces::Globs(globs) => globs,
            Workspaces::Config { packages } => packages,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum Bin {
    Path(String),
    Map(BTreeMap<String, String>),
}

impl Bin {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Bin::Path(p) => vec![p.as_str()],
            Bin::Map(m) => m.values().map(String::as_str).collect(),
        }
    }
}

impl PackageManifest {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Read `<dir>/package.json`, returning `None` when it does not exist.
    pub fn read_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join("package.json");
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    /// The manager named by the `packageManager` field, if any.
    pub fn declared_manager(&self) -> Option<&str> {
        let raw = self.package_manager.as_deref()?;
        Some(raw.split('@').next().unwrap_or(raw).trim())
    }
}
