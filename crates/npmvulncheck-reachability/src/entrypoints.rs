//! Entry file discovery.
//!
//! Explicit entries win; otherwise the root manifest (`main`, `bin`,
//! `exports`) is consulted, then the conventional locations.

use npmvulncheck_lockfiles::manifest::PackageManifest;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONVENTIONAL: &[&str] = &[
    "src/index.ts",
    "src/index.tsx",
    "src/index.js",
    "src/index.jsx",
    "index.ts",
    "index.js",
];

/// Resolve the set of entry files for a project.
pub fn discover_entries(root: &Path, explicit: &[PathBuf]) -> Vec<PathBuf> {
    if !explicit.is_empty() {
        let mut entries = Vec::new();
        for entry in explicit {
            let path = if entry.is_absolute() {
                entry.clone()
            } else {
                root.join(entry)
            };
            if path.is_file() {
                entries.push(path);
            } else {
                debug!("entry {} does not exist; skipping", path.display());
            }
        }
        return entries;
    }

    let mut candidates: Vec<String> = Vec::new();
    if let Ok(Some(manifest)) = PackageManifest::read_dir(root) {
        if let Some(main) = &manifest.main {
            candidates.push(main.clone());
        }
        if let Some(module) = &manifest.module {
            candidates.push(module.clone());
        }
        if let Some(bin) = &manifest.bin {
            candidates.extend(bin.paths().iter().map(|p| p.to_string()));
        }
        if let Some(exports) = &manifest.exports {
            collect_export_targets(exports, &mut candidates);
        }
    }
    candidates.extend(CONVENTIONAL.iter().map(|c| c.to_string()));

    let mut entries = Vec::new();
    for candidate in candidates {
        let path = root.join(candidate.trim_start_matches("./"));
        if path.is_file() && !entries.contains(&path) {
            entries.push(path);
        }
    }
    entries
}

/// Every string leaf of an `exports` value is a potential entry file.
fn collect_export_targets(exports: &Value, out: &mut Vec<String>) {
    match exports {
        Value::String(s) => {
            if s.starts_with("./") {
                out.push(s.clone());
            }
        }
        Value::Object(map) => {
            for value in map.values() {
                collect_export_targets(value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_export_targets(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn explicit_entries_win() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/index.ts"), "").unwrap();
        fs::write(temp.path().join("cli.ts"), "").unwrap();
        let entries = discover_entries(temp.path(), &[PathBuf::from("cli.ts")]);
        assert_eq!(entries, [temp.path().join("cli.ts")]);
    }

    #[test]
    fn manifest_main_and_exports() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{
                "name": "demo",
                "main": "./lib/main.js",
                "exports": { ".": { "import": "./lib/esm.js" } }
            }"#,
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("lib")).unwrap();
        fs::write(temp.path().join("lib/main.js"), "").unwrap();
        fs::write(temp.path().join("lib/esm.js"), "").unwrap();
        let entries = discover_entries(temp.path(), &[]);
        assert_eq!(
            entries,
            [temp.path().join("lib/main.js"), temp.path().join("lib/esm.js")]
        );
    }

    #[test]
    fn conventional_fallback() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/index.ts"), "").unwrap();
        let entries = discover_entries(temp.path(), &[]);
        assert_eq!(entries, [temp.path().join("src/index.ts")]);
    }

    #[test]
    fn missing_everything_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(discover_entries(temp.path(), &[]).is_empty());
    }
}
