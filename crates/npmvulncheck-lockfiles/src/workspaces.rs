//! Workspace member discovery from the root manifest's `workspaces` globs.

use crate::manifest::PackageManifest;
use crate::rel_key;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A discovered workspace member.
#[derive(Debug, Clone)]
pub struct WorkspaceMember {
    /// Root-relative key, e.g. `packages/a`.
    pub key: String,
    pub dir: PathBuf,
    pub manifest: PackageManifest,
}

/// Glob-expand the root manifest's `workspaces` field. Only directories that
/// actually contain a `package.json` become members; matches are returned in
/// sorted key order for determinism.
pub fn discover_members(root: &Path, manifest: &PackageManifest) -> Result<Vec<WorkspaceMember>> {
    let mut members = Vec::new();
    let Some(workspaces) = &manifest.workspaces else {
        return Ok(members);
    };
    for pattern in workspaces.globs() {
        let full = root.join(pattern);
        let Some(full) = full.to_str() else { continue };
        for entry in glob::glob(full)? {
            let dir = match entry {
                Ok(dir) => dir,
                Err(e) => {
                    debug!("workspace glob entry failed: {e}");
                    continue;
                }
            };
            if !dir.is_dir() {
                continue;
            }
            let Some(member_manifest) = PackageManifest::read_dir(&dir)? else {
                continue;
            };
            members.push(WorkspaceMember {
                key: rel_key(root, &dir),
                dir,
                manifest: member_manifest,
            });
        }
    }
    members.sort_by(|a, b| a.key.cmp(&b.key));
    members.dedup_by(|a, b| a.key == b.key);
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn expands_globs_and_skips_bare_dirs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("packages/a")).unwrap();
        fs::create_dir_all(temp.path().join("packages/b")).unwrap();
        fs::create_dir_all(temp.path().join("packages/empty")).unwrap();
        fs::write(
            temp.path().join("packages/a/package.json"),
            r#"{"name": "a"}"#,
        )
        .unwrap();
        fs::write(
            temp.path().join("packages/b/package.json"),
            r#"{"name": "b"}"#,
        )
        .unwrap();

        let manifest: PackageManifest =
            serde_json::from_str(r#"{"workspaces": ["packages/*"]}"#).unwrap();
        let members = discover_members(temp.path(), &manifest).unwrap();
        let keys: Vec<_> = members.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["packages/a", "packages/b"]);
    }

    #[test]
    fn no_workspaces_field_is_empty() {
        let temp = TempDir::new().unwrap();
        let manifest = PackageManifest::default();
        assert!(discover_members(temp.path(), &manifest).unwrap().is_empty());
    }
}
