//! On-disk OSV cache.
//!
//! Two write-once stores under one directory: `vulns/` keyed by
//! `(id, modified)` and `queries/` keyed by `(name, version)`. File names are
//! URL-encoded so scoped package names stay filesystem-safe. Reads also
//! accept vulnerability files in the legacy flat layout (directly under the
//! cache directory).

use crate::{OsvVulnerability, VulnRef};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const UNKNOWN_MODIFIED: &str = "unknown";

#[derive(Debug, Clone)]
pub struct OsvCache {
    dir: PathBuf,
}

impl OsvCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$XDG_CACHE_HOME/npmvulncheck/osv`, falling back to
    /// `$HOME/.cache/npmvulncheck/osv`.
    pub fn default_dir() -> PathBuf {
        let base = std::env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".cache"));
        base.join("npmvulncheck").join("osv")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn vuln_file_name(id: &str, modified: &str) -> String {
        format!(
            "{}__{}.json",
            urlencoding::encode(id),
            urlencoding::encode(modified)
        )
    }

    fn query_path(&self, name: &str, version: &str) -> PathBuf {
        self.dir.join("queries").join(format!(
            "{}__{}.json",
            urlencoding::encode(name),
            urlencoding::encode(version)
        ))
    }

    pub fn read_query(&self, name: &str, version: &str) -> Option<Vec<VulnRef>> {
        let content = fs::read_to_string(self.query_path(name, version)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn write_query(&self, name: &str, version: &str, refs: &[VulnRef]) -> Result<()> {
        let path = self.query_path(name, version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(refs)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn read_vuln(&self, id: &str, modified: &str) -> Option<OsvVulnerability> {
        let file_name = Self::vuln_file_name(id, modified);
        for path in [
            self.dir.join("vulns").join(&file_name),
            // Legacy flat layout.
            self.dir.join(&file_name),
        ] {
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(vuln) = serde_json::from_str(&content) {
                    return Some(vuln);
                }
            }
        }
        None
    }

    /// The cached record for `id` with the newest `modified` stamp, across
    /// both layouts.
    pub fn read_vuln_newest(&self, id: &str) -> Option<OsvVulnerability> {
        let prefix = format!("{}__", urlencoding::encode(id));
        let mut newest: Option<(String, PathBuf)> = None;
        for dir in [self.dir.join("vulns"), self.dir.clone()] {
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some(rest) = name.strip_prefix(&prefix) else {
                    continue;
                };
                let Some(encoded_modified) = rest.strip_suffix(".json") else {
                    continue;
                };
                let modified = urlencoding::decode(encoded_modified)
                    .map(|m| m.into_owned())
                    .unwrap_or_else(|_| encoded_modified.to_string());
                let better = newest
                    .as_ref()
                    .map(|(current, _)| modified > *current)
                    .unwrap_or(true);
                if better {
                    newest = Some((modified, entry.path()));
                }
            }
        }
        let (_, path) = newest?;
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn write_vuln(&self, vuln: &OsvVulnerability) -> Result<()> {
        let modified = vuln.modified.as_deref().unwrap_or(UNKNOWN_MODIFIED);
        let path = self
            .dir
            .join("vulns")
            .join(Self::vuln_file_name(&vuln.id, modified));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(vuln)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vuln(id: &str, modified: &str) -> OsvVulnerability {
        OsvVulnerability {
            id: id.to_string(),
            modified: Some(modified.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn query_roundtrip() {
        let temp = TempDir::new().unwrap();
        let cache = OsvCache::new(temp.path());
        let refs = vec![VulnRef {
            id: "GHSA-xxxx".to_string(),
            modified: Some("2024-01-01T00:00:00Z".to_string()),
        }];
        cache.write_query("@scope/pkg", "1.0.0", &refs).unwrap();
        assert_eq!(cache.read_query("@scope/pkg", "1.0.0"), Some(refs));
        assert_eq!(cache.read_query("@scope/pkg", "2.0.0"), None);
    }

    #[test]
    fn scoped_names_are_encoded() {
        let temp = TempDir::new().unwrap();
        let cache = OsvCache::new(temp.path());
        cache.write_query("@scope/pkg", "1.0.0", &[]).unwrap();
        let encoded = temp.path().join("queries/%40scope%2Fpkg__1.0.0.json");
        assert!(encoded.is_file());
    }

    #[test]
    fn vuln_roundtrip_and_newest() {
        let temp = TempDir::new().unwrap();
        let cache = OsvCache::new(temp.path());
        cache
            .write_vuln(&vuln("GHSA-a", "2024-01-01T00:00:00Z"))
            .unwrap();
        cache
            .write_vuln(&vuln("GHSA-a", "2024-06-01T00:00:00Z"))
            .unwrap();
        let exact = cache.read_vuln("GHSA-a", "2024-01-01T00:00:00Z").unwrap();
        assert_eq!(exact.modified.as_deref(), Some("2024-01-01T00:00:00Z"));
        let newest = cache.read_vuln_newest("GHSA-a").unwrap();
        assert_eq!(newest.modified.as_deref(), Some("2024-06-01T00:00:00Z"));
    }

    #[test]
    fn legacy_flat_layout_is_readable() {
        let temp = TempDir::new().unwrap();
        let cache = OsvCache::new(temp.path());
        let legacy = temp
            .path()
            .join("GHSA-legacy__2023-01-01T00%3A00%3A00Z.json");
        fs::write(
            &legacy,
            serde_json::to_string(&vuln("GHSA-legacy", "2023-01-01T00:00:00Z")).unwrap(),
        )
        .unwrap();
        assert!(cache
            .read_vuln("GHSA-legacy", "2023-01-01T00:00:00Z")
            .is_some());
        assert!(cache.read_vuln_newest("GHSA-legacy").is_some());
    }
}
