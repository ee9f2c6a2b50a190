//! Fix-version selection.
//!
//! For each (vulnerability, package, installed version) this picks the
//! smallest upgrade that the vulnerability database confirms is clean:
//! OSV `fixed` events first, the registry version list as a fallback, and
//! the smallest fixed event unverified only when every verification query
//! failed. Downgrades are never suggested.

use crate::FixSuggestion;
use npmvulncheck_advisories::{OsvVulnerability, PackageQuery, VulnerabilityProvider};
use semver::Version;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Order two version strings: semver when both parse (a leading `v` is
/// tolerated), lexicographic otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn parse_lenient(version: &str) -> Option<Version> {
    Version::parse(version.trim().trim_start_matches('v')).ok()
}

pub struct FixSelector<'a> {
    provider: &'a dyn VulnerabilityProvider,
    /// Keyed on (vuln id, package, current version).
    cache: Mutex<HashMap<(String, String, String), Option<FixSuggestion>>>,
}

impl<'a> FixSelector<'a> {
    pub fn new(provider: &'a dyn VulnerabilityProvider) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Suggest a verified non-vulnerable upgrade for `package@current`.
    pub fn suggest(
        &self,
        vuln: &OsvVulnerability,
        package: &str,
        current: &str,
    ) -> Option<FixSuggestion> {
        let cache_key = (
            vuln.id.clone(),
            package.to_string(),
            current.to_string(),
        );
        if let Some(hit) = self.cache.lock().expect("fix cache lock").get(&cache_key) {
            return hit.clone();
        }
        let result = self.suggest_uncached(vuln, package, current);
        self.cache
            .lock()
            .expect("fix cache lock")
            .insert(cache_key, result.clone());
        result
    }

    fn suggest_uncached(
        &self,
        vuln: &OsvVulnerability,
        package: &str,
        current: &str,
    ) -> Option<FixSuggestion> {
        let mut fixed_candidates: Vec<String> = vuln
            .fixed_versions_for(package)
            .into_iter()
            .filter(|candidate| compare_versions(candidate, current) != Ordering::Less)
            .collect();
        fixed_candidates.sort_by(|a, b| compare_versions(a, b));
        fixed_candidates.dedup();

        let mut any_verification_succeeded = false;
        for candidate in &fixed_candidates {
            match self.candidate_is_clean(&vuln.id, package, candidate) {
                Ok(true) => {
                    return Some(FixSuggestion {
                        fixed_version: candidate.clone(),
                        note: None,
                    });
                }
                Ok(false) => any_verification_succeeded = true,
                Err(e) => {
                    debug!("verification query for {package}@{candidate} failed: {e}");
                    break;
                }
            }
        }

        // Registry fallback: no fixed event verified clean.
        if let Ok(Some(versions)) = self.provider.list_package_versions(package) {
            let mut registry_candidates: Vec<String> = versions
                .into_iter()
                .filter(|candidate| compare_versions(candidate, current) == Ordering::Greater)
                .collect();
            registry_candidates.sort_by(|a, b| compare_versions(a, b));
            registry_candidates.dedup();
            for candidate in &registry_candidates {
                match self.candidate_is_clean(&vuln.id, package, candidate) {
                    Ok(true) => {
                        return Some(FixSuggestion {
                            fixed_version: candidate.clone(),
                            note: Some("selected from registry versions".to_string()),
                        });
                    }
                    Ok(false) => any_verification_succeeded = true,
                    Err(e) => {
                        debug!("registry verification for {package}@{candidate} failed: {e}");
                        break;
                    }
                }
            }
        }

        // Fixed events existed but none could be verified either way: trust
        // the smallest one, flagged as unverified.
        if !fixed_candidates.is_empty() && !any_verification_succeeded {
            return Some(FixSuggestion {
                fixed_version: fixed_candidates[0].clone(),
                note: Some("unverified: vulnerability database query failed".to_string()),
            });
        }
        None
    }

    /// Whether `package@candidate` is free of this vulnerability per a fresh
    /// database query. The query also warms the per-version cache.
    fn candidate_is_clean(
        &self,
        vuln_id: &str,
        package: &str,
        candidate: &str,
    ) -> anyhow::Result<bool> {
        let query = PackageQuery::new(package, candidate);
        let results = self.provider.query_packages(&[query.clone()])?;
        let refs = results.get(&query.key()).cloned().unwrap_or_default();
        Ok(!refs.iter().any(|r| r.id == vuln_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use npmvulncheck_advisories::{OsvAffected, OsvEvent, OsvPackageInfo, OsvRange, VulnRef};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Fake database: version -> vuln ids, plus a query log.
    struct FakeProvider {
        affected_versions: HashMap<String, Vec<String>>,
        registry: Option<Vec<String>>,
        fail_queries: bool,
        log: RefCell<Vec<String>>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                affected_versions: HashMap::new(),
                registry: None,
                fail_queries: false,
                log: RefCell::new(Vec::new()),
            }
        }
    }

    impl VulnerabilityProvider for FakeProvider {
        fn query_packages(
            &self,
            packages: &[PackageQuery],
        ) -> Result<HashMap<String, Vec<VulnRef>>> {
            if self.fail_queries {
                anyhow::bail!("database unavailable");
            }
            let mut out = HashMap::new();
            for query in packages {
                self.log.borrow_mut().push(query.key());
                let refs = self
                    .affected_versions
                    .get(&query.key())
                    .map(|ids| {
                        ids.iter()
                            .map(|id| VulnRef {
                                id: id.clone(),
                                modified: None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                out.insert(query.key(), refs);
            }
            Ok(out)
        }

        fn get_vuln(&self, _id: &str, _modified: Option<&str>) -> Result<OsvVulnerability> {
            unimplemented!("not used by the selector")
        }

        fn list_package_versions(&self, _name: &str) -> Result<Option<Vec<String>>> {
            Ok(self.registry.clone())
        }
    }

    fn vuln_with_fixed(id: &str, package: &str, fixed: &[&str]) -> OsvVulnerability {
        OsvVulnerability {
            id: id.to_string(),
            affected: vec![OsvAffected {
                package: OsvPackageInfo {
                    name: package.to_string(),
                    ecosystem: "npm".to_string(),
                },
                ranges: vec![OsvRange {
                    range_type: "SEMVER".to_string(),
                    events: fixed
                        .iter()
                        .map(|f| OsvEvent {
                            fixed: Some(f.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                }],
                versions: Vec::new(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_verified_clean_candidate() {
        let mut provider = FakeProvider::new();
        // 1.1.0 is still affected, 1.2.0 is clean.
        provider
            .affected_versions
            .insert("pkg-a@1.1.0".to_string(), vec!["GHSA-pkg-a".to_string()]);
        let vuln = vuln_with_fixed("GHSA-pkg-a", "pkg-a", &["1.1.0", "1.2.0"]);
        let selector = FixSelector::new(&provider);
        let fix = selector.suggest(&vuln, "pkg-a", "1.0.0").unwrap();
        assert_eq!(fix.fixed_version, "1.2.0");
        assert!(fix.note.is_none());
        let log = provider.log.borrow();
        assert!(log.contains(&"pkg-a@1.1.0".to_string()));
        assert!(log.contains(&"pkg-a@1.2.0".to_string()));
    }

    #[test]
    fn registry_fallback_when_no_fixed_events() {
        let mut provider = FakeProvider::new();
        provider.registry = Some(vec![
            "1.0.0".to_string(),
            "1.0.1".to_string(),
            "1.0.2".to_string(),
            "1.1.0".to_string(),
        ]);
        // 1.0.0 through 1.0.2 are affected (last_affected 1.0.2, no fixed).
        for v in ["1.0.0", "1.0.1", "1.0.2"] {
            provider
                .affected_versions
                .insert(format!("pkg-b@{v}"), vec!["GHSA-pkg-b".to_string()]);
        }
        let vuln = OsvVulnerability {
            id: "GHSA-pkg-b".to_string(),
            affected: vec![OsvAffected {
                package: OsvPackageInfo {
                    name: "pkg-b".to_string(),
                    ecosystem: "npm".to_string(),
                },
                ranges: vec![OsvRange {
                    range_type: "SEMVER".to_string(),
                    events: vec![
                        OsvEvent {
                            introduced: Some("0".to_string()),
                            ..Default::default()
                        },
                        OsvEvent {
                            last_affected: Some("1.0.2".to_string()),
                            ..Default::default()
                        },
                    ],
                }],
                versions: Vec::new(),
            }],
            ..Default::default()
        };
        let selector = FixSelector::new(&provider);
        let fix = selector.suggest(&vuln, "pkg-b", "1.0.0").unwrap();
        assert_eq!(fix.fixed_version, "1.1.0");
        assert_eq!(fix.note.as_deref(), Some("selected from registry versions"));
    }

    #[test]
    fn never_downgrades() {
        let provider = FakeProvider::new();
        let vuln = vuln_with_fixed("GHSA-pkg-c", "pkg-c", &["2.5.0", "3.1.0"]);
        let selector = FixSelector::new(&provider);
        let fix = selector.suggest(&vuln, "pkg-c", "3.0.0").unwrap();
        assert_eq!(fix.fixed_version, "3.1.0");
    }

    #[test]
    fn unverified_fallback_on_query_failure() {
        let mut provider = FakeProvider::new();
        provider.fail_queries = true;
        let vuln = vuln_with_fixed("GHSA-pkg-d", "pkg-d", &["1.4.0", "1.2.0"]);
        let selector = FixSelector::new(&provider);
        let fix = selector.suggest(&vuln, "pkg-d", "1.0.0").unwrap();
        assert_eq!(fix.fixed_version, "1.2.0");
        assert!(fix.note.as_deref().unwrap().contains("unverified"));
    }

    #[test]
    fn none_when_all_candidates_remain_affected() {
        let mut provider = FakeProvider::new();
        provider
            .affected_versions
            .insert("pkg-e@1.1.0".to_string(), vec!["GHSA-pkg-e".to_string()]);
        let vuln = vuln_with_fixed("GHSA-pkg-e", "pkg-e", &["1.1.0"]);
        let selector = FixSelector::new(&provider);
        assert_eq!(selector.suggest(&vuln, "pkg-e", "1.0.0"), None);
    }

    #[test]
    fn results_are_cached_per_key() {
        let mut provider = FakeProvider::new();
        provider
            .affected_versions
            .insert("pkg-f@1.0.0".to_string(), vec!["GHSA-pkg-f".to_string()]);
        let vuln = vuln_with_fixed("GHSA-pkg-f", "pkg-f", &["1.1.0"]);
        let selector = FixSelector::new(&provider);
        let first = selector.suggest(&vuln, "pkg-f", "1.0.0");
        let queries_after_first = provider.log.borrow().len();
        let second = selector.suggest(&vuln, "pkg-f", "1.0.0");
        assert_eq!(first, second);
        assert_eq!(provider.log.borrow().len(), queries_after_first);
    }

    #[test]
    fn version_compare_falls_back_to_lexicographic() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("v2.0.0", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("abc", "abd"), Ordering::Less);
    }
}
