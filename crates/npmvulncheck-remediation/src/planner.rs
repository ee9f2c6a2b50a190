//! Strategy decomposition: findings into override / direct-upgrade
//! operations.

use crate::{
    relock_command, ChangeScope, DependencyField, DirectUpgrade, Operation, OverrideChange,
    PlanFixes, PlanSummary, ReasonedChoice, RemediationPlan, RiskLevel, ScopePolicy, Strategy,
    UpgradeLevel,
};
use anyhow::Result;
use npmvulncheck_core::fix::compare_versions;
use npmvulncheck_core::{AffectedPackage, Finding, ReachabilityState, ScanResult};
use semver::Version;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RemediationPolicy {
    pub strategy: Strategy,
    pub scope: ScopePolicy,
    pub upgrade_level: UpgradeLevel,
    pub only_reachable: bool,
    pub include_unreachable: bool,
    pub relock: bool,
    pub verify: bool,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            scope: ScopePolicy::Global,
            upgrade_level: UpgradeLevel::Any,
            only_reachable: false,
            include_unreachable: true,
            relock: false,
            verify: false,
        }
    }
}

#[derive(Debug, Default)]
struct OverrideCandidate {
    scope: ChangeScope,
    to: String,
    from_versions: BTreeSet<String>,
    vuln_ids: BTreeSet<String>,
    reachable: bool,
}

#[derive(Debug, Default)]
struct DirectCandidate {
    field: DependencyField,
    from_versions: BTreeSet<String>,
    to: String,
    vuln_ids: BTreeSet<String>,
}

/// Per-finding bookkeeping for the fixed/remaining split.
#[derive(Debug, Default, Clone, Copy)]
struct Coverage {
    covered: bool,
    unresolved: bool,
}

/// Compute a remediation plan for a scan result.
pub fn plan(
    scan: &ScanResult,
    policy: &RemediationPolicy,
    root: &Path,
) -> Result<RemediationPlan> {
    let manager = scan
        .meta
        .package_manager
        .unwrap_or(npmvulncheck_lockfiles::PackageManager::Npm);
    // `in-place` is reserved and plans like `auto`.
    let effective_strategy = match policy.strategy {
        Strategy::InPlace => Strategy::Auto,
        other => other,
    };

    let mut override_candidates: BTreeMap<(String, String), OverrideCandidate> = BTreeMap::new();
    let mut direct_candidates: BTreeMap<String, DirectCandidate> = BTreeMap::new();
    let mut coverage: BTreeMap<String, Coverage> = BTreeMap::new();

    for finding in &scan.findings {
        let entry = coverage.entry(finding.vuln_id.clone()).or_default();
        for affected in &finding.affected {
            if !eligible(affected, policy) {
                continue;
            }
            let use_direct = matches!(effective_strategy, Strategy::Direct | Strategy::Auto);
            let use_override = matches!(effective_strategy, Strategy::Override | Strategy::Auto);

            if affected.direct {
                if use_direct {
                    match upgrade_for(affected, policy) {
                        Some(to) => {
                            merge_direct(&mut direct_candidates, finding, affected, to);
                            entry.covered = true;
                        }
                        None => entry.unresolved = true,
                    }
                } else {
                    // Override strategy never touches direct dependencies;
                    // the finding stays blocked.
                    debug!(
                        "{}: {} is a direct dependency; blocked under the override strategy",
                        finding.vuln_id, affected.name
                    );
                    entry.unresolved = true;
                }
                continue;
            }

            if use_override {
                match upgrade_for(affected, policy) {
                    Some(to) => {
                        merge_overrides(
                            &mut override_candidates,
                            finding,
                            affected,
                            to,
                            policy.scope,
                        );
                        entry.covered = true;
                    }
                    None => entry.unresolved = true,
                }
            } else {
                // Direct-only strategy reports transitive findings as
                // remaining.
                entry.unresolved = true;
            }
        }
    }

    let mut operations = Vec::new();
    let changes = override_changes(override_candidates);
    let has_global_override = changes
        .iter()
        .any(|c| matches!(c.scope, ChangeScope::Global));
    let has_parent_override = changes
        .iter()
        .any(|c| matches!(c.scope, ChangeScope::Parent { .. }));
    if !changes.is_empty() {
        operations.push(Operation::ManifestOverride { manager, changes });
    }
    let upgrades = direct_upgrades(direct_candidates);
    let has_direct = !upgrades.is_empty();
    if has_direct {
        operations.push(Operation::ManifestDirectUpgrade { upgrades });
    }

    let any_changes = !operations.is_empty();
    if policy.relock {
        operations.push(Operation::Relock {
            command: relock_command(manager),
        });
    }
    if policy.verify {
        operations.push(Operation::Verify);
    }

    let mut fixed = Vec::new();
    let mut remaining = Vec::new();
    for (vuln_id, entry) in &coverage {
        if entry.covered && !entry.unresolved {
            fixed.push(vuln_id.clone());
        } else {
            remaining.push(vuln_id.clone());
        }
    }

    let (risk, rationale) = if !any_changes {
        (
            RiskLevel::High,
            "no applicable manifest changes were found; every finding stays open".to_string(),
        )
    } else if has_global_override {
        (
            RiskLevel::Medium,
            "global overrides force versions for every dependent and may surface peer conflicts"
                .to_string(),
        )
    } else if has_parent_override {
        (
            RiskLevel::Low,
            "overrides are scoped to the affected parents only".to_string(),
        )
    } else {
        (
            RiskLevel::Low,
            "only direct dependency ranges change".to_string(),
        )
    };

    Ok(RemediationPlan {
        strategy: policy.strategy,
        package_manager: manager,
        target: root.display().to_string(),
        operations,
        fixes: PlanFixes {
            fixed_vulnerabilities: fixed,
            remaining_vulnerabilities: remaining,
            introduced_vulnerabilities: Vec::new(),
        },
        summary: PlanSummary {
            reasoned_top_choices: vec![ReasonedChoice { risk, rationale }],
        },
    })
}

fn eligible(affected: &AffectedPackage, policy: &RemediationPolicy) -> bool {
    let state = affected.reachability.as_ref().map(|r| r.state);
    if policy.only_reachable {
        return state == Some(ReachabilityState::Reachable);
    }
    if !policy.include_unreachable && state == Some(ReachabilityState::Unreachable) {
        return false;
    }
    true
}

/// The target version for an affected entry, or `None` when there is no fix,
/// the fix would be a downgrade, or it violates the upgrade-level policy.
fn upgrade_for(affected: &AffectedPackage, policy: &RemediationPolicy) -> Option<String> {
    let fix = affected.fix.as_ref()?;
    if compare_versions(&fix.fixed_version, &affected.version) == Ordering::Less {
        return None;
    }
    if !level_allowed(&affected.version, &fix.fixed_version, policy.upgrade_level) {
        return None;
    }
    Some(fix.fixed_version.clone())
}

fn level_allowed(from: &str, to: &str, allowed: UpgradeLevel) -> bool {
    if allowed == UpgradeLevel::Any {
        return true;
    }
    let actual = match (parse(from), parse(to)) {
        (Some(from), Some(to)) => {
            if from.major != to.major {
                UpgradeLevel::Major
            } else if from.minor != to.minor {
                UpgradeLevel::Minor
            } else {
                UpgradeLevel::Patch
            }
        }
        // Unparseable versions could change anything.
        _ => UpgradeLevel::Major,
    };
    actual <= allowed
}

fn parse(version: &str) -> Option<Version> {
    Version::parse(version.trim().trim_start_matches('v')).ok()
}

fn merge_overrides(
    candidates: &mut BTreeMap<(String, String), OverrideCandidate>,
    finding: &Finding,
    affected: &AffectedPackage,
    to: String,
    scope_policy: ScopePolicy,
) {
    let scopes = match scope_policy {
        ScopePolicy::Global => vec![ChangeScope::Global],
        ScopePolicy::ByParent => {
            let parents = qualified_parents(affected);
            if parents.is_empty() {
                // No qualified parent in any path; fall back to global.
                vec![ChangeScope::Global]
            } else {
                parents
                    .into_iter()
                    .map(|parent| ChangeScope::Parent {
                        parent,
                        parent_version: None,
                    })
                    .collect()
            }
        }
    };
    let reachable = affected
        .reachability
        .as_ref()
        .is_some_and(|r| r.state == ReachabilityState::Reachable);
    for scope in scopes {
        let key = (affected.name.clone(), scope.key());
        let candidate = candidates.entry(key).or_insert_with(|| OverrideCandidate {
            scope: scope.clone(),
            to: to.clone(),
            ..Default::default()
        });
        // Versions move monotonically up across merges.
        if compare_versions(&to, &candidate.to) == Ordering::Greater {
            candidate.to = to.clone();
        }
        candidate.from_versions.insert(affected.version.clone());
        candidate.vuln_ids.insert(finding.vuln_id.clone());
        candidate.reachable |= reachable;
    }
}

/// Parents of an affected package: the penultimate element of each path,
/// skipping root-like names, deduped preserving first occurrence.
fn qualified_parents(affected: &AffectedPackage) -> Vec<String> {
    let mut parents = Vec::new();
    for path in &affected.paths {
        if path.len() < 2 {
            continue;
        }
        let parent = &path[path.len() - 2];
        let root_name = &path[0];
        if parent == root_name || parent == "(root)" || parent.starts_with("importer:") {
            continue;
        }
        if !parents.contains(parent) {
            parents.push(parent.clone());
        }
    }
    parents
}

fn override_changes(
    candidates: BTreeMap<(String, String), OverrideCandidate>,
) -> Vec<OverrideChange> {
    // BTreeMap keyed (package, scope key) already yields the mandated order.
    candidates
        .into_iter()
        .map(|((package, _), candidate)| {
            let mut why = candidate
                .vuln_ids
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if candidate.reachable {
                why.push_str(" (reachable)");
            }
            OverrideChange {
                package,
                from: candidate
                    .from_versions
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
                to: candidate.to,
                scope: candidate.scope,
                why,
            }
        })
        .collect()
}

fn merge_direct(
    candidates: &mut BTreeMap<String, DirectCandidate>,
    finding: &Finding,
    affected: &AffectedPackage,
    to: String,
) {
    let field = if affected.flags.optional {
        DependencyField::OptionalDependencies
    } else if affected.flags.dev {
        DependencyField::DevDependencies
    } else {
        DependencyField::Dependencies
    };
    let candidate = candidates
        .entry(affected.name.clone())
        .or_insert_with(|| DirectCandidate {
            field,
            to: to.clone(),
            ..Default::default()
        });
    if compare_versions(&to, &candidate.to) == Ordering::Greater {
        candidate.to = to.clone();
    }
    candidate.from_versions.insert(affected.version.clone());
    candidate.vuln_ids.insert(finding.vuln_id.clone());
}

fn direct_upgrades(candidates: BTreeMap<String, DirectCandidate>) -> Vec<DirectUpgrade> {
    let mut upgrades: Vec<DirectUpgrade> = candidates
        .into_iter()
        .map(|(package, candidate)| DirectUpgrade {
            package,
            field: candidate.field,
            from: candidate
                .from_versions
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
            to: candidate.to,
            vuln_ids: candidate.vuln_ids.into_iter().collect(),
        })
        .collect();
    // Sorted by dependency field, then package.
    upgrades.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.package.cmp(&b.package)));
    upgrades
}

#[cfg(test)]
mod tests {
    use super::*;
    use npmvulncheck_core::{
        AffectedReachability, FixSuggestion, Priority, PriorityLevel, PriorityReason, ScanMeta,
        ScanMode, ScanStats,
    };
    use npmvulncheck_graph::DependencyFlags;
    use npmvulncheck_lockfiles::PackageManager;

    fn affected(
        name: &str,
        version: &str,
        direct: bool,
        fix: Option<&str>,
        paths: Vec<Vec<&str>>,
    ) -> AffectedPackage {
        AffectedPackage {
            name: name.to_string(),
            version: version.to_string(),
            node_id: format!("node_modules/{name}"),
            direct,
            flags: DependencyFlags::default(),
            paths: paths
                .into_iter()
                .map(|p| p.into_iter().map(|s| s.to_string()).collect())
                .collect(),
            reachability: None,
            fix: fix.map(|f| FixSuggestion {
                fixed_version: f.to_string(),
                note: None,
            }),
        }
    }

    fn finding(vuln_id: &str, affected: Vec<AffectedPackage>) -> Finding {
        Finding {
            vuln_id: vuln_id.to_string(),
            aliases: Vec::new(),
            summary: None,
            details: None,
            severity: None,
            modified: None,
            published: None,
            references: Vec::new(),
            affected,
            priority: Priority {
                level: PriorityLevel::Low,
                reason: PriorityReason::Severity,
                score: 20,
            },
        }
    }

    fn scan_with(findings: Vec<Finding>) -> ScanResult {
        ScanResult {
            meta: ScanMeta {
                tool: "npmvulncheck".to_string(),
                version: "0.0.0".to_string(),
                mode: ScanMode::Lockfile,
                format: "json".to_string(),
                db: "osv.dev".to_string(),
                timestamp: "2024-01-01T00:00:00Z".to_string(),
                package_manager: Some(PackageManager::Npm),
                source_analysis: None,
                warnings: Vec::new(),
            },
            findings,
            stats: ScanStats::default(),
        }
    }

    fn policy(strategy: Strategy) -> RemediationPolicy {
        RemediationPolicy {
            strategy,
            ..Default::default()
        }
    }

    #[test]
    fn override_strategy_excludes_direct_dependencies() {
        let scan = scan_with(vec![
            finding(
                "GHSA-pkg-a",
                vec![affected(
                    "pkg-a",
                    "1.0.0",
                    false,
                    Some("1.2.0"),
                    vec![vec!["demo", "express", "pkg-a"]],
                )],
            ),
            finding(
                "GHSA-pkg-b",
                vec![affected(
                    "pkg-b",
                    "2.0.0",
                    true,
                    Some("2.1.0"),
                    vec![vec!["demo", "pkg-b"]],
                )],
            ),
            finding(
                "GHSA-pkg-c",
                vec![affected(
                    "pkg-c",
                    "0.1.0",
                    false,
                    None,
                    vec![vec!["demo", "express", "pkg-c"]],
                )],
            ),
        ]);
        let plan = plan(&scan, &policy(Strategy::Override), Path::new("/proj")).unwrap();

        let changes = match &plan.operations[0] {
            Operation::ManifestOverride { changes, .. } => changes,
            other => panic!("unexpected first operation {other:?}"),
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].package, "pkg-a");
        assert_eq!(changes[0].to, "1.2.0");
        assert_eq!(changes[0].scope, ChangeScope::Global);
        assert_eq!(plan.fixes.fixed_vulnerabilities, ["GHSA-pkg-a"]);
        assert_eq!(
            plan.fixes.remaining_vulnerabilities,
            ["GHSA-pkg-b", "GHSA-pkg-c"]
        );
    }

    #[test]
    fn direct_strategy_upgrades_only_direct() {
        let scan = scan_with(vec![
            finding(
                "GHSA-direct",
                vec![affected(
                    "pkg-b",
                    "2.0.0",
                    true,
                    Some("2.1.0"),
                    vec![vec!["demo", "pkg-b"]],
                )],
            ),
            finding(
                "GHSA-transitive",
                vec![affected(
                    "pkg-a",
                    "1.0.0",
                    false,
                    Some("1.2.0"),
                    vec![vec!["demo", "express", "pkg-a"]],
                )],
            ),
        ]);
        let plan = plan(&scan, &policy(Strategy::Direct), Path::new("/proj")).unwrap();
        let upgrades = match &plan.operations[0] {
            Operation::ManifestDirectUpgrade { upgrades } => upgrades,
            other => panic!("unexpected operation {other:?}"),
        };
        assert_eq!(upgrades.len(), 1);
        assert_eq!(upgrades[0].package, "pkg-b");
        assert_eq!(upgrades[0].field, DependencyField::Dependencies);
        assert_eq!(plan.fixes.fixed_vulnerabilities, ["GHSA-direct"]);
        assert_eq!(plan.fixes.remaining_vulnerabilities, ["GHSA-transitive"]);
    }

    #[test]
    fn auto_combines_and_requires_full_coverage() {
        let scan = scan_with(vec![finding(
            "GHSA-both",
            vec![
                affected("pkg-b", "2.0.0", true, Some("2.1.0"), vec![vec!["demo", "pkg-b"]]),
                affected(
                    "pkg-a",
                    "1.0.0",
                    false,
                    Some("1.2.0"),
                    vec![vec!["demo", "express", "pkg-a"]],
                ),
                affected(
                    "pkg-c",
                    "0.1.0",
                    false,
                    None,
                    vec![vec!["demo", "express", "pkg-c"]],
                ),
            ],
        )]);
        let plan = plan(&scan, &policy(Strategy::Auto), Path::new("/proj")).unwrap();
        assert_eq!(plan.operations.len(), 2);
        // Covered but one eligible affected had no fix: not reported fixed.
        assert!(plan.fixes.fixed_vulnerabilities.is_empty());
        assert_eq!(plan.fixes.remaining_vulnerabilities, ["GHSA-both"]);
    }

    #[test]
    fn by_parent_scope_with_global_fallback() {
        let scan = scan_with(vec![finding(
            "GHSA-scoped",
            vec![
                affected(
                    "pkg-a",
                    "1.0.0",
                    false,
                    Some("1.2.0"),
                    vec![vec!["demo", "webpack", "pkg-a"]],
                ),
                // Path too shallow for a qualified parent.
                affected("pkg-d", "1.0.0", false, Some("1.1.0"), vec![vec!["demo", "pkg-d"]]),
            ],
        )]);
        let mut p = policy(Strategy::Override);
        p.scope = ScopePolicy::ByParent;
        let plan = plan(&scan, &p, Path::new("/proj")).unwrap();
        let changes = match &plan.operations[0] {
            Operation::ManifestOverride { changes, .. } => changes,
            other => panic!("unexpected operation {other:?}"),
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0].scope,
            ChangeScope::Parent {
                parent: "webpack".to_string(),
                parent_version: None
            }
        );
        assert_eq!(changes[1].scope, ChangeScope::Global);
    }

    #[test]
    fn merged_candidates_move_monotonically_up() {
        let scan = scan_with(vec![
            finding(
                "GHSA-one",
                vec![affected(
                    "pkg-a",
                    "1.0.0",
                    false,
                    Some("1.2.0"),
                    vec![vec!["demo", "x", "pkg-a"]],
                )],
            ),
            finding(
                "GHSA-two",
                vec![affected(
                    "pkg-a",
                    "1.1.0",
                    false,
                    Some("1.5.0"),
                    vec![vec!["demo", "y", "pkg-a"]],
                )],
            ),
        ]);
        let plan = plan(&scan, &policy(Strategy::Override), Path::new("/proj")).unwrap();
        let changes = match &plan.operations[0] {
            Operation::ManifestOverride { changes, .. } => changes,
            other => panic!("unexpected operation {other:?}"),
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, "1.5.0");
        assert_eq!(changes[0].from, "1.0.0, 1.1.0");
        assert_eq!(changes[0].why, "GHSA-one, GHSA-two");
    }

    #[test]
    fn upgrade_level_policy_blocks_major_jumps() {
        let scan = scan_with(vec![finding(
            "GHSA-major",
            vec![affected(
                "pkg-a",
                "1.0.0",
                false,
                Some("2.0.0"),
                vec![vec!["demo", "x", "pkg-a"]],
            )],
        )]);
        let mut p = policy(Strategy::Override);
        p.upgrade_level = UpgradeLevel::Minor;
        let plan = plan(&scan, &p, Path::new("/proj")).unwrap();
        assert!(plan.operations.is_empty());
        assert_eq!(plan.fixes.remaining_vulnerabilities, ["GHSA-major"]);
        assert_eq!(plan.summary.reasoned_top_choices[0].risk, RiskLevel::High);
    }

    #[test]
    fn relock_and_verify_operations_append() {
        let scan = scan_with(vec![finding(
            "GHSA-a",
            vec![affected(
                "pkg-a",
                "1.0.0",
                false,
                Some("1.2.0"),
                vec![vec!["demo", "x", "pkg-a"]],
            )],
        )]);
        let mut p = policy(Strategy::Override);
        p.relock = true;
        p.verify = true;
        let plan = plan(&scan, &p, Path::new("/proj")).unwrap();
        assert_eq!(plan.operations.len(), 3);
        match &plan.operations[1] {
            Operation::Relock { command } => {
                assert_eq!(command, &["npm", "install", "--package-lock-only"]);
            }
            other => panic!("unexpected operation {other:?}"),
        }
        assert!(matches!(plan.operations[2], Operation::Verify));
    }

    #[test]
    fn reachable_marker_lands_in_why() {
        let mut a = affected(
            "pkg-a",
            "1.0.0",
            false,
            Some("1.2.0"),
            vec![vec!["demo", "x", "pkg-a"]],
        );
        a.reachability = Some(AffectedReachability {
            state: ReachabilityState::Reachable,
            level: None,
            traces: Vec::new(),
        });
        let scan = scan_with(vec![finding("GHSA-r", vec![a])]);
        let plan = plan(&scan, &policy(Strategy::Override), Path::new("/proj")).unwrap();
        let changes = match &plan.operations[0] {
            Operation::ManifestOverride { changes, .. } => changes,
            other => panic!("unexpected operation {other:?}"),
        };
        assert_eq!(changes[0].why, "GHSA-r (reachable)");
    }
}
