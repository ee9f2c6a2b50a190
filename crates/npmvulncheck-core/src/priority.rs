//! Finding prioritization.

use crate::{
    AffectedPackage, Priority, PriorityLevel, PriorityReason, ReachabilityState, ScanMode,
};
use npmvulncheck_advisories::severity::SeverityLevel;
use tracing::debug;

/// Compute a finding's priority from its affected entries and severity.
///
/// In source mode reachability dominates; severity only breaks ties through
/// the 0-3 rank added to the base score.
pub fn compute(
    mode: ScanMode,
    affected: &[AffectedPackage],
    severity: Option<SeverityLevel>,
) -> Priority {
    let severity_rank = severity.map(|s| s.rank()).unwrap_or(0);
    if mode == ScanMode::Source {
        let states: Vec<ReachabilityState> = affected
            .iter()
            .filter_map(|a| a.reachability.as_ref().map(|r| r.state))
            .collect();
        if states.is_empty() {
            // No affected entry carries reachability (entriesScanned = 0);
            // fall back to severity.
            debug!("finding has no reachability info in source mode; scoring by severity");
            return severity_priority(severity, severity_rank);
        }
        if states.iter().any(|s| *s == ReachabilityState::Reachable) {
            return Priority {
                level: PriorityLevel::High,
                reason: PriorityReason::Reachable,
                score: 30 + severity_rank,
            };
        }
        if states.iter().any(|s| *s == ReachabilityState::Unknown) {
            return Priority {
                level: PriorityLevel::Medium,
                reason: PriorityReason::UnknownReachability,
                score: 20 + severity_rank,
            };
        }
        return Priority {
            level: PriorityLevel::Low,
            reason: PriorityReason::Unreachable,
            score: 10 + severity_rank,
        };
    }
    severity_priority(severity, severity_rank)
}

fn severity_priority(severity: Option<SeverityLevel>, severity_rank: u32) -> Priority {
    let level = match severity {
        Some(SeverityLevel::Critical) | Some(SeverityLevel::High) => PriorityLevel::High,
        Some(SeverityLevel::Medium) => PriorityLevel::Medium,
        _ => PriorityLevel::Low,
    };
    Priority {
        level,
        reason: PriorityReason::Severity,
        score: 20 + severity_rank,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AffectedReachability;
    use npmvulncheck_graph::DependencyFlags;

    fn affected(state: Option<ReachabilityState>) -> AffectedPackage {
        AffectedPackage {
            name: "pkg".to_string(),
            version: "1.0.0".to_string(),
            node_id: "pkg".to_string(),
            direct: false,
            flags: DependencyFlags::default(),
            paths: Vec::new(),
            reachability: state.map(|s| AffectedReachability {
                state: s,
                level: None,
                traces: Vec::new(),
            }),
            fix: None,
        }
    }

    #[test]
    fn reachable_wins_in_source_mode() {
        let priority = compute(
            ScanMode::Source,
            &[
                affected(Some(ReachabilityState::Unreachable)),
                affected(Some(ReachabilityState::Reachable)),
            ],
            Some(SeverityLevel::Low),
        );
        assert_eq!(priority.level, PriorityLevel::High);
        assert_eq!(priority.reason, PriorityReason::Reachable);
        assert_eq!(priority.score, 30);
    }

    #[test]
    fn unknown_beats_unreachable() {
        let priority = compute(
            ScanMode::Source,
            &[
                affected(Some(ReachabilityState::Unreachable)),
                affected(Some(ReachabilityState::Unknown)),
            ],
            None,
        );
        assert_eq!(priority.level, PriorityLevel::Medium);
        assert_eq!(priority.reason, PriorityReason::UnknownReachability);
        assert_eq!(priority.score, 20);
    }

    #[test]
    fn all_unreachable_is_low() {
        let priority = compute(
            ScanMode::Source,
            &[affected(Some(ReachabilityState::Unreachable))],
            Some(SeverityLevel::Critical),
        );
        assert_eq!(priority.level, PriorityLevel::Low);
        assert_eq!(priority.reason, PriorityReason::Unreachable);
        assert_eq!(priority.score, 13);
    }

    #[test]
    fn source_mode_without_reachability_uses_severity() {
        let priority = compute(
            ScanMode::Source,
            &[affected(None)],
            Some(SeverityLevel::High),
        );
        assert_eq!(priority.reason, PriorityReason::Severity);
        assert_eq!(priority.score, 22);
    }

    #[test]
    fn lockfile_mode_maps_severity_to_level() {
        let critical = compute(ScanMode::Lockfile, &[], Some(SeverityLevel::Critical));
        assert_eq!(critical.level, PriorityLevel::High);
        assert_eq!(critical.score, 23);
        let medium = compute(ScanMode::Lockfile, &[], Some(SeverityLevel::Medium));
        assert_eq!(medium.level, PriorityLevel::Medium);
        let unknown = compute(ScanMode::Lockfile, &[], None);
        assert_eq!(unknown.level, PriorityLevel::Low);
        assert_eq!(unknown.score, 20);
    }
}
