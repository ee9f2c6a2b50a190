//! Text rendering for scan results and remediation plans.

use npmvulncheck_core::{Finding, ScanResult};
use npmvulncheck_remediation::{ChangeScope, Operation, RemediationPlan};

pub fn print_scan_result(result: &ScanResult) {
    println!(
        "[npmvulncheck] {} scan of {} packages ({} graph nodes, {} edges)",
        result.meta.mode.as_str(),
        result.stats.queried_packages,
        result.stats.nodes,
        result.stats.edges
    );
    for warning in &result.meta.warnings {
        println!("[npmvulncheck]   warning: {warning}");
    }
    if let Some(source) = &result.meta.source_analysis {
        println!(
            "[npmvulncheck]   source analysis: {} entry file(s), coverage {}",
            source.entries_scanned,
            if source.complete_coverage {
                "complete"
            } else {
                "incomplete"
            }
        );
        for unresolved in &source.unresolved_imports {
            println!(
                "[npmvulncheck]   unresolved: {} ({}:{}:{}) {}",
                unresolved.specifier,
                unresolved.file,
                unresolved.line,
                unresolved.column,
                unresolved.reason
            );
        }
    }

    if result.findings.is_empty() {
        println!("[npmvulncheck] no known vulnerabilities found");
        return;
    }
    println!(
        "[npmvulncheck] {} finding(s):",
        result.stats.vulnerabilities
    );
    for finding in &result.findings {
        print_finding(finding);
    }
}

fn print_finding(finding: &Finding) {
    let severity = finding
        .severity
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "  [{}] {} (severity: {severity}, score: {})",
        priority_tag(finding),
        finding.vuln_id,
        finding.priority.score
    );
    if let Some(summary) = &finding.summary {
        println!("      {summary}");
    }
    for affected in &finding.affected {
        let mut line = format!("      {}@{}", affected.name, affected.version);
        if affected.direct {
            line.push_str(" (direct)");
        }
        if let Some(reachability) = &affected.reachability {
            line.push_str(&format!(" [{:?}]", reachability.state).to_lowercase());
        }
        if let Some(fix) = &affected.fix {
            line.push_str(&format!(" -> fix {}", fix.fixed_version));
            if let Some(note) = &fix.note {
                line.push_str(&format!(" ({note})"));
            }
        }
        println!("{line}");
        if let Some(path) = affected.paths.first() {
            println!("        via {}", path.join(" > "));
        }
    }
}

fn priority_tag(finding: &Finding) -> &'static str {
    match finding.priority.level {
        npmvulncheck_core::PriorityLevel::High => "HIGH",
        npmvulncheck_core::PriorityLevel::Medium => "MED",
        npmvulncheck_core::PriorityLevel::Low => "LOW",
    }
}

pub fn print_plan(plan: &RemediationPlan) {
    println!(
        "[npmvulncheck] remediation plan for {} ({:?} strategy, {} manager)",
        plan.target,
        plan.strategy,
        plan.package_manager
    );
    for operation in &plan.operations {
        match operation {
            Operation::ManifestOverride { manager, changes } => {
                println!("  manifest-override ({manager}):");
                for change in changes {
                    let scope = match &change.scope {
                        ChangeScope::Global => "global".to_string(),
                        ChangeScope::Parent { parent, .. } => format!("under {parent}"),
                    };
                    println!(
                        "    {} {} -> {} [{scope}] ({})",
                        change.package, change.from, change.to, change.why
                    );
                }
            }
            Operation::ManifestDirectUpgrade { upgrades } => {
                println!("  manifest-direct-upgrade:");
                for upgrade in upgrades {
                    println!(
                        "    {} {} -> {} in {} ({})",
                        upgrade.package,
                        upgrade.from,
                        upgrade.to,
                        upgrade.field.manifest_key(),
                        upgrade.vuln_ids.join(", ")
                    );
                }
            }
            Operation::Relock { command } => {
                println!("  relock: {}", command.join(" "));
            }
            Operation::Verify => println!("  verify: rescan after apply"),
        }
    }
    println!(
        "[npmvulncheck] fixes: {} fixed, {} remaining",
        plan.fixes.fixed_vulnerabilities.len(),
        plan.fixes.remaining_vulnerabilities.len()
    );
    for choice in &plan.summary.reasoned_top_choices {
        println!("[npmvulncheck] risk {:?}: {}", choice.risk, choice.rationale);
    }
}
