//! Plan application with snapshot/rollback, lockfile regeneration, and
//! rescan verification.

use crate::overrides::provider_for;
use crate::{lockfile_name, DirectUpgrade, Operation, RemediationPlan};
use anyhow::{Context, Result};
use npmvulncheck_advisories::VulnerabilityProvider;
use npmvulncheck_core::{run_scan, ScanOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub rollback_on_fail: bool,
    /// Verify also fails when new vulnerabilities appear.
    pub no_introduce: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub ok: bool,
    pub fixed: Vec<String>,
    pub remaining: Vec<String>,
    pub introduced: Vec<String>,
}

#[derive(Debug)]
pub struct ApplyReport {
    pub operations_applied: usize,
    pub verify: Option<VerifyOutcome>,
    pub rolled_back: bool,
}

/// Snapshot of files touched by the applier. Files absent at snapshot time
/// are deleted on rollback.
#[derive(Debug, Default)]
struct FileSnapshots {
    files: HashMap<PathBuf, Option<String>>,
}

impl FileSnapshots {
    fn snapshot(&mut self, path: &Path) {
        if self.files.contains_key(path) {
            return;
        }
        let content = fs::read_to_string(path).ok();
        self.files.insert(path.to_path_buf(), content);
    }

    fn restore_all(&self) -> Result<()> {
        for (path, content) in &self.files {
            match content {
                Some(content) => {
                    fs::write(path, content)
                        .with_context(|| format!("failed to restore {}", path.display()))?;
                }
                None => {
                    if path.exists() {
                        fs::remove_file(path)
                            .with_context(|| format!("failed to remove {}", path.display()))?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Apply a plan's operations in order. On failure with `rollback_on_fail`,
/// every snapshot is restored and the original error re-raised.
pub fn apply_plan(
    root: &Path,
    plan: &mut RemediationPlan,
    scan_options: &ScanOptions,
    provider: &dyn VulnerabilityProvider,
    options: &ApplyOptions,
) -> Result<ApplyReport> {
    let mut snapshots = FileSnapshots::default();
    match run_operations(root, plan, scan_options, provider, options, &mut snapshots) {
        Ok(report) => Ok(report),
        Err(e) => {
            if options.rollback_on_fail {
                warn!("apply failed; rolling back {} file(s)", snapshots.files.len());
                snapshots
                    .restore_all()
                    .context("rollback after failed apply also failed")?;
                return Err(e.context("apply failed; all changes were rolled back"));
            }
            Err(e)
        }
    }
}

fn run_operations(
    root: &Path,
    plan: &mut RemediationPlan,
    scan_options: &ScanOptions,
    provider: &dyn VulnerabilityProvider,
    options: &ApplyOptions,
    snapshots: &mut FileSnapshots,
) -> Result<ApplyReport> {
    // The vulnerabilities the plan set out to fix, and everything known at
    // plan time (the verify baseline).
    let expected: BTreeSet<String> = plan.fixes.fixed_vulnerabilities.iter().cloned().collect();
    let baseline: BTreeSet<String> = expected
        .iter()
        .cloned()
        .chain(plan.fixes.remaining_vulnerabilities.iter().cloned())
        .collect();

    // Validate overrides before touching anything.
    for operation in &plan.operations {
        if let Operation::ManifestOverride { manager, changes } = operation {
            provider_for(*manager).validate(root, changes)?;
        }
    }

    let mut applied = 0;
    let mut verify_outcome = None;
    let operations = plan.operations.clone();
    for operation in &operations {
        match operation {
            Operation::ManifestOverride { manager, changes } => {
                snapshots.snapshot(&root.join("package.json"));
                provider_for(*manager).apply(root, changes)?;
                info!("wrote {} override(s) to package.json", changes.len());
            }
            Operation::ManifestDirectUpgrade { upgrades } => {
                snapshots.snapshot(&root.join("package.json"));
                apply_direct_upgrades(root, upgrades)?;
                info!("upgraded {} direct dependency range(s)", upgrades.len());
            }
            Operation::Relock { command } => {
                snapshots.snapshot(&root.join(lockfile_name(plan.package_manager)));
                run_relock(root, command)?;
            }
            Operation::Verify => {
                let outcome = verify(plan, scan_options, provider, options, &expected, &baseline)?;
                verify_outcome = Some(outcome);
            }
        }
        applied += 1;
    }

    Ok(ApplyReport {
        operations_applied: applied,
        verify: verify_outcome,
        rolled_back: false,
    })
}

fn apply_direct_upgrades(root: &Path, upgrades: &[DirectUpgrade]) -> Result<()> {
    let path = root.join("package.json");
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut manifest: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    for upgrade in upgrades {
        let field = manifest
            .get_mut(upgrade.field.manifest_key())
            .and_then(Value::as_object_mut)
            .with_context(|| {
                format!(
                    "{} has no {} section for {}",
                    path.display(),
                    upgrade.field.manifest_key(),
                    upgrade.package
                )
            })?;
        if !field.contains_key(&upgrade.package) {
            anyhow::bail!(
                "{} is not declared in {}",
                upgrade.package,
                upgrade.field.manifest_key()
            );
        }
        field.insert(
            upgrade.package.clone(),
            Value::String(format!("^{}", upgrade.to)),
        );
    }
    let formatted =
        serde_json::to_string_pretty(&manifest).context("failed to serialize package.json")?;
    fs::write(&path, formatted + "\n")
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn run_relock(root: &Path, command: &[String]) -> Result<()> {
    let (program, args) = command
        .split_first()
        .context("relock operation has an empty command")?;
    info!("running {}", command.join(" "));
    // Stdio passes through so install output stays visible.
    let status = Command::new(program)
        .args(args)
        .current_dir(root)
        .status()
        .with_context(|| format!("failed to spawn {program}"))?;
    if !status.success() {
        anyhow::bail!("{} exited with {status}", command.join(" "));
    }
    Ok(())
}

fn verify(
    plan: &mut RemediationPlan,
    scan_options: &ScanOptions,
    provider: &dyn VulnerabilityProvider,
    options: &ApplyOptions,
    expected: &BTreeSet<String>,
    baseline: &BTreeSet<String>,
) -> Result<VerifyOutcome> {
    info!("verifying by rescanning");
    let rescan = run_scan(scan_options, provider)?;
    let current: BTreeSet<String> = rescan.vuln_ids().into_iter().collect();

    let remaining: Vec<String> = expected.intersection(&current).cloned().collect();
    let fixed: Vec<String> = expected.difference(&current).cloned().collect();
    let introduced: Vec<String> = current.difference(baseline).cloned().collect();
    let ok = remaining.is_empty() && (!options.no_introduce || introduced.is_empty());

    plan.fixes.fixed_vulnerabilities = fixed.clone();
    plan.fixes.remaining_vulnerabilities = remaining.clone();
    plan.fixes.introduced_vulnerabilities = introduced.clone();

    Ok(VerifyOutcome {
        ok,
        fixed,
        remaining,
        introduced,
    })
}
