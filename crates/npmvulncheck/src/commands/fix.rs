//! `npmvulncheck plan` and `npmvulncheck fix`

use super::scan::{client_for, scan_options};
use crate::cli::{FixArgs, PlanArgs};
use crate::output::{print_plan, print_scan_result};
use anyhow::Result;
use npmvulncheck_core::run_scan;
use npmvulncheck_remediation::{
    apply_plan, plan, ApplyOptions, RemediationPlan, RemediationPolicy,
};

fn policy_for(args: &PlanArgs) -> RemediationPolicy {
    RemediationPolicy {
        strategy: args.strategy.into(),
        scope: args.scope.into(),
        upgrade_level: args.upgrade_level.into(),
        only_reachable: args.only_reachable,
        include_unreachable: !args.skip_unreachable,
        relock: args.relock,
        verify: args.verify,
    }
}

fn compute_plan(args: &PlanArgs) -> Result<RemediationPlan> {
    let options = scan_options(&args.scan);
    let client = client_for(&options);
    let scan = run_scan(&options, &client)?;
    if !args.scan.json {
        print_scan_result(&scan);
    }
    plan(&scan, &policy_for(args), &options.root)
}

pub fn handle_plan(args: PlanArgs) -> Result<()> {
    let plan = compute_plan(&args)?;
    if args.scan.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

pub fn handle_fix(args: FixArgs) -> Result<()> {
    let mut plan = compute_plan(&args.plan)?;
    if args.dry_run {
        println!("[npmvulncheck] dry run; no files were changed");
        if args.plan.scan.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let options = scan_options(&args.plan.scan);
    let client = client_for(&options);
    let report = apply_plan(
        &options.root,
        &mut plan,
        &options,
        &client,
        &ApplyOptions {
            rollback_on_fail: !args.no_rollback,
            no_introduce: args.no_introduce,
        },
    )?;

    if args.plan.scan.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
        println!(
            "[npmvulncheck] applied {} operation(s)",
            report.operations_applied
        );
    }
    if let Some(verify) = &report.verify {
        if !verify.ok {
            anyhow::bail!(
                "verify failed: {} remaining, {} introduced",
                verify.remaining.len(),
                verify.introduced.len()
            );
        }
        println!(
            "[npmvulncheck] verify ok: {} vulnerability(ies) confirmed fixed",
            verify.fixed.len()
        );
    }
    Ok(())
}
