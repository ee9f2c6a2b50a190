//! `npmvulncheck scan`

use crate::cli::ScanArgs;
use crate::output::print_scan_result;
use anyhow::Result;
use npmvulncheck_advisories::{OsvCache, OsvClient};
use npmvulncheck_core::{run_scan, ScanOptions, ScanResult};

pub fn scan_options(args: &ScanArgs) -> ScanOptions {
    ScanOptions {
        root: args.path.clone(),
        mode: args.mode.into(),
        entries: args.entries.clone(),
        conditions: args.conditions.clone(),
        include_type_imports: args.include_type_imports,
        explain_resolve: args.explain_resolve,
        include_dev: args.include_dev,
        severity_threshold: args.severity_threshold.map(Into::into),
        offline: args.offline,
        ignore_file: args.ignore_file.clone(),
        cache_dir: args.cache_dir.clone(),
    }
}

pub fn client_for(options: &ScanOptions) -> OsvClient {
    let cache_dir = options
        .cache_dir
        .clone()
        .unwrap_or_else(OsvCache::default_dir);
    OsvClient::new(OsvCache::new(cache_dir), options.offline)
}

pub fn run(args: &ScanArgs) -> Result<ScanResult> {
    let options = scan_options(args);
    let client = client_for(&options);
    run_scan(&options, &client)
}

pub fn handle_scan(args: ScanArgs) -> Result<()> {
    let result = run(&args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_scan_result(&result);
    }
    Ok(())
}
