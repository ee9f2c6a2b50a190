//! Command-line interface definition.

use clap::{Args, Parser, Subcommand, ValueEnum};
use npmvulncheck_advisories::severity::SeverityLevel;
use npmvulncheck_core::ScanMode;
use npmvulncheck_remediation::{ScopePolicy, Strategy, UpgradeLevel};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "npmvulncheck",
    version,
    about = "Vulnerability scanner and remediation planner for npm projects"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a project for known vulnerabilities
    Scan(ScanArgs),
    /// Compute a remediation plan without touching any file
    Plan(PlanArgs),
    /// Apply a remediation plan (and optionally relock + verify)
    Fix(FixArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,
    #[arg(long, value_enum, default_value_t = ModeArg::Lockfile)]
    pub mode: ModeArg,
    /// Explicit entry file for source mode (repeatable)
    #[arg(long = "entry")]
    pub entries: Vec<PathBuf>,
    /// Extra resolution condition (repeatable)
    #[arg(long = "condition")]
    pub conditions: Vec<String>,
    /// Follow type-only imports in source mode
    #[arg(long)]
    pub include_type_imports: bool,
    /// Record unresolved imports in the scan output
    #[arg(long)]
    pub explain_resolve: bool,
    /// Include devDependencies in the inventory
    #[arg(long)]
    pub include_dev: bool,
    /// Drop findings below this severity
    #[arg(long, value_enum)]
    pub severity_threshold: Option<SeverityArg>,
    /// Use only the local cache; no network
    #[arg(long)]
    pub offline: bool,
    /// Ignore policy file (default: <root>/.npmvulncheck-ignore.json)
    #[arg(long)]
    pub ignore_file: Option<PathBuf>,
    /// OSV cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Emit the scan result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
    #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
    pub strategy: StrategyArg,
    #[arg(long, value_enum, default_value_t = ScopeArg::Global)]
    pub scope: ScopeArg,
    #[arg(long, value_enum, default_value_t = UpgradeLevelArg::Any)]
    pub upgrade_level: UpgradeLevelArg,
    /// Plan fixes only for reachable findings
    #[arg(long)]
    pub only_reachable: bool,
    /// Leave findings proven unreachable out of the plan
    #[arg(long)]
    pub skip_unreachable: bool,
    /// Append a lockfile-only install operation
    #[arg(long)]
    pub relock: bool,
    /// Append a rescan-verify operation
    #[arg(long)]
    pub verify: bool,
}

#[derive(Debug, Args)]
pub struct FixArgs {
    #[command(flatten)]
    pub plan: PlanArgs,
    /// Keep partial changes in place when an operation fails
    #[arg(long)]
    pub no_rollback: bool,
    /// Verify also fails when new vulnerabilities appear
    #[arg(long)]
    pub no_introduce: bool,
    /// Print the plan without applying it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Lockfile,
    Installed,
    Source,
}

impl From<ModeArg> for ScanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lockfile => ScanMode::Lockfile,
            ModeArg::Installed => ScanMode::Installed,
            ModeArg::Source => ScanMode::Source,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<SeverityArg> for SeverityLevel {
    fn from(severity: SeverityArg) -> Self {
        match severity {
            SeverityArg::Low => SeverityLevel::Low,
            SeverityArg::Medium => SeverityLevel::Medium,
            SeverityArg::High => SeverityLevel::High,
            SeverityArg::Critical => SeverityLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Override,
    Direct,
    InPlace,
    Auto,
}

impl From<StrategyArg> for Strategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Override => Strategy::Override,
            StrategyArg::Direct => Strategy::Direct,
            StrategyArg::InPlace => Strategy::InPlace,
            StrategyArg::Auto => Strategy::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    Global,
    ByParent,
}

impl From<ScopeArg> for ScopePolicy {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Global => ScopePolicy::Global,
            ScopeArg::ByParent => ScopePolicy::ByParent,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UpgradeLevelArg {
    Patch,
    Minor,
    Major,
    Any,
}

impl From<UpgradeLevelArg> for UpgradeLevel {
    fn from(level: UpgradeLevelArg) -> Self {
        match level {
            UpgradeLevelArg::Patch => UpgradeLevel::Patch,
            UpgradeLevelArg::Minor => UpgradeLevel::Minor,
            UpgradeLevelArg::Major => UpgradeLevel::Major,
            UpgradeLevelArg::Any => UpgradeLevel::Any,
        }
    }
}
