//! Source-level reachability analysis for npmvulncheck
//!
//! Determines which installed packages a project's source actually imports,
//! directly or transitively. Parsing uses SWC; resolution goes through the
//! dependency graph's provider resolver; propagation is a serial BFS that
//! records evidence and bounded traces per package node.

pub mod entrypoints;
pub mod error;
pub mod imports;
pub mod propagate;
pub mod resolver;

pub use entrypoints::discover_entries;
pub use error::{ReachabilityError, Result};
pub use imports::{parse_imports, ParsedImport};
pub use propagate::{
    analyze, Evidence, ReachabilityAnalysis, ReachabilityLevel, ReachabilityOptions,
    ReachabilityRecord, UnresolvedImport,
};
pub use resolver::{is_in_dependency, ModuleFileResolver, ResolvedModule};
