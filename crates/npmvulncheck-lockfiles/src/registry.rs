//! Provider selection for a project root.
//!
//! All dialects are probed; a `packageManager` manifest declaration wins when
//! it matches a detection, otherwise the preference order is pnpm, yarn, npm.
//! Conflicting detections produce warnings rather than errors.

use crate::manifest::PackageManifest;
use crate::npm::NpmProvider;
use crate::pnpm::PnpmProvider;
use crate::yarn::YarnProvider;
use crate::{DetectResult, LockfileProvider, PackageManager, ProviderContext};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// A loaded project plus any provider-selection warnings.
pub struct ProjectLoad {
    pub context: ProviderContext,
    pub warnings: Vec<String>,
}

impl std::fmt::Debug for ProjectLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectLoad")
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

/// Detect and load the provider for `root`.
///
/// In installed mode only the npm provider applies and an installed
/// `node_modules` tree is required.
pub fn load_project(root: &Path, installed: bool) -> Result<ProjectLoad> {
    if installed {
        let provider = NpmProvider { installed: true };
        provider
            .detect(root)
            .with_context(|| format!("{}: installed mode requires a node_modules directory", root.display()))?;
        let context = provider.load(root)?;
        return Ok(ProjectLoad {
            context,
            warnings: Vec::new(),
        });
    }

    let providers: Vec<Box<dyn LockfileProvider>> = vec![
        Box::new(PnpmProvider),
        Box::new(YarnProvider),
        Box::new(NpmProvider { installed: false }),
    ];
    let detections: Vec<(usize, DetectResult)> = providers
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.detect(root).map(|d| (i, d)))
        .collect();
    if detections.is_empty() {
        anyhow::bail!(
            "{}: no lockfile found (expected package-lock.json, pnpm-lock.yaml, or yarn.lock)",
            root.display()
        );
    }

    let mut warnings = Vec::new();
    let manifest = PackageManifest::read_dir(root)?.unwrap_or_default();
    let declared = manifest.declared_manager().and_then(parse_manager);

    let chosen = match declared {
        Some(manager) => match detections.iter().find(|(_, d)| d.manager == manager) {
            Some((i, _)) => {
                if detections.len() > 1 {
                    warnings.push(format!(
                        "multiple lockfiles detected ({}); using {} per the packageManager field",
                        detected_list(&detections),
                        manager
                    ));
                }
                *i
            }
            None => {
                let fallback = detections[0].0;
                warnings.push(format!(
                    "packageManager declares {} but no matching lockfile was found; using {}",
                    manager, detections[0].1.manager
                ));
                fallback
            }
        },
        None => {
            if detections.len() > 1 {
                warnings.push(format!(
                    "multiple lockfiles detected ({}); preferring {}",
                    detected_list(&detections),
                    detections[0].1.manager
                ));
            }
            detections[0].0
        }
    };

    for w in &warnings {
        warn!("{w}");
    }
    let context = providers[chosen].load(root)?;
    Ok(ProjectLoad { context, warnings })
}

fn parse_manager(name: &str) -> Option<PackageManager> {
    match name {
        "npm" => Some(PackageManager::Npm),
        "pnpm" => Some(PackageManager::Pnpm),
        "yarn" => Some(PackageManager::Yarn),
        _ => None,
    }
}

fn detected_list(detections: &[(usize, DetectResult)]) -> String {
    detections
        .iter()
        .map(|(_, d)| d.manager.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
