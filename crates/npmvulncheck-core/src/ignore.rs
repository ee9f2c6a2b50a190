//! Ignore policy: `.npmvulncheck-ignore.json` at the project root.
//!
//! A rule is active when it has no `until`, or an `until` that parses and
//! lies in the future. Expired or unparseable dates deactivate the rule.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_IGNORE_FILE: &str = ".npmvulncheck-ignore.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IgnoreFile {
    #[serde(default)]
    ignore: Vec<IgnoreRule>,
}

#[derive(Debug, Default)]
pub struct IgnorePolicy {
    rules: Vec<IgnoreRule>,
}

impl IgnorePolicy {
    /// Load a policy file; a missing file is an empty policy.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: IgnoreFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Self { rules: file.ignore })
    }

    pub fn is_ignored(&self, vuln_id: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.id == vuln_id && rule_is_active(rule))
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }
}

fn rule_is_active(rule: &IgnoreRule) -> bool {
    let Some(until) = &rule.until else {
        return true;
    };
    let Some(until) = parse_until(until) else {
        debug!("ignore rule {}: invalid until {until:?}; treating as inactive", rule.id);
        return false;
    };
    until > Utc::now()
}

fn parse_until(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(
        date.and_hms_opt(23, 59, 59)?
            .and_utc(),
    )
}
