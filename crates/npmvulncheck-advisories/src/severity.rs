//! Severity model: textual labels, numeric scores, and CVSS 3.x vectors.

use crate::OsvSeverity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    /// Rank used in priority scoring: low 0 through critical 3.
    pub fn rank(&self) -> u32 {
        match self {
            SeverityLevel::Low => 0,
            SeverityLevel::Medium => 1,
            SeverityLevel::High => 2,
            SeverityLevel::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "low",
            SeverityLevel::Medium => "medium",
            SeverityLevel::High => "high",
            SeverityLevel::Critical => "critical",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "critical" => Some(SeverityLevel::Critical),
            "high" => Some(SeverityLevel::High),
            "medium" | "moderate" => Some(SeverityLevel::Medium),
            "low" => Some(SeverityLevel::Low),
            _ => None,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            SeverityLevel::Critical
        } else if score >= 7.0 {
            SeverityLevel::High
        } else if score >= 4.0 {
            SeverityLevel::Medium
        } else {
            SeverityLevel::Low
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive a severity level from OSV severity entries: a numeric score, a
/// CVSS 3.x vector, or a textual label, in that order per entry.
pub fn severity_of(entries: &[OsvSeverity]) -> Option<SeverityLevel> {
    for entry in entries {
        if let Ok(score) = entry.score.parse::<f64>() {
            return Some(SeverityLevel::from_score(score));
        }
        if let Some(score) = cvss_base_score(&entry.score) {
            return Some(SeverityLevel::from_score(score));
        }
        if let Some(level) = SeverityLevel::from_label(&entry.score) {
            return Some(level);
        }
    }
    None
}

/// CVSS 3.0 / 3.1 base score from a vector string, round-up to one decimal.
pub fn cvss_base_score(vector: &str) -> Option<f64> {
    let mut parts = vector.split('/');
    let header = parts.next()?;
    if !header.starts_with("CVSS:3.0") && !header.starts_with("CVSS:3.1") {
        return None;
    }
    let metrics: HashMap<&str, &str> = parts
        .filter_map(|p| p.split_once(':'))
        .collect();

    let scope_changed = match *metrics.get("S")? {
        "C" => true,
        "U" => false,
        _ => return None,
    };
    let av = match *metrics.get("AV")? {
        "N" => 0.85,
        "A" => 0.62,
        "L" => 0.55,
        "P" => 0.2,
        _ => return None,
    };
    let ac = match *metrics.get("AC")? {
        "L" => 0.77,
        "H" => 0.44,
        _ => return None,
    };
    let pr = match *metrics.get("PR")? {
        "N" => 0.85,
        "L" => {
            if scope_changed {
                0.68
            } else {
                0.62
            }
        }
        "H" => {
            if scope_changed {
                0.5
            } else {
                0.27
            }
        }
        _ => return None,
    };
    let ui = match *metrics.get("UI")? {
        "N" => 0.85,
        "R" => 0.62,
        _ => return None,
    };
    let cia = |metric: &str| -> Option<f64> {
        match *metrics.get(metric)? {
            "H" => Some(0.56),
            "L" => Some(0.22),
            "N" => Some(0.0),
            _ => None,
        }
    };
    let (c, i, a) = (cia("C")?, cia("I")?, cia("A")?);

    let iss = 1.0 - (1.0 - c) * (1.0 - i) * (1.0 - a);
    let impact = if scope_changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02).powi(15)
    } else {
        6.42 * iss
    };
    let exploitability = 8.22 * av * ac * pr * ui;

    if impact <= 0.0 {
        return Some(0.0);
    }
    let raw = if scope_changed {
        (1.08 * (impact + exploitability)).min(10.0)
    } else {
        (impact + exploitability).min(10.0)
    };
    Some(round_up_one_decimal(raw))
}

/// CVSS "Roundup": smallest number with one decimal that is >= the input,
/// with an integer guard against floating-point representation error.
fn round_up_one_decimal(value: f64) -> f64 {
    let scaled = (value * 100_000.0).round() as i64;
    if scaled % 10_000 == 0 {
        scaled as f64 / 100_000.0
    } else {
        ((scaled / 10_000) + 1) as f64 / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(score: &str) -> OsvSeverity {
        OsvSeverity {
            severity_type: "CVSS_V3".to_string(),
            score: score.to_string(),
        }
    }

    #[test]
    fn reference_vectors() {
        // Published reference scores for the 3.1 base formula.
        let cases = [
            ("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H", 9.8),
            ("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:C/C:H/I:H/A:H", 10.0),
            ("CVSS:3.1/AV:N/AC:L/PR:L/UI:N/S:U/C:H/I:N/A:N", 6.5),
            ("CVSS:3.1/AV:L/AC:H/PR:H/UI:R/S:U/C:L/I:L/A:N", 2.9),
            ("CVSS:3.0/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N", 6.1),
            ("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N", 0.0),
        ];
        for (vector, expected) in cases {
            let score = cvss_base_score(vector).unwrap();
            assert!(
                (score - expected).abs() < 0.05,
                "{vector}: got {score}, want {expected}"
            );
        }
    }

    #[test]
    fn non_cvss3_vectors_are_none() {
        assert!(cvss_base_score("CVSS:2.0/AV:N/AC:L/Au:N/C:P/I:P/A:P").is_none());
        assert!(cvss_base_score("garbage").is_none());
    }

    #[test]
    fn levels_from_scores() {
        assert_eq!(SeverityLevel::from_score(9.8), SeverityLevel::Critical);
        assert_eq!(SeverityLevel::from_score(7.0), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_score(5.2), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_score(1.0), SeverityLevel::Low);
    }

    #[test]
    fn labels_case_insensitive() {
        assert_eq!(
            SeverityLevel::from_label("CRITICAL"),
            Some(SeverityLevel::Critical)
        );
        assert_eq!(
            SeverityLevel::from_label("Moderate"),
            Some(SeverityLevel::Medium)
        );
        assert_eq!(SeverityLevel::from_label("none"), None);
    }

    #[test]
    fn severity_of_prefers_first_usable_entry() {
        let level = severity_of(&[
            entry("not-a-score"),
            entry("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"),
        ])
        .unwrap();
        assert_eq!(level, SeverityLevel::Critical);
        assert_eq!(severity_of(&[entry("8.1")]), Some(SeverityLevel::High));
        assert_eq!(severity_of(&[entry("high")]), Some(SeverityLevel::High));
        assert_eq!(severity_of(&[]), None);
    }

    #[test]
    fn rank_ordering() {
        assert!(SeverityLevel::Critical.rank() > SeverityLevel::High.rank());
        assert_eq!(SeverityLevel::Low.rank(), 0);
        assert_eq!(SeverityLevel::Critical.rank(), 3);
    }
}
