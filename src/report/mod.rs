//! Validation report - verdict and rendering

use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;

use crate::compare::{self, CheckResult, CheckStatus, Finding, Severity};
use crate::extract::{ScanResult, VariableSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Pass,
    PassWithWarnings,
    Fail,
}

impl Verdict {
    /// Warnings alone never fail the run
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Fail => 1,
            Self::Pass | Self::PassWithWarnings => 0,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::PassWithWarnings => write!(f, "pass-with-warnings"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub verdict: Verdict,
    pub errors: usize,
    pub warnings: usize,
    pub checks: Vec<CheckResult>,
    pub notes: Vec<String>,
}

impl ValidationReport {
    pub fn new(checks: Vec<CheckResult>, notes: Vec<String>) -> Self {
        let mut report = Self {
            verdict: Verdict::Pass,
            errors: 0,
            warnings: 0,
            checks,
            notes,
        };

        report.errors = report.count(Severity::Error);
        report.warnings = report.count(Severity::Warning);
        report.verdict = if report.errors > 0 {
            Verdict::Fail
        } else if report.warnings > 0 {
            Verdict::PassWithWarnings
        } else {
            Verdict::Pass
        };

        report
    }

    /// Compare every set of a scan and aggregate the outcome
    pub fn from_scan(scan: &ScanResult) -> Self {
        Self::new(compare::compare(scan), scan.notes.clone())
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.checks.iter().flat_map(|c| c.findings())
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings().filter(|f| f.severity == severity).count()
    }

    pub fn skipped(&self) -> usize {
        self.checks.iter().filter(|c| c.is_skipped()).count()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let title = "Environment consistency check";
        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "{}", "=".repeat(title.len()));

        for check in &self.checks {
            let _ = writeln!(out);
            let _ = writeln!(out, "[{}] {}", check.id, check.title);
            match &check.status {
                CheckStatus::Skipped { reason } => {
                    let _ = writeln!(out, "  skipped: {}", reason);
                }
                CheckStatus::Completed { checked, findings } if findings.is_empty() => {
                    let _ = writeln!(out, "  ok ({} checked)", checked);
                }
                CheckStatus::Completed { findings, .. } => {
                    for finding in findings {
                        let _ = writeln!(out, "  - {}", describe(finding));
                    }
                }
            }
        }

        if !self.notes.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Notes:");
            for note in &self.notes {
                let _ = writeln!(out, "  - {}", note);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Verdict: {} ({} {}, {} {})",
            self.verdict,
            self.errors,
            plural(self.errors, "error", "errors"),
            self.warnings,
            plural(self.warnings, "warning", "warnings"),
        );
        out
    }

    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn describe(finding: &Finding) -> String {
    let missing = finding
        .missing_from
        .iter()
        .map(|c| c.describe())
        .collect::<Vec<_>>()
        .join(" nor ");
    format!(
        "{} ({}): {}, not {}",
        finding.name,
        finding.severity,
        finding.found_in.describe(),
        missing
    )
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// Listing of every extracted set, for the `sets` command
pub fn render_sets(scan: &ScanResult) -> String {
    let mut out = String::new();

    for set in scan.sets() {
        let sources = if set.sources.is_empty() {
            "no sources".to_string()
        } else {
            set.sources
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(out, "{} ({}) [{}]", set.category, set.len(), sources);
        for name in set.iter() {
            let _ = writeln!(out, "  {}", name);
        }
    }

    if !scan.notes.is_empty() {
        let _ = writeln!(out, "Notes:");
        for note in &scan.notes {
            let _ = writeln!(out, "  - {}", note);
        }
    }

    out
}

#[derive(Serialize)]
struct SetsListing<'a> {
    sets: Vec<&'a VariableSet>,
    notes: &'a [String],
}

/// JSON form of the `sets` listing
pub fn render_sets_json(scan: &ScanResult) -> Result<String> {
    let listing = SetsListing {
        sets: scan.sets(),
        notes: &scan.notes,
    };
    Ok(serde_json::to_string_pretty(&listing)?)
}
