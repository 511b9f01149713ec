//! Consistency checks between extracted variable sets

use serde::Serialize;
use tracing::debug;

use crate::extract::{ScanResult, SourceCategory, VarName, VariableSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A name present in the checked set but absent from every reference set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub name: VarName,
    pub severity: Severity,
    pub found_in: SourceCategory,
    pub missing_from: Vec<SourceCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CheckStatus {
    Skipped { reason: String },
    Completed { checked: usize, findings: Vec<Finding> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub status: CheckStatus,
}

impl CheckResult {
    fn skipped(id: &str, title: String, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            title,
            status: CheckStatus::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    pub fn findings(&self) -> &[Finding] {
        match &self.status {
            CheckStatus::Completed { findings, .. } => findings,
            CheckStatus::Skipped { .. } => &[],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, CheckStatus::Skipped { .. })
    }
}

/// Names of `used` missing from every set in `declared`
pub fn missing<'a>(used: &'a VariableSet, declared: &[&VariableSet]) -> Vec<&'a VarName> {
    used.iter()
        .filter(|name| !declared.iter().any(|set| set.contains(name)))
        .collect()
}

/// One subset check: every name in `used` must appear in some `declared` set
struct Check<'a> {
    id: String,
    title: String,
    used: &'a VariableSet,
    declared: Vec<&'a VariableSet>,
    severity: Severity,
}

impl Check<'_> {
    fn run(self) -> CheckResult {
        if self.used.is_empty() && self.declared.iter().all(|set| set.is_empty()) {
            return CheckResult::skipped(&self.id, self.title, "no variables found in its inputs");
        }

        let findings: Vec<Finding> = missing(self.used, &self.declared)
            .into_iter()
            .map(|name| Finding {
                name: name.clone(),
                severity: self.severity,
                found_in: self.used.category,
                missing_from: self.declared.iter().map(|set| set.category).collect(),
            })
            .collect();

        debug!(check = %self.id, findings = findings.len(), "check complete");

        CheckResult {
            id: self.id,
            title: self.title,
            status: CheckStatus::Completed {
                checked: self.used.len(),
                findings,
            },
        }
    }
}

/// Run every check against a scan, in a fixed order
pub fn compare(scan: &ScanResult) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let code_title = "Variables used in code are declared in the env template".to_string();
    match &scan.code_usage {
        Some(code) => results.push(
            Check {
                id: "code-usage".to_string(),
                title: code_title,
                used: code,
                declared: vec![&scan.env_template],
                severity: Severity::Error,
            }
            .run(),
        ),
        None => results.push(CheckResult::skipped(
            "code-usage",
            code_title,
            "no scan directories configured",
        )),
    }

    results.push(
        Check {
            id: "compose-references".to_string(),
            title: "Compose interpolations are declared in the env template".to_string(),
            used: &scan.compose_refs,
            declared: vec![&scan.env_template],
            severity: Severity::Error,
        }
        .run(),
    );

    results.push(
        Check {
            id: "script-requirements".to_string(),
            title: "Script guards are satisfied by the env template or a service environment"
                .to_string(),
            used: &scan.script_required,
            declared: vec![&scan.env_template, &scan.container_env],
            severity: Severity::Error,
        }
        .run(),
    );

    if scan.charts.is_empty() {
        results.push(CheckResult::skipped(
            "deployment-references",
            "Deployment template references are declared in values".to_string(),
            "no deployment chart found",
        ));
        results.push(CheckResult::skipped(
            "deployment-unused-values",
            "Deployment values are referenced by templates".to_string(),
            "no deployment chart found",
        ));
    }

    for chart in &scan.charts {
        results.push(
            Check {
                id: format!("deployment-references[{}]", chart.name),
                title: format!(
                    "Deployment template references are declared in {} values",
                    chart.name
                ),
                used: &chart.template_refs,
                declared: vec![&chart.values_declared],
                severity: Severity::Error,
            }
            .run(),
        );
        results.push(
            Check {
                id: format!("deployment-unused-values[{}]", chart.name),
                title: format!(
                    "Deployment values of {} are referenced by its templates",
                    chart.name
                ),
                used: &chart.values_declared,
                declared: vec![&chart.template_refs],
                severity: Severity::Warning,
            }
            .run(),
        );
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ChartVars;
    use pretty_assertions::assert_eq;

    fn set(category: SourceCategory, names: &[&str]) -> VariableSet {
        let mut set = VariableSet::new(category);
        set.extend(names.iter().filter_map(|n| {
            n.split_once('.')
                .map_or_else(|| VarName::parse(n), |(s, v)| VarName::qualified(s, v))
        }));
        set
    }

    fn scan() -> ScanResult {
        ScanResult {
            env_template: set(SourceCategory::DeclaredInEnvTemplate, &[]),
            compose_refs: set(SourceCategory::ReferencedInCompose, &[]),
            container_env: set(SourceCategory::DeclaredInComposeContainerEnv, &[]),
            script_required: set(SourceCategory::RequiredByScript, &[]),
            code_usage: None,
            charts: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn by_id<'a>(results: &'a [CheckResult], id: &str) -> &'a CheckResult {
        results.iter().find(|r| r.id == id).unwrap()
    }

    fn finding_names(result: &CheckResult) -> Vec<&str> {
        result.findings().iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn missing_never_fabricates_names() {
        let used = set(SourceCategory::ReferencedInCompose, &["A", "B", "C"]);
        let declared = set(SourceCategory::DeclaredInEnvTemplate, &["B", "Z"]);
        let missing: Vec<_> = missing(&used, &[&declared])
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(missing, vec!["A", "C"]);
    }

    #[test]
    fn fully_declared_references_yield_no_findings() {
        let mut scan = scan();
        scan.env_template = set(SourceCategory::DeclaredInEnvTemplate, &["FOO", "BAR"]);
        scan.compose_refs = set(SourceCategory::ReferencedInCompose, &["FOO", "BAR"]);

        let results = compare(&scan);
        let compose = by_id(&results, "compose-references");
        assert!(!compose.is_skipped());
        assert!(compose.findings().is_empty());
    }

    #[test]
    fn undeclared_compose_reference_is_an_error() {
        let mut scan = scan();
        scan.env_template = set(SourceCategory::DeclaredInEnvTemplate, &["FOO", "BAR"]);
        scan.compose_refs = set(SourceCategory::ReferencedInCompose, &["FOO", "BAZ"]);

        let results = compare(&scan);
        let compose = by_id(&results, "compose-references");
        assert_eq!(finding_names(compose), vec!["BAZ"]);
        assert_eq!(compose.findings()[0].severity, Severity::Error);
        assert_eq!(
            compose.findings()[0].missing_from,
            vec![SourceCategory::DeclaredInEnvTemplate]
        );
    }

    #[test]
    fn script_guard_satisfied_by_container_env() {
        let mut scan = scan();
        scan.script_required = set(SourceCategory::RequiredByScript, &["TOKEN", "REGION"]);
        scan.container_env = set(SourceCategory::DeclaredInComposeContainerEnv, &["REGION"]);

        let results = compare(&scan);
        let scripts = by_id(&results, "script-requirements");
        assert_eq!(finding_names(scripts), vec!["TOKEN"]);
        assert_eq!(
            scripts.findings()[0].missing_from,
            vec![
                SourceCategory::DeclaredInEnvTemplate,
                SourceCategory::DeclaredInComposeContainerEnv
            ]
        );
    }

    #[test]
    fn unused_values_are_warnings_per_chart() {
        let mut scan = scan();
        scan.charts.push(ChartVars {
            name: "helm/app".to_string(),
            template_refs: set(SourceCategory::ReferencedInDeploymentTemplate, &["llm.MODEL"]),
            values_declared: set(
                SourceCategory::DeclaredInDeploymentValues,
                &["common.DEBUG", "llm.MODEL"],
            ),
        });

        let results = compare(&scan);
        assert!(by_id(&results, "deployment-references[helm/app]")
            .findings()
            .is_empty());
        let unused = by_id(&results, "deployment-unused-values[helm/app]");
        assert_eq!(finding_names(unused), vec!["common.DEBUG"]);
        assert_eq!(unused.findings()[0].severity, Severity::Warning);
    }

    #[test]
    fn empty_inputs_and_missing_scope_are_skipped() {
        let results = compare(&scan());
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "code-usage",
                "compose-references",
                "script-requirements",
                "deployment-references",
                "deployment-unused-values"
            ]
        );
        assert!(results.iter().all(CheckResult::is_skipped));
        assert_eq!(
            by_id(&results, "code-usage").status,
            CheckStatus::Skipped {
                reason: "no scan directories configured".to_string()
            }
        );
    }

    #[test]
    fn code_usage_runs_when_scope_is_given() {
        let mut scan = scan();
        scan.env_template = set(SourceCategory::DeclaredInEnvTemplate, &["PORT"]);
        scan.code_usage = Some(set(SourceCategory::UsedInCode, &["PORT", "SECRET_KEY"]));

        let results = compare(&scan);
        assert_eq!(finding_names(by_id(&results, "code-usage")), vec!["SECRET_KEY"]);
    }
}
