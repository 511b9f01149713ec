//! Deployment chart extractor
//!
//! Templates are Go templates rather than YAML, so references are found by
//! pattern. The values document is parsed and walked under `env:`.

use anyhow::{Context, Result};
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use super::parse_yaml;
use crate::config::DeployConfig;
use crate::extract::{
    read_optional, walk_files, InputIssue, SourceCategory, VarName, VariableSet,
};

/// Template references and declared values of one chart
#[derive(Debug)]
pub struct ChartExtraction {
    pub template_refs: VariableSet,
    pub values_declared: VariableSet,
    pub issues: Vec<InputIssue>,
}

pub async fn extract(chart: &Path, config: &DeployConfig) -> Result<ChartExtraction> {
    let pattern = reference_pattern(&config.values_root)?;
    let mut issues = Vec::new();

    let mut template_refs = VariableSet::new(SourceCategory::ReferencedInDeploymentTemplate);
    let templates = chart.join(&config.templates_dir);
    if templates.is_dir() {
        for file in walk_files(&templates, &[], &mut issues).await {
            let Ok(content) = tokio::fs::read_to_string(&file).await else {
                debug!("skipping unreadable template {}", file.display());
                continue;
            };
            template_refs.add_source(&file);
            template_refs.extend(references_in(&pattern, &content));
        }
    } else {
        issues.push(InputIssue::Missing(templates));
    }

    let mut values_declared = VariableSet::new(SourceCategory::DeclaredInDeploymentValues);
    let values_path = chart.join(&config.values_file);
    if let Some(content) = read_optional(&values_path, &mut issues).await {
        values_declared.add_source(&values_path);
        match parse_yaml(&content) {
            Ok(doc) => values_declared.extend(declared_in(&doc)),
            Err(e) => issues.push(InputIssue::Unparsable {
                path: values_path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    debug!(
        chart = %chart.display(),
        refs = template_refs.len(),
        declared = values_declared.len(),
        "chart extraction complete"
    );

    Ok(ChartExtraction {
        template_refs,
        values_declared,
        issues,
    })
}

/// Pattern for `<root>.env.<section>.<VAR>`
pub fn reference_pattern(values_root: &str) -> Result<Regex> {
    let pattern = format!(
        r"{}\.env\.([A-Za-z_][A-Za-z0-9_-]*)\.([A-Z_][A-Z0-9_]*)\b",
        regex::escape(values_root)
    );
    Regex::new(&pattern).with_context(|| format!("invalid values root `{}`", values_root))
}

/// Qualified `section.VAR` names referenced by a template
pub fn references_in(pattern: &Regex, content: &str) -> BTreeSet<VarName> {
    pattern
        .captures_iter(content)
        .filter_map(|caps| VarName::qualified(&caps[1], &caps[2]))
        .collect()
}

/// Qualified `section.VAR` names for every key under `env.<section>`
pub fn declared_in(doc: &Value) -> BTreeSet<VarName> {
    let mut names = BTreeSet::new();

    let Some(env) = doc.get("env").and_then(|e| e.as_mapping()) else {
        return names;
    };

    for (section, vars) in env {
        let (Some(section), Some(vars)) = (section.as_str(), vars.as_mapping()) else {
            continue;
        };
        for key in vars.keys() {
            if let Some(name) = key.as_str().and_then(|k| VarName::qualified(section, k)) {
                names.insert(name);
            }
        }
    }

    names
}
