//! Variable extraction from declaration and usage sources

pub mod extractors;
pub mod patterns;

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{Config, Sources};

/// A variable name, optionally qualified by a deployment section (`section.VAR`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VarName(String);

impl VarName {
    /// Accepts `[A-Z_][A-Z0-9_]*` only.
    pub fn parse(raw: &str) -> Option<Self> {
        is_var_name(raw).then(|| Self(raw.to_string()))
    }

    pub fn qualified(section: &str, name: &str) -> Option<Self> {
        if is_section_name(section) && is_var_name(name) {
            Some(Self(format!("{}.{}", section, name)))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VarName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_var_name(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {
            chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    }
}

fn is_section_name(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

/// Where a set of variable names came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCategory {
    DeclaredInEnvTemplate,
    ReferencedInCompose,
    DeclaredInComposeContainerEnv,
    RequiredByScript,
    ReferencedInDeploymentTemplate,
    DeclaredInDeploymentValues,
    UsedInCode,
}

impl SourceCategory {
    /// Short phrase used in report lines
    pub fn describe(&self) -> &'static str {
        match self {
            Self::DeclaredInEnvTemplate => "declared in the env template",
            Self::ReferencedInCompose => "referenced in compose",
            Self::DeclaredInComposeContainerEnv => "set in a compose service environment",
            Self::RequiredByScript => "required by a script guard",
            Self::ReferencedInDeploymentTemplate => "referenced in deployment templates",
            Self::DeclaredInDeploymentValues => "declared in deployment values",
            Self::UsedInCode => "used in code",
        }
    }
}

impl std::fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeclaredInEnvTemplate => write!(f, "declared-in-env-template"),
            Self::ReferencedInCompose => write!(f, "referenced-in-compose"),
            Self::DeclaredInComposeContainerEnv => write!(f, "declared-in-compose-container-env"),
            Self::RequiredByScript => write!(f, "required-by-script"),
            Self::ReferencedInDeploymentTemplate => write!(f, "referenced-in-deployment-template"),
            Self::DeclaredInDeploymentValues => write!(f, "declared-in-deployment-values"),
            Self::UsedInCode => write!(f, "used-in-code"),
        }
    }
}

/// A set of variable names tagged with its source category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableSet {
    pub category: SourceCategory,
    pub sources: Vec<PathBuf>,
    pub names: BTreeSet<VarName>,
}

impl VariableSet {
    pub fn new(category: SourceCategory) -> Self {
        Self {
            category,
            sources: Vec::new(),
            names: BTreeSet::new(),
        }
    }

    pub fn contains(&self, name: &VarName) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VarName> {
        self.names.iter()
    }

    pub fn add_source(&mut self, path: &Path) {
        if !self.sources.iter().any(|p| p == path) {
            self.sources.push(path.to_path_buf());
        }
    }

    /// Drop every name on the denylist, returning how many were removed
    pub fn remove_ignored(&mut self, ignored: &BTreeSet<String>) -> usize {
        let before = self.names.len();
        self.names.retain(|name| !ignored.contains(name.as_str()));
        before - self.names.len()
    }

    fn relative_to(mut self, root: &Path) -> Self {
        for source in &mut self.sources {
            if let Ok(relative) = source.strip_prefix(root) {
                *source = relative.to_path_buf();
            }
        }
        self.sources.sort();
        self
    }
}

impl Extend<VarName> for VariableSet {
    fn extend<T: IntoIterator<Item = VarName>>(&mut self, iter: T) {
        self.names.extend(iter);
    }
}

/// Non-fatal problems with an input, surfaced as report notes
#[derive(Debug, Error)]
pub enum InputIssue {
    #[error("{} not found, treating as empty", .0.display())]
    Missing(PathBuf),

    #[error("could not read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid YAML ({reason})", .path.display())]
    Unparsable { path: PathBuf, reason: String },
}

impl InputIssue {
    fn relative_to(self, root: &Path) -> Self {
        let strip = |path: PathBuf| match path.strip_prefix(root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => path,
        };
        match self {
            Self::Missing(path) => Self::Missing(strip(path)),
            Self::Unreadable { path, source } => Self::Unreadable {
                path: strip(path),
                source,
            },
            Self::Unparsable { path, reason } => Self::Unparsable {
                path: strip(path),
                reason,
            },
        }
    }
}

/// A variable set together with the input problems met while building it
#[derive(Debug)]
pub struct Extraction {
    pub set: VariableSet,
    pub issues: Vec<InputIssue>,
}

impl Extraction {
    pub fn new(category: SourceCategory) -> Self {
        Self {
            set: VariableSet::new(category),
            issues: Vec::new(),
        }
    }
}

/// Read a file, recording a note instead of failing when it is absent or unreadable
pub async fn read_optional(path: &Path, issues: &mut Vec<InputIssue>) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            issues.push(InputIssue::Missing(path.to_path_buf()));
            None
        }
        Err(source) => {
            issues.push(InputIssue::Unreadable {
                path: path.to_path_buf(),
                source,
            });
            None
        }
    }
}

/// Recursively list files under `dir`, skipping directories named in `exclude`.
///
/// Entries the walk cannot read are recorded in `issues` and the rest of the
/// tree is still listed.
pub async fn walk_files(
    dir: &Path,
    exclude: &[String],
    issues: &mut Vec<InputIssue>,
) -> Vec<PathBuf> {
    let root = dir.to_path_buf();
    let exclude = exclude.to_vec();

    let walked = tokio::task::spawn_blocking(move || walk_blocking(&root, &exclude)).await;
    match walked {
        Ok((files, errors)) => {
            issues.extend(errors);
            files
        }
        Err(e) => {
            issues.push(InputIssue::Unreadable {
                path: dir.to_path_buf(),
                source: std::io::Error::other(e),
            });
            Vec::new()
        }
    }
}

fn walk_blocking(root: &Path, exclude: &[String]) -> (Vec<PathBuf>, Vec<InputIssue>) {
    let mut files = Vec::new();
    let mut issues = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !exclude
                    .iter()
                    .any(|e| entry.file_name().to_str() == Some(e.as_str()))
        });

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                debug!("walk error under {}: {}", root.display(), e);
                issues.push(InputIssue::Unreadable {
                    path,
                    source: e.into(),
                });
            }
        }
    }

    files.sort();
    (files, issues)
}

/// Variables of one deployment chart
#[derive(Debug, Clone)]
pub struct ChartVars {
    pub name: String,
    pub template_refs: VariableSet,
    pub values_declared: VariableSet,
}

/// Every extracted set for a project
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub env_template: VariableSet,
    pub compose_refs: VariableSet,
    pub container_env: VariableSet,
    pub script_required: VariableSet,
    /// `None` when no scan directories are configured
    pub code_usage: Option<VariableSet>,
    pub charts: Vec<ChartVars>,
    pub notes: Vec<String>,
}

impl ScanResult {
    /// All sets in report order
    pub fn sets(&self) -> Vec<&VariableSet> {
        let mut sets = vec![
            &self.env_template,
            &self.compose_refs,
            &self.container_env,
            &self.script_required,
        ];
        if let Some(code) = &self.code_usage {
            sets.push(code);
        }
        for chart in &self.charts {
            sets.push(&chart.template_refs);
            sets.push(&chart.values_declared);
        }
        sets
    }
}

/// Runs every extractor against a project root
pub struct ProjectScanner<'a> {
    root: PathBuf,
    config: &'a Config,
}

impl<'a> ProjectScanner<'a> {
    pub fn new(root: &Path, config: &'a Config) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    pub async fn scan(&self) -> Result<ScanResult> {
        let sources = self.config.resolve_sources(&self.root)?;
        debug!(?sources, "resolved input sources");
        self.scan_sources(&sources).await
    }

    async fn scan_sources(&self, sources: &Sources) -> Result<ScanResult> {
        let deploy = &self.config.deploy;

        let (env_template, compose, scripts, code, charts) = tokio::join!(
            extractors::env_file::extract(&sources.env_template),
            extractors::compose::extract(&sources.compose_files),
            extractors::scripts::extract(&sources.scripts),
            async {
                match &sources.scan_dirs {
                    Some(dirs) => {
                        Some(extractors::code::extract(dirs, &self.config.scan.exclude).await)
                    }
                    None => None,
                }
            },
            async {
                let mut charts = Vec::new();
                for chart in &sources.charts {
                    charts.push(extractors::helm::extract(chart, deploy).await);
                }
                charts
            }
        );

        let mut issues = Vec::new();
        let ignored = self.config.ignored_names();

        let env_template = collect(env_template, &mut issues);
        let compose_refs = collect(compose.references, &mut issues);
        let container_env = collect(compose.container_env, &mut issues);

        let mut script_required = collect(scripts, &mut issues);
        let dropped = script_required.remove_ignored(&ignored);
        if dropped > 0 {
            debug!("dropped {} ignored names from script guards", dropped);
        }

        let code_usage = code.map(|extraction| {
            let mut set = collect(extraction, &mut issues);
            let dropped = set.remove_ignored(&ignored);
            if dropped > 0 {
                debug!("dropped {} ignored names from code usage", dropped);
            }
            set
        });

        let mut chart_vars = Vec::new();
        for (dir, chart) in sources.charts.iter().zip(charts) {
            let chart = chart?;
            issues.extend(chart.issues);
            chart_vars.push(ChartVars {
                name: display_path(&self.root, dir),
                template_refs: chart.template_refs.relative_to(&self.root),
                values_declared: chart.values_declared.relative_to(&self.root),
            });
        }

        let notes = issues
            .into_iter()
            .map(|issue| issue.relative_to(&self.root).to_string())
            .collect();

        info!(
            env_template = env_template.len(),
            compose_refs = compose_refs.len(),
            container_env = container_env.len(),
            script_required = script_required.len(),
            charts = chart_vars.len(),
            "extraction complete"
        );

        Ok(ScanResult {
            env_template: env_template.relative_to(&self.root),
            compose_refs: compose_refs.relative_to(&self.root),
            container_env: container_env.relative_to(&self.root),
            script_required: script_required.relative_to(&self.root),
            code_usage: code_usage.map(|set| set.relative_to(&self.root)),
            charts: chart_vars,
            notes,
        })
    }
}

fn collect(extraction: Extraction, issues: &mut Vec<InputIssue>) -> VariableSet {
    issues.extend(extraction.issues);
    extraction.set
}

pub fn display_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative.display().to_string(),
        _ => path.display().to_string(),
    }
}
