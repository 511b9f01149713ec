//! Configuration system for envcheck

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROJECT_CONFIG_FILE: &str = ".envcheck.toml";

/// Project configuration (.envcheck.toml)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub env: EnvConfig,
    pub compose: ComposeConfig,
    pub scripts: ScriptsConfig,
    pub deploy: DeployConfig,
    pub scan: ScanConfig,
    pub ignore: IgnoreConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("envcheck").join("config.toml"))
    }

    /// Load the explicit file, else `<root>/.envcheck.toml`, else the user
    /// config, else defaults.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let candidates = std::iter::once(root.join(PROJECT_CONFIG_FILE)).chain(Self::default_path());
        for path in candidates {
            if path.is_file() {
                debug!("using configuration {}", path.display());
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Command-line values take precedence over the file
    pub fn apply_overrides(&mut self, scan_dirs: Option<Vec<PathBuf>>, ignore: Vec<String>) {
        if let Some(dirs) = scan_dirs {
            self.scan.dirs = dirs
                .into_iter()
                .filter(|d| !d.as_os_str().is_empty())
                .collect();
        }
        self.ignore.names.extend(
            ignore
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        );
    }

    /// The denylist subtracted from script and code derived sets
    pub fn ignored_names(&self) -> BTreeSet<String> {
        self.ignore.names.iter().cloned().collect()
    }

    /// Expand configured locations into concrete paths under `root`
    pub fn resolve_sources(&self, root: &Path) -> Result<Sources> {
        let compose_files = expand_globs(root, &self.compose.files)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();

        let scripts = expand_globs(root, &self.scripts.globs)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();

        let charts = expand_globs(root, &self.deploy.charts)?
            .into_iter()
            .filter(|p| {
                p.is_dir()
                    && (p.join(&self.deploy.values_file).is_file()
                        || p.join(&self.deploy.templates_dir).is_dir())
            })
            .collect();

        let scan_dirs = if self.scan.dirs.is_empty() {
            None
        } else {
            Some(self.scan.dirs.iter().map(|d| root.join(d)).collect())
        };

        Ok(Sources {
            env_template: root.join(&self.env.template),
            compose_files,
            scripts,
            charts,
            scan_dirs,
        })
    }
}

/// Concrete input locations for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sources {
    pub env_template: PathBuf,
    pub compose_files: Vec<PathBuf>,
    pub scripts: Vec<PathBuf>,
    pub charts: Vec<PathBuf>,
    pub scan_dirs: Option<Vec<PathBuf>>,
}

fn expand_globs(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&root.to_string_lossy());
    let mut found = BTreeSet::new();

    for pattern in patterns {
        let full = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), pattern)
        };
        let entries =
            glob::glob(&full).with_context(|| format!("invalid glob pattern `{}`", pattern))?;
        for entry in entries {
            match entry {
                Ok(path) => {
                    found.insert(path);
                }
                Err(e) => debug!("skipping unreadable glob match: {}", e),
            }
        }
    }

    Ok(found.into_iter().collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub template: PathBuf,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from(".env.example"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub files: Vec<String>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            files: [
                "docker-compose.yml",
                "docker-compose.yaml",
                "compose.yml",
                "compose.yaml",
                "docker-compose.*.yml",
                "docker-compose.*.yaml",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    pub globs: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            globs: vec!["scripts/**/*.sh".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Globs matching chart directories
    pub charts: Vec<String>,
    pub values_file: String,
    pub templates_dir: String,
    /// Expression prefix before `.env.<section>.<VAR>` in templates
    pub values_root: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            charts: vec![
                "helm/*".to_string(),
                "chart".to_string(),
                "deploy/helm/*".to_string(),
            ],
            values_file: "values.yaml".to_string(),
            templates_dir: "templates".to_string(),
            values_root: ".Values".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories scanned for code usage; empty disables the check
    pub dirs: Vec<PathBuf>,
    pub exclude: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            exclude: [
                ".git",
                "node_modules",
                "target",
                "vendor",
                "dist",
                "build",
                "__pycache__",
                ".venv",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    pub names: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            names: [
                // ambient shell and process variables
                "PWD", "OLDPWD", "HOME", "PATH", "USER", "SHELL", "HOSTNAME", "TERM", "LANG",
                "TMPDIR", "IFS", "UID", "RANDOM", "LINENO", "SECONDS", "OPTARG", "OPTIND",
                "BASH_SOURCE", "CI", "DEBUG",
                // documentation placeholders
                "VAR_NAME",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write logs to a daily rolling file here instead of stderr
    pub dir: Option<PathBuf>,
}

/// Initialize a new project configuration
pub fn init_project_config(dir: &Path, force: bool) -> Result<()> {
    let path = dir.join(PROJECT_CONFIG_FILE);

    if path.exists() && !force {
        anyhow::bail!("Configuration already exists. Use --force to overwrite.");
    }

    Config::default().save(&path)?;
    println!("Created {}", PROJECT_CONFIG_FILE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[env]
template = "config/.env.template"

[scan]
dirs = ["src"]
"#,
        )
        .unwrap();

        assert_eq!(config.env.template, PathBuf::from("config/.env.template"));
        assert_eq!(config.scan.dirs, vec![PathBuf::from("src")]);
        assert!(config.scan.exclude.contains(&"node_modules".to_string()));
        assert_eq!(config.deploy.values_root, ".Values");
    }

    #[test]
    fn overrides_replace_scan_dirs_and_extend_denylist() {
        let mut config = Config::default();
        config.scan.dirs = vec![PathBuf::from("from-file")];
        config.apply_overrides(
            Some(vec![PathBuf::from("api"), PathBuf::from(""), PathBuf::from("web")]),
            vec![" LOCAL_ONLY ".to_string(), String::new()],
        );

        assert_eq!(config.scan.dirs, vec![PathBuf::from("api"), PathBuf::from("web")]);
        let ignored = config.ignored_names();
        assert!(ignored.contains("LOCAL_ONLY"));
        assert!(ignored.contains("PWD"));
        assert!(!ignored.contains(""));
    }

    #[test]
    fn resolve_sources_finds_default_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("docker-compose.yml"), "services: {}\n").unwrap();
        std::fs::write(root.join("docker-compose.prod.yml"), "services: {}\n").unwrap();
        std::fs::create_dir_all(root.join("scripts/ci")).unwrap();
        std::fs::write(root.join("scripts/deploy.sh"), "").unwrap();
        std::fs::write(root.join("scripts/ci/build.sh"), "").unwrap();
        std::fs::write(root.join("scripts/notes.md"), "").unwrap();
        std::fs::create_dir_all(root.join("helm/app/templates")).unwrap();
        std::fs::create_dir_all(root.join("helm/empty")).unwrap();

        let sources = Config::default().resolve_sources(root).unwrap();

        assert_eq!(sources.env_template, root.join(".env.example"));
        assert_eq!(
            sources.compose_files,
            vec![root.join("docker-compose.prod.yml"), root.join("docker-compose.yml")]
        );
        assert_eq!(
            sources.scripts,
            vec![root.join("scripts/ci/build.sh"), root.join("scripts/deploy.sh")]
        );
        assert_eq!(sources.charts, vec![root.join("helm/app")]);
        assert_eq!(sources.scan_dirs, None);
    }

    #[test]
    fn invalid_glob_is_an_error() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.scripts.globs = vec!["scripts/[".to_string()];
        assert!(config.resolve_sources(dir.path()).is_err());
    }

    #[test]
    fn discover_prefers_project_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[env]\ntemplate = \".env.sample\"\n",
        )
        .unwrap();

        let config = Config::discover(dir.path(), None).unwrap();
        assert_eq!(config.env.template, PathBuf::from(".env.sample"));
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempdir().unwrap();
        init_project_config(dir.path(), false).unwrap();
        assert!(init_project_config(dir.path(), false).is_err());
        init_project_config(dir.path(), true).unwrap();

        let written = Config::load(&dir.path().join(PROJECT_CONFIG_FILE)).unwrap();
        assert_eq!(written.env.template, PathBuf::from(".env.example"));
        assert_eq!(written.deploy.charts, DeployConfig::default().charts);
    }
}
