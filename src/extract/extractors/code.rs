//! Source code usage extractor

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::extract::patterns::{shell_expansions, SHELL_BARE_REF, SHELL_BINDING};
use crate::extract::{walk_files, Extraction, InputIssue, SourceCategory, VarName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    Rust,
    Go,
    Shell,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "py" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "vue" | "svelte" => {
                Some(Self::JavaScript)
            }
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "sh" | "bash" => Some(Self::Shell),
            _ => None,
        }
    }

    fn comment_prefix(&self) -> &'static str {
        match self {
            Self::Python | Self::Shell => "#",
            Self::JavaScript | Self::Rust | Self::Go => "//",
        }
    }

    fn patterns(&self) -> &'static [Regex] {
        match self {
            Self::Python => PYTHON.as_slice(),
            Self::JavaScript => JAVASCRIPT.as_slice(),
            Self::Rust => RUST.as_slice(),
            Self::Go => GO.as_slice(),
            Self::Shell => &[],
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("Invalid env access regex"))
        .collect()
}

static PYTHON: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"os\.(?:getenv|environ\.get|environ\.setdefault)\(\s*["']([A-Z_][A-Z0-9_]*)["']"#,
        r#"os\.environ\[\s*["']([A-Z_][A-Z0-9_]*)["']\s*\]"#,
    ])
});

static JAVASCRIPT: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"process\.env\.([A-Z_][A-Z0-9_]*)\b",
        r#"process\.env\[\s*["'`]([A-Z_][A-Z0-9_]*)["'`]\s*\]"#,
        r"import\.meta\.env\.([A-Z_][A-Z0-9_]*)\b",
    ])
});

static RUST: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"env::var(?:_os)?\(\s*"([A-Z_][A-Z0-9_]*)""#,
        r#"\b(?:option_)?env!\(\s*"([A-Z_][A-Z0-9_]*)""#,
    ])
});

static GO: Lazy<Vec<Regex>> =
    Lazy::new(|| compile(&[r#"os\.(?:Getenv|LookupEnv)\(\s*"([A-Z_][A-Z0-9_]*)""#]));

/// Environment reads across every recognized source file under `dirs`
pub async fn extract(dirs: &[PathBuf], exclude: &[String]) -> Extraction {
    let mut extraction = Extraction::new(SourceCategory::UsedInCode);

    for dir in dirs {
        if !dir.is_dir() {
            extraction.issues.push(InputIssue::Missing(dir.clone()));
            continue;
        }
        extraction.set.add_source(dir);

        for file in walk_files(dir, exclude, &mut extraction.issues).await {
            let Some(language) = Language::from_path(&file) else {
                continue;
            };
            // Non-UTF-8 files are not source code worth scanning
            let Ok(content) = tokio::fs::read_to_string(&file).await else {
                debug!("skipping {}", file.display());
                continue;
            };
            extraction.set.extend(used_in(language, &content));
        }
    }

    debug!("code scan found {} variables", extraction.set.len());
    extraction
}

/// Variables read by a source file of the given language
pub fn used_in(language: Language, content: &str) -> BTreeSet<VarName> {
    let lines = content
        .lines()
        .filter(|line| !line.trim_start().starts_with(language.comment_prefix()));

    if language == Language::Shell {
        return shell_refs(lines);
    }

    let patterns = language.patterns();
    lines
        .flat_map(|line| {
            patterns
                .iter()
                .flat_map(move |re| re.captures_iter(line))
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        })
        .filter_map(VarName::parse)
        .collect()
}

/// `${X}`, `${X:=d}`, `${X[i]}` and `$X` references minus names the script binds itself
fn shell_refs<'a>(lines: impl Iterator<Item = &'a str>) -> BTreeSet<VarName> {
    let mut referenced = BTreeSet::new();
    let mut bound = BTreeSet::new();

    for line in lines {
        let line = line.trim_start();
        for caps in SHELL_BINDING.captures_iter(line) {
            if let Some(name) = caps.iter().skip(1).flatten().next() {
                bound.insert(name.as_str());
            }
        }
        referenced.extend(shell_expansions(line));
        for caps in SHELL_BARE_REF.captures_iter(line) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > 0 && line.as_bytes()[whole.start() - 1] == b'\\' {
                continue;
            }
            referenced.insert(name.as_str());
        }
    }

    referenced
        .difference(&bound)
        .filter_map(|name| VarName::parse(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn names(set: &BTreeSet<VarName>) -> Vec<&str> {
        set.iter().map(|n| n.as_str()).collect()
    }

    #[test]
    fn python_reads() {
        let src = r#"
import os
url = os.getenv("DATABASE_URL")
key = os.environ["API_KEY"]
mode = os.environ.get('APP_MODE', 'dev')
# os.getenv("COMMENTED")
lower = os.getenv("lowercase")
"#;
        assert_eq!(
            names(&used_in(Language::Python, src)),
            vec!["API_KEY", "APP_MODE", "DATABASE_URL"]
        );
    }

    #[test]
    fn javascript_reads() {
        let src = r#"
const port = process.env.PORT || 3000;
const key = process.env["STRIPE_KEY"];
const base = import.meta.env.VITE_API_BASE;
// process.env.COMMENTED
"#;
        assert_eq!(
            names(&used_in(Language::JavaScript, src)),
            vec!["PORT", "STRIPE_KEY", "VITE_API_BASE"]
        );
    }

    #[test]
    fn rust_and_go_reads() {
        let rust = r#"let a = std::env::var("RUST_A"); let b = env!("RUST_B"); let c = option_env!("RUST_C");"#;
        assert_eq!(
            names(&used_in(Language::Rust, rust)),
            vec!["RUST_A", "RUST_B", "RUST_C"]
        );

        let go = r#"v := os.Getenv("GO_A"); w, ok := os.LookupEnv("GO_B")"#;
        assert_eq!(names(&used_in(Language::Go, go)), vec!["GO_A", "GO_B"]);
    }

    #[test]
    fn shell_refs_exclude_local_bindings() {
        let src = r#"#!/bin/sh
TAG="${TAG:-latest}"
export IMAGE="$REGISTRY/app:$TAG"
for FILE in *.yaml; do echo "$FILE"; done
echo "\$ESCAPED ${CHART_DIR}"
# echo $COMMENTED
"#;
        assert_eq!(
            names(&used_in(Language::Shell, src)),
            vec!["CHART_DIR", "REGISTRY"]
        );
    }

    #[test]
    fn shell_assign_default_and_array_expansions_are_references() {
        let src = ": \"${PORT:=8080}\"\necho \"${ARR[0]}\" \"${#ITEMS[@]}\"\n";
        assert_eq!(
            names(&used_in(Language::Shell, src)),
            vec!["ARR", "ITEMS", "PORT"]
        );
    }

    #[test]
    fn language_detection_by_extension() {
        assert_eq!(Language::from_path(Path::new("a/b.tsx")), Some(Language::JavaScript));
        assert_eq!(Language::from_path(Path::new("deploy.sh")), Some(Language::Shell));
        assert_eq!(Language::from_path(Path::new("README.md")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[tokio::test]
    async fn scans_directories_and_notes_missing_ones() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("node_modules/dep")).unwrap();
        std::fs::write(src.join("app.py"), "os.getenv(\"APP_SECRET\")\n").unwrap();
        std::fs::write(
            src.join("node_modules/dep/index.js"),
            "process.env.VENDORED\n",
        )
        .unwrap();

        let extraction = extract(
            &[src, dir.path().join("missing")],
            &["node_modules".to_string()],
        )
        .await;

        assert_eq!(names(&extraction.set.names), vec!["APP_SECRET"]);
        assert_eq!(extraction.issues.len(), 1);
    }
}
