//! Docker Compose extractor
//!
//! Descriptors are parsed as YAML and walked as a tree. Interpolations are
//! collected from every string in the document; container environment keys
//! come from `services.<name>.environment` and any `env_file` the service
//! loads.

use serde_yaml::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{env_file, parse_yaml};
use crate::extract::patterns::interpolations;
use crate::extract::{read_optional, Extraction, InputIssue, SourceCategory, VarName};

/// Both sets drawn from the compose descriptors
#[derive(Debug)]
pub struct ComposeExtraction {
    pub references: Extraction,
    pub container_env: Extraction,
}

pub async fn extract(paths: &[PathBuf]) -> ComposeExtraction {
    let mut references = Extraction::new(SourceCategory::ReferencedInCompose);
    let mut container_env = Extraction::new(SourceCategory::DeclaredInComposeContainerEnv);

    for path in paths {
        let Some(content) = read_optional(path, &mut references.issues).await else {
            continue;
        };
        references.set.add_source(path);

        match parse_yaml(&content) {
            Ok(doc) => {
                references.set.extend(references_in(&doc));

                container_env.set.add_source(path);
                container_env.set.extend(container_env_in(&doc));

                let base = path.parent().unwrap_or_else(|| Path::new("."));
                for env_path in env_files_in(&doc) {
                    let env_path = base.join(env_path);
                    let loaded = env_file::extract(&env_path).await;
                    container_env.issues.extend(loaded.issues);
                    if !loaded.set.sources.is_empty() {
                        container_env.set.add_source(&env_path);
                    }
                    container_env.set.extend(loaded.set.names);
                }
            }
            Err(e) => {
                warn!("{} is not valid YAML, scanning lines instead", path.display());
                references.issues.push(InputIssue::Unparsable {
                    path: path.clone(),
                    reason: e.to_string(),
                });
                references.set.extend(references_in_text(&content));
            }
        }
    }

    debug!(
        references = references.set.len(),
        container_env = container_env.set.len(),
        "compose extraction complete"
    );

    ComposeExtraction {
        references,
        container_env,
    }
}

/// Interpolated names in every string (keys and values) of the document
pub fn references_in(doc: &Value) -> BTreeSet<VarName> {
    let mut strings = Vec::new();
    collect_strings(doc, &mut strings);
    strings
        .into_iter()
        .flat_map(interpolations)
        .filter_map(VarName::parse)
        .collect()
}

/// Line-oriented fallback for descriptors that fail to parse
pub fn references_in_text(content: &str) -> BTreeSet<VarName> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(interpolations)
        .filter_map(VarName::parse)
        .collect()
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Sequence(seq) => {
            for item in seq {
                collect_strings(item, out);
            }
        }
        Value::Mapping(map) => {
            for (key, value) in map {
                collect_strings(key, out);
                collect_strings(value, out);
            }
        }
        Value::Tagged(tagged) => collect_strings(&tagged.value, out),
        _ => {}
    }
}

/// Keys of each service's `environment`, in mapping or list form
pub fn container_env_in(doc: &Value) -> BTreeSet<VarName> {
    let mut names = BTreeSet::new();

    let Some(services) = doc.get("services").and_then(|s| s.as_mapping()) else {
        return names;
    };

    for (_, service) in services {
        let Some(service) = service.as_mapping() else {
            continue;
        };

        match service.get("environment") {
            Some(Value::Mapping(env)) => {
                names.extend(
                    env.keys()
                        .filter_map(|key| key.as_str())
                        .filter_map(VarName::parse),
                );
            }
            Some(Value::Sequence(env)) => {
                names.extend(
                    env.iter()
                        .filter_map(|item| item.as_str())
                        .map(|item| item.split_once('=').map_or(item, |(key, _)| key).trim())
                        .filter_map(VarName::parse),
                );
            }
            _ => {}
        }
    }

    names
}

/// Every `env_file` path referenced by a service, in declaration order
pub fn env_files_in(doc: &Value) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let Some(services) = doc.get("services").and_then(|s| s.as_mapping()) else {
        return files;
    };

    for (_, service) in services {
        let Some(service) = service.as_mapping() else {
            continue;
        };

        let entries: Vec<&Value> = match service.get("env_file") {
            Some(Value::Sequence(seq)) => seq.iter().collect(),
            Some(single) => vec![single],
            None => continue,
        };

        for entry in entries {
            let path = entry
                .as_str()
                .or_else(|| entry.get("path").and_then(|p| p.as_str()));
            if let Some(path) = path {
                let path = PathBuf::from(path);
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
    }

    files
}
