//! Script guard extractor
//!
//! Only the required-variable guard idiom is tracked:
//!
//! ```sh
//! : "${REGISTRY:?REGISTRY must be set}"
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

use crate::extract::patterns::required_guards;
use crate::extract::{read_optional, Extraction, SourceCategory, VarName};

pub async fn extract(paths: &[PathBuf]) -> Extraction {
    let mut extraction = Extraction::new(SourceCategory::RequiredByScript);

    for path in paths {
        let Some(content) = read_optional(path, &mut extraction.issues).await else {
            continue;
        };
        let required = required_in(&content);
        debug!("{} guards {} variables", path.display(), required.len());
        extraction.set.add_source(path);
        extraction.set.extend(required);
    }

    extraction
}

/// Names guarded on non-comment lines
pub fn required_in(content: &str) -> BTreeSet<VarName> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(required_guards)
        .filter_map(VarName::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn only_guard_idiom_is_recognized() {
        let script = r#"#!/bin/sh
set -eu
# usage: ${EXAMPLE:?documented only}
: "${REGISTRY:?REGISTRY must be set}"
: "${IMAGE_NAME?IMAGE_NAME must be set}"
TAG="${TAG:-latest}"
echo "$HOME $REGISTRY ${OTHER}"
"#;
        let names: Vec<_> = required_in(script)
            .iter()
            .map(|n| n.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["IMAGE_NAME", "REGISTRY"]);
    }

    #[test]
    fn guard_order_does_not_change_the_set() {
        let forward = ": \"${A:?}\"\n: \"${B:?}\"\n";
        let backward = ": \"${B:?}\"\n: \"${A:?}\"\n";
        assert_eq!(required_in(forward), required_in(backward));
    }

    #[tokio::test]
    async fn merges_guards_across_scripts() {
        let dir = tempdir().unwrap();
        let build = dir.path().join("build-push.sh");
        let deploy = dir.path().join("deploy-helm.sh");
        std::fs::write(&build, ": \"${REGISTRY:?}\"\n").unwrap();
        std::fs::write(&deploy, ": \"${KUBE_CONTEXT:?}\"\n: \"${REGISTRY:?}\"\n").unwrap();

        let extraction = extract(&[build, deploy]).await;
        assert_eq!(extraction.set.len(), 2);
        assert_eq!(extraction.set.sources.len(), 2);
        assert!(extraction.issues.is_empty());
    }
}
