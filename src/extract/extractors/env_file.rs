//! Env template (`KEY=VALUE`) extractor

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use crate::extract::patterns::ENV_ASSIGNMENT;
use crate::extract::{read_optional, Extraction, SourceCategory, VarName};

/// Keys declared in a dotenv-style template. A missing file yields an empty set.
pub async fn extract(path: &Path) -> Extraction {
    let mut extraction = Extraction::new(SourceCategory::DeclaredInEnvTemplate);

    if let Some(content) = read_optional(path, &mut extraction.issues).await {
        extraction.set.add_source(path);
        extraction.set.extend(declared_in(&content));
        debug!(
            "{} declares {} variables",
            path.display(),
            extraction.set.len()
        );
    }

    extraction
}

/// Keys of every `KEY=VALUE` line. Comments, blanks and malformed lines are skipped.
pub fn declared_in(content: &str) -> BTreeSet<VarName> {
    content
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| ENV_ASSIGNMENT.captures(line))
        .filter_map(|caps| VarName::parse(&caps[1]))
        .collect()
}
