//! Per-source extractors

pub mod code;
pub mod compose;
pub mod env_file;
pub mod helm;
pub mod scripts;

use serde_yaml::Value;

/// Parse a YAML document with `<<` merge keys resolved in place
pub(crate) fn parse_yaml(content: &str) -> Result<Value, serde_yaml::Error> {
    let mut doc: Value = serde_yaml::from_str(content)?;
    doc.apply_merge()?;
    Ok(doc)
}
