use super::types::SchemaFile;
use super::SchemaSet;
use crate::error::Result;
use std::path::Path;

const BUILTIN_SCHEMA: &str = include_str!("default_schema.yaml");

/// Parse a schema YAML file into a validated SchemaSet
pub fn parse_schema(path: &Path) -> Result<SchemaSet> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a validated SchemaSet
pub fn parse_schema_str(content: &str) -> Result<SchemaSet> {
    let file: SchemaFile = serde_yaml::from_str(content)?;
    SchemaSet::from_file(file)
}

/// The schema set shipped with the crate (video, audio and image profiles)
pub fn builtin_schema() -> Result<SchemaSet> {
    parse_schema_str(BUILTIN_SCHEMA)
}
