use crate::media::MediaType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level layout of a schema YAML file.
///
/// Either one schema per media type under `schemas:`, or a bare schema that
/// applies to every media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaFile {
    PerMediaType {
        schemas: BTreeMap<MediaType, SchemaDefinition>,
    },
    Uniform(SchemaDefinition),
}

/// Schema for one media type, as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// When false, enum violations are reported as warnings instead of errors
    #[serde(default = "default_strict")]
    pub strict: bool,
    pub sections: Vec<SectionDefinition>,
}

fn default_strict() -> bool {
    true
}

/// Definition of a single section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDefinition {
    /// XML element name; derived from `name` when omitted
    #[serde(default)]
    pub key: Option<String>,
    pub name: String,
    /// Display color as `#RRGGBB`
    pub color: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// Definition of a single field in a section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// XML element name; derived from `label` when omitted
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub role: Option<FieldRole>,
}

/// Job a field does beyond holding a value. Code that needs "the identifier"
/// or "the checksum" finds it through the role, never by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    /// Defaulted from the media file stem
    Identifier,
    /// Receives the fixity checksum of the media file
    Checksum,
    /// Record title for sidecars that carry none of their own
    Title,
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Date,
    Enum,
    Boolean,
    /// Comma separated values, stored as repeated `<Item>` elements
    List,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Enum => "enum",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
        }
    }
}
