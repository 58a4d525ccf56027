mod parser;
mod types;

pub use parser::{builtin_schema, parse_schema, parse_schema_str};
pub use types::{
    FieldDefinition, FieldRole, FieldType, SchemaDefinition, SchemaFile, SectionDefinition,
};

use crate::error::{AvMetaError, Result};
use crate::media::MediaType;
use crate::naming::{is_valid_tag, sanitize_tag};
use crate::validation::{self, ValidationResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Element names the XML codec reserves for record attributes.
pub const RESERVED_SECTION_KEYS: &[&str] = &["RelatedMedia", "RelatedVideo", "RelatedAudio"];

/// A validated field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    /// Allowed values for `enum` fields
    pub options: Vec<String>,
    /// Non-binding values offered by a form
    pub suggestions: Vec<String>,
    /// Normalized default value ("" when the definition has none)
    pub default: String,
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<FieldRole>,
}

/// A validated section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub key: String,
    pub name: String,
    /// 0xRRGGBB
    pub color: u32,
    pub fields: Vec<Field>,
}

impl Section {
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Color formatted back as `#RRGGBB`
    pub fn color_hex(&self) -> String {
        format!("#{:06X}", self.color)
    }
}

/// Schema-wide key of a field: `Section:Field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldRef {
    pub section: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(section: impl Into<String>, field: impl Into<String>) -> Self {
        FieldRef {
            section: section.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.section, self.field)
    }
}

/// An ordered, validated set of sections for one media type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    strict: bool,
    sections: Vec<Section>,
}

impl Schema {
    /// Validate a definition and derive missing keys and defaults.
    pub fn from_definition(def: SchemaDefinition) -> Result<Self> {
        if def.sections.is_empty() {
            return Err(AvMetaError::Schema("Schema has no sections".into()));
        }

        let mut sections = Vec::with_capacity(def.sections.len());
        let mut section_keys = HashSet::new();

        for section_def in def.sections {
            let key = section_def
                .key
                .clone()
                .unwrap_or_else(|| sanitize_tag(&section_def.name));

            if !is_valid_tag(&key) {
                return Err(AvMetaError::Schema(format!(
                    "Section key '{key}' is not a valid XML element name"
                )));
            }
            if RESERVED_SECTION_KEYS.contains(&key.as_str()) {
                return Err(AvMetaError::Schema(format!(
                    "Section key '{key}' is reserved"
                )));
            }
            if !section_keys.insert(key.clone()) {
                return Err(AvMetaError::Schema(format!("Duplicate section '{key}'")));
            }

            let color = parse_color(&section_def.color).ok_or_else(|| {
                AvMetaError::Schema(format!(
                    "Section '{key}' has invalid color '{}' (expected #RRGGBB)",
                    section_def.color
                ))
            })?;

            let mut fields = Vec::with_capacity(section_def.fields.len());
            let mut field_keys = HashSet::new();
            for field_def in section_def.fields {
                let field = build_field(&key, field_def, def.strict)?;
                if !field_keys.insert(field.key.clone()) {
                    return Err(AvMetaError::Schema(format!(
                        "Duplicate field '{key}:{}'",
                        field.key
                    )));
                }
                fields.push(field);
            }

            sections.push(Section {
                key,
                name: section_def.name,
                color,
                fields,
            });
        }

        Ok(Schema {
            strict: def.strict,
            sections,
        })
    }

    /// Ordered union of several schemas. The first occurrence of a section
    /// or field decides its position, label and color.
    pub fn union<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> Schema {
        let mut strict = true;
        let mut sections: Vec<Section> = Vec::new();

        for schema in schemas {
            strict &= schema.strict;
            for section in &schema.sections {
                match sections.iter_mut().find(|s| s.key == section.key) {
                    Some(existing) => {
                        for field in &section.fields {
                            if existing.field(&field.key).is_none() {
                                existing.fields.push(field.clone());
                            }
                        }
                    }
                    None => sections.push(section.clone()),
                }
            }
        }

        Schema { strict, sections }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key == key)
    }

    pub fn field(&self, section: &str, field: &str) -> Option<&Field> {
        self.section(section)?.field(field)
    }

    /// Every (section, field) pair in schema order
    pub fn fields(&self) -> impl Iterator<Item = (&Section, &Field)> {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter().map(move |f| (s, f)))
    }

    /// Fields carrying `role`, in schema order
    pub fn fields_with_role(&self, role: FieldRole) -> impl Iterator<Item = (&Section, &Field)> {
        self.fields().filter(move |(_, f)| f.role == Some(role))
    }

    pub fn field_count(&self) -> usize {
        self.sections.iter().map(|s| s.fields.len()).sum()
    }

    /// Resolve a field key. Accepts `Section:Field`, or a bare field key
    /// when exactly one section defines it.
    pub fn lookup(&self, key: &str) -> Result<FieldRef> {
        if let Some((section, field)) = key.split_once(':') {
            let (section, field) = (section.trim(), field.trim());
            return match self.field(section, field) {
                Some(_) => Ok(FieldRef::new(section, field)),
                None => Err(AvMetaError::Validation(format!("Unknown field '{key}'"))),
            };
        }

        let key = key.trim();
        let mut candidates = self
            .fields()
            .filter(|(_, f)| f.key == key)
            .map(|(s, f)| FieldRef::new(&s.key, &f.key));

        match (candidates.next(), candidates.next()) {
            (Some(found), None) => Ok(found),
            (Some(_), Some(_)) => Err(AvMetaError::Validation(format!(
                "Field '{key}' exists in several sections; use Section:Field"
            ))),
            (None, _) => Err(AvMetaError::Validation(format!("Unknown field '{key}'"))),
        }
    }
}

fn build_field(section_key: &str, def: FieldDefinition, strict: bool) -> Result<Field> {
    let key = match (&def.key, &def.label) {
        (Some(key), _) => key.clone(),
        (None, Some(label)) => sanitize_tag(label),
        (None, None) => {
            return Err(AvMetaError::Schema(format!(
                "Field in section '{section_key}' needs a key or a label"
            )))
        }
    };

    if !is_valid_tag(&key) {
        return Err(AvMetaError::Schema(format!(
            "Field key '{section_key}:{key}' is not a valid XML element name"
        )));
    }

    let options = def.enum_values.unwrap_or_default();
    if def.field_type == FieldType::Enum && options.is_empty() {
        return Err(AvMetaError::Schema(format!(
            "Enum field '{section_key}:{key}' has no values"
        )));
    }

    let mut field = Field {
        label: def.label.unwrap_or_else(|| key.clone()),
        key,
        field_type: def.field_type,
        options,
        suggestions: def.suggestions.unwrap_or_default(),
        default: String::new(),
        hint: def.hint,
        role: def.role,
    };

    let raw_default = match def.default {
        None | Some(serde_yaml::Value::Null) => String::new(),
        Some(serde_yaml::Value::String(s)) => s,
        Some(serde_yaml::Value::Bool(b)) => b.to_string(),
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(AvMetaError::Schema(format!(
                "Default of '{section_key}:{}' must be a scalar",
                field.key
            )))
        }
    };

    let mut check = ValidationResult::default();
    let normalized = validation::normalize_value(&field, &raw_default, strict, &mut check);
    if !check.is_ok() {
        return Err(AvMetaError::Schema(format!(
            "Invalid default for '{section_key}:{}': {}",
            field.key,
            check.errors.join("; ")
        )));
    }
    field.default = normalized;

    Ok(field)
}

fn parse_color(raw: &str) -> Option<u32> {
    let hex = raw.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// One schema per media type, loaded once and shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSet {
    schemas: BTreeMap<MediaType, Schema>,
}

impl SchemaSet {
    pub fn from_file(file: SchemaFile) -> Result<Self> {
        match file {
            SchemaFile::PerMediaType { schemas } => {
                if schemas.is_empty() {
                    return Err(AvMetaError::Schema("No schemas defined".into()));
                }
                let mut set = BTreeMap::new();
                for (media_type, def) in schemas {
                    let schema = Schema::from_definition(def).map_err(|e| match e {
                        AvMetaError::Schema(msg) => {
                            AvMetaError::Schema(format!("{media_type}: {msg}"))
                        }
                        other => other,
                    })?;
                    set.insert(media_type, schema);
                }
                Ok(SchemaSet { schemas: set })
            }
            SchemaFile::Uniform(def) => Ok(SchemaSet::uniform(Schema::from_definition(def)?)),
        }
    }

    /// Use the same schema for every media type
    pub fn uniform(schema: Schema) -> Self {
        let schemas = MediaType::ALL
            .iter()
            .map(|mt| (*mt, schema.clone()))
            .collect();
        SchemaSet { schemas }
    }

    pub fn for_media(&self, media_type: MediaType) -> Result<&Schema> {
        self.schemas.get(&media_type).ok_or_else(|| {
            AvMetaError::Schema(format!("No schema defined for media type '{media_type}'"))
        })
    }

    pub fn media_types(&self) -> impl Iterator<Item = MediaType> + '_ {
        self.schemas.keys().copied()
    }

    /// Union of every media type's schema, in video, audio, image order
    pub fn union(&self) -> Schema {
        Schema::union(MediaType::ALL.iter().filter_map(|mt| self.schemas.get(mt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scenario_schema() -> SchemaSet {
        parse_schema_str(
            r##"
sections:
  - key: Descriptive
    name: Descriptive
    color: "#9370DB"
    fields:
      - { key: title, label: Title }
      - { key: creator, label: Creator }
  - key: Technical
    name: Technical
    color: "#708090"
    fields:
      - { key: duration, label: Duration }
"##,
        )
        .unwrap()
    }

    #[test]
    fn test_uniform_schema_applies_to_all_media() {
        let set = scenario_schema();
        for mt in MediaType::ALL {
            let schema = set.for_media(mt).unwrap();
            assert_eq!(schema.sections().len(), 2);
            assert_eq!(schema.field_count(), 3);
        }
    }

    #[test]
    fn test_section_and_field_order_preserved() {
        let set = scenario_schema();
        let schema = set.for_media(MediaType::Video).unwrap();
        let keys: Vec<String> = schema
            .fields()
            .map(|(s, f)| format!("{}:{}", s.key, f.key))
            .collect();
        assert_eq!(
            keys,
            vec!["Descriptive:title", "Descriptive:creator", "Technical:duration"]
        );
    }

    #[test]
    fn test_lookup_qualified_and_bare() {
        let set = builtin_schema().unwrap();
        let schema = set.for_media(MediaType::Video).unwrap();

        let r = schema.lookup("Descriptive:Title").unwrap();
        assert_eq!(r, FieldRef::new("Descriptive", "Title"));

        let r = schema.lookup("Codec").unwrap();
        assert_eq!(r.section, "TechnicalMaster");

        // Title lives in both Administrative and Descriptive
        assert!(schema.lookup("Title").is_err());
        assert!(schema.lookup("Descriptive:Nope").is_err());
    }

    #[test]
    fn test_builtin_schema_parses() {
        let set = builtin_schema().unwrap();
        let video = set.for_media(MediaType::Video).unwrap();
        let audio = set.for_media(MediaType::Audio).unwrap();
        let image = set.for_media(MediaType::Image).unwrap();

        assert_eq!(video.sections()[0].key, "Administrative");
        assert_eq!(video.sections()[0].color, 0xFFA500);
        assert!(audio.field("TechnicalOriginal", "SpeedTrack").is_some());
        assert!(video.field("TechnicalOriginal", "SpeedTrack").is_none());
        assert!(image.field("TechnicalMaster", "DPI").is_some());

        let embedded = video
            .field("TechnicalMaster", "EmbeddedMetadataSchema")
            .unwrap();
        assert_eq!(embedded.default, "PBCoreXML");
    }

    #[test]
    fn test_keys_derived_from_labels() {
        let set = parse_schema_str(
            r##"
sections:
  - name: Technical Original
    color: "#BEBEBE"
    fields:
      - label: Donor/Source Contact
"##,
        )
        .unwrap();
        let schema = set.for_media(MediaType::Audio).unwrap();
        assert_eq!(schema.sections()[0].key, "Technical_Original");
        assert_eq!(schema.sections()[0].fields[0].key, "Donor_Source_Contact");
        assert_eq!(schema.sections()[0].fields[0].label, "Donor/Source Contact");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = parse_schema_str(
            r##"
sections:
  - key: A
    name: A
    color: "#000000"
    fields:
      - key: x
      - key: x
"##,
        );
        assert!(matches!(result, Err(AvMetaError::Schema(msg)) if msg.contains("Duplicate field")));
    }

    #[test]
    fn test_same_field_key_in_two_sections_allowed() {
        let result = parse_schema_str(
            r##"
sections:
  - { key: A, name: A, color: "#000000", fields: [{ key: Title }] }
  - { key: B, name: B, color: "#FFFFFF", fields: [{ key: Title }] }
"##,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_color_rejected() {
        let result = parse_schema_str(
            r#"
sections:
  - { key: A, name: A, color: orange, fields: [{ key: x }] }
"#,
        );
        assert!(matches!(result, Err(AvMetaError::Schema(msg)) if msg.contains("color")));

        for bad in ["#+12345", "#-12345", "#12 345", "12345678"] {
            let yaml = format!(
                "sections:\n  - {{ key: A, name: A, color: \"{bad}\", fields: [{{ key: x }}] }}\n"
            );
            assert!(parse_schema_str(&yaml).is_err(), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn test_field_roles() {
        let set = parse_schema_str(
            r##"
sections:
  - key: Admin
    name: Admin
    color: "#000000"
    fields:
      - { key: Id, role: identifier }
      - { key: Name }
  - key: Tech
    name: Tech
    color: "#FFFFFF"
    fields:
      - { key: Fixity, role: checksum }
      - { key: Ref, role: identifier }
"##,
        )
        .unwrap();
        let schema = set.for_media(MediaType::Video).unwrap();

        let ids: Vec<String> = schema
            .fields_with_role(FieldRole::Identifier)
            .map(|(s, f)| FieldRef::new(&s.key, &f.key).to_string())
            .collect();
        assert_eq!(ids, vec!["Admin:Id", "Tech:Ref"]);
        assert_eq!(schema.fields_with_role(FieldRole::Checksum).count(), 1);
        assert_eq!(schema.fields_with_role(FieldRole::Title).count(), 0);

        let bad = parse_schema_str(
            "sections:\n  - { key: A, name: A, color: \"#000000\", fields: [{ key: x, role: owner }] }\n",
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_builtin_roles() {
        let set = builtin_schema().unwrap();
        for media_type in MediaType::ALL {
            let schema = set.for_media(media_type).unwrap();
            assert_eq!(schema.fields_with_role(FieldRole::Identifier).count(), 2);
            assert_eq!(schema.fields_with_role(FieldRole::Checksum).count(), 1);
            let (section, field) = schema.fields_with_role(FieldRole::Title).next().unwrap();
            assert_eq!((section.key.as_str(), field.key.as_str()), ("Descriptive", "Title"));
        }
    }

    #[test]
    fn test_reserved_section_rejected() {
        let result = parse_schema_str(
            r##"
sections:
  - { key: RelatedMedia, name: Related, color: "#000000", fields: [{ key: x }] }
"##,
        );
        assert!(matches!(result, Err(AvMetaError::Schema(msg)) if msg.contains("reserved")));
    }

    #[test]
    fn test_enum_without_values_rejected() {
        let result = parse_schema_str(
            r##"
sections:
  - { key: A, name: A, color: "#000000", fields: [{ key: x, type: enum }] }
"##,
        );
        assert!(matches!(result, Err(AvMetaError::Schema(msg)) if msg.contains("no values")));
    }

    #[test]
    fn test_invalid_default_rejected() {
        let result = parse_schema_str(
            r##"
sections:
  - { key: A, name: A, color: "#000000", fields: [{ key: when, type: date, default: "someday" }] }
"##,
        );
        assert!(matches!(result, Err(AvMetaError::Schema(msg)) if msg.contains("default")));
    }

    #[test]
    fn test_scalar_defaults_normalized() {
        let set = parse_schema_str(
            r##"
sections:
  - key: A
    name: A
    color: "#000000"
    fields:
      - { key: flag, type: boolean, default: yes }
      - { key: count, default: 3 }
"##,
        )
        .unwrap();
        let schema = set.for_media(MediaType::Video).unwrap();
        assert_eq!(schema.field("A", "flag").unwrap().default, "true");
        assert_eq!(schema.field("A", "count").unwrap().default, "3");
    }

    #[test]
    fn test_union_keeps_first_occurrence_order() {
        let set = builtin_schema().unwrap();
        let union = set.union();

        let keys: Vec<&str> = union.sections().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys[0], "Administrative");
        assert!(keys.contains(&"TechnicalAccessCopy"));

        let original = union.section("TechnicalOriginal").unwrap();
        // video fields first, then the audio-only additions
        assert_eq!(original.fields[0].key, "Format");
        assert!(original.field("SpeedTrack").is_some());
        assert!(union.field("TechnicalMaster", "DPI").is_some());
    }

    #[test]
    fn test_per_media_type_file() {
        let set = parse_schema_str(
            r##"
schemas:
  video:
    sections:
      - { key: V, name: V, color: "#111111", fields: [{ key: a }] }
  image:
    strict: false
    sections:
      - { key: I, name: I, color: "#222222", fields: [{ key: b }] }
"##,
        )
        .unwrap();

        assert!(set.for_media(MediaType::Video).unwrap().is_strict());
        assert!(!set.for_media(MediaType::Image).unwrap().is_strict());
        assert!(set.for_media(MediaType::Audio).is_err());
    }
}
