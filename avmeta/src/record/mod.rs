// Record model - one media item's metadata, grouped by section

use crate::error::{AvMetaError, Result};
use crate::media::MediaType;
use crate::schema::{FieldRef, Schema};
use crate::validation::{self, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// In-memory metadata for one media item.
///
/// Values are stored as strings keyed by section key and field key. Records
/// built through `new`/`resolve` carry an entry for every schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub media_type: MediaType,
    pub title: String,
    pub source_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Record {
    /// A fresh record pre-filled with schema defaults. The title is trimmed.
    pub fn new(schema: &Schema, media_type: MediaType, title: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut record = Record {
            media_type,
            title: title.into().trim().to_string(),
            source_path: None,
            created_at: now,
            modified_at: now,
            sections: BTreeMap::new(),
        };
        for (section, field) in schema.fields() {
            record.insert_raw(&section.key, &field.key, field.default.clone());
        }
        record
    }

    /// A record with attributes only and no field entries
    pub(crate) fn bare(media_type: MediaType) -> Self {
        Record {
            media_type,
            title: String::new(),
            source_path: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            modified_at: DateTime::<Utc>::UNIX_EPOCH,
            sections: BTreeMap::new(),
        }
    }

    pub fn get(&self, section: &str, field: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
    }

    /// Value of a field, empty when absent
    pub fn value(&self, key: &FieldRef) -> &str {
        self.get(&key.section, &key.field).unwrap_or("")
    }

    /// Validate and assign one field. Returns warnings (lenient enum checks).
    pub fn set(
        &mut self,
        schema: &Schema,
        section: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>> {
        let key = FieldRef::new(section, field);
        self.apply_edits(schema, &[(key.to_string(), value.to_string())])
    }

    /// Apply a batch of `field key -> value` edits, all or nothing.
    ///
    /// Keys are `Section:Field` or unambiguous bare field keys. If any key is
    /// unknown or any value fails its type, nothing is changed.
    pub fn apply_edits(&mut self, schema: &Schema, edits: &[(String, String)]) -> Result<Vec<String>> {
        let mut result = ValidationResult::default();
        let mut staged = Vec::with_capacity(edits.len());

        for (key, value) in edits {
            let field_ref = match schema.lookup(key) {
                Ok(r) => r,
                Err(AvMetaError::Validation(msg)) => {
                    result.errors.push(msg);
                    continue;
                }
                Err(other) => return Err(other),
            };
            let Some(field) = schema.field(&field_ref.section, &field_ref.field) else {
                continue;
            };

            let mut issues = ValidationResult::default();
            let clean = validation::normalize_value(field, value, schema.is_strict(), &mut issues);
            let qualify = |msg: String| msg.replacen("Field '", &format!("Field '{}:", field_ref.section), 1);
            result.errors.extend(issues.errors.into_iter().map(&qualify));
            result.warnings.extend(issues.warnings.into_iter().map(&qualify));
            staged.push((field_ref, clean));
        }

        if !result.is_ok() {
            return Err(AvMetaError::Validation(result.errors.join("; ")));
        }

        for (field_ref, value) in staged {
            self.insert_raw(&field_ref.section, &field_ref.field, value);
        }
        Ok(result.warnings)
    }

    pub(crate) fn insert_raw(&mut self, section: &str, field: &str, value: String) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    /// Every stored `(section, field, value)`, sorted by key
    pub fn values(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.sections.iter().flat_map(|(section, fields)| {
            fields
                .iter()
                .map(move |(field, value)| (section.as_str(), field.as_str(), value.as_str()))
        })
    }

    pub fn sections(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.sections
    }

    /// Values in schema order, keyed by `Section:Field`
    pub fn flatten(&self, schema: &Schema) -> Vec<(FieldRef, String)> {
        schema
            .fields()
            .map(|(section, field)| {
                let key = FieldRef::new(&section.key, &field.key);
                let value = self.value(&key).to_string();
                (key, value)
            })
            .collect()
    }

    /// File name of the described media, if any
    pub fn source_file_name(&self) -> Option<String> {
        self.source_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Stamp the modification time
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Merge a decoded record (if any) with schema defaults.
///
/// The result has exactly one entry per schema field: decoded values win,
/// missing ones take the field default. Attributes come from the decoded
/// record, or are fresh when there is none.
pub fn resolve(schema: &Schema, media_type: MediaType, decoded: Option<Record>) -> Record {
    let Some(decoded) = decoded else {
        return Record::new(schema, media_type, "");
    };

    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (section, field) in schema.fields() {
        let value = decoded
            .get(&section.key, &field.key)
            .map(str::to_string)
            .unwrap_or_else(|| field.default.clone());
        sections
            .entry(section.key.clone())
            .or_default()
            .insert(field.key.clone(), value);
    }

    Record { sections, ..decoded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{builtin_schema, parse_schema_str};
    use pretty_assertions::assert_eq;

    fn scenario_schema() -> Schema {
        parse_schema_str(
            r##"
sections:
  - { key: Descriptive, name: Descriptive, color: "#9370DB", fields: [{ key: title }, { key: creator }] }
  - { key: Technical, name: Technical, color: "#708090", fields: [{ key: duration }, { key: digitized, type: date }] }
"##,
        )
        .unwrap()
        .for_media(MediaType::Video)
        .unwrap()
        .clone()
    }

    #[test]
    fn test_new_record_has_every_field() {
        let set = builtin_schema().unwrap();
        let schema = set.for_media(MediaType::Video).unwrap();
        let record = Record::new(schema, MediaType::Video, "Clip A");

        for (section, field) in schema.fields() {
            assert!(
                record.get(&section.key, &field.key).is_some(),
                "missing {}:{}",
                section.key,
                field.key
            );
        }
        assert_eq!(
            record.get("TechnicalMaster", "EmbeddedMetadataSchema"),
            Some("PBCoreXML")
        );
        assert_eq!(record.created_at, record.modified_at);
    }

    #[test]
    fn test_new_trims_title() {
        let schema = scenario_schema();
        let record = Record::new(&schema, MediaType::Video, "  Clip B \n");
        assert_eq!(record.title, "Clip B");
    }

    #[test]
    fn test_set_validates_and_normalizes() {
        let schema = scenario_schema();
        let mut record = Record::new(&schema, MediaType::Video, "Clip A");

        record.set(&schema, "Technical", "digitized", "2024/05/01").unwrap();
        assert_eq!(record.get("Technical", "digitized"), Some("2024-05-01"));

        let err = record.set(&schema, "Technical", "digitized", "soon");
        assert!(matches!(err, Err(AvMetaError::Validation(_))));
        assert_eq!(record.get("Technical", "digitized"), Some("2024-05-01"));
    }

    #[test]
    fn test_set_unknown_field() {
        let schema = scenario_schema();
        let mut record = Record::new(&schema, MediaType::Video, "Clip A");
        let err = record.set(&schema, "Technical", "codec", "FFV1");
        assert!(matches!(err, Err(AvMetaError::Validation(msg)) if msg.contains("Unknown field")));
    }

    #[test]
    fn test_apply_edits_is_all_or_nothing() {
        let schema = scenario_schema();
        let mut record = Record::new(&schema, MediaType::Video, "Clip A");

        let edits = vec![
            ("creator".to_string(), "J. Doe".to_string()),
            ("Technical:digitized".to_string(), "not a date".to_string()),
        ];
        assert!(record.apply_edits(&schema, &edits).is_err());
        assert_eq!(record.get("Descriptive", "creator"), Some(""));

        let edits = vec![
            ("creator".to_string(), "J. Doe".to_string()),
            ("Technical:duration".to_string(), "00:01:30".to_string()),
        ];
        record.apply_edits(&schema, &edits).unwrap();
        assert_eq!(record.get("Descriptive", "creator"), Some("J. Doe"));
        assert_eq!(record.get("Technical", "duration"), Some("00:01:30"));
    }

    #[test]
    fn test_resolve_without_decoded_uses_defaults() {
        let schema = scenario_schema();
        let record = resolve(&schema, MediaType::Audio, None);
        assert_eq!(record.media_type, MediaType::Audio);
        assert_eq!(record.title, "");
        assert_eq!(record.values().count(), 4);
    }

    #[test]
    fn test_resolve_fills_missing_and_drops_unknown() {
        let schema = scenario_schema();
        let mut decoded = Record::bare(MediaType::Image);
        decoded.title = "Clip A".into();
        decoded.insert_raw("Descriptive", "creator", "J. Doe".into());
        decoded.insert_raw("Removed", "old", "x".into());

        let record = resolve(&schema, MediaType::Video, Some(decoded));
        assert_eq!(record.media_type, MediaType::Image);
        assert_eq!(record.title, "Clip A");
        assert_eq!(record.get("Descriptive", "creator"), Some("J. Doe"));
        assert_eq!(record.get("Descriptive", "title"), Some(""));
        assert_eq!(record.get("Removed", "old"), None);
    }

    #[test]
    fn test_flatten_in_schema_order() {
        let schema = scenario_schema();
        let mut record = Record::new(&schema, MediaType::Video, "Clip A");
        record.set(&schema, "Descriptive", "title", "Clip A").unwrap();

        let flat = record.flatten(&schema);
        let keys: Vec<String> = flat.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "Descriptive:title",
                "Descriptive:creator",
                "Technical:duration",
                "Technical:digitized"
            ]
        );
        assert_eq!(flat[0].1, "Clip A");
    }

    #[test]
    fn test_source_file_name() {
        let schema = scenario_schema();
        let mut record = Record::new(&schema, MediaType::Video, "Clip A");
        assert_eq!(record.source_file_name(), None);
        record.source_path = Some(PathBuf::from("/uploads/video/tape_01.mkv"));
        assert_eq!(record.source_file_name().as_deref(), Some("tape_01.mkv"));
    }
}
