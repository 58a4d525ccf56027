use crate::error::{AvMetaError, Result};
use crate::record::Record;
use crate::schema::{Field, FieldType, Schema};
use chrono::{DateTime, NaiveDate};

/// Result of validating a record
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Validate every value of a record against its schema.
/// Values are not modified; see `validate_and_prepare` for that.
pub fn validate_record(schema: &Schema, record: &Record) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (section, field) in schema.fields() {
        let value = record.get(&section.key, &field.key).unwrap_or("");
        let mut issues = ValidationResult::default();
        normalize_value(field, value, schema.is_strict(), &mut issues);
        prefix_issues(&section.key, &mut issues);
        result.errors.extend(issues.errors);
        result.warnings.extend(issues.warnings);
    }

    for (section, field, _) in record.values() {
        if schema.field(section, field).is_none() {
            result
                .warnings
                .push(format!("Field '{section}:{field}' is not part of the schema"));
        }
    }

    result
}

/// Fill empty values from schema defaults. Modifies the record in place.
pub fn apply_defaults(schema: &Schema, record: &mut Record) {
    for (section, field) in schema.fields() {
        if field.default.is_empty() {
            continue;
        }
        let is_empty = record
            .get(&section.key, &field.key)
            .map(|v| v.trim().is_empty())
            .unwrap_or(true);
        if is_empty {
            record.insert_raw(&section.key, &field.key, field.default.clone());
        }
    }
}

/// Apply defaults, normalize every value and fail if any value violates
/// its declared type. Returns the warnings of a successful validation.
pub fn validate_and_prepare(schema: &Schema, record: &mut Record) -> Result<Vec<String>> {
    apply_defaults(schema, record);

    let mut result = ValidationResult::default();
    let mut normalized = Vec::new();
    for (section, field) in schema.fields() {
        let value = record.get(&section.key, &field.key).unwrap_or("").to_string();
        let mut issues = ValidationResult::default();
        let clean = normalize_value(field, &value, schema.is_strict(), &mut issues);
        prefix_issues(&section.key, &mut issues);
        result.errors.extend(issues.errors);
        result.warnings.extend(issues.warnings);
        normalized.push((section.key.clone(), field.key.clone(), clean));
    }

    if !result.is_ok() {
        return Err(AvMetaError::Validation(format!(
            "Record validation failed:\n  - {}",
            result.errors.join("\n  - ")
        )));
    }

    for (section, field, value) in normalized {
        record.insert_raw(&section, &field, value);
    }

    Ok(result.warnings)
}

/// Check a single value against its field definition and return the
/// normalized form. Issues are appended to `result`; on error the trimmed
/// input is returned unchanged.
pub fn normalize_value(
    field: &Field,
    value: &str,
    strict: bool,
    result: &mut ValidationResult,
) -> String {
    let value = value.trim();

    if value
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        result.errors.push(format!(
            "Field '{}' contains control characters",
            field.key
        ));
        return value.to_string();
    }

    if value.is_empty() {
        return String::new();
    }

    match field.field_type {
        FieldType::Text => value.to_string(),
        FieldType::Date => match normalize_date(value) {
            Some(date) => date,
            None => {
                result.errors.push(format!(
                    "Field '{}' expected a date (YYYY, YYYY-MM or YYYY-MM-DD), got '{value}'",
                    field.key
                ));
                value.to_string()
            }
        },
        FieldType::Boolean => match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => "true".to_string(),
            "false" | "no" | "n" | "0" => "false".to_string(),
            _ => {
                result.errors.push(format!(
                    "Field '{}' expected boolean, got '{value}'",
                    field.key
                ));
                value.to_string()
            }
        },
        FieldType::Enum => {
            match field
                .options
                .iter()
                .find(|opt| opt.eq_ignore_ascii_case(value))
            {
                Some(canonical) => canonical.clone(),
                None => {
                    add_issue(
                        result,
                        strict,
                        format!(
                            "Field '{}' value '{value}' is not in enum: {:?}",
                            field.key, field.options
                        ),
                    );
                    value.to_string()
                }
            }
        }
        FieldType::List => split_list(value).join(", "),
    }
}

/// Split a comma separated list value into trimmed, non-empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_date(value: &str) -> Option<String> {
    if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
        return Some(value.to_string());
    }

    if let Some((year, month)) = value.split_once('-') {
        if year.len() == 4 && !month.contains('-') {
            let year: u32 = year.parse().ok()?;
            let month: u32 = month.parse().ok()?;
            if (1..=12).contains(&month) {
                return Some(format!("{year:04}-{month:02}"));
            }
            return None;
        }
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

fn prefix_issues(section: &str, issues: &mut ValidationResult) {
    for msg in issues.errors.iter_mut().chain(issues.warnings.iter_mut()) {
        *msg = msg.replacen("Field '", &format!("Field '{section}:"), 1);
    }
}

fn add_issue(result: &mut ValidationResult, strict: bool, message: String) {
    if strict {
        result.errors.push(message);
    } else {
        result.warnings.push(message);
    }
}
