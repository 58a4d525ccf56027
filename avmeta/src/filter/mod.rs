// Filter engine - field criteria combined with ALL/ANY plus a global keyword

use crate::error::{AvMetaError, Result};
use crate::record::Record;
use crate::schema::{FieldRef, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of criteria in one query
pub const MAX_CRITERIA: usize = 5;

/// A single field condition: the field value must contain `keyword`
/// (case-insensitive). Criteria that are switched off or have a blank
/// keyword take no part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub section: String,
    pub field: String,
    pub keyword: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl FilterCriterion {
    pub fn new(section: impl Into<String>, field: impl Into<String>, keyword: impl Into<String>) -> Self {
        FilterCriterion {
            section: section.into(),
            field: field.into(),
            keyword: keyword.into(),
            active: true,
        }
    }

    /// Parse `Section:Field=keyword` (or `Field=keyword` when the field key
    /// is unambiguous) against a schema.
    pub fn parse(schema: &Schema, input: &str) -> Result<Self> {
        let (key, keyword) = input.split_once('=').ok_or_else(|| {
            AvMetaError::Validation(format!(
                "Invalid criterion '{input}': expected Section:Field=keyword"
            ))
        })?;
        let FieldRef { section, field } = schema.lookup(key.trim())?;
        Ok(FilterCriterion::new(section, field, keyword.trim()))
    }

    /// Active and carrying a non-blank keyword
    pub fn is_effective(&self) -> bool {
        self.active && !self.keyword.trim().is_empty()
    }

    fn matches(&self, record: &Record) -> bool {
        let value = record.get(&self.section, &self.field).unwrap_or("");
        contains_ignore_case(value, self.keyword.trim())
    }
}

/// How active criteria combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::All => write!(f, "all"),
            MatchMode::Any => write!(f, "any"),
        }
    }
}

impl FromStr for MatchMode {
    type Err = AvMetaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "and" => Ok(MatchMode::All),
            "any" | "or" => Ok(MatchMode::Any),
            other => Err(AvMetaError::Validation(format!(
                "Unknown match mode '{other}' (expected all or any)"
            ))),
        }
    }
}

/// Does a record satisfy the criteria and the global keyword?
///
/// With no active criteria, ALL is vacuously true and ANY is false. A blank
/// global keyword does not filter. The final result is criteria AND keyword.
pub fn matches(
    record: &Record,
    criteria: &[FilterCriterion],
    mode: MatchMode,
    global_keyword: Option<&str>,
) -> bool {
    let mut active = criteria.iter().filter(|c| c.is_effective());
    let criteria_ok = match mode {
        MatchMode::All => active.all(|c| c.matches(record)),
        MatchMode::Any => active.any(|c| c.matches(record)),
    };
    if !criteria_ok {
        return false;
    }

    match global_keyword.map(str::trim) {
        Some(keyword) if !keyword.is_empty() => contains_ignore_case(&haystack(record), keyword),
        _ => true,
    }
}

/// Every field value plus title, media type label and source file name,
/// joined by single spaces so a phrase may run across adjacent values.
fn haystack(record: &Record) -> String {
    let mut parts: Vec<&str> = record.values().map(|(_, _, value)| value).collect();
    parts.push(&record.title);
    parts.push(record.media_type.label());
    let file_name = record.source_file_name().unwrap_or_default();
    parts.push(&file_name);
    parts.join(" ")
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// A complete search request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueryParts")]
pub struct Query {
    criteria: Vec<FilterCriterion>,
    pub mode: MatchMode,
    pub global_keyword: Option<String>,
}

/// Wire form of a query, checked by `TryFrom` before it becomes a `Query`
#[derive(Deserialize)]
struct QueryParts {
    #[serde(default)]
    criteria: Vec<FilterCriterion>,
    #[serde(default)]
    mode: MatchMode,
    #[serde(default)]
    global_keyword: Option<String>,
}

impl TryFrom<QueryParts> for Query {
    type Error = AvMetaError;

    fn try_from(parts: QueryParts) -> Result<Self> {
        let mut query = Query {
            criteria: Vec::with_capacity(parts.criteria.len()),
            mode: parts.mode,
            global_keyword: parts.global_keyword,
        };
        for criterion in parts.criteria {
            query.push(criterion)?;
        }
        Ok(query)
    }
}

impl Query {
    pub fn new(mode: MatchMode) -> Self {
        Query {
            mode,
            ..Query::default()
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.global_keyword = Some(keyword.into());
        self
    }

    /// Add a criterion. Fails once the query already holds `MAX_CRITERIA`.
    pub fn push(&mut self, criterion: FilterCriterion) -> Result<()> {
        if self.criteria.len() >= MAX_CRITERIA {
            return Err(AvMetaError::Validation(format!(
                "A query holds at most {MAX_CRITERIA} criteria"
            )));
        }
        self.criteria.push(criterion);
        Ok(())
    }

    /// Parse and add a `Section:Field=keyword` criterion
    pub fn push_parsed(&mut self, schema: &Schema, input: &str) -> Result<()> {
        let criterion = FilterCriterion::parse(schema, input)?;
        self.push(criterion)
    }

    pub fn criteria(&self) -> &[FilterCriterion] {
        &self.criteria
    }

    fn keyword(&self) -> Option<&str> {
        self.global_keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// No active criterion and no global keyword: every record is selected
    pub fn is_browse_all(&self) -> bool {
        self.keyword().is_none() && !self.criteria.iter().any(FilterCriterion::is_effective)
    }

    /// Criteria stage, then keyword stage. Without an active criterion only
    /// the keyword decides, whatever the mode.
    pub fn matches(&self, record: &Record) -> bool {
        if self.is_browse_all() {
            return true;
        }
        if !self.criteria.iter().any(FilterCriterion::is_effective) {
            return matches(record, &[], MatchMode::All, self.keyword());
        }
        matches(record, &self.criteria, self.mode, self.keyword())
    }
}
