// Search service - scan a folder of XML records and filter them

use crate::document;
use crate::error::{AvMetaError, Result};
use crate::filter::Query;
use crate::record::Record;
use crate::schema::SchemaSet;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A decoded record and where it came from
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub record: Record,
    pub path: PathBuf,
    pub matched: bool,
}

/// A file that was skipped during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchReport {
    pub results: Vec<SearchResult>,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of XML files examined
    pub scanned: usize,
}

impl SearchReport {
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.results.iter().map(|r| &r.record)
    }

    pub fn into_records(self) -> Vec<Record> {
        self.results.into_iter().map(|r| r.record).collect()
    }
}

/// XML files directly inside `dir`, sorted by file name.
/// The extension match ignores case.
pub fn list_xml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(AvMetaError::not_found("Metadata directory", dir.display().to_string()));
    }

    let dir_str = dir.to_str().ok_or_else(|| {
        AvMetaError::Other(format!("Directory path is not valid UTF-8: {}", dir.display()))
    })?;
    let pattern = format!("{}/*.xml", glob::Pattern::escape(dir_str));
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..glob::MatchOptions::new()
    };

    let mut files = Vec::new();
    for entry in glob::glob_with(&pattern, options)
        .map_err(|e| AvMetaError::Other(format!("Invalid glob pattern: {e}")))?
    {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable entry: {e}"),
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Decode every XML file in `dir` and apply the query.
///
/// Only matching records are returned. Files that fail to decode are
/// skipped, logged and listed in `diagnostics`.
pub fn search(dir: &Path, schemas: &SchemaSet, query: &Query) -> Result<SearchReport> {
    let files = list_xml_files(dir)?;
    let mut report = SearchReport {
        scanned: files.len(),
        ..SearchReport::default()
    };

    for path in files {
        match document::read_document(schemas, &path) {
            Ok(record) => {
                if query.matches(&record) {
                    report.results.push(SearchResult {
                        record,
                        path,
                        matched: true,
                    });
                }
            }
            Err(e @ (AvMetaError::MalformedDocument { .. } | AvMetaError::Io(_))) => {
                log::warn!("Skipping {}: {e}", path.display());
                report.diagnostics.push(Diagnostic {
                    path,
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    log::debug!(
        "Search in {}: {} of {} files matched, {} skipped",
        dir.display(),
        report.results.len(),
        report.scanned,
        report.diagnostics.len()
    );
    Ok(report)
}
