use crate::config::{Config, OnConflict};
use crate::document;
use crate::error::{AvMetaError, Result};
use crate::export::{self, ExportSummary};
use crate::filter::Query;
use crate::media::{self, MediaType};
use crate::naming;
use crate::record::{self, Record};
use crate::schema::{builtin_schema, parse_schema, FieldRole, Schema, SchemaSet};
use crate::search::{self, Diagnostic, SearchReport};
use crate::validation;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Outcome of a save
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

/// Validation outcome for one metadata file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    /// Files with errors or warnings only
    pub issues: Vec<FileReport>,
}

/// Entry point for applications: owns the configuration and the schema set
/// and ties the codec, search and export services to the metadata folder.
pub struct Store {
    config: Config,
    schemas: SchemaSet,
}

impl Store {
    /// Open the store described by `config`.
    /// Creates the metadata directory if needed and loads the schema set.
    pub fn open(config: Config) -> Result<Self> {
        let schemas = match &config.schema {
            Some(path) => {
                if !path.exists() {
                    return Err(AvMetaError::not_found("Schema file", path.display().to_string()));
                }
                parse_schema(path)?
            }
            None => builtin_schema()?,
        };

        std::fs::create_dir_all(&config.metadata_dir)?;
        log::debug!(
            "Opened metadata store at {} ({} media types)",
            config.metadata_dir.display(),
            schemas.media_types().count()
        );

        Ok(Store { config, schemas })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    pub fn schema_for(&self, media_type: MediaType) -> Result<&Schema> {
        self.schemas.for_media(media_type)
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.config.metadata_dir
    }

    /// Default location of a record's XML file
    pub fn record_path(&self, record: &Record) -> PathBuf {
        self.path_for(&record.title, record.media_type)
    }

    fn path_for(&self, title: &str, media_type: MediaType) -> PathBuf {
        self.metadata_dir()
            .join(naming::record_file_name(title.trim(), media_type))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_relative() && !path.starts_with(self.metadata_dir()) {
            self.metadata_dir().join(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Load a record file. Relative paths are taken from the metadata folder.
    /// A malformed file is an error here, unlike during search.
    pub fn load(&self, path: &Path) -> Result<Record> {
        document::read_document(&self.schemas, &self.absolute(path))
    }

    /// The stored record for `(media_type, title)`, or a new one built from
    /// schema defaults when no file exists yet.
    pub fn load_or_new(&self, media_type: MediaType, title: &str) -> Result<Record> {
        let schema = self.schema_for(media_type)?;
        let path = self.path_for(title, media_type);

        let decoded = if path.exists() {
            Some(document::read_document(&self.schemas, &path)?)
        } else {
            None
        };

        let found = decoded.is_some();
        let mut record = record::resolve(schema, media_type, decoded);
        if !found {
            record.title = title.trim().to_string();
        }
        Ok(record)
    }

    /// Record for an uploaded media file: media type from the extension,
    /// title and identifier defaulted from the file stem.
    pub fn record_for_media(&self, media_path: &Path) -> Result<Record> {
        if !media_path.is_file() {
            return Err(AvMetaError::not_found("Media file", media_path.display().to_string()));
        }
        let media_type = MediaType::from_path(media_path).ok_or_else(|| {
            AvMetaError::Validation(format!(
                "Cannot tell the media type of {}",
                media_path.display()
            ))
        })?;
        let stem = media_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let schema = self.schema_for(media_type)?;
        let mut record = self.load_or_new(media_type, &stem)?;
        if record.source_path.is_none() {
            record.source_path = Some(media_path.to_path_buf());
        }

        // identifier fields start out as the file stem
        for (section, field) in schema.fields_with_role(FieldRole::Identifier) {
            if record.get(&section.key, &field.key).unwrap_or("").is_empty() {
                record.set(schema, &section.key, &field.key, &stem)?;
            }
        }

        Ok(record)
    }

    /// Compute the media file's checksum and store it in the record
    pub fn attach_checksum(&self, record: &mut Record) -> Result<String> {
        let source = record.source_path.clone().ok_or_else(|| {
            AvMetaError::Validation(format!("Record '{}' has no media file", record.title))
        })?;
        let digest = media::checksum(&source)?;

        let schema = self.schema_for(record.media_type)?;
        if let Some((section, field)) = schema.fields_with_role(FieldRole::Checksum).next() {
            record.set(schema, &section.key, &field.key, &digest)?;
        }
        Ok(digest)
    }

    /// Validate and write a record to its default location
    pub fn save(&self, record: &mut Record) -> Result<SaveReport> {
        let path = self.record_path(record);
        self.write_record(record, path)
    }

    /// Validate and write a record to an explicit path
    pub fn save_to(&self, record: &mut Record, path: &Path) -> Result<SaveReport> {
        self.write_record(record, self.absolute(path))
    }

    /// The caller's record only takes the normalized values and the new
    /// modification time once the file is written.
    fn write_record(&self, record: &mut Record, target: PathBuf) -> Result<SaveReport> {
        let mut prepared = record.clone();
        prepared.title = prepared.title.trim().to_string();
        let schema = self.schema_for(prepared.media_type)?;
        let mut warnings = validation::validate_and_prepare(schema, &mut prepared)?;
        prepared.touch();

        let target = self.resolve_conflict(&prepared, target, &mut warnings)?;
        document::write_document(schema, &target, &prepared)?;

        log::info!("Saved '{}' to {}", prepared.title, target.display());
        *record = prepared;
        Ok(SaveReport {
            path: target,
            warnings,
        })
    }

    /// Apply the conflict policy when `target` already exists. Rewriting the
    /// file of the same record is never a conflict, and a suffixed file that
    /// already holds this record is reused.
    fn resolve_conflict(
        &self,
        record: &Record,
        target: PathBuf,
        warnings: &mut Vec<String>,
    ) -> Result<PathBuf> {
        if !target.exists() {
            return Ok(target);
        }

        let existing = document::read_document(&self.schemas, &target);
        if matches!(&existing, Ok(existing) if is_same_record(existing, record)) {
            return Ok(target);
        }

        match self.config.on_conflict {
            OnConflict::Error => Err(AvMetaError::PathConflict {
                path: target.display().to_string(),
            }),
            OnConflict::Suffix => {
                let dir = target.parent().unwrap_or_else(|| Path::new(""));
                let file_name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let taken = |name: &str| {
                    let path = dir.join(name);
                    path.exists()
                        && !document::read_document(&self.schemas, &path)
                            .is_ok_and(|other| is_same_record(&other, record))
                };
                let resolved = naming::resolve_suffix(&file_name, taken);
                Ok(dir.join(resolved))
            }
            OnConflict::Overwrite => {
                let message = match existing {
                    Ok(other) => format!(
                        "Overwriting {}, which held a different record ('{}')",
                        target.display(),
                        other.title
                    ),
                    Err(e) => format!("Overwriting unreadable file {}: {e}", target.display()),
                };
                log::warn!("{message}");
                warnings.push(message);
                Ok(target)
            }
        }
    }

    pub fn search(&self, query: &Query) -> Result<SearchReport> {
        search::search(self.metadata_dir(), &self.schemas, query)
    }

    /// Every decodable record in the metadata folder
    pub fn list(&self) -> Result<SearchReport> {
        self.search(&Query::default())
    }

    /// Export records. A single-media collection uses that media type's
    /// schema; mixed collections use the union schema.
    pub fn export(&self, records: &[Record], destination: &Path) -> Result<ExportSummary> {
        let schema = match records.first() {
            Some(first) if records.iter().all(|r| r.media_type == first.media_type) => {
                self.schema_for(first.media_type)?.clone()
            }
            _ => self.schemas.union(),
        };
        export::export(&schema, records, destination)
    }

    pub fn export_all(&self, destination: &Path) -> Result<(ExportSummary, Vec<Diagnostic>)> {
        export::export_folder(self.metadata_dir(), &self.schemas, destination)
    }

    /// Check every metadata file against its schema
    pub fn validate_all(&self) -> Result<ValidationReport> {
        let files = search::list_xml_files(self.metadata_dir())?;
        let mut report = ValidationReport {
            total: files.len(),
            ..ValidationReport::default()
        };

        for path in files {
            let (errors, warnings) = match document::read_document(&self.schemas, &path) {
                Ok(record) => {
                    let schema = self.schema_for(record.media_type)?;
                    let result = validation::validate_record(schema, &record);
                    (result.errors, result.warnings)
                }
                Err(e @ (AvMetaError::MalformedDocument { .. } | AvMetaError::Io(_))) => {
                    (vec![e.to_string()], Vec::new())
                }
                Err(e) => return Err(e),
            };
            if !errors.is_empty() || !warnings.is_empty() {
                report.issues.push(FileReport {
                    path,
                    errors,
                    warnings,
                });
            }
        }

        Ok(report)
    }
}

fn is_same_record(existing: &Record, record: &Record) -> bool {
    existing.media_type == record.media_type && existing.created_at == record.created_at
}
