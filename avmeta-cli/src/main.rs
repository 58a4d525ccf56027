use avmeta::{Config, FilterCriterion, MatchMode, MediaType, Query, Record, Store};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process;

/// avmeta CLI: enter, search and export archival media metadata
#[derive(Parser)]
#[command(name = "avmeta", version, about)]
struct Cli {
    /// Config file (default: ./avmeta.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder holding the XML records (overrides config and environment)
    #[arg(long)]
    metadata_dir: Option<PathBuf>,

    /// Schema file (overrides config and environment)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    All,
    Any,
}

impl From<ModeArg> for MatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => MatchMode::All,
            ModeArg::Any => MatchMode::Any,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create (or reopen) a record and save it
    New {
        /// Media type: video, audio or image
        #[arg(long, required_unless_present = "media")]
        media_type: Option<MediaType>,
        /// Record title
        #[arg(long, required_unless_present = "media")]
        title: Option<String>,
        /// Uploaded media file; type and title are derived from it
        #[arg(long, conflicts_with_all = ["media_type", "title"])]
        media: Option<PathBuf>,
        /// Field values (e.g. --field Descriptive:Creator="J. Doe")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Print a record
    Show {
        /// XML file (relative paths are taken from the metadata folder)
        file: PathBuf,
    },

    /// Change field values of a stored record
    Edit {
        /// XML file (relative paths are taken from the metadata folder)
        file: PathBuf,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// Field values to update (e.g. --field QCStatus=Pass)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Search the metadata folder
    Search {
        /// Field criterion, up to five (e.g. --where Technical:Duration=01:30)
        #[arg(long = "where")]
        criteria: Vec<String>,
        /// How criteria combine
        #[arg(long, default_value = "all")]
        mode: ModeArg,
        /// Keyword matched against every value, the title and the file name
        #[arg(long)]
        keyword: Option<String>,
        /// Also export the results to this workbook
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Export every record in the metadata folder to an Excel workbook
    Export {
        /// Destination .xlsx file
        destination: PathBuf,
    },

    /// Show the active schema
    Schema {
        /// Only this media type
        #[arg(long)]
        media_type: Option<MediaType>,
    },

    /// Check every record against the schema
    Validate,

    /// Compute a media file's fixity checksum
    Checksum {
        /// Media file
        media: PathBuf,
        /// Store the checksum in the file's record
        #[arg(long)]
        save: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.metadata_dir {
        config.metadata_dir = dir;
    }
    if let Some(schema) = cli.schema {
        config.schema = Some(schema);
    }
    log::debug!("Metadata folder: {}", config.metadata_dir.display());
    let store = Store::open(config)?;

    match cli.command {
        Command::New {
            media_type,
            title,
            media,
            fields,
        } => {
            let mut record = match (media, media_type) {
                (Some(media), _) => store.record_for_media(&media)?,
                (None, Some(media_type)) => {
                    store.load_or_new(media_type, title.as_deref().unwrap_or(""))?
                }
                (None, None) => return Err("either --media or --media-type is required".into()),
            };
            let mut warnings = apply_fields(&store, &mut record, &fields)?;
            let report = store.save(&mut record)?;
            warnings.extend(report.warnings);
            print_output(
                &serde_json::json!({ "path": report.path, "warnings": warnings }),
                &cli.format,
            )?;
        }

        Command::Show { file } => {
            let record = store.load(&file)?;
            print_output(&record, &cli.format)?;
        }

        Command::Edit {
            file,
            title,
            fields,
        } => {
            let mut record = store.load(&file)?;
            if let Some(title) = title {
                record.title = title;
            }
            let mut warnings = apply_fields(&store, &mut record, &fields)?;
            let report = store.save_to(&mut record, &file)?;
            warnings.extend(report.warnings);
            print_output(
                &serde_json::json!({ "path": report.path, "warnings": warnings }),
                &cli.format,
            )?;
        }

        Command::Search {
            criteria,
            mode,
            keyword,
            export,
        } => {
            let union = store.schemas().union();
            let mut query = Query::new(mode.into());
            for input in &criteria {
                query.push(FilterCriterion::parse(&union, input)?)?;
            }
            if let Some(keyword) = keyword {
                query = query.with_keyword(keyword);
            }

            let report = store.search(&query)?;
            let hits: Vec<_> = report
                .results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "path": r.path,
                        "title": r.record.title,
                        "media_type": r.record.media_type,
                    })
                })
                .collect();

            let mut output = serde_json::json!({
                "scanned": report.scanned,
                "matches": hits,
                "skipped": report.diagnostics,
            });
            if let Some(destination) = export {
                let records: Vec<Record> = report.into_records();
                let summary = store.export(&records, &destination)?;
                output["export"] = serde_json::to_value(summary)?;
            }
            print_output(&output, &cli.format)?;
        }

        Command::Export { destination } => {
            let (summary, skipped) = store.export_all(&destination)?;
            print_output(
                &serde_json::json!({ "export": summary, "skipped": skipped }),
                &cli.format,
            )?;
        }

        Command::Schema { media_type } => match media_type {
            Some(media_type) => print_output(store.schema_for(media_type)?, &cli.format)?,
            None => print_output(store.schemas(), &cli.format)?,
        },

        Command::Validate => {
            let report = store.validate_all()?;
            print_output(&report, &cli.format)?;
        }

        Command::Checksum { media, save } => {
            let mut record = store.record_for_media(&media)?;
            let digest = store.attach_checksum(&mut record)?;
            let mut output = serde_json::json!({ "file": media, "checksum": digest });
            if save {
                let report = store.save(&mut record)?;
                output["saved"] = serde_json::to_value(report)?;
            }
            print_output(&output, &cli.format)?;
        }
    }

    Ok(())
}

fn apply_fields(
    store: &Store,
    record: &mut Record,
    fields: &[(String, String)],
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    let schema = store.schema_for(record.media_type)?;
    Ok(record.apply_edits(schema, fields)?)
}

fn print_output<T: Serialize + ?Sized>(
    value: &T,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
