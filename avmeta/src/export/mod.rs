// Export service - flatten records into a formatted Excel workbook

use crate::error::{AvMetaError, Result};
use crate::filter::Query;
use crate::record::Record;
use crate::schema::{FieldRef, FieldType, Schema, SchemaSet};
use crate::search::{self, Diagnostic};
use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{Color, ExcelDateTime, Format, FormatBorder, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const WORKSHEET_NAME: &str = "Metadata";
const SEQUENCE_LABEL: &str = "#";
const DATE_FORMAT: &str = "yyyy-mm-dd";
/// Years an Excel date cell can hold
const EXCEL_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

/// A spreadsheet column. The sequence column has no field and no color.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub field: Option<FieldRef>,
    pub label: String,
    pub color: Option<u32>,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Cell {
    Number(u32),
    Text(String),
    Date(NaiveDate),
    Boolean(bool),
}

/// Header plus one row per record, independent of the output format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub records: usize,
    pub columns: usize,
}

/// Flatten records into rows: a 1-based sequence number, then one cell
/// per field in schema order.
pub fn build_table(schema: &Schema, records: &[Record]) -> Table {
    let mut columns = vec![Column {
        field: None,
        label: SEQUENCE_LABEL.to_string(),
        color: None,
        field_type: FieldType::Text,
    }];
    for (section, field) in schema.fields() {
        columns.push(Column {
            field: Some(FieldRef::new(&section.key, &field.key)),
            label: field.label.clone(),
            color: Some(section.color),
            field_type: field.field_type,
        });
    }

    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut row = Vec::with_capacity(columns.len());
            row.push(Cell::Number(i as u32 + 1));
            for column in columns.iter().skip(1) {
                let value = column.field.as_ref().map(|f| record.value(f)).unwrap_or("");
                row.push(typed_cell(column.field_type, value));
            }
            row
        })
        .collect();

    Table { columns, rows }
}

fn typed_cell(field_type: FieldType, value: &str) -> Cell {
    match field_type {
        FieldType::Date => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) if EXCEL_YEARS.contains(&date.year()) => Cell::Date(date),
            _ => Cell::Text(value.to_string()),
        },
        FieldType::Boolean => match value {
            "true" => Cell::Boolean(true),
            "false" => Cell::Boolean(false),
            _ => Cell::Text(value.to_string()),
        },
        _ => Cell::Text(value.to_string()),
    }
}

/// Write records to an `.xlsx` file at `destination`.
///
/// The workbook is rendered in memory and moved into place only once it is
/// complete; on failure nothing is left at the destination.
pub fn export(schema: &Schema, records: &[Record], destination: &Path) -> Result<ExportSummary> {
    let table = build_table(schema, records);
    let bytes = render(&table).map_err(|e| AvMetaError::ExportWrite(e.to_string()))?;
    persist(&bytes, destination)?;

    log::info!(
        "Exported {} records to {}",
        table.rows.len(),
        destination.display()
    );
    Ok(ExportSummary {
        path: destination.to_path_buf(),
        records: table.rows.len(),
        columns: table.columns.len(),
    })
}

/// Export every decodable record in a folder with the union schema.
/// Files that fail to decode are skipped and returned as diagnostics.
pub fn export_folder(
    dir: &Path,
    schemas: &SchemaSet,
    destination: &Path,
) -> Result<(ExportSummary, Vec<Diagnostic>)> {
    let report = search::search(dir, schemas, &Query::default())?;
    let diagnostics = report.diagnostics.clone();
    let records = report.into_records();
    let summary = export(&schemas.union(), &records, destination)?;
    Ok((summary, diagnostics))
}

fn render(table: &Table) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(WORKSHEET_NAME)?;
    let rows = write_table(worksheet, table)?;
    log::debug!("Rendered {rows} worksheet rows");
    workbook.save_to_buffer()
}

/// Header row plus one row per record. Returns the number of rows written.
fn write_table(worksheet: &mut Worksheet, table: &Table) -> std::result::Result<u32, XlsxError> {
    let header_base = Format::new().set_bold().set_border(FormatBorder::Thin);
    for (col, column) in table.columns.iter().enumerate() {
        let col = column_index(col)?;
        let format = match column.color {
            Some(rgb) => header_base.clone().set_background_color(Color::RGB(rgb)),
            None => header_base.clone(),
        };
        worksheet.write_string_with_format(0, col, &column.label, &format)?;
        let width = column.label.chars().count().clamp(6, 40) as f64 + 2.0;
        worksheet.set_column_width(col, width)?;
    }

    let mut written = 1;
    for row in &table.rows {
        for (col, (cell, column)) in row.iter().zip(&table.columns).enumerate() {
            write_cell(worksheet, written, column_index(col)?, cell, column.color)?;
        }
        written = written
            .checked_add(1)
            .ok_or_else(|| XlsxError::ParameterError("too many rows".to_string()))?;
    }

    worksheet.set_freeze_panes(1, 0)?;
    Ok(written)
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    color: Option<u32>,
) -> std::result::Result<(), XlsxError> {
    let mut format = Format::new();
    if let Some(rgb) = color {
        format = format.set_background_color(Color::RGB(rgb));
    }

    match cell {
        Cell::Number(n) => {
            worksheet.write_number_with_format(row, col, *n as f64, &format)?;
        }
        Cell::Text(text) if text.is_empty() => {
            worksheet.write_blank(row, col, &format)?;
        }
        Cell::Text(text) => {
            worksheet.write_string_with_format(row, col, text, &format)?;
        }
        Cell::Boolean(value) => {
            worksheet.write_boolean_with_format(row, col, *value, &format)?;
        }
        Cell::Date(date) => {
            let excel_date = ExcelDateTime::from_ymd(
                date.year() as u16,
                date.month() as u8,
                date.day() as u8,
            )?;
            let format = format.set_num_format(DATE_FORMAT);
            worksheet.write_datetime_with_format(row, col, &excel_date, &format)?;
        }
    }
    Ok(())
}

fn column_index(col: usize) -> std::result::Result<u16, XlsxError> {
    u16::try_from(col).map_err(|_| XlsxError::ParameterError("too many columns".to_string()))
}

fn persist(bytes: &[u8], destination: &Path) -> Result<()> {
    let export_err = |e: std::io::Error| {
        AvMetaError::ExportWrite(format!("{}: {e}", destination.display()))
    };

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(export_err)?;
    tmp.write_all(bytes).map_err(export_err)?;
    tmp.flush().map_err(export_err)?;
    tmp.persist(destination).map_err(|e| export_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;
    use crate::media::MediaType;
    use crate::schema::{builtin_schema, parse_schema_str};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn scenario_schema() -> Schema {
        parse_schema_str(
            r##"
sections:
  - { key: Descriptive, name: Descriptive, color: "#9370DB", fields: [{ key: title, label: Title }, { key: creator, label: Creator }] }
  - key: Technical
    name: Technical
    color: "#708090"
    fields:
      - { key: duration, label: Duration }
      - { key: digitized, label: Digitized, type: date }
      - { key: restored, label: Restored, type: boolean }
"##,
        )
        .unwrap()
        .for_media(MediaType::Video)
        .unwrap()
        .clone()
    }

    fn records(schema: &Schema, count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                let mut record = Record::new(schema, MediaType::Video, format!("Clip {i}"));
                record.set(schema, "Descriptive", "title", &format!("Clip {i}")).unwrap();
                record
            })
            .collect()
    }

    #[test]
    fn test_table_shape_and_sequence() {
        let schema = scenario_schema();
        let table = build_table(&schema, &records(&schema, 3));

        assert_eq!(table.columns.len(), 1 + schema.field_count());
        assert_eq!(table.columns[0].label, "#");
        assert_eq!(table.columns[0].color, None);
        assert_eq!(table.columns[1].color, Some(0x9370DB));
        assert_eq!(table.columns[3].color, Some(0x708090));

        assert_eq!(table.rows.len(), 3);
        let seq: Vec<&Cell> = table.rows.iter().map(|r| &r[0]).collect();
        assert_eq!(seq, vec![&Cell::Number(1), &Cell::Number(2), &Cell::Number(3)]);
        assert_eq!(table.rows[2][1], Cell::Text("Clip 2".into()));
    }

    #[test]
    fn test_typed_cells() {
        let schema = scenario_schema();
        let mut record = Record::new(&schema, MediaType::Video, "Clip A");
        record.set(&schema, "Technical", "digitized", "2024/05/01").unwrap();
        record.set(&schema, "Technical", "restored", "yes").unwrap();
        let table = build_table(&schema, &[record.clone()]);
        assert_eq!(
            table.rows[0][4],
            Cell::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
        );
        assert_eq!(table.rows[0][5], Cell::Boolean(true));

        // partial dates stay text
        record.set(&schema, "Technical", "digitized", "2024").unwrap();
        let table = build_table(&schema, &[record.clone()]);
        assert_eq!(table.rows[0][4], Cell::Text("2024".into()));

        // outside the years a spreadsheet date can hold
        for early in ["1888-05-01", "0099-12-31"] {
            record.set(&schema, "Technical", "digitized", early).unwrap();
            let table = build_table(&schema, &[record.clone()]);
            assert_eq!(table.rows[0][4], Cell::Text(early.into()));
        }
    }

    #[test]
    fn test_export_early_date() {
        let tmp = TempDir::new().unwrap();
        let schema = scenario_schema();
        let mut record = Record::new(&schema, MediaType::Video, "Wax Cylinder");
        record.set(&schema, "Technical", "digitized", "1888-05-01").unwrap();
        let dest = tmp.path().join("early.xlsx");

        let summary = export(&schema, &[record], &dest).unwrap();
        assert_eq!(summary.records, 1);
        assert!(dest.exists());
    }

    #[test]
    fn test_write_table_row_count() {
        let schema = scenario_schema();
        for count in [0, 1, 4] {
            let table = build_table(&schema, &records(&schema, count));
            let seq: Vec<Cell> = table.rows.iter().map(|r| r[0].clone()).collect();
            let expected: Vec<Cell> = (1..=count as u32).map(Cell::Number).collect();
            assert_eq!(seq, expected);

            let mut workbook = Workbook::new();
            let worksheet = workbook.add_worksheet();
            let rows = write_table(worksheet, &table).unwrap();
            assert_eq!(rows, count as u32 + 1);
        }
    }

    #[test]
    fn test_export_writes_workbook() {
        let tmp = TempDir::new().unwrap();
        let schema = scenario_schema();
        let dest = tmp.path().join("report.xlsx");

        let summary = export(&schema, &records(&schema, 4), &dest).unwrap();
        assert_eq!(summary.records, 4);
        assert_eq!(summary.columns, 6);

        let bytes = std::fs::read(&dest).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_export_empty_collection() {
        let tmp = TempDir::new().unwrap();
        let schema = scenario_schema();
        let dest = tmp.path().join("empty.xlsx");
        let summary = export(&schema, &[], &dest).unwrap();
        assert_eq!(summary.records, 0);
        assert!(dest.exists());
    }

    #[test]
    fn test_export_unwritable_destination() {
        let tmp = TempDir::new().unwrap();
        let schema = scenario_schema();
        let dest = tmp.path().join("missing").join("report.xlsx");

        let result = export(&schema, &records(&schema, 2), &dest);
        assert!(matches!(result, Err(AvMetaError::ExportWrite(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn test_export_folder_mixed_media() {
        let tmp = TempDir::new().unwrap();
        let set = builtin_schema().unwrap();
        for (media_type, title) in [(MediaType::Video, "Tape 1"), (MediaType::Image, "Photo 1")] {
            let schema = set.for_media(media_type).unwrap();
            let record = Record::new(schema, media_type, title);
            let path = tmp.path().join(crate::naming::record_file_name(title, media_type));
            document::write_document(schema, &path, &record).unwrap();
        }
        std::fs::write(tmp.path().join("junk.xml"), "not xml").unwrap();

        let out = TempDir::new().unwrap();
        let dest = out.path().join("all.xlsx");
        let (summary, diagnostics) = export_folder(tmp.path(), &set, &dest).unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.columns, 1 + set.union().field_count());
        assert_eq!(diagnostics.len(), 1);
        assert!(dest.exists());
    }
}
