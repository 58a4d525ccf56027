// Document I/O - read/write records as XML sidecar files

use crate::error::{AvMetaError, Result};
use crate::media::MediaType;
use crate::record::{self, Record};
use crate::schema::{FieldRole, FieldType, Schema, SchemaSet};
use crate::validation::{self, ValidationResult};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ROOT_ELEMENT: &str = "Asset";
pub const FORMAT_VERSION: &str = "1.0";
const RELATED_ELEMENT: &str = "RelatedMedia";
const LIST_ITEM: &str = "Item";

/// Serialize a record to an XML document.
///
/// Layout: `<Asset>` root, a `<RelatedMedia>` block with the record
/// attributes, then one element per section and one child per field in
/// schema order. Empty values still produce an (empty) element.
pub fn encode(schema: &Schema, record: &Record) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(
        &mut writer,
        Event::Start(BytesStart::new(ROOT_ELEMENT).with_attributes([("version", FORMAT_VERSION)])),
    )?;

    emit(&mut writer, Event::Start(BytesStart::new(RELATED_ELEMENT)))?;
    text_element(&mut writer, "MediaType", record.media_type.as_str())?;
    text_element(&mut writer, "Title", &record.title)?;
    let media_path = record
        .source_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    text_element(&mut writer, "MediaPath", &media_path)?;
    text_element(
        &mut writer,
        "MediaBasename",
        &record.source_file_name().unwrap_or_default(),
    )?;
    text_element(&mut writer, "Created", &format_timestamp(&record.created_at))?;
    text_element(&mut writer, "Modified", &format_timestamp(&record.modified_at))?;
    emit(&mut writer, Event::End(BytesEnd::new(RELATED_ELEMENT)))?;

    for section in schema.sections() {
        emit(&mut writer, Event::Start(BytesStart::new(section.key.as_str())))?;
        for field in &section.fields {
            let value = record.get(&section.key, &field.key).unwrap_or("");
            match field.field_type {
                FieldType::List => {
                    let items = validation::split_list(value);
                    if items.is_empty() {
                        emit(&mut writer, Event::Empty(BytesStart::new(field.key.as_str())))?;
                    } else {
                        emit(&mut writer, Event::Start(BytesStart::new(field.key.as_str())))?;
                        for item in &items {
                            text_element(&mut writer, LIST_ITEM, item)?;
                        }
                        emit(&mut writer, Event::End(BytesEnd::new(field.key.as_str())))?;
                    }
                }
                FieldType::Date => {
                    let mut scratch = ValidationResult::default();
                    let iso = validation::normalize_value(field, value, true, &mut scratch);
                    let out = if scratch.is_ok() { iso.as_str() } else { value };
                    text_element(&mut writer, &field.key, out)?;
                }
                _ => text_element(&mut writer, &field.key, value)?,
            }
        }
        emit(&mut writer, Event::End(BytesEnd::new(section.key.as_str())))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| AvMetaError::Other(format!("XML output is not UTF-8: {e}")))
}

/// Parse an XML document back into a record, using the schema of the
/// document's media type. Missing fields take schema defaults and unknown
/// elements are ignored.
pub fn decode(schemas: &SchemaSet, xml: &str) -> Result<Record> {
    decode_at(schemas, xml, "<memory>")
}

fn decode_at(schemas: &SchemaSet, xml: &str, origin: &str) -> Result<Record> {
    let root = parse_tree(xml).map_err(|reason| AvMetaError::malformed(origin, reason))?;

    if root.name != ROOT_ELEMENT {
        return Err(AvMetaError::malformed(
            origin,
            format!("root element is <{}>, expected <{ROOT_ELEMENT}>", root.name),
        ));
    }

    let related = read_related(&root).map_err(|reason| AvMetaError::malformed(origin, reason))?;
    let schema = schemas
        .for_media(related.media_type)
        .map_err(|e| AvMetaError::malformed(origin, e.to_string()))?;

    let mut decoded = Record::bare(related.media_type);
    decoded.title = related.title;
    decoded.source_path = related.source_path;
    decoded.created_at = related.created_at;
    decoded.modified_at = related.modified_at;

    for section_node in &root.children {
        let Some(section) = schema.section(&section_node.name) else {
            continue;
        };
        for field_node in &section_node.children {
            let Some(field) = section.field(&field_node.name) else {
                continue;
            };
            let has_items = field_node.children.iter().any(|c| c.name == LIST_ITEM);
            let value = if field.field_type == FieldType::List || has_items {
                field_node
                    .children
                    .iter()
                    .filter(|c| c.name == LIST_ITEM)
                    .map(|c| c.text.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                field_node.text.trim().to_string()
            };
            decoded.insert_raw(&section.key, &field.key, value);
        }
    }

    // Legacy sidecars carry no title of their own
    if related.legacy {
        if let Some((section, field)) = schema.fields_with_role(FieldRole::Title).next() {
            decoded.title = decoded.get(&section.key, &field.key).unwrap_or("").to_string();
        }
    }

    Ok(record::resolve(schema, related.media_type, Some(decoded)))
}

/// Read and decode an XML file
pub fn read_document(schemas: &SchemaSet, path: &Path) -> Result<Record> {
    if !path.exists() {
        return Err(AvMetaError::not_found("Metadata file", path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let origin = path.display().to_string();
    let xml = String::from_utf8(bytes)
        .map_err(|_| AvMetaError::malformed(origin.clone(), "file is not valid UTF-8"))?;
    decode_at(schemas, &xml, &origin)
}

/// Encode a record and write it atomically (temp file + rename)
pub fn write_document(schema: &Schema, path: &Path, record: &Record) -> Result<()> {
    let xml = encode(schema, record)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(xml.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| AvMetaError::Io(e.error))?;

    log::debug!("Wrote {}", path.display());
    Ok(())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| AvMetaError::Other(format!("XML write error: {e}")))
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return emit(writer, Event::Empty(BytesStart::new(name)));
    }
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

// ── Parsing ────────────────────────────────────────────────────

/// Minimal element tree: names, concatenated text and children
#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }
}

fn parse_tree(xml: &str) -> std::result::Result<Node, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML error at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => stack.push(Node {
                name: local_name(&e)?,
                ..Node::default()
            }),
            Event::Empty(e) => {
                let node = Node {
                    name: local_name(&e)?,
                    ..Node::default()
                };
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or("unexpected closing tag")?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| format!("bad text content: {e}"))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn local_name(start: &BytesStart<'_>) -> std::result::Result<String, String> {
    std::str::from_utf8(start.local_name().as_ref())
        .map(str::to_string)
        .map_err(|e| format!("element name is not UTF-8: {e}"))
}

fn attach(
    stack: &mut [Node],
    root: &mut Option<Node>,
    node: Node,
) -> std::result::Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_some() => Err(format!("second root element <{}>", node.name)),
        None => {
            *root = Some(node);
            Ok(())
        }
    }
}

struct Related {
    media_type: MediaType,
    /// Read from a `RelatedVideo`/`RelatedAudio` node
    legacy: bool,
    title: String,
    source_path: Option<PathBuf>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

fn read_related(root: &Node) -> std::result::Result<Related, String> {
    if let Some(node) = root.child(RELATED_ELEMENT) {
        let media_type = node
            .child_text("MediaType")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| format!("<{RELATED_ELEMENT}> has no <MediaType>"))?
            .parse::<MediaType>()
            .map_err(|e| e.to_string())?;

        return Ok(Related {
            media_type,
            legacy: false,
            title: node.child_text("Title").unwrap_or("").to_string(),
            source_path: non_empty_path(node.child_text("MediaPath")),
            created_at: parse_timestamp(node.child_text("Created"), "Created")?,
            modified_at: parse_timestamp(node.child_text("Modified"), "Modified")?,
        });
    }

    // Layout written by the original sidecar builder
    for (element, path_key, media_type) in [
        ("RelatedVideo", "VideoPath", MediaType::Video),
        ("RelatedAudio", "AudioPath", MediaType::Audio),
    ] {
        if let Some(node) = root.child(element) {
            return Ok(Related {
                media_type,
                legacy: true,
                title: String::new(),
                source_path: non_empty_path(node.child_text(path_key)),
                created_at: DateTime::<Utc>::UNIX_EPOCH,
                modified_at: DateTime::<Utc>::UNIX_EPOCH,
            });
        }
    }

    Err(format!("missing <{RELATED_ELEMENT}> element"))
}

fn non_empty_path(text: Option<&str>) -> Option<PathBuf> {
    text.filter(|t| !t.is_empty()).map(PathBuf::from)
}

fn parse_timestamp(text: Option<&str>, what: &str) -> std::result::Result<DateTime<Utc>, String> {
    match text {
        None | Some("") => Ok(DateTime::<Utc>::UNIX_EPOCH),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("<{what}> is not an RFC 3339 timestamp ('{raw}'): {e}")),
    }
}
