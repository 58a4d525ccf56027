// File naming and XML tag helpers

use crate::media::MediaType;
use regex::Regex;
use std::sync::OnceLock;

fn invalid_tag_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static regex"))
}

fn valid_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("static regex"))
}

/// Slugify a string for use in file names. Words are joined with underscores.
pub fn slugify(input: &str) -> String {
    slug::slugify(input).replace('-', "_")
}

/// Deterministic XML file name for a record: `<media type>_<slug>.xml`.
///
/// Two records with the same title and media type map to the same name;
/// callers decide what happens on collision (see `OnConflict`).
pub fn record_file_name(title: &str, media_type: MediaType) -> String {
    let slug = slugify(title);
    let slug = if slug.is_empty() { "untitled".to_string() } else { slug };
    format!("{}_{}.xml", media_type.as_str(), slug)
}

/// Append `_1`, `_2`, ... to the file stem until `exists` reports a free name.
pub fn resolve_suffix(file_name: &str, exists: impl Fn(&str) -> bool) -> String {
    if !exists(file_name) {
        return file_name.to_string();
    }

    let (stem, ext) = match file_name.rfind('.') {
        Some(pos) => (&file_name[..pos], &file_name[pos..]),
        None => (file_name, ""),
    };

    let mut suffix = 1;
    loop {
        let candidate = format!("{stem}_{suffix}{ext}");
        if !exists(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Turn an arbitrary label into a usable XML element name.
pub fn sanitize_tag(name: &str) -> String {
    let tag = invalid_tag_chars().replace_all(name.trim(), "_").into_owned();
    if tag.is_empty() {
        return "X".to_string();
    }
    match tag.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => tag,
        _ => format!("X_{tag}"),
    }
}

/// Whether `name` can be used verbatim as an element name.
pub fn is_valid_tag(name: &str) -> bool {
    valid_tag().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_file_name_is_stable() {
        let a = record_file_name("Saudi Airlines Training Film, 1988", MediaType::Video);
        let b = record_file_name("Saudi Airlines Training Film, 1988", MediaType::Video);
        assert_eq!(a, b);
        assert_eq!(a, "video_saudi_airlines_training_film_1988.xml");
    }

    #[test]
    fn test_record_file_name_depends_on_media_type() {
        assert_ne!(
            record_file_name("Clip A", MediaType::Video),
            record_file_name("Clip A", MediaType::Audio)
        );
    }

    #[test]
    fn test_record_file_name_untitled() {
        assert_eq!(record_file_name("", MediaType::Image), "image_untitled.xml");
        assert_eq!(record_file_name("  !!  ", MediaType::Audio), "audio_untitled.xml");
    }

    #[test]
    fn test_resolve_suffix() {
        let taken = ["video_a.xml", "video_a_1.xml"];
        let resolved = resolve_suffix("video_a.xml", |name| taken.contains(&name));
        assert_eq!(resolved, "video_a_2.xml");

        let free = resolve_suffix("video_b.xml", |name| taken.contains(&name));
        assert_eq!(free, "video_b.xml");
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("Donor/Source Contact"), "Donor_Source_Contact");
        assert_eq!(sanitize_tag("Technical Original"), "Technical_Original");
        assert_eq!(sanitize_tag("35mm"), "X_35mm");
        assert_eq!(sanitize_tag("   "), "X");
        assert!(is_valid_tag(&sanitize_tag("Section:Field")));
    }

    #[test]
    fn test_is_valid_tag() {
        assert!(is_valid_tag("TechnicalMaster"));
        assert!(is_valid_tag("Container_wrapper"));
        assert!(!is_valid_tag("1st"));
        assert!(!is_valid_tag("Has Space"));
        assert!(!is_valid_tag("Section:Field"));
    }
}
