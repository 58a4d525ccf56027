// Media kinds, extension detection and fixity checksums

use crate::error::{AvMetaError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mov", "avi", "mp4", "mxf", "m2t", "dv", "mpg", "mpeg", "vob", "wmv", "ts",
];
const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "aiff", "aif", "flac", "mp3", "m4a", "aac", "wma", "ogg",
];
const IMAGE_EXTENSIONS: &[&str] = &[
    "tif", "tiff", "jpg", "jpeg", "png", "bmp", "gif", "dng", "webp",
];

/// Kind of asset a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Audio,
    Video,
    Image,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Video, MediaType::Audio, MediaType::Image];

    /// Lowercase identifier used in file names and XML.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Image => "image",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Audio => "Audio",
            MediaType::Video => "Video",
            MediaType::Image => "Image",
        }
    }

    /// Infer the media type from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<MediaType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Audio)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Image)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = AvMetaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            "image" => Ok(MediaType::Image),
            other => Err(AvMetaError::Validation(format!(
                "Unknown media type '{other}' (expected audio, video or image)"
            ))),
        }
    }
}

/// Compute a fixity checksum for a media file, formatted as `SHA256:<hex>`.
pub fn checksum(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(AvMetaError::not_found("Media file", path.display().to_string()));
    }

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 8 * 1024 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("SHA256:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(MediaType::from_path(Path::new("tape01.MKV")), Some(MediaType::Video));
        assert_eq!(MediaType::from_path(Path::new("side_a.flac")), Some(MediaType::Audio));
        assert_eq!(MediaType::from_path(Path::new("scan.tiff")), Some(MediaType::Image));
        assert_eq!(MediaType::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaType::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn test_media_type_parse() {
        assert_eq!("Video".parse::<MediaType>().unwrap(), MediaType::Video);
        assert_eq!(" audio ".parse::<MediaType>().unwrap(), MediaType::Audio);
        assert!("film".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_checksum_of_known_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clip.wav");
        std::fs::write(&path, b"abc").unwrap();

        let sum = checksum(&path).unwrap();
        assert_eq!(
            sum,
            "SHA256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_checksum_missing_file() {
        let tmp = TempDir::new().unwrap();
        let result = checksum(&tmp.path().join("missing.wav"));
        assert!(matches!(result, Err(AvMetaError::NotFound { .. })));
    }
}
