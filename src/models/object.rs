//! Data types shared across storage providers (§3).

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One level of `GetFileList(prefix)` (directory or file).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileListElement {
    pub name: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
    #[serde(rename = "objectKey")]
    pub object_key: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dir,
    Text,
    Json,
    Image,
    Binary,
}

/// Classify a MIME type (and directory flag) into a `FileKind`. A pure
/// function of `(mimeString, isDir)` shared by every provider — no provider
/// owns this logic, matching the "no inheritance" design note in spec §9.
pub fn classify(mime: &str, is_dir: bool) -> FileKind {
    if is_dir {
        return FileKind::Dir;
    }
    if mime == "application/json" {
        FileKind::Json
    } else if let Some(prefix) = mime.split('/').next() {
        match prefix {
            "text" => FileKind::Text,
            "image" => FileKind::Image,
            _ => FileKind::Binary,
        }
    } else {
        FileKind::Binary
    }
}

/// Metadata returned alongside a `GetObject` byte stream.
#[derive(Debug, Clone)]
pub struct GetObjectInfo {
    pub content_type: String,
    pub content_length: i64,
    pub last_modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_mime() {
        assert_eq!(classify("text/plain", false), FileKind::Text);
        assert_eq!(classify("application/json", false), FileKind::Json);
        assert_eq!(classify("image/png", false), FileKind::Image);
        assert_eq!(classify("application/octet-stream", false), FileKind::Binary);
        assert_eq!(classify("image/png", true), FileKind::Dir);
    }
}
