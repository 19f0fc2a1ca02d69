use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// File extension used for downloaded payloads of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// One discovered gallery item.
///
/// `canonical_url` is the identity key: payload URLs rotate on reload, page
/// identities do not. Serialized as a `[payload_url, kind, canonical_url]`
/// triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RecordRow", into = "RecordRow")]
pub struct MediaRecord {
    pub payload_url: String,
    pub kind: MediaKind,
    pub canonical_url: String,
}

#[derive(Serialize, Deserialize)]
struct RecordRow(String, MediaKind, String);

impl From<RecordRow> for MediaRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            payload_url: row.0,
            kind: row.1,
            canonical_url: row.2,
        }
    }
}

impl From<MediaRecord> for RecordRow {
    fn from(record: MediaRecord) -> Self {
        RecordRow(record.payload_url, record.kind, record.canonical_url)
    }
}

impl MediaRecord {
    pub fn new(
        payload_url: impl Into<String>,
        kind: MediaKind,
        canonical_url: impl Into<String>,
    ) -> Self {
        Self {
            payload_url: payload_url.into(),
            kind,
            canonical_url: canonical_url.into(),
        }
    }
}

/// Expected file name for the record at 1-based `ordinal`.
pub fn target_file_name(ordinal: usize, kind: MediaKind) -> String {
    format!("{:03}.{}", ordinal, kind.extension())
}
