//! Resource model and convention-based identifiers
//!
//! Edition and audio resources come from the catalog API; everything stored
//! on disk or in persisted state is keyed by convention-based strings built
//! from an edition id (`documentId--editionType`). The methods here are the
//! only place those conventions live.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditionType {
    Updated,
    Modernized,
    Original,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    #[default]
    Hq,
    Lq,
}

impl fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioQuality::Hq => write!(f, "hq"),
            AudioQuality::Lq => write!(f, "lq"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EbookColorScheme {
    #[default]
    White,
    Black,
    Sepia,
}

/// Edition identifier of the form `documentId--editionType`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditionId(String);

impl EditionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn document_id(&self) -> &str {
        self.0.split("--").next().unwrap_or("")
    }

    pub fn edition_type(&self) -> &str {
        self.0.split("--").last().unwrap_or("")
    }

    /// Track identifier for the player queue: `{editionId}--{partIndex}`.
    pub fn track_id(&self, part_index: usize) -> String {
        format!("{}--{}", self.0, part_index)
    }

    /// On-disk audio filename: `{editionId}--{partIndex}--{quality}.mp3`.
    pub fn audio_part_filename(&self, part_index: usize, quality: AudioQuality) -> String {
        format!("{}--{}--{}.mp3", self.0, part_index, quality)
    }

    /// On-disk ebook filename, stamped with the content revision so stale
    /// copies can be recognized and cleaned up.
    pub fn ebook_html_filename(&self, revision: &str) -> String {
        format!("{}--{}.html", self.0, revision)
    }

    pub fn ebook_filename_prefix(&self) -> String {
        format!("{}--", self.0)
    }
}

impl fmt::Display for EditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pull the revision sha back out of a stored ebook filename.
pub fn extract_revision_from_filename(filename: &str) -> String {
    filename
        .trim_end_matches(".html")
        .split("--")
        .last()
        .unwrap_or("")
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub short_title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionResource {
    pub id: EditionId,
    #[serde(rename = "type")]
    pub edition_type: EditionType,
    pub title: String,
    pub author: String,
    pub description: String,
    /// Content sha of the published ebook; compared against the revision
    /// embedded in the cached filename to detect staleness.
    pub revision: String,
    pub ebook_url: String,
    pub is_most_modernized: bool,
    pub square_cover_image_url: Option<String>,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPart {
    pub audio_id: EditionId,
    pub index: usize,
    pub title: String,
    pub duration: f64,
    pub size: u64,
    pub size_lq: u64,
    pub url: String,
    pub url_lq: String,
}

impl AudioPart {
    pub fn url(&self, quality: AudioQuality) -> &str {
        match quality {
            AudioQuality::Hq => &self.url,
            AudioQuality::Lq => &self.url_lq,
        }
    }

    pub fn size(&self, quality: AudioQuality) -> u64 {
        match quality {
            AudioQuality::Hq => self.size,
            AudioQuality::Lq => self.size_lq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioResource {
    pub id: EditionId,
    pub title: String,
    pub artist: String,
    pub artwork_url: String,
    pub parts: Vec<AudioPart>,
}

/// Row handed to the platform audio player when queueing an audiobook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub id: String,
    pub filepath: String,
    pub title: String,
    pub artist: String,
    pub artwork_url: String,
    pub album: String,
    pub duration: f64,
}

/// A cached ebook read back off the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbookData {
    pub sha: String,
    pub inner_html: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edition_id_components() {
        let id = EditionId::new("journal-of-george-fox--updated");
        assert_eq!(id.document_id(), "journal-of-george-fox");
        assert_eq!(id.edition_type(), "updated");
    }

    #[test]
    fn audio_filename_convention() {
        let id = EditionId::new("doc--original");
        assert_eq!(
            id.audio_part_filename(3, AudioQuality::Lq),
            "doc--original--3--lq.mp3"
        );
        assert_eq!(
            id.audio_part_filename(0, AudioQuality::Hq),
            "doc--original--0--hq.mp3"
        );
    }

    #[test]
    fn track_id_convention() {
        let id = EditionId::new("doc--original");
        assert_eq!(id.track_id(2), "doc--original--2");
    }

    #[test]
    fn ebook_filename_roundtrips_revision() {
        let id = EditionId::new("doc--modernized");
        let filename = id.ebook_html_filename("abc123f");
        assert_eq!(filename, "doc--modernized--abc123f.html");
        assert!(filename.starts_with(&id.ebook_filename_prefix()));
        assert_eq!(extract_revision_from_filename(&filename), "abc123f");
    }

    #[test]
    fn audio_part_quality_selection() {
        let part = AudioPart {
            audio_id: EditionId::new("doc--original"),
            index: 0,
            title: "Part 1".to_string(),
            duration: 1800.0,
            size: 40_000_000,
            size_lq: 10_000_000,
            url: "https://cdn/hq.mp3".to_string(),
            url_lq: "https://cdn/lq.mp3".to_string(),
        };
        assert_eq!(part.url(AudioQuality::Lq), "https://cdn/lq.mp3");
        assert_eq!(part.size(AudioQuality::Hq), 40_000_000);
    }
}
