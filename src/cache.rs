//! Ebook caching with LRU eviction over the on-disk library
//!
//! The data directory holds everything the app downloads: `editions/` for
//! revision-stamped ebook HTML and the shared stylesheet, `audio/` for
//! audiobook parts, `images/` for artwork, and `data/` for persisted state.
//! Parsed ebooks are kept in a small in-memory LRU so repeated searches of
//! the same edition don't re-read and re-parse the file.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ebook::{self, EbookElement};
use crate::models::{extract_revision_from_filename, AudioQuality, EbookData, EditionId};

pub const EBOOK_CSS_FILENAME: &str = "ebook.css";

/// A parsed ebook ready for searching.
pub struct CachedEbook {
    pub revision: String,
    pub elements: Vec<EbookElement>,
}

pub struct EbookCache {
    cache: Mutex<LruCache<EditionId, Arc<CachedEbook>>>,
    data_dir: PathBuf,
}

impl EbookCache {
    pub fn new(data_dir: PathBuf, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(20).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn editions_dir(&self) -> PathBuf {
        self.data_dir.join("editions")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn create_layout(&self) -> Result<()> {
        for dir in [
            self.data_dir.clone(),
            self.editions_dir(),
            self.audio_dir(),
            self.images_dir(),
            self.data_dir.join("data"),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        Ok(())
    }

    /// Fetch the parsed ebook for an edition, reading and parsing from disk
    /// on a cache miss. `None` means no copy of the ebook is stored locally.
    pub fn get(&self, edition_id: &EditionId) -> Result<Option<Arc<CachedEbook>>> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(ebook) = cache.get(edition_id) {
                return Ok(Some(Arc::clone(ebook)));
            }
        }

        let Some(data) = self.ebook_data(edition_id)? else {
            return Ok(None);
        };

        let parsed = Arc::new(CachedEbook {
            revision: data.sha,
            elements: ebook::parse_elements(&data.inner_html),
        });
        {
            let mut cache = self.cache.lock().unwrap();
            cache.put(edition_id.clone(), Arc::clone(&parsed));
        }
        Ok(Some(parsed))
    }

    pub fn invalidate(&self, edition_id: &EditionId) {
        self.cache.lock().unwrap().pop(edition_id);
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub fn stats(&self) -> (usize, usize) {
        let cache = self.cache.lock().unwrap();
        (cache.len(), cache.cap().get())
    }

    /// Raw stored ebook HTML for an edition, with its revision recovered
    /// from the filename.
    pub fn ebook_data(&self, edition_id: &EditionId) -> Result<Option<EbookData>> {
        let prefix = edition_id.ebook_filename_prefix();
        let Some(path) = self
            .files_with_prefix(&self.editions_dir(), &prefix)
            .into_iter()
            .find(|p| p.extension().is_some_and(|ext| ext == "html"))
        else {
            return Ok(None);
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let inner_html = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read ebook file {:?}", path))?;

        Ok(Some(EbookData {
            sha: extract_revision_from_filename(&filename),
            inner_html,
        }))
    }

    /// Store a freshly downloaded ebook, dropping any stale revisions of the
    /// same edition and the cached parse.
    pub fn write_ebook_html(
        &self,
        edition_id: &EditionId,
        revision: &str,
        html: &str,
    ) -> Result<PathBuf> {
        let filename = edition_id.ebook_html_filename(revision);
        let path = self.editions_dir().join(&filename);
        fs::write(&path, html).with_context(|| format!("Failed to write ebook file {:?}", path))?;

        let prefix = edition_id.ebook_filename_prefix();
        for stale in self.files_with_prefix(&self.editions_dir(), &prefix) {
            if stale != path {
                let _ = fs::remove_file(stale);
            }
        }

        self.invalidate(edition_id);
        Ok(path)
    }

    pub fn ebook_css(&self) -> Option<String> {
        fs::read_to_string(self.editions_dir().join(EBOOK_CSS_FILENAME)).ok()
    }

    pub fn files_with_prefix(&self, dir: &Path, prefix: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with(prefix))
            })
            .collect();
        paths.sort();
        paths
    }

    /// Indices of the audio parts already downloaded for an edition at the
    /// given quality.
    pub fn downloaded_audio_parts(&self, edition_id: &EditionId, quality: AudioQuality) -> Vec<usize> {
        let prefix = format!("{}--", edition_id);
        let suffix = format!("--{}.mp3", quality);
        let mut parts: Vec<usize> = self
            .files_with_prefix(&self.audio_dir(), &prefix)
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                name.strip_prefix(&prefix)?
                    .strip_suffix(&suffix)?
                    .parse()
                    .ok()
            })
            .collect();
        parts.sort_unstable();
        parts
    }

    /// Remove every downloaded audio part for one edition. Returns how many
    /// files were removed.
    pub fn delete_audio_files(&self, edition_id: &EditionId) -> Result<usize> {
        let prefix = format!("{}--", edition_id);
        let mut removed = 0usize;
        for path in self.files_with_prefix(&self.audio_dir(), &prefix) {
            if path.extension().is_some_and(|ext| ext == "mp3") {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove audio file {:?}", path))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every downloaded audio file, for the "free up storage" setting.
    pub fn delete_all_audio(&self) -> Result<usize> {
        let Ok(entries) = fs::read_dir(self.audio_dir()) else {
            return Ok(0);
        };
        let mut removed = 0usize;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "mp3") {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove audio file {:?}", path))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn read_json<T: DeserializeOwned>(&self, rel_path: &str) -> Option<T> {
        let contents = fs::read_to_string(self.data_dir.join(rel_path)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn write_json<T: Serialize>(&self, rel_path: &str, value: &T) -> Result<()> {
        let path = self.data_dir.join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let contents = serde_json::to_string_pretty(value)?;
        fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_cache(name: &str) -> EbookCache {
        let dir = std::env::temp_dir().join(format!(
            "folio-cache-test-{}-{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        let cache = EbookCache::new(dir, 4);
        cache.create_layout().unwrap();
        cache
    }

    #[test]
    fn missing_ebook_reads_as_none() {
        let cache = test_cache("missing");
        let id = EditionId::new("doc--updated");
        assert!(cache.ebook_data(&id).unwrap().is_none());
        assert!(cache.get(&id).unwrap().is_none());
    }

    #[test]
    fn write_replaces_stale_revisions() {
        let cache = test_cache("stale");
        let id = EditionId::new("doc--updated");

        cache.write_ebook_html(&id, "aaa111", "<p id=\"p1\">old text</p>").unwrap();
        cache.write_ebook_html(&id, "bbb222", "<p id=\"p1\">new text</p>").unwrap();

        let files = cache.files_with_prefix(&cache.editions_dir(), "doc--updated--");
        assert_eq!(files.len(), 1);

        let data = cache.ebook_data(&id).unwrap().unwrap();
        assert_eq!(data.sha, "bbb222");
        assert_eq!(data.inner_html, "<p id=\"p1\">new text</p>");
    }

    #[test]
    fn get_parses_and_caches_elements() {
        let cache = test_cache("parse");
        let id = EditionId::new("doc--original");
        cache
            .write_ebook_html(&id, "abc", "<p id=\"p1\">hello there</p><p id=\"p2\">more</p>")
            .unwrap();

        let ebook = cache.get(&id).unwrap().unwrap();
        assert_eq!(ebook.revision, "abc");
        assert_eq!(ebook.elements.len(), 2);
        assert_eq!(ebook.elements[0].plain_text, "hello there");
        assert_eq!(cache.stats().0, 1);

        // re-download invalidates the cached parse
        cache.write_ebook_html(&id, "def", "<p id=\"p1\">rewritten</p>").unwrap();
        let ebook = cache.get(&id).unwrap().unwrap();
        assert_eq!(ebook.revision, "def");
        assert_eq!(ebook.elements[0].plain_text, "rewritten");
    }

    #[test]
    fn audio_part_listing_and_deletion() {
        let cache = test_cache("audio");
        let id = EditionId::new("doc--original");
        let other = EditionId::new("other-doc--updated");

        for name in [
            id.audio_part_filename(0, AudioQuality::Hq),
            id.audio_part_filename(2, AudioQuality::Hq),
            id.audio_part_filename(1, AudioQuality::Lq),
            other.audio_part_filename(0, AudioQuality::Hq),
        ] {
            fs::write(cache.audio_dir().join(name), b"mp3").unwrap();
        }

        assert_eq!(cache.downloaded_audio_parts(&id, AudioQuality::Hq), vec![0, 2]);
        assert_eq!(cache.downloaded_audio_parts(&id, AudioQuality::Lq), vec![1]);

        assert_eq!(cache.delete_audio_files(&id).unwrap(), 3);
        assert!(cache.downloaded_audio_parts(&id, AudioQuality::Hq).is_empty());
        assert_eq!(cache.downloaded_audio_parts(&other, AudioQuality::Hq), vec![0]);

        assert_eq!(cache.delete_all_audio().unwrap(), 1);
    }

    #[test]
    fn json_roundtrip() {
        let cache = test_cache("json");
        let mut positions: HashMap<String, f64> = HashMap::new();
        positions.insert("doc--updated".to_string(), 0.42);

        cache.write_json("data/positions.json", &positions).unwrap();
        let read: HashMap<String, f64> = cache.read_json("data/positions.json").unwrap();
        assert_eq!(read, positions);

        let missing: Option<HashMap<String, f64>> = cache.read_json("data/nope.json");
        assert!(missing.is_none());
    }
}
