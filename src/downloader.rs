//! Catalog fetch and asset downloads
//!
//! Handles fetching the edition/audio catalogs from the network API,
//! downloading ebook HTML and the shared stylesheet, and streaming audiobook
//! parts to disk with progress events and cooperative cancellation. Each
//! completed audio file is recorded in a local manifest (size, sha256,
//! timestamp) so corrupted files can be detected and re-downloaded.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};

use crate::cache::{EbookCache, EBOOK_CSS_FILENAME};
use crate::models::{AudioQuality, AudioResource, EditionId, EditionResource};

/// Catalog and static asset URLs
pub const EDITIONS_API_URL: &str = "https://api.folioapp.org/app-editions/v1/en";
pub const AUDIOS_API_URL: &str = "https://api.folioapp.org/app-audios/v1/en";
pub const EBOOK_CSS_NETWORK_URL: &str = "https://cdn.folioapp.org/static/app-ebook.css";

const MANIFEST_FILENAME: &str = "downloads.local.json";

/// Record of completed downloads, stored in the data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalManifest {
    pub files: HashMap<String, LocalFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFile {
    pub size: u64,
    pub sha256: String,
    pub downloaded_at: String,
}

/// Download progress sent to the frontend while an audiobook downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDownloadProgress {
    pub edition_id: EditionId,
    pub part_index: usize,
    pub part_title: String,
    pub file_bytes_downloaded: u64,
    pub file_total_bytes: u64,
    pub overall_bytes_downloaded: u64,
    pub overall_total_bytes: u64,
    pub parts_completed: usize,
    pub parts_total: usize,
    pub state: DownloadState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Starting,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

/// Where downloaded and persisted data lives.
///
/// Platform data directory when available, a `data` folder next to the
/// executable otherwise. In development a `data` folder in the working
/// directory wins so repeated runs share one library.
pub fn get_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        let dev_path = PathBuf::from("data");
        if dev_path.exists() {
            return dev_path;
        }
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("Folio");
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join("data");
        }
    }

    PathBuf::from("data")
}

/// Fetch the edition catalog from the API.
pub async fn fetch_editions(client: &reqwest::Client) -> Result<Vec<EditionResource>> {
    let response = client
        .get(EDITIONS_API_URL)
        .send()
        .await
        .context("Failed to fetch editions catalog")?;

    if !response.status().is_success() {
        return Err(anyhow!("Failed to fetch editions: HTTP {}", response.status()));
    }

    let editions: Vec<EditionResource> = response
        .json()
        .await
        .context("Failed to parse editions catalog")?;

    Ok(editions)
}

/// Fetch the audiobook catalog from the API.
pub async fn fetch_audios(client: &reqwest::Client) -> Result<Vec<AudioResource>> {
    let response = client
        .get(AUDIOS_API_URL)
        .send()
        .await
        .context("Failed to fetch audio catalog")?;

    if !response.status().is_success() {
        return Err(anyhow!("Failed to fetch audios: HTTP {}", response.status()));
    }

    let audios: Vec<AudioResource> = response
        .json()
        .await
        .context("Failed to parse audio catalog")?;

    Ok(audios)
}

/// Download a fresh copy of an edition's ebook HTML and store it under its
/// revision-stamped filename, replacing any stale revision.
pub async fn download_ebook_html(
    client: &reqwest::Client,
    cache: &EbookCache,
    edition: &EditionResource,
) -> Result<String> {
    let response = client
        .get(&edition.ebook_url)
        .send()
        .await
        .with_context(|| format!("Failed to download ebook for {}", edition.id))?;

    if !response.status().is_success() {
        return Err(anyhow!("Ebook download failed: HTTP {}", response.status()));
    }

    let html = response.text().await.context("Failed to read ebook body")?;
    cache.write_ebook_html(&edition.id, &edition.revision, &html)?;
    Ok(html)
}

/// Refresh the shared ebook stylesheet. Downloads to a temp file first so a
/// failed transfer never clobbers the working copy.
pub async fn download_latest_ebook_css(client: &reqwest::Client, cache: &EbookCache) -> Result<()> {
    let response = client
        .get(EBOOK_CSS_NETWORK_URL)
        .send()
        .await
        .context("Failed to download ebook css")?;

    if !response.status().is_success() {
        return Err(anyhow!("Css download failed: HTTP {}", response.status()));
    }

    let css = response.text().await.context("Failed to read css body")?;
    let dest = cache.editions_dir().join(EBOOK_CSS_FILENAME);
    let temp = cache.editions_dir().join(format!("{EBOOK_CSS_FILENAME}.temp"));
    fs::write(&temp, css).with_context(|| format!("Failed to write {:?}", temp))?;
    fs::rename(&temp, &dest).with_context(|| format!("Failed to move css into {:?}", dest))?;
    Ok(())
}

/// Load the download manifest from the data directory.
pub fn load_local_manifest(data_dir: &Path) -> Option<LocalManifest> {
    let manifest_path = data_dir.join(MANIFEST_FILENAME);
    let content = fs::read_to_string(manifest_path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Save the download manifest to the data directory.
pub fn save_local_manifest(data_dir: &Path, manifest: &LocalManifest) -> Result<()> {
    let manifest_path = data_dir.join(MANIFEST_FILENAME);
    let content = serde_json::to_string_pretty(manifest)?;
    fs::write(&manifest_path, content)?;
    Ok(())
}

/// Hex sha256 of a file on disk.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file against an expected hash, accepting an optional `sha256:`
/// prefix on the expected value.
pub fn verify_file_hash(path: &Path, expected_hash: &str) -> Result<bool> {
    let expected = expected_hash.strip_prefix("sha256:").unwrap_or(expected_hash);
    Ok(file_sha256(path)? == expected)
}

/// Re-hash every manifest entry and drop files that no longer match.
/// Returns the filenames that were found corrupted or missing.
pub fn verify_audio_files(cache: &EbookCache) -> Result<Vec<String>> {
    let data_dir = cache.data_dir();
    let mut manifest = load_local_manifest(data_dir).unwrap_or_default();
    let mut bad: Vec<String> = Vec::new();

    for (name, record) in &manifest.files {
        let path = cache.audio_dir().join(name);
        if !path.exists() || !verify_file_hash(&path, &record.sha256)? {
            let _ = fs::remove_file(&path);
            bad.push(name.clone());
        }
    }

    for name in &bad {
        manifest.files.remove(name);
    }
    if !bad.is_empty() {
        save_local_manifest(data_dir, &manifest)?;
    }

    bad.sort();
    Ok(bad)
}

/// Download every missing part of an audiobook at the given quality,
/// streaming progress events and honoring cancellation.
pub async fn download_audio(
    client: &reqwest::Client,
    cache: &EbookCache,
    audio: &AudioResource,
    quality: AudioQuality,
    progress_tx: mpsc::Sender<AudioDownloadProgress>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let missing: Vec<_> = audio
        .parts
        .iter()
        .filter(|part| {
            let filename = audio.id.audio_part_filename(part.index, quality);
            !cache.audio_dir().join(filename).exists()
        })
        .collect();

    let overall_total: u64 = missing.iter().map(|part| part.size(quality)).sum();

    let mut progress = AudioDownloadProgress {
        edition_id: audio.id.clone(),
        part_index: 0,
        part_title: String::new(),
        file_bytes_downloaded: 0,
        file_total_bytes: 0,
        overall_bytes_downloaded: 0,
        overall_total_bytes: overall_total,
        parts_completed: 0,
        parts_total: missing.len(),
        state: DownloadState::Starting,
    };
    let _ = progress_tx.send(progress.clone()).await;

    let mut manifest = load_local_manifest(cache.data_dir()).unwrap_or_default();

    for part in missing {
        if *cancel_rx.borrow() {
            progress.state = DownloadState::Cancelled;
            let _ = progress_tx.send(progress).await;
            return Err(anyhow!("Download cancelled"));
        }

        let filename = audio.id.audio_part_filename(part.index, quality);
        let path = cache.audio_dir().join(&filename);

        progress.part_index = part.index;
        progress.part_title = part.title.clone();
        progress.file_bytes_downloaded = 0;
        progress.file_total_bytes = part.size(quality);
        progress.state = DownloadState::Downloading;
        let _ = progress_tx.send(progress.clone()).await;

        match download_file_with_progress(
            client,
            part.url(quality),
            &path,
            &progress_tx,
            &mut progress,
            cancel_rx,
        )
        .await
        {
            Ok(()) => {}
            Err(e) => {
                progress.state = if *cancel_rx.borrow() {
                    DownloadState::Cancelled
                } else {
                    DownloadState::Failed
                };
                let _ = progress_tx.send(progress).await;
                return Err(e);
            }
        }

        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        manifest.files.insert(
            filename,
            LocalFile {
                size,
                sha256: file_sha256(&path)?,
                downloaded_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        save_local_manifest(cache.data_dir(), &manifest)?;

        progress.parts_completed += 1;
    }

    progress.state = DownloadState::Completed;
    let _ = progress_tx.send(progress).await;

    Ok(())
}

/// Stream one file to disk, emitting a progress event per chunk.
async fn download_file_with_progress(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    progress_tx: &mpsc::Sender<AudioDownloadProgress>,
    progress: &mut AudioDownloadProgress,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to start download")?;

    if !response.status().is_success() {
        return Err(anyhow!("Download failed: HTTP {}", response.status()));
    }

    if let Some(content_length) = response.content_length() {
        progress.file_total_bytes = content_length;
    }

    let mut file = fs::File::create(path)?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if *cancel_rx.borrow() {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(anyhow!("Download cancelled"));
        }

        let chunk = chunk.context("Error reading chunk")?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;

        progress.file_bytes_downloaded = downloaded;
        progress.overall_bytes_downloaded += chunk.len() as u64;

        // ignore send errors, the channel may be closed
        let _ = progress_tx.send(progress.clone()).await;
    }

    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "folio-downloader-test-{}-{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sha256_and_verification() {
        let dir = test_dir("hash");
        let path = dir.join("part.mp3");
        fs::write(&path, b"some audio bytes").unwrap();

        let sha = file_sha256(&path).unwrap();
        assert_eq!(sha.len(), 64);
        assert!(verify_file_hash(&path, &sha).unwrap());
        assert!(verify_file_hash(&path, &format!("sha256:{sha}")).unwrap());
        assert!(!verify_file_hash(&path, "sha256:deadbeef").unwrap());
    }

    #[test]
    fn manifest_roundtrip() {
        let dir = test_dir("manifest");
        assert!(load_local_manifest(&dir).is_none());

        let mut manifest = LocalManifest::default();
        manifest.files.insert(
            "doc--original--0--hq.mp3".to_string(),
            LocalFile {
                size: 1234,
                sha256: "abc".to_string(),
                downloaded_at: "2024-01-01T00:00:00Z".to_string(),
            },
        );
        save_local_manifest(&dir, &manifest).unwrap();

        let loaded = load_local_manifest(&dir).unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files["doc--original--0--hq.mp3"].size, 1234);
    }

    #[test]
    fn corrupted_audio_is_detected_and_removed() {
        let dir = test_dir("verify");
        let cache = EbookCache::new(dir.clone(), 4);
        cache.create_layout().unwrap();

        let good = cache.audio_dir().join("doc--original--0--hq.mp3");
        let bad = cache.audio_dir().join("doc--original--1--hq.mp3");
        fs::write(&good, b"good bytes").unwrap();
        fs::write(&bad, b"original bytes").unwrap();

        let mut manifest = LocalManifest::default();
        for (name, path) in [
            ("doc--original--0--hq.mp3", &good),
            ("doc--original--1--hq.mp3", &bad),
        ] {
            manifest.files.insert(
                name.to_string(),
                LocalFile {
                    size: 10,
                    sha256: file_sha256(path).unwrap(),
                    downloaded_at: "2024-01-01T00:00:00Z".to_string(),
                },
            );
        }
        save_local_manifest(&dir, &manifest).unwrap();

        fs::write(&bad, b"truncated").unwrap();

        let corrupted = verify_audio_files(&cache).unwrap();
        assert_eq!(corrupted, vec!["doc--original--1--hq.mp3".to_string()]);
        assert!(good.exists());
        assert!(!bad.exists());

        let manifest = load_local_manifest(&dir).unwrap();
        assert!(manifest.files.contains_key("doc--original--0--hq.mp3"));
        assert!(!manifest.files.contains_key("doc--original--1--hq.mp3"));
    }
}
