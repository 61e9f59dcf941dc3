//! Tauri commands for frontend communication

use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tauri::{AppHandle, Emitter, State};

use crate::downloader::{self, AudioDownloadProgress};
use crate::error::FolioError;
use crate::models::{AudioQuality, AudioResource, EditionId, EditionResource, TrackData};
use crate::reader::{self, EbookLoadError, EbookSource};
use crate::search::{self, EditionSearchResults, SearchHit};
use crate::state::{AppState, Preferences};

/// Managed app state; `None` until the data directory could be initialized.
pub type ManagedAppState = Arc<RwLock<Option<Arc<AppState>>>>;

static DOWNLOAD_CANCEL_TX: Mutex<Option<tokio::sync::watch::Sender<bool>>> = Mutex::new(None);

/// Helper to get AppState or return error if not ready
fn require_state(state: &ManagedAppState) -> Result<Arc<AppState>, FolioError> {
    let guard = state
        .read()
        .map_err(|_| FolioError::Other("Failed to acquire state lock".to_string()))?;
    guard.clone().ok_or_else(|| {
        FolioError::NotReady("Data directory could not be initialized.".to_string())
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogCounts {
    pub editions: usize,
    pub audios: usize,
}

/// Refresh the edition and audiobook catalogs from the network.
#[tauri::command]
pub async fn fetch_catalog(state: State<'_, ManagedAppState>) -> Result<CatalogCounts, FolioError> {
    let app_state = require_state(&state)?;

    let editions = downloader::fetch_editions(&app_state.client)
        .await
        .map_err(|e| FolioError::Network(e.to_string()))?;
    let audios = downloader::fetch_audios(&app_state.client)
        .await
        .map_err(|e| FolioError::Network(e.to_string()))?;

    let counts = CatalogCounts {
        editions: editions.len(),
        audios: audios.len(),
    };
    app_state.set_catalog(editions, audios);
    Ok(counts)
}

#[tauri::command]
pub fn get_editions(state: State<'_, ManagedAppState>) -> Result<Vec<EditionResource>, FolioError> {
    Ok(require_state(&state)?.editions())
}

#[tauri::command]
pub fn get_audios(state: State<'_, ManagedAppState>) -> Result<Vec<AudioResource>, FolioError> {
    Ok(require_state(&state)?.audios())
}

/// Search an edition's text for the overlay.
#[tauri::command]
pub async fn search_edition(
    state: State<'_, ManagedAppState>,
    edition_id: String,
    query: String,
) -> Result<EditionSearchResults, FolioError> {
    let app_state = require_state(&state)?;
    let cache = Arc::clone(&app_state.ebook_cache);
    let edition_id = EditionId::new(edition_id);

    // CPU-bound scan of the whole document, keep it off the main runtime
    tokio::task::spawn_blocking(move || {
        let ebook = cache
            .get(&edition_id)
            .map_err(|e| FolioError::Ebook(e.to_string()))?
            .ok_or_else(|| FolioError::NotFound(format!("No stored ebook for {edition_id}")))?;
        Ok(search::search_elements(&query, &ebook.elements))
    })
    .await
    .map_err(|e| FolioError::Search(format!("Task join error: {e}")))?
}

/// Re-run a recorded search hit against the element's markup so the result
/// can be highlighted with inline formatting intact. `None` tells the
/// frontend to fall back to plain-text substitution.
#[tauri::command]
pub async fn resolve_search_result(
    state: State<'_, ManagedAppState>,
    edition_id: String,
    query: String,
    element_id: String,
    sibling_index: usize,
) -> Result<Option<SearchHit>, FolioError> {
    let app_state = require_state(&state)?;
    let cache = Arc::clone(&app_state.ebook_cache);
    let edition_id = EditionId::new(edition_id);

    tokio::task::spawn_blocking(move || {
        let ebook = cache
            .get(&edition_id)
            .map_err(|e| FolioError::Ebook(e.to_string()))?
            .ok_or_else(|| FolioError::NotFound(format!("No stored ebook for {edition_id}")))?;
        let element = ebook
            .elements
            .iter()
            .find(|e| e.id == element_id)
            .ok_or_else(|| FolioError::NotFound(format!("No element {element_id}")))?;
        Ok(search::resolve_markup_match(&query, element, sibling_index))
    })
    .await
    .map_err(|e| FolioError::Search(format!("Task join error: {e}")))?
}

/// Resolve the html/css served to the read screen.
#[tauri::command]
pub async fn ebook_source(
    state: State<'_, ManagedAppState>,
    edition_id: String,
    network_connected: bool,
) -> Result<EbookSource, EbookLoadError> {
    let Ok(app_state) = require_state(&state) else {
        return Err(EbookLoadError::Unknown);
    };
    let edition_id = EditionId::new(edition_id);
    let Some(edition) = app_state.edition(&edition_id) else {
        return Err(EbookLoadError::Unknown);
    };

    let fs_data = app_state.ebook_cache.ebook_data(&edition.id).unwrap_or(None);
    let fs_css = app_state.ebook_cache.ebook_css();

    // missing css gets refreshed in the background for the next load
    if fs_css.is_none() && network_connected {
        let client = app_state.client.clone();
        let cache = Arc::clone(&app_state.ebook_cache);
        tokio::spawn(async move {
            if let Err(e) = downloader::download_latest_ebook_css(&client, &cache).await {
                eprintln!("Failed to refresh ebook css: {e}");
            }
        });
    }

    let client = app_state.client.clone();
    let cache = Arc::clone(&app_state.ebook_cache);
    let fresh_edition = edition.clone();
    reader::ebook_source(&edition, network_connected, fs_data, fs_css, move || async move {
        downloader::download_ebook_html(&client, &cache, &fresh_edition)
            .await
            .ok()
    })
    .await
}

/// Download every missing part of an audiobook, emitting
/// "audio-download-progress" events.
#[tauri::command]
pub async fn start_audio_download(
    app: AppHandle,
    state: State<'_, ManagedAppState>,
    edition_id: String,
    quality: Option<AudioQuality>,
) -> Result<(), FolioError> {
    let app_state = require_state(&state)?;
    let edition_id = EditionId::new(edition_id);
    let audio = app_state
        .audio(&edition_id)
        .ok_or_else(|| FolioError::NotFound(format!("No audiobook for {edition_id}")))?;
    let quality = quality.unwrap_or_else(|| app_state.preferences().audio_quality);

    let (progress_tx, mut progress_rx) =
        tokio::sync::mpsc::channel::<AudioDownloadProgress>(100);
    let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);

    {
        let mut guard = DOWNLOAD_CANCEL_TX.lock().unwrap();
        *guard = Some(cancel_tx);
    }

    // forward progress to window events
    let app_clone = app.clone();
    tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            let _ = app_clone.emit("audio-download-progress", &progress);
        }
    });

    let result = downloader::download_audio(
        &app_state.client,
        &app_state.ebook_cache,
        &audio,
        quality,
        progress_tx,
        &mut cancel_rx,
    )
    .await;

    // give the forwarder time to deliver the final event
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    {
        let mut guard = DOWNLOAD_CANCEL_TX.lock().unwrap();
        *guard = None;
    }

    result.map_err(|e| FolioError::Download(e.to_string()))
}

#[tauri::command]
pub fn cancel_audio_download() -> Result<(), FolioError> {
    let guard = DOWNLOAD_CANCEL_TX.lock().unwrap();
    match guard.as_ref() {
        Some(tx) => tx
            .send(true)
            .map_err(|_| FolioError::Download("Download already finished".to_string())),
        None => Err(FolioError::Download("No download in progress".to_string())),
    }
}

#[tauri::command]
pub fn downloaded_audio_parts(
    state: State<'_, ManagedAppState>,
    edition_id: String,
    quality: Option<AudioQuality>,
) -> Result<Vec<usize>, FolioError> {
    let app_state = require_state(&state)?;
    let edition_id = EditionId::new(edition_id);
    let quality = quality.unwrap_or_else(|| app_state.preferences().audio_quality);
    Ok(app_state
        .ebook_cache
        .downloaded_audio_parts(&edition_id, quality))
}

/// Queue rows for the platform audio player.
#[tauri::command]
pub fn audio_tracks(
    state: State<'_, ManagedAppState>,
    edition_id: String,
    quality: Option<AudioQuality>,
) -> Result<Vec<TrackData>, FolioError> {
    let app_state = require_state(&state)?;
    let edition_id = EditionId::new(edition_id);
    let audio = app_state
        .audio(&edition_id)
        .ok_or_else(|| FolioError::NotFound(format!("No audiobook for {edition_id}")))?;
    let quality = quality.unwrap_or_else(|| app_state.preferences().audio_quality);

    let tracks = audio
        .parts
        .iter()
        .map(|part| {
            let filename = audio.id.audio_part_filename(part.index, quality);
            TrackData {
                id: audio.id.track_id(part.index),
                filepath: app_state
                    .ebook_cache
                    .audio_dir()
                    .join(filename)
                    .to_string_lossy()
                    .into_owned(),
                title: part.title.clone(),
                artist: audio.artist.clone(),
                artwork_url: audio.artwork_url.clone(),
                album: audio.title.clone(),
                duration: part.duration,
            }
        })
        .collect();
    Ok(tracks)
}

#[tauri::command]
pub fn delete_audio_files(
    state: State<'_, ManagedAppState>,
    edition_id: String,
) -> Result<usize, FolioError> {
    let app_state = require_state(&state)?;
    app_state
        .ebook_cache
        .delete_audio_files(&EditionId::new(edition_id))
        .map_err(|e| FolioError::Other(e.to_string()))
}

#[tauri::command]
pub fn delete_all_audio(state: State<'_, ManagedAppState>) -> Result<usize, FolioError> {
    let app_state = require_state(&state)?;
    app_state
        .ebook_cache
        .delete_all_audio()
        .map_err(|e| FolioError::Other(e.to_string()))
}

/// Re-hash downloaded audio and drop corrupted files. Returns the filenames
/// that were removed so the frontend can offer a re-download.
#[tauri::command]
pub async fn verify_audio_files(
    state: State<'_, ManagedAppState>,
) -> Result<Vec<String>, FolioError> {
    let app_state = require_state(&state)?;
    let cache = Arc::clone(&app_state.ebook_cache);

    tokio::task::spawn_blocking(move || {
        downloader::verify_audio_files(&cache).map_err(|e| FolioError::Other(e.to_string()))
    })
    .await
    .map_err(|e| FolioError::Other(format!("Task join error: {e}")))?
}

#[tauri::command]
pub fn get_preferences(state: State<'_, ManagedAppState>) -> Result<Preferences, FolioError> {
    Ok(require_state(&state)?.preferences())
}

#[tauri::command]
pub fn set_preferences(
    state: State<'_, ManagedAppState>,
    preferences: Preferences,
) -> Result<(), FolioError> {
    require_state(&state)?
        .set_preferences(preferences)
        .map_err(|e| FolioError::Other(e.to_string()))
}

#[tauri::command]
pub fn get_ebook_position(
    state: State<'_, ManagedAppState>,
    edition_id: String,
) -> Result<f64, FolioError> {
    Ok(require_state(&state)?.ebook_position(&EditionId::new(edition_id)))
}

#[tauri::command]
pub fn set_ebook_position(
    state: State<'_, ManagedAppState>,
    edition_id: String,
    position: f64,
) -> Result<(), FolioError> {
    require_state(&state)?
        .set_ebook_position(&EditionId::new(edition_id), position)
        .map_err(|e| FolioError::Other(e.to_string()))
}

#[tauri::command]
pub fn get_cache_stats(state: State<'_, ManagedAppState>) -> Result<(usize, usize), FolioError> {
    Ok(require_state(&state)?.ebook_cache.stats())
}

#[tauri::command]
pub fn clear_ebook_cache(state: State<'_, ManagedAppState>) -> Result<(), FolioError> {
    require_state(&state)?.ebook_cache.clear();
    Ok(())
}

#[tauri::command]
pub fn get_data_directory() -> Result<String, FolioError> {
    Ok(downloader::get_data_dir().to_string_lossy().into_owned())
}

/// Retry state initialization, e.g. after the user frees up storage.
#[tauri::command]
pub fn reload_app_state(state: State<'_, ManagedAppState>) -> Result<bool, FolioError> {
    let data_dir = downloader::get_data_dir();
    match AppState::new(data_dir) {
        Ok(new_state) => {
            let mut guard = state
                .write()
                .map_err(|_| FolioError::Other("Failed to acquire state lock".to_string()))?;
            *guard = Some(Arc::new(new_state));
            Ok(true)
        }
        Err(e) => {
            eprintln!("Failed to reload app state: {e}");
            Ok(false)
        }
    }
}
