//! Folio - mobile reading and listening application
//!
//! Native core behind the webview UI: the in-text search engine, the ebook
//! cache and filesystem layout, catalog and asset downloads, and persisted
//! user state, exposed to the frontend through Tauri commands.

pub mod cache;
pub mod commands;
pub mod downloader;
pub mod ebook;
pub mod error;
pub mod models;
pub mod reader;
pub mod search;
pub mod state;

pub use cache::{CachedEbook, EbookCache};
pub use commands::ManagedAppState;
pub use downloader::{
    download_audio, download_ebook_html, download_latest_ebook_css, fetch_audios, fetch_editions,
    get_data_dir, load_local_manifest, save_local_manifest, verify_file_hash,
    AudioDownloadProgress, DownloadState, LocalManifest,
};
pub use ebook::{parse_elements, EbookElement};
pub use error::FolioError;
pub use models::{
    AudioPart, AudioQuality, AudioResource, Chapter, EbookColorScheme, EbookData, EditionId,
    EditionResource, EditionType, TrackData,
};
pub use reader::{ebook_source, EbookLoadError, EbookSource};
pub use search::{
    resolve_markup_match, search, search_elements, EditionSearchResult, EditionSearchResults,
    SearchHit, MAX_RESULTS,
};
pub use state::{AppState, Preferences};

use std::sync::{Arc, RwLock};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let data_dir = downloader::get_data_dir();
    println!("Using data directory: {:?}", data_dir);

    // If the layout can't be created the app starts anyway and the frontend
    // retries through reload_app_state once storage is available.
    let app_state: ManagedAppState = Arc::new(RwLock::new(match AppState::new(data_dir) {
        Ok(state) => Some(Arc::new(state)),
        Err(e) => {
            eprintln!("Data directory not ready: {e}");
            None
        }
    }));

    tauri::Builder::default()
        .plugin(tauri_plugin_fs::init())
        .manage(app_state)
        .invoke_handler(tauri::generate_handler![
            commands::fetch_catalog,
            commands::get_editions,
            commands::get_audios,
            commands::search_edition,
            commands::resolve_search_result,
            commands::ebook_source,
            commands::start_audio_download,
            commands::cancel_audio_download,
            commands::downloaded_audio_parts,
            commands::audio_tracks,
            commands::delete_audio_files,
            commands::delete_all_audio,
            commands::verify_audio_files,
            commands::get_preferences,
            commands::set_preferences,
            commands::get_ebook_position,
            commands::set_ebook_position,
            commands::get_cache_stats,
            commands::clear_ebook_cache,
            commands::get_data_directory,
            commands::reload_app_state,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
