//! Application state management

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::EbookCache;
use crate::models::{AudioQuality, AudioResource, EbookColorScheme, EditionId, EditionResource};

/// Parsed ebooks kept in memory at once
const DEFAULT_EBOOK_CACHE_CAPACITY: usize = 20;

/// Persisted user state, relative to the data directory
const STATE_FILE: &str = "data/state.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub ebook_color_scheme: EbookColorScheme,
    pub ebook_font_size: u8,
    pub audio_quality: AudioQuality,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            ebook_color_scheme: EbookColorScheme::White,
            ebook_font_size: 5,
            audio_quality: AudioQuality::Hq,
        }
    }
}

/// Everything that survives an app restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub preferences: Preferences,
    /// Scroll position per edition, 0.0 - 1.0.
    pub ebook_positions: HashMap<EditionId, f64>,
    pub last_ebook_edition_id: Option<EditionId>,
}

/// In-memory copy of the resource catalogs, keyed by edition id.
#[derive(Default)]
pub struct Catalog {
    pub editions: HashMap<EditionId, EditionResource>,
    pub audios: HashMap<EditionId, AudioResource>,
}

/// Application state holding the ebook cache, catalogs, and persisted
/// user state.
pub struct AppState {
    pub ebook_cache: Arc<EbookCache>,
    pub data_dir: PathBuf,
    pub client: reqwest::Client,
    catalog: RwLock<Catalog>,
    persisted: Mutex<PersistedState>,
}

impl AppState {
    /// Initialize application state, creating the on-disk layout on first
    /// run and loading persisted user state.
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        let ebook_cache = Arc::new(EbookCache::new(data_dir.clone(), DEFAULT_EBOOK_CACHE_CAPACITY));
        ebook_cache.create_layout()?;

        let persisted: PersistedState = ebook_cache.read_json(STATE_FILE).unwrap_or_default();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            ebook_cache,
            data_dir,
            client,
            catalog: RwLock::new(Catalog::default()),
            persisted: Mutex::new(persisted),
        })
    }

    pub fn set_catalog(&self, editions: Vec<EditionResource>, audios: Vec<AudioResource>) {
        let mut catalog = self.catalog.write().unwrap();
        catalog.editions = editions.into_iter().map(|e| (e.id.clone(), e)).collect();
        catalog.audios = audios.into_iter().map(|a| (a.id.clone(), a)).collect();
    }

    pub fn edition(&self, id: &EditionId) -> Option<EditionResource> {
        self.catalog.read().unwrap().editions.get(id).cloned()
    }

    pub fn audio(&self, id: &EditionId) -> Option<AudioResource> {
        self.catalog.read().unwrap().audios.get(id).cloned()
    }

    pub fn editions(&self) -> Vec<EditionResource> {
        let mut editions: Vec<_> = self.catalog.read().unwrap().editions.values().cloned().collect();
        editions.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        editions
    }

    pub fn audios(&self) -> Vec<AudioResource> {
        let mut audios: Vec<_> = self.catalog.read().unwrap().audios.values().cloned().collect();
        audios.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        audios
    }

    pub fn preferences(&self) -> Preferences {
        self.persisted.lock().unwrap().preferences
    }

    pub fn set_preferences(&self, preferences: Preferences) -> Result<()> {
        let mut persisted = self.persisted.lock().unwrap();
        persisted.preferences = preferences;
        self.save(&persisted)
    }

    pub fn ebook_position(&self, id: &EditionId) -> f64 {
        self.persisted
            .lock()
            .unwrap()
            .ebook_positions
            .get(id)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_ebook_position(&self, id: &EditionId, position: f64) -> Result<()> {
        let mut persisted = self.persisted.lock().unwrap();
        persisted
            .ebook_positions
            .insert(id.clone(), position.clamp(0.0, 1.0));
        persisted.last_ebook_edition_id = Some(id.clone());
        self.save(&persisted)
    }

    fn save(&self, persisted: &PersistedState) -> Result<()> {
        self.ebook_cache.write_json(STATE_FILE, persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "folio-state-test-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn default_preferences() {
        let prefs = Preferences::default();
        assert_eq!(prefs.ebook_color_scheme, EbookColorScheme::White);
        assert_eq!(prefs.ebook_font_size, 5);
        assert_eq!(prefs.audio_quality, AudioQuality::Hq);
    }

    #[test]
    fn positions_survive_restart() {
        let dir = test_data_dir("positions");
        let id = EditionId::new("doc--updated");

        {
            let state = AppState::new(dir.clone()).unwrap();
            assert_eq!(state.ebook_position(&id), 0.0);
            state.set_ebook_position(&id, 0.37).unwrap();
            assert_eq!(state.ebook_position(&id), 0.37);
        }

        let state = AppState::new(dir).unwrap();
        assert_eq!(state.ebook_position(&id), 0.37);
    }

    #[test]
    fn positions_are_clamped() {
        let dir = test_data_dir("clamp");
        let id = EditionId::new("doc--updated");
        let state = AppState::new(dir).unwrap();
        state.set_ebook_position(&id, 1.7).unwrap();
        assert_eq!(state.ebook_position(&id), 1.0);
    }

    #[test]
    fn preferences_survive_restart() {
        let dir = test_data_dir("prefs");

        {
            let state = AppState::new(dir.clone()).unwrap();
            state
                .set_preferences(Preferences {
                    ebook_color_scheme: EbookColorScheme::Sepia,
                    ebook_font_size: 7,
                    audio_quality: AudioQuality::Lq,
                })
                .unwrap();
        }

        let state = AppState::new(dir).unwrap();
        let prefs = state.preferences();
        assert_eq!(prefs.ebook_color_scheme, EbookColorScheme::Sepia);
        assert_eq!(prefs.ebook_font_size, 7);
        assert_eq!(prefs.audio_quality, AudioQuality::Lq);
    }
}
