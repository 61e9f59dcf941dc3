//! Error types for Folio

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("Search error: {0}")]
    Search(String),

    #[error("Ebook error: {0}")]
    Ebook(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Library not ready: {0}")]
    NotReady(String),

    #[error("{0}")]
    Other(String),
}

impl serde::Serialize for FolioError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
