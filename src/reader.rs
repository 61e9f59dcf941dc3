//! Ebook source resolution for the read screen
//!
//! Decides where the HTML and CSS for a requested edition come from: the
//! filesystem copy when it is current (or when offline), a fresh download
//! when the copy is stale, and the stale copy again when that download
//! fails. Pure over its inputs so the decision table stays testable; the
//! command layer supplies the filesystem reads and the download closure.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::downloader::EBOOK_CSS_NETWORK_URL;
use crate::models::{EbookData, EditionResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EbookLoadError {
    NoInternet,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbookSource {
    pub html: String,
    pub css: String,
}

/// Resolve the document served to the read screen's webview.
///
/// `download_fresh` is only awaited when the filesystem copy is missing or
/// stale and the network is reachable; it resolves to `None` on failure.
pub async fn ebook_source<F, Fut>(
    edition: &EditionResource,
    network_connected: bool,
    fs_data: Option<EbookData>,
    fs_css: Option<String>,
    download_fresh: F,
) -> Result<EbookSource, EbookLoadError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let css = match fs_css {
        Some(css) => format!("<style>{css}</style>"),
        None => format!(r#"<link rel="stylesheet" href="{EBOOK_CSS_NETWORK_URL}">"#),
    };

    if let Some(ref data) = fs_data {
        if data.sha == edition.revision || !network_connected {
            return Ok(EbookSource {
                html: data.inner_html.clone(),
                css,
            });
        }
    }

    if !network_connected {
        return Err(EbookLoadError::NoInternet);
    }

    // filesystem copy is missing or stale, try for a fresh one
    match download_fresh().await {
        Some(html) => Ok(EbookSource { html, css }),
        None => match fs_data {
            Some(data) => Ok(EbookSource {
                html: data.inner_html,
                css,
            }),
            None => Err(EbookLoadError::Unknown),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditionId, EditionType};
    use std::sync::atomic::{AtomicBool, Ordering};

    const CONNECTED: bool = true;
    const NOT_CONNECTED: bool = false;

    fn edition() -> EditionResource {
        EditionResource {
            id: EditionId::new("doc--updated"),
            edition_type: EditionType::Updated,
            title: "A Journal".to_string(),
            author: "Jane Doe".to_string(),
            description: "desc".to_string(),
            revision: "latest-sha".to_string(),
            ebook_url: "https://cdn/doc--updated.html".to_string(),
            is_most_modernized: true,
            square_cover_image_url: None,
            chapters: vec![],
        }
    }

    fn fs_data(sha: &str, html: &str) -> Option<EbookData> {
        Some(EbookData {
            sha: sha.to_string(),
            inner_html: html.to_string(),
        })
    }

    #[tokio::test]
    async fn returns_fs_data_when_current() {
        let downloaded = AtomicBool::new(false);
        let source = ebook_source(
            &edition(),
            CONNECTED,
            fs_data("latest-sha", "html"),
            Some("fs_css".to_string()),
            || async {
                downloaded.store(true, Ordering::SeqCst);
                Some("fresh_html".to_string())
            },
        )
        .await
        .unwrap();

        assert_eq!(source.html, "html");
        assert_eq!(source.css, "<style>fs_css</style>");
        assert!(!downloaded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn uses_network_css_link_when_no_fs_css() {
        let source = ebook_source(
            &edition(),
            CONNECTED,
            fs_data("latest-sha", "html"),
            None,
            || async { None },
        )
        .await
        .unwrap();

        assert_eq!(
            source.css,
            format!(r#"<link rel="stylesheet" href="{EBOOK_CSS_NETWORK_URL}">"#)
        );
    }

    #[tokio::test]
    async fn returns_stale_fs_data_when_not_connected() {
        let source = ebook_source(
            &edition(),
            NOT_CONNECTED,
            fs_data("old-sha", "stale"),
            Some("fs_css".to_string()),
            || async { Some("fresh_html".to_string()) },
        )
        .await
        .unwrap();

        assert_eq!(source.html, "stale");
    }

    #[tokio::test]
    async fn returns_stale_fs_data_when_fresh_download_fails() {
        let source = ebook_source(
            &edition(),
            CONNECTED,
            fs_data("old-sha", "stale"),
            Some("fs_css".to_string()),
            || async { None },
        )
        .await
        .unwrap();

        assert_eq!(source.html, "stale");
    }

    #[tokio::test]
    async fn returns_fresh_html_when_fs_data_is_stale() {
        let source = ebook_source(
            &edition(),
            CONNECTED,
            fs_data("old-sha", "stale"),
            Some("fs_css".to_string()),
            || async { Some("fresh_html".to_string()) },
        )
        .await
        .unwrap();

        assert_eq!(source.html, "fresh_html");
    }

    #[tokio::test]
    async fn errors_no_internet_when_nothing_cached_and_offline() {
        let result = ebook_source(
            &edition(),
            NOT_CONNECTED,
            None,
            Some("fs_css".to_string()),
            || async { None },
        )
        .await;

        assert_eq!(result, Err(EbookLoadError::NoInternet));
    }

    #[tokio::test]
    async fn errors_unknown_when_nothing_cached_and_download_fails() {
        let result = ebook_source(
            &edition(),
            CONNECTED,
            None,
            Some("fs_css".to_string()),
            || async { None },
        )
        .await;

        assert_eq!(result, Err(EbookLoadError::Unknown));
    }

    #[tokio::test]
    async fn returns_fresh_html_when_nothing_cached_and_download_succeeds() {
        let source = ebook_source(&edition(), CONNECTED, None, Some("fs_css".to_string()), || async {
            Some("fresh_html".to_string())
        })
        .await
        .unwrap();

        assert_eq!(source.html, "fresh_html");
        assert_eq!(source.css, "<style>fs_css</style>");
    }
}
