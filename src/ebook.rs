//! Ebook markup parsing
//!
//! Stored ebook HTML is split into searchable elements: block-level elements
//! carrying an `id` attribute, in document order. Each element keeps both its
//! inner markup (for the navigation-time markup search pass) and a plain-text
//! rendering (for the overlay pass). Plain text preserves internal whitespace
//! so offsets within an element are stable between the two passes.

use std::sync::OnceLock;

use regex_lite::Regex;

/// One searchable block of the rendered ebook, addressed by its DOM id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbookElement {
    pub id: String,
    pub inner_html: String,
    pub plain_text: String,
}

static BLOCK_ELEMENT: OnceLock<Regex> = OnceLock::new();
static TAG: OnceLock<Regex> = OnceLock::new();

fn block_element() -> &'static Regex {
    BLOCK_ELEMENT.get_or_init(|| {
        Regex::new(
            r#"(?s)<(?:p|h[1-6]|blockquote|li)\b[^>]*\sid="([^"]*)"[^>]*>(.*?)</(?:p|h[1-6]|blockquote|li)>"#,
        )
        .unwrap()
    })
}

fn tag() -> &'static Regex {
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

/// Extract the searchable elements of an ebook document. Blocks without an
/// `id` attribute cannot be navigated to, so they are skipped.
pub fn parse_elements(html: &str) -> Vec<EbookElement> {
    block_element()
        .captures_iter(html)
        .map(|caps| {
            let inner_html = caps[2].to_string();
            EbookElement {
                id: caps[1].to_string(),
                plain_text: plain_text(&inner_html),
                inner_html,
            }
        })
        .collect()
}

/// Strip tags and decode the handful of entities the publishing pipeline
/// emits.
pub fn plain_text(html: &str) -> String {
    let stripped = tag().replace_all(html, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
