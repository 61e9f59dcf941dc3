//! In-text search over chapter text and markup
//!
//! One pure function locates a query phrase inside a source string and builds
//! word-boundary-safe excerpts around each occurrence. The same function runs
//! against extracted plain text (results overlay) and against an element's
//! inner markup (navigation highlighting), and the two passes must agree on
//! offsets and trimming exactly, since results are correlated by sibling index.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::ebook::EbookElement;

/// Max results materialized for the overlay; the full hit count is still
/// reported so the UI can say "First 50 Results".
pub const MAX_RESULTS: usize = 50;

const BEFORE_MAX: usize = 30;
const AFTER_MAX: usize = 60;

static FOOTNOTE_MARKER: OnceLock<Regex> = OnceLock::new();

/// Footnote markers like ` [3] ` are display artifacts of the webview, not
/// part of the text proper, so excerpts drop them.
fn footnote_marker() -> &'static Regex {
    FOOTNOTE_MARKER.get_or_init(|| Regex::new(r"\s*\[\d+\]\s*").unwrap())
}

/// One occurrence of the query within a source string.
///
/// `start`/`end` are a half-open character range into the original source,
/// and `match` is exactly that slice with original casing. The field set and
/// names are shared with the webview-side pass and must not drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub before: String,
    #[serde(rename = "match")]
    pub matched: String,
    pub after: String,
    pub start: usize,
    pub end: usize,
}

/// Find every non-overlapping occurrence of `query` in `source`, scanning
/// from character offset `offset`.
///
/// The query is treated as an ordered sequence of whitespace-delimited words
/// which must appear in order, separated by at most 3 non-letter characters.
/// Matching is case-insensitive; returned text preserves the source's case.
/// Every failure mode (empty query, absent word, boundary or gap violation)
/// yields no results rather than an error.
pub fn search(query: &str, source: &str, offset: usize) -> Vec<SearchHit> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let src: Vec<char> = source.chars().collect();
    let lower: Vec<char> = src.iter().map(|&c| fold_char(c)).collect();
    let words: Vec<Vec<char>> = query
        .split_whitespace()
        .map(|w| w.chars().map(fold_char).collect())
        .collect();

    let mut hits = Vec::new();
    let mut cursor = offset;

    'scan: while cursor + 1 < src.len() {
        let mut spans: Vec<(usize, usize)> = Vec::with_capacity(words.len());

        for (word_index, word) in words.iter().enumerate() {
            let from = spans.last().map_or(cursor, |&(_, end)| end);
            let Some(found) = find_sub(&lower[from..], word) else {
                // this word occurs nowhere in the remaining text
                break 'scan;
            };
            let start = from + found;

            // reject matching `light` inside `slight`, resume past it
            if start > 0 && src[start - 1].is_ascii_alphabetic() {
                cursor = start + word.len();
                continue 'scan;
            }

            if word_index > 0 {
                let prev_end = spans[word_index - 1].1;
                let gap = &src[prev_end..start];
                if gap.len() > 3 || gap.iter().any(|c| c.is_ascii_alphabetic()) {
                    cursor = prev_end;
                    continue 'scan;
                }
            }

            let mut end = start + word.len();

            // reject matching `foo` inside `foot`, resume past it
            if src.get(end).is_some_and(|c| c.is_ascii_lowercase()) {
                cursor = start + word.len();
                continue 'scan;
            }

            // pull in trailing glue like `'s` from `Bob's` when matching `Bob`
            if absorbs_glue(&src, end) {
                end += 2;
            }

            spans.push((start, end));
        }

        let first_start = spans[0].0;
        let last_end = spans[spans.len() - 1].1;

        let before: String = src[..first_start].iter().collect();
        let matched: String = src[first_start..last_end].iter().collect();
        let after: String = src[last_end..].iter().collect();

        hits.push(SearchHit {
            before: prepare_context(before.trim(), Context::Before),
            matched: matched.trim().to_string(),
            after: prepare_context(after.trim(), Context::After),
            start: first_start,
            end: last_end,
        });

        cursor = last_end;
    }

    hits
}

enum Context {
    Before,
    After,
}

/// Truncate surrounding text to whole words within the excerpt budget:
/// trailing words of `before` text, leading words of `after` text.
fn prepare_context(text: &str, dir: Context) -> String {
    let mut trimmed = String::new();
    let mut len = 0usize;

    match dir {
        Context::Before => {
            for word in text.split_whitespace().rev() {
                let word_len = word.chars().count();
                if len + word_len + 1 < BEFORE_MAX {
                    trimmed = format!("{word} {trimmed}");
                    len += word_len + 1;
                } else {
                    break;
                }
            }
        }
        Context::After => {
            for word in text.split_whitespace() {
                let word_len = word.chars().count();
                if len + word_len + 1 < AFTER_MAX {
                    trimmed.push(' ');
                    trimmed.push_str(word);
                    len += word_len + 1;
                } else {
                    break;
                }
            }
        }
    }

    footnote_marker().replace(trimmed.trim(), "").into_owned()
}

/// Does the text at `end` look like `'s` in `Bob's`? Pattern: one character
/// that is neither a lowercase letter nor a space, one lowercase letter, then
/// a word boundary, all within a 3-character lookahead window.
fn absorbs_glue(src: &[char], end: usize) -> bool {
    let Some(&c0) = src.get(end) else {
        return false;
    };
    if c0.is_ascii_lowercase() || c0 == ' ' {
        return false;
    }
    let Some(&c1) = src.get(end + 1) else {
        return false;
    };
    if !c1.is_ascii_lowercase() {
        return false;
    }
    match src.get(end + 2) {
        None => true,
        Some(&c2) => !(c2.is_ascii_alphanumeric() || c2 == '_'),
    }
}

fn find_sub(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Single-char case fold. `to_lowercase` can expand for exotic scripts, which
/// would desynchronize offsets, so only the first folded char is kept.
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// One overlay row: a hit decorated with where it lives in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditionSearchResult {
    pub element_id: String,
    /// Ordinal of this hit among all hits within the same element, used to
    /// re-identify the hit when the markup pass runs at navigation time.
    pub sibling_index: usize,
    pub sibling_count: usize,
    /// Position of the hit within the whole document text, 0-100, one
    /// decimal place. Rendered directly by the overlay, so early hits show
    /// as e.g. 0.2% rather than collapsing to 0%.
    pub percentage: f64,
    pub before: String,
    #[serde(rename = "match")]
    pub matched: String,
    pub after: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditionSearchResults {
    pub query: String,
    /// Uncapped hit count; `results` holds at most [`MAX_RESULTS`] rows.
    pub total_hits: usize,
    pub results: Vec<EditionSearchResult>,
    pub elapsed_ms: u64,
}

/// Run the engine over every element's plain text in document order,
/// decorating each hit with its element, sibling ordinal, and position
/// percentage within the concatenated document text.
pub fn search_elements(query: &str, elements: &[EbookElement]) -> EditionSearchResults {
    let started = std::time::Instant::now();

    let total_chars: usize = elements.iter().map(|e| e.plain_text.chars().count()).sum();

    let mut results = Vec::new();
    let mut total_hits = 0usize;
    let mut consumed = 0usize;

    for element in elements {
        let element_chars = element.plain_text.chars().count();
        let hits = search(query, &element.plain_text, 0);
        let sibling_count = hits.len();
        total_hits += sibling_count;

        for (sibling_index, hit) in hits.into_iter().enumerate() {
            if results.len() >= MAX_RESULTS {
                break;
            }
            let location = consumed + hit.start;
            let percentage = if total_chars == 0 {
                0.0
            } else {
                ((location as f64 / total_chars as f64) * 1000.0).round() / 10.0
            };
            results.push(EditionSearchResult {
                element_id: element.id.clone(),
                sibling_index,
                sibling_count,
                percentage,
                before: hit.before,
                matched: hit.matched,
                after: hit.after,
                start: hit.start,
                end: hit.end,
            });
        }

        consumed += element_chars;
    }

    EditionSearchResults {
        query: query.to_string(),
        total_hits,
        results,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Re-run the engine against an element's inner markup and pick the hit the
/// plain-text pass recorded, so the displayed excerpt keeps inline tags.
///
/// When the markup pass finds a different number of hits than the plain-text
/// pass did (tag boundaries can split or merge occurrences), returns `None`
/// and the caller falls back to plain-text substitution.
pub fn resolve_markup_match(
    query: &str,
    element: &EbookElement,
    sibling_index: usize,
) -> Option<SearchHit> {
    let plain = search(query, &element.plain_text, 0);
    let marked = search(query, &element.inner_html, 0);
    if marked.len() != plain.len() {
        return None;
    }
    marked.into_iter().nth(sibling_index)
}
