//! Splits content items into segments for embedding and search.
//! Text that fits is kept whole; longer text is cut at paragraph breaks, then
//! sentence or line ends, then spaces, and only then mid-word.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{ContentItem, SectionType};

/// Default maximum characters (bytes of UTF-8) per segment. Keeps segments small enough for embedding models.
pub const DEFAULT_MAX_CHARS: usize = 512;

/// A piece of a content item's text, the unit we embed and retrieve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub source_id: String,
    pub section: SectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Inherited from the parent item.
    pub timestamp: Option<DateTime<Utc>>,
    /// Index of this segment within its item (0, 1, 2, …).
    pub index: usize,
    pub text: String,
}

impl Segment {
    /// Identity used for deduplication: same item, same position.
    pub fn key(&self) -> (&str, usize) {
        (&self.source_id, self.index)
    }
}

/// Lazily yields an item's segments in text order. Clone it to start over.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    item: &'a ContentItem,
    remaining: &'a str,
    max_chars: usize,
    next_index: usize,
}

impl Segments<'_> {
    fn fits(&self, text: &str) -> bool {
        self.max_chars == 0 || text.len() <= self.max_chars
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.remaining.trim().is_empty() {
            self.remaining = "";
            return None;
        }
        let (piece, rest) = if self.next_index == 0 && self.fits(self.remaining) {
            (self.remaining, "")
        } else {
            let text = self.remaining.trim_start();
            if self.fits(text) {
                (text.trim_end(), "")
            } else {
                split_at_boundary(text, self.max_chars)
            }
        };
        self.remaining = rest;

        let segment = Segment {
            source_id: self.item.source_id.clone(),
            section: self.item.section,
            title: self.item.title.clone(),
            timestamp: self.item.timestamp,
            index: self.next_index,
            text: piece.to_string(),
        };
        self.next_index += 1;
        Some(segment)
    }
}

/// Chunk a single item. Text no longer than `max_chars` becomes exactly one
/// segment equal to the input; empty or whitespace-only text yields none.
/// `max_chars == 0` disables splitting.
pub fn chunk_item(item: &ContentItem, max_chars: usize) -> Segments<'_> {
    Segments {
        item,
        remaining: &item.text,
        max_chars,
        next_index: 0,
    }
}

/// Cuts `text` (already known to be longer than `max_chars`) into a piece of at
/// most `max_chars` bytes and the rest. Only whitespace is dropped at the cut.
fn split_at_boundary(text: &str, max_chars: usize) -> (&str, &str) {
    let window = &text[..floor_char_boundary(text, max_chars)];

    let cut = window
        .rfind("\n\n")
        .or_else(|| last_sentence_end(window))
        .or_else(|| window.rfind('\n'))
        .or_else(|| window.rfind(char::is_whitespace))
        .filter(|&pos| !window[..pos].trim().is_empty());

    match cut {
        Some(pos) => (text[..pos].trim_end(), &text[pos..]),
        None => {
            let mut end = window.len();
            if end == 0 {
                // max_chars is smaller than the first character; take it whole.
                end = text.chars().next().map_or(text.len(), char::len_utf8);
            }
            (&text[..end], &text[end..])
        }
    }
}

/// Position just past the last `.`, `?` or `!` that is followed by whitespace.
fn last_sentence_end(window: &str) -> Option<usize> {
    let bytes = window.as_bytes();
    (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i - 1], b'.' | b'?' | b'!') && bytes[i].is_ascii_whitespace())
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
