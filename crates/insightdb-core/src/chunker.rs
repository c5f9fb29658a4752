//! Recursive character chunker.
//!
//! Splits an entry body on the first separator that occurs in it (paragraph,
//! line, period, space, then single characters), keeping each separator at the
//! start of the piece that follows it. Small pieces are merged greedily into
//! windows of at most `max_chars` characters; consecutive windows share up to
//! `overlap_chars` characters. Pieces too large to merge are split again with
//! the remaining separators.
//!
//! All work is done on byte spans into the body, so every segment is an exact
//! substring of its entry and carries its position.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Range;

use crate::error::Error;
use crate::types::{Entry, Segment};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 512,
            overlap_chars: 50,
            separators: ["\n\n", "\n", ".", " ", ""].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_chars == 0 {
            return Err(Error::InvalidConfig("chunking.max_chars must be > 0".into()));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        if self.separators.is_empty() {
            return Err(Error::InvalidConfig("chunking.separators must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(mut config: ChunkingConfig) -> Result<Self, Error> {
        config.validate()?;
        // Character splitting is always the last resort so the size bound holds.
        if config.separators.last().is_some_and(|s| !s.is_empty()) {
            config.separators.push(String::new());
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    /// Chunk one entry. Metadata is copied onto every segment.
    pub fn chunk_entry(&self, entry: &Entry) -> Vec<Segment> {
        let spans = self.split_spans(&entry.body);
        let total_chunks = spans.len();
        let metadata = entry.metadata();
        spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| Segment {
                id: format!("{}:{}", entry.entry_id, chunk_index),
                text: entry.body[span.clone()].to_string(),
                metadata: metadata.clone(),
                chunk_index,
                total_chunks,
                span,
            })
            .collect()
    }

    pub fn chunk_entries(&self, entries: &[Entry]) -> Vec<Segment> {
        entries.iter().flat_map(|e| self.chunk_entry(e)).collect()
    }

    /// Byte spans of the segments of `text`, in order.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        self.split_recursive(text, 0..text.len(), &self.config.separators, &mut out);
        out
    }

    fn split_recursive(&self, text: &str, span: Range<usize>, separators: &[String], out: &mut Vec<Range<usize>>) {
        let (separator, remaining) = pick_separator(&text[span.clone()], separators);
        let mut good: Vec<(Range<usize>, usize)> = Vec::new();
        for piece in split_keep_start(text, span, separator) {
            let len = char_len(&text[piece.clone()]);
            if len < self.config.max_chars {
                good.push((piece, len));
                continue;
            }
            if !good.is_empty() {
                self.merge(text, &good, out);
                good.clear();
            }
            if remaining.is_empty() {
                push_trimmed(text, piece, out);
            } else {
                self.split_recursive(text, piece, remaining, out);
            }
        }
        if !good.is_empty() {
            self.merge(text, &good, out);
        }
    }

    fn merge(&self, text: &str, pieces: &[(Range<usize>, usize)], out: &mut Vec<Range<usize>>) {
        let ChunkingConfig { max_chars, overlap_chars, .. } = self.config;
        let mut window: VecDeque<&(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;
        for piece in pieces {
            let len = piece.1;
            if total + len > max_chars && !window.is_empty() {
                push_window(text, &window, out);
                while total > overlap_chars || (total + len > max_chars && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= front.1,
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_window(text, &window, out);
    }
}

impl Default for Chunker {
    fn default() -> Self { Self { config: ChunkingConfig::default() } }
}

/// First separator present in `text`; the empty separator always matches.
/// Returns it with the separators left for recursive splits.
fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if text.contains(sep.as_str()) {
            return (sep.as_str(), &separators[i + 1..]);
        }
    }
    (separators.last().map_or("", String::as_str), &[])
}

/// Split `text[span]` on `separator`, attaching each separator to the start of
/// the following piece. Empty pieces are dropped.
fn split_keep_start(text: &str, span: Range<usize>, separator: &str) -> Vec<Range<usize>> {
    let slice = &text[span.clone()];
    let base = span.start;
    if separator.is_empty() {
        return slice.char_indices().map(|(i, c)| base + i..base + i + c.len_utf8()).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (pos, _) in slice.match_indices(separator) {
        if pos > start {
            pieces.push(base + start..base + pos);
        }
        start = pos;
    }
    if start < slice.len() {
        pieces.push(base + start..base + slice.len());
    }
    pieces
}

fn push_window(text: &str, window: &VecDeque<&(Range<usize>, usize)>, out: &mut Vec<Range<usize>>) {
    if let (Some(first), Some(last)) = (window.front(), window.back()) {
        push_trimmed(text, first.0.start..last.0.end, out);
    }
}

fn push_trimmed(text: &str, span: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[span.clone()];
    let start = span.start + (slice.len() - slice.trim_start().len());
    let end = span.start + slice.trim_end().len();
    if start < end {
        out.push(start..end);
    }
}

fn char_len(s: &str) -> usize { s.chars().count() }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Heading, UNKNOWN};

    fn chunker(max_chars: usize, overlap_chars: usize) -> Chunker {
        Chunker::new(ChunkingConfig { max_chars, overlap_chars, ..ChunkingConfig::default() }).expect("valid config")
    }

    fn texts(c: &Chunker, body: &str) -> Vec<String> {
        c.split_spans(body).into_iter().map(|s| body[s].to_string()).collect()
    }

    #[test]
    fn short_body_is_one_segment() {
        assert_eq!(texts(&Chunker::default(), "  Short text.  "), vec!["Short text.".to_string()]);
    }

    #[test]
    fn empty_body_has_no_segments() {
        assert!(Chunker::default().split_spans("   \n\n ").is_empty());
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let body = "aaaa bbbb\n\ncccc dddd";
        assert_eq!(texts(&chunker(12, 0), body), vec!["aaaa bbbb".to_string(), "cccc dddd".to_string()]);
    }

    #[test]
    fn words_are_merged_with_overlap() {
        let body = "one two three four five six";
        let out = texts(&chunker(10, 4), body);
        assert_eq!(out, vec!["one two", "two three", "four five", "six"]);
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let body = "abcdefghijklmnopqrstuvwxyz";
        let out = texts(&chunker(10, 2), body);
        assert!(out.iter().all(|s| s.chars().count() <= 10));
        assert_eq!(out.first().map(String::as_str), Some("abcdefghij"));
        assert_eq!(out.get(1).map(String::as_str), Some("ijklmnopqr"));
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let body = "é".repeat(30);
        let out = texts(&chunker(8, 0), &body);
        assert!(out.iter().all(|s| s.chars().count() <= 8));
        assert_eq!(out.concat(), body);
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let err = Chunker::new(ChunkingConfig { max_chars: 50, overlap_chars: 50, ..ChunkingConfig::default() });
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn character_fallback_is_appended() {
        let c = Chunker::new(ChunkingConfig { separators: vec!["\n".into()], ..ChunkingConfig::default() }).expect("valid");
        assert_eq!(c.config().separators, vec!["\n".to_string(), String::new()]);
    }

    #[test]
    fn segments_carry_entry_metadata_and_positions() {
        let heading = Heading::Parsed { name: "A".into(), destination: "X".into() };
        let body = "alpha beta gamma delta epsilon zeta eta theta".to_string();
        let entry = Entry::new("abc".into(), heading, body, UNKNOWN);
        let segments = chunker(16, 5).chunk_entry(&entry);
        assert!(segments.len() > 1);
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.metadata, entry.metadata());
            assert_eq!(s.chunk_index, i);
            assert_eq!(s.total_chunks, segments.len());
            assert_eq!(s.id, format!("abc:{i}"));
            assert_eq!(&entry.body[s.span.clone()], s.text);
        }
    }
}
