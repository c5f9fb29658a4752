//! Corpus parser: splits the flat write-up file into per-person entries.
//!
//! Entries start with a literal delimiter (`Heading:` by default). The first
//! line after the delimiter is the heading, `Name: Placed at Destination`; the
//! rest is the body. Headings that do not match degrade to sentinel metadata
//! instead of failing the run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::types::{Entry, Heading, UNKNOWN};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    pub delimiter: String,
    pub separator: String,
    pub marker: String,
    pub sentinel: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: "Heading:".to_string(),
            separator: ":".to_string(),
            marker: "Placed at".to_string(),
            sentinel: UNKNOWN.to_string(),
        }
    }
}

impl ParserConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.delimiter.is_empty() { return Err(Error::InvalidConfig("corpus.delimiter must not be empty".into())); }
        if self.separator.is_empty() { return Err(Error::InvalidConfig("corpus.separator must not be empty".into())); }
        if self.marker.is_empty() { return Err(Error::InvalidConfig("corpus.marker must not be empty".into())); }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub entries: Vec<Entry>,
    pub malformed: usize,
    /// Delimited fragments that were empty after trimming.
    pub skipped_empty: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CorpusParser {
    config: ParserConfig,
}

impl CorpusParser {
    pub fn new(config: ParserConfig) -> Self { Self { config } }

    pub fn config(&self) -> &ParserConfig { &self.config }

    /// Read and parse a corpus file. Unreadable files and corpora without a
    /// single entry are errors; malformed headings are not.
    pub fn parse_file(&self, path: &Path) -> Result<ParseReport, Error> {
        let text = fs::read_to_string(path)
            .map_err(|source| Error::CorpusUnreadable { path: path.display().to_string(), source })?;
        let report = self.parse(&text);
        if report.entries.is_empty() {
            return Err(Error::EmptyCorpus(path.display().to_string()));
        }
        info!(path = %path.display(), entries = report.entries.len(), malformed = report.malformed, "parsed corpus");
        Ok(report)
    }

    pub fn parse(&self, text: &str) -> ParseReport {
        let mut report = ParseReport::default();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        // Anything before the first delimiter is preamble.
        for fragment in text.split(self.config.delimiter.as_str()).skip(1) {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                report.skipped_empty += 1;
                continue;
            }
            let occurrence = seen.entry(fragment).or_insert(0);
            let entry = self.parse_fragment(fragment, *occurrence);
            *occurrence += 1;
            if entry.is_malformed() {
                report.malformed += 1;
                warn!(heading = fragment.lines().next().unwrap_or_default(), "malformed heading, using sentinel metadata");
            }
            report.entries.push(entry);
        }
        debug!(entries = report.entries.len(), skipped_empty = report.skipped_empty, "split corpus");
        report
    }

    fn parse_fragment(&self, fragment: &str, occurrence: usize) -> Entry {
        let mut lines = fragment.lines();
        let heading_line = lines.next().unwrap_or_default().trim();
        let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
        let heading = self.parse_heading(heading_line);
        Entry::new(entry_id(fragment, occurrence), heading, body, &self.config.sentinel)
    }

    pub fn parse_heading(&self, line: &str) -> Heading {
        let ParserConfig { separator, marker, .. } = &self.config;
        match (line.split_once(separator.as_str()), line.split_once(marker.as_str())) {
            (Some((name, _)), Some((_, destination))) => Heading::Parsed {
                name: name.trim().to_string(),
                destination: destination.trim().to_string(),
            },
            _ => Heading::Malformed { raw: line.to_string() },
        }
    }
}

/// Content hash of the fragment; repeated copies of the same text also hash
/// their occurrence number so ids stay unique within a corpus.
fn entry_id(fragment: &str, occurrence: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(fragment.as_bytes());
    if occurrence > 0 {
        hasher.update(&(occurrence as u64).to_le_bytes());
    }
    hasher.finalize().to_hex().as_str()[..16].to_string()
}
