//! Domain types shared by the parser, chunker, index builder and retriever.

use serde::{Deserialize, Serialize};
use std::ops::Range;

pub type SegmentId = String;

/// Value reported for name/destination when a heading could not be parsed.
pub const UNKNOWN: &str = "Unknown";

/// Outcome of parsing an entry's heading line.
///
/// `Malformed` keeps the raw line so callers can tell a broken heading apart
/// from someone legitimately called "Unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Heading {
    Parsed { name: String, destination: String },
    Malformed { raw: String },
}

/// One person's write-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Stable hash of the raw fragment this entry was parsed from.
    pub entry_id: String,
    pub heading: Heading,
    pub body: String,
    sentinel: String,
}

impl Entry {
    pub fn new(entry_id: String, heading: Heading, body: String, sentinel: &str) -> Self {
        Self { entry_id, heading, body, sentinel: sentinel.to_string() }
    }

    pub fn name(&self) -> &str {
        match &self.heading {
            Heading::Parsed { name, .. } => name,
            Heading::Malformed { .. } => &self.sentinel,
        }
    }

    pub fn destination(&self) -> &str {
        match &self.heading {
            Heading::Parsed { destination, .. } => destination,
            Heading::Malformed { .. } => &self.sentinel,
        }
    }

    pub fn is_malformed(&self) -> bool { matches!(self.heading, Heading::Malformed { .. }) }

    pub fn metadata(&self) -> SegmentMetadata {
        SegmentMetadata {
            entry_id: self.entry_id.clone(),
            name: self.name().to_string(),
            destination: self.destination().to_string(),
            malformed: self.is_malformed(),
        }
    }
}

/// Entry-level metadata copied onto every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub entry_id: String,
    pub name: String,
    pub destination: String,
    pub malformed: bool,
}

/// A bounded slice of an entry body, independently embedded and indexed.
///
/// - `id`: `"<entry_id>:<chunk_index>"`
/// - `span`: byte range of `text` inside the owning entry's body
/// - `chunk_index`/`total_chunks`: position within the parent entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub text: String,
    pub metadata: SegmentMetadata,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub span: Range<usize>,
}

/// A segment returned by the retriever, with its distance to the query
/// (lower is closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSegment {
    pub segment_id: SegmentId,
    pub text: String,
    pub metadata: SegmentMetadata,
    pub distance: f32,
}
