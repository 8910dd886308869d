//! Core data model: annotation kinds, annotations, responses and selection samples.
//!
//! All offsets are in Unicode scalar values (chars), not bytes or UTF-16.
//! Platform layers convert their native units before handing offsets in.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::error::RecurateError;

/// What the user wants the assistant to do with an annotated passage.
///
/// Serialized with the names the panel protocol has always used
/// (`highlight`, `strikethrough`, `deeper`, `verify`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnnotationKind {
    #[serde(rename = "highlight")]
    Keep,
    #[serde(rename = "strikethrough")]
    Drop,
    #[serde(rename = "deeper")]
    ExploreDeeper,
    #[serde(rename = "verify")]
    Verify,
}

impl AnnotationKind {
    /// Every kind, in feedback section order.
    pub const ALL: [AnnotationKind; 4] = [
        AnnotationKind::Keep,
        AnnotationKind::Drop,
        AnnotationKind::ExploreDeeper,
        AnnotationKind::Verify,
    ];

    /// Wire name, as used in `data-annotation-kind` and panel messages.
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Keep => "highlight",
            AnnotationKind::Drop => "strikethrough",
            AnnotationKind::ExploreDeeper => "deeper",
            AnnotationKind::Verify => "verify",
        }
    }

    /// Short human label used in list summaries.
    pub fn label(self) -> &'static str {
        match self {
            AnnotationKind::Keep => "keep",
            AnnotationKind::Drop => "drop",
            AnnotationKind::ExploreDeeper => "explore deeper",
            AnnotationKind::Verify => "verify",
        }
    }

    /// Element name of the overlay marker.
    pub fn marker_tag(self) -> &'static str {
        match self {
            AnnotationKind::Drop => "del",
            _ => "mark",
        }
    }

    /// CSS class of the overlay marker.
    pub fn marker_class(self) -> &'static str {
        match self {
            AnnotationKind::Keep => "annotation-highlight",
            AnnotationKind::Drop => "annotation-strikethrough",
            AnnotationKind::ExploreDeeper => "annotation-deeper",
            AnnotationKind::Verify => "annotation-verify",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationKind {
    type Err = RecurateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highlight" | "keep" => Ok(AnnotationKind::Keep),
            "strikethrough" | "drop" => Ok(AnnotationKind::Drop),
            "deeper" | "explore-deeper" | "exploreDeeper" => Ok(AnnotationKind::ExploreDeeper),
            "verify" => Ok(AnnotationKind::Verify),
            other => Err(RecurateError::UnknownKind(other.into())),
        }
    }
}

/// Opaque annotation identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(SmolStr);

impl AnnotationId {
    /// Build an id from the owning store's sequence number.
    pub fn from_seq(seq: u64) -> Self {
        Self(format_smolstr!("a-{}", seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AnnotationId {
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tagged, half-open character range over a response's plain text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: AnnotationId,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    /// Literal annotated text, captured when the annotation was made.
    #[serde(rename = "text")]
    pub source_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Logical timestamp from the owning store. Ordering tie-breaks only.
    pub created_at: u64,
}

impl Annotation {
    /// Character range covered by this annotation.
    pub fn range(&self) -> Range<usize> {
        self.start_offset..self.end_offset
    }

    /// Number of chars covered.
    pub fn len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether this annotation intersects `range`.
    ///
    /// Touching ranges (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, range: &Range<usize>) -> bool {
        !(self.end_offset <= range.start || self.start_offset >= range.end)
    }

    /// Check `0 <= start < end <= text_len`.
    pub fn validate(&self, text_len: usize) -> Result<(), RecurateError> {
        if self.start_offset < self.end_offset && self.end_offset <= text_len {
            Ok(())
        } else {
            Err(RecurateError::InvalidRange {
                start: self.start_offset,
                end: self.end_offset,
                len: text_len,
            })
        }
    }
}

/// An extracted assistant response. Never mutated once adopted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Original rendered markup.
    pub html: String,
    /// Plain-text projection.
    pub text: String,
    /// Dedup key.
    pub message_id: SmolStr,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl Response {
    /// Create a response stamped with the current wall-clock time.
    pub fn new(html: impl Into<String>, text: impl Into<String>, message_id: impl Into<SmolStr>) -> Self {
        Self {
            html: html.into(),
            text: text.into(),
            message_id: message_id.into(),
            timestamp: now_millis(),
        }
    }
}

/// Payload delivered by an extraction collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseExtracted {
    pub html: String,
    pub text: String,
    pub message_id: SmolStr,
}

impl From<ResponseExtracted> for Response {
    fn from(data: ResponseExtracted) -> Self {
        Response::new(data.html, data.text, data.message_id)
    }
}

/// Screen rectangle of a selection, in viewport coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A finalized user selection, already mapped into character offsets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSample {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default)]
    pub anchor_rect: Option<Rect>,
    /// First existing annotation intersecting the selection, if any.
    #[serde(default)]
    pub overlapping_annotation_id: Option<AnnotationId>,
}

impl SelectionSample {
    pub fn range(&self) -> Range<usize> {
        self.start_offset..self.end_offset
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
