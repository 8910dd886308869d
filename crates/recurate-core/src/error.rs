//! Error types for the annotation engine.

use smol_str::SmolStr;
use thiserror::Error;

/// Errors surfaced to callers that parse or validate external input.
///
/// Overlay rendering and selection mapping never produce these: they degrade
/// to partial output or "no selection" instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RecurateError {
    /// Range does not satisfy `start < end <= len`.
    #[error("invalid range {start}..{end} for text of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// Unrecognized annotation kind name.
    #[error("unknown annotation kind: {0}")]
    UnknownKind(SmolStr),

    /// Panel message could not be decoded or encoded.
    #[error("malformed panel message: {0}")]
    Message(#[from] serde_json::Error),

    /// Transcript contained no usable assistant response.
    #[error("transcript error: {0}")]
    Transcript(String),
}

/// Failure to wrap a single text node in an overlay marker.
///
/// Always recovered from by skipping the node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WrapError {
    /// Handle does not refer to a text node.
    #[error("node is not a text node")]
    NotText,

    /// Handle no longer refers to a node in the tree.
    #[error("stale node handle")]
    Stale,

    /// Local range falls outside the node's text.
    #[error("range {start}..{end} outside text node of length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },

    /// Text lives inside an element whose content is not markup.
    #[error("cannot wrap text inside <{0}>")]
    RawTextParent(SmolStr),

    /// The host platform rejected the wrap.
    #[error("platform error: {0}")]
    Platform(String),
}
