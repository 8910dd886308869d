//! recurate-core: annotation overlay engine without DOM dependencies.
//!
//! This crate provides:
//! - `AnnotationStore` - sorted, non-overlapping annotations for one response
//! - Offset mapping between text nodes and character offsets
//! - `OverlaySurface` trait and the descending-offset overlay renderer
//! - `Fragment` - owned HTML tree for overlays outside a browser
//! - `FeedbackFormatter` - turns annotations into a feedback block
//! - `ResponseSession` - retained responses, navigation and cached markup
//! - Panel message protocol and transcript extraction

pub mod error;
pub mod format;
pub mod inject;
pub mod markup;
pub mod messages;
pub mod offset_map;
pub mod render;
pub mod selection;
pub mod session;
pub mod store;
pub mod transcript;
pub mod types;

pub use error::{RecurateError, WrapError};
pub use format::{
    FEEDBACK_FOOTER, FEEDBACK_HEADER, FeedbackFormatter, format_feedback, is_only_injected_feedback,
};
pub use inject::{InjectAction, decide_injection};
pub use markup::{Fragment, NodeId};
pub use messages::{
    ConnectionStatus, DeliveryError, MessageSink, PanelMessage, Theme, deliver_quietly,
};
pub use offset_map::{
    NodeSlice, TextNodeSpan, char_to_utf16_offset, intersecting_spans, snap_to_word_boundaries,
    text_node_spans, text_offset_of, utf16_to_char_offset,
};
pub use render::{
    MarkupSurface, OverlayReport, OverlaySurface, RenderStrategy, apply_overlays, marker_open_tag,
    render, render_dom_overlay, render_text_rebuild,
};
pub use session::{AdoptOutcome, ResponseSession, SessionConfig};
pub use smol_str::SmolStr;
pub use store::{AnnotationStore, KindCounts};
pub use types::{
    Annotation, AnnotationId, AnnotationKind, Rect, Response, ResponseExtracted, SelectionSample,
};
