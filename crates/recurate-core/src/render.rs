//! Overlay rendering.
//!
//! Two strategies produce the displayed markup from the original content and
//! the annotation list:
//!
//! - DOM overlay: reset to the original markup, then wrap every intersecting
//!   text node in a marker element. Preserves formatting.
//! - Text rebuild: rebuild markup from the plain text, wrapping each
//!   annotation's captured text. Loses formatting, used as a fallback.
//!
//! Overlays are never patched. Every render starts from the original content.

use std::ops::Range;

use markdown_weaver_escape::escape_html;
use serde::{Deserialize, Serialize};

use crate::error::WrapError;
use crate::markup::{Fragment, NodeId};
use crate::offset_map::{intersecting_spans, slice_chars, text_node_spans};
use crate::types::Annotation;

/// How overlays are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStrategy {
    #[default]
    DomOverlay,
    TextRebuild,
}

/// Something overlays can be drawn onto.
///
/// Implemented by the owned [`Fragment`] here and by the live DOM in the
/// browser crate, so both run the same wrap ordering.
pub trait OverlaySurface {
    /// Handle to a text node.
    type Node: Clone + PartialEq;

    /// Discard all overlays and restore `html`.
    fn reset(&mut self, html: &str);

    /// Text nodes in document order with their char lengths.
    fn text_nodes(&self) -> Vec<(Self::Node, usize)>;

    /// Wrap `local` chars of `node` in a marker for `annotation`.
    ///
    /// The node must keep the text before `local` so lower offsets inside it
    /// stay addressable.
    fn wrap(
        &mut self,
        node: &Self::Node,
        local: Range<usize>,
        annotation: &Annotation,
    ) -> Result<(), WrapError>;
}

/// Outcome of an overlay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayReport {
    /// Node-level wraps applied.
    pub wrapped: usize,
    /// Node-level wraps skipped after a failure.
    pub skipped: usize,
}

/// Reset `surface` to `html` and draw every annotation on it.
///
/// Annotations are applied from the highest start offset to the lowest, and
/// within one annotation from the last node to the first. Text node spans are
/// computed once up front, so every wrap lands on a node whose leading text
/// has not been touched yet. A failed wrap is skipped, never fatal.
pub fn apply_overlays<S: OverlaySurface>(
    surface: &mut S,
    html: &str,
    annotations: &[Annotation],
) -> OverlayReport {
    surface.reset(html);
    let mut report = OverlayReport::default();
    if annotations.is_empty() {
        return report;
    }

    let spans = text_node_spans(surface.text_nodes());
    let mut ordered: Vec<&Annotation> = annotations.iter().collect();
    ordered.sort_by(|a, b| b.start_offset.cmp(&a.start_offset));

    for annotation in ordered {
        let slices = intersecting_spans(&spans, annotation.range());
        for slice in slices.iter().rev() {
            match surface.wrap(&slice.node, slice.local.clone(), annotation) {
                Ok(()) => report.wrapped += 1,
                Err(err) => {
                    tracing::debug!(
                        annotation = %annotation.id,
                        local = ?slice.local,
                        error = %err,
                        "skipping overlay wrap"
                    );
                    report.skipped += 1;
                }
            }
        }
    }

    report
}

/// Opening tag of the marker element for `annotation`.
pub fn marker_open_tag(annotation: &Annotation) -> String {
    let mut tag = format!(
        "<{} class=\"{}\" data-annotation-id=\"",
        annotation.kind.marker_tag(),
        annotation.kind.marker_class()
    );
    let _ = escape_html(&mut tag, annotation.id.as_str());
    tag.push_str("\" data-annotation-kind=\"");
    tag.push_str(annotation.kind.as_str());
    tag.push_str("\">");
    tag
}

/// Overlay surface backed by an owned [`Fragment`].
#[derive(Debug, Clone, Default)]
pub struct MarkupSurface {
    fragment: Fragment,
}

impl MarkupSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn to_html(&self) -> String {
        self.fragment.to_html()
    }
}

impl OverlaySurface for MarkupSurface {
    type Node = NodeId;

    fn reset(&mut self, html: &str) {
        self.fragment = Fragment::parse(html);
    }

    fn text_nodes(&self) -> Vec<(NodeId, usize)> {
        self.fragment.text_nodes()
    }

    fn wrap(
        &mut self,
        node: &NodeId,
        local: Range<usize>,
        annotation: &Annotation,
    ) -> Result<(), WrapError> {
        self.fragment
            .wrap_text(
                *node,
                local,
                annotation.kind.marker_tag(),
                marker_open_tag(annotation),
            )
            .map(|_| ())
    }
}

/// Render with the DOM overlay strategy over an owned tree.
///
/// With no annotations the original markup is returned unchanged.
pub fn render_dom_overlay(html: &str, annotations: &[Annotation]) -> String {
    if annotations.is_empty() {
        return html.to_string();
    }
    let mut surface = MarkupSurface::new();
    let report = apply_overlays(&mut surface, html, annotations);
    tracing::trace!(wrapped = report.wrapped, skipped = report.skipped, "dom overlay rendered");
    surface.to_html()
}

/// Render with the text rebuild strategy.
///
/// Gaps between annotations are escaped plain text, annotation spans emit
/// their captured text inside a marker. With no annotations the original
/// markup is returned unchanged.
pub fn render_text_rebuild(html: &str, text: &str, annotations: &[Annotation]) -> String {
    if annotations.is_empty() {
        return html.to_string();
    }

    let mut ordered: Vec<&Annotation> = annotations.iter().collect();
    ordered.sort_by_key(|a| a.start_offset);

    let mut out = String::with_capacity(text.len() + annotations.len() * 64);
    let mut cursor = 0;
    for annotation in ordered {
        if annotation.start_offset > cursor {
            let _ = escape_html(&mut out, slice_chars(text, cursor..annotation.start_offset));
        }
        out.push_str(&marker_open_tag(annotation));
        let _ = escape_html(&mut out, &annotation.source_text);
        out.push_str("</");
        out.push_str(annotation.kind.marker_tag());
        out.push('>');
        cursor = cursor.max(annotation.end_offset);
    }
    let len = text.chars().count();
    if cursor < len {
        let _ = escape_html(&mut out, slice_chars(text, cursor..len));
    }
    out
}

/// Render with the given strategy.
pub fn render(
    strategy: RenderStrategy,
    html: &str,
    text: &str,
    annotations: &[Annotation],
) -> String {
    match strategy {
        RenderStrategy::DomOverlay => render_dom_overlay(html, annotations),
        RenderStrategy::TextRebuild => render_text_rebuild(html, text, annotations),
    }
}
