//! Sampling the browser selection inside a response container.

use recurate_core::{Rect, ResponseSession, SelectionSample};

use crate::dom::dom_position_to_text_offset;

/// Raw selection endpoints as char offsets into the container text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSelection {
    pub start: usize,
    pub end: usize,
    pub rect: Rect,
}

/// Read the current document selection relative to `container`.
///
/// `None` when nothing is selected, the selection is collapsed or blank, or
/// it is not inside `container`.
pub fn read_selection(container: &web_sys::Element) -> Option<RawSelection> {
    let window = web_sys::window()?;
    let document = window.document()?;
    let selection = window.get_selection().ok()??;

    if selection.is_collapsed() || selection.range_count() == 0 {
        return None;
    }
    if String::from(selection.to_string()).trim().is_empty() {
        return None;
    }

    let range = selection.get_range_at(0).ok()?;
    let common = range.common_ancestor_container().ok()?;
    let container_node: &web_sys::Node = container.as_ref();
    if !container_node.contains(Some(&common)) {
        tracing::trace!("selection outside response container");
        return None;
    }

    let start = dom_position_to_text_offset(
        &document,
        container_node,
        &range.start_container().ok()?,
        range.start_offset().ok()?,
    )?;
    let end = dom_position_to_text_offset(
        &document,
        container_node,
        &range.end_container().ok()?,
        range.end_offset().ok()?,
    )?;

    let dom_rect = range.get_bounding_client_rect();
    let rect = Rect::new(dom_rect.x(), dom_rect.y(), dom_rect.width(), dom_rect.height());

    tracing::trace!(start, end, "read dom selection");
    Some(RawSelection { start, end, rect })
}

/// Read the selection and resolve it against the session's active response.
pub fn sample_selection(
    container: &web_sys::Element,
    session: &ResponseSession,
) -> Option<SelectionSample> {
    let raw = read_selection(container)?;
    session.sample_selection(raw.start, raw.end, Some(raw.rect))
}

/// Drop the document selection after it has been acted on.
pub fn clear_selection() {
    let selection = web_sys::window().and_then(|w| w.get_selection().ok().flatten());
    if let Some(selection) = selection {
        if let Err(e) = selection.remove_all_ranges() {
            tracing::debug!("removeAllRanges failed: {:?}", e);
        }
    }
}
