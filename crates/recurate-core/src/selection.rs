//! Turning raw selection offsets into a selection sample.

use std::ops::Range;

use crate::offset_map::{slice_chars, snap_to_word_boundaries};
use crate::types::{Annotation, Rect, SelectionSample};

impl SelectionSample {
    /// Resolve a raw container range into a sample.
    ///
    /// Reversed endpoints are reordered and clamped to the container.
    /// Collapsed and whitespace-only selections resolve to `None`, which
    /// callers treat as "no selection".
    pub fn resolve(
        container_text: &str,
        raw: Range<usize>,
        snap_to_words: bool,
        annotations: &[Annotation],
        anchor_rect: Option<Rect>,
    ) -> Option<SelectionSample> {
        let len = container_text.chars().count();
        let start = raw.start.min(raw.end).min(len);
        let end = raw.start.max(raw.end).min(len);
        if start >= end {
            return None;
        }
        if slice_chars(container_text, start..end).trim().is_empty() {
            return None;
        }

        let range = if snap_to_words {
            snap_to_word_boundaries(container_text, start..end)
        } else {
            start..end
        };

        let overlapping_annotation_id = annotations
            .iter()
            .find(|a| a.overlaps(&range))
            .map(|a| a.id.clone());

        Some(SelectionSample {
            text: slice_chars(container_text, range.clone()).to_string(),
            start_offset: range.start,
            end_offset: range.end,
            anchor_rect,
            overlapping_annotation_id,
        })
    }
}
