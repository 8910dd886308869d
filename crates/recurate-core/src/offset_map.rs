//! Offset mapping between rendered text nodes and plain-text positions.
//!
//! Both directions walk the same pre-order sequence of text-bearing leaf
//! nodes, accumulating a running character count. The mapper is generic over
//! the node handle so the owned markup tree and the live browser DOM share it.

use std::ops::Range;

/// A text node together with its span in the container's character space.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNodeSpan<N> {
    pub node: N,
    /// Container offset of the node's first char.
    pub start: usize,
    /// Container offset one past the node's last char.
    pub end: usize,
}

impl<N> TextNodeSpan<N> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Part of a text node covered by a container range.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSlice<N> {
    pub node: N,
    /// Range relative to the start of the node's own text.
    pub local: Range<usize>,
}

/// Lay out text nodes end to end, given `(node, char_len)` in document order.
pub fn text_node_spans<N, I>(nodes: I) -> Vec<TextNodeSpan<N>>
where
    I: IntoIterator<Item = (N, usize)>,
{
    let mut offset = 0;
    nodes
        .into_iter()
        .map(|(node, len)| {
            let span = TextNodeSpan {
                node,
                start: offset,
                end: offset + len,
            };
            offset += len;
            span
        })
        .collect()
}

/// Character offset of `(target, offset_in_node)` within the container.
///
/// If `target` never appears, returns the total length walked. Callers clamp
/// to the content edges rather than treating this as an error.
pub fn text_offset_of<N, I>(nodes: I, target: &N, offset_in_node: usize) -> usize
where
    N: PartialEq,
    I: IntoIterator<Item = (N, usize)>,
{
    let mut offset = 0;
    for (node, len) in nodes {
        if &node == target {
            return offset + offset_in_node.min(len);
        }
        offset += len;
    }
    offset
}

/// Every node whose span intersects `range`, with the local overlap.
///
/// Overlap is `max(start, node.start)..min(end, node.end)`; empty overlaps
/// are skipped.
pub fn intersecting_spans<N: Clone>(
    spans: &[TextNodeSpan<N>],
    range: Range<usize>,
) -> Vec<NodeSlice<N>> {
    spans
        .iter()
        .filter_map(|span| {
            let overlap_start = range.start.max(span.start);
            let overlap_end = range.end.min(span.end);
            if overlap_start >= overlap_end {
                return None;
            }
            Some(NodeSlice {
                node: span.node.clone(),
                local: (overlap_start - span.start)..(overlap_end - span.start),
            })
        })
        .collect()
}

/// Extend a range outward so partial words become whole words.
///
/// `start` moves back while the char before it is not whitespace, `end`
/// moves forward while the char at it is not whitespace. Never leaves
/// `0..len`.
pub fn snap_to_word_boundaries(text: &str, range: Range<usize>) -> Range<usize> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut start = range.start.min(len);
    let mut end = range.end.min(len).max(start);

    while start > 0 && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    while end < len && !chars[end].is_whitespace() {
        end += 1;
    }

    start..end
}

/// Convert a UTF-16 code unit offset into a char offset within `text`.
///
/// Offsets landing inside a surrogate pair round up to the next char.
/// Offsets past the end clamp to the char length.
pub fn utf16_to_char_offset(text: &str, utf16_offset: usize) -> usize {
    let mut utf16_seen = 0;
    for (idx, c) in text.chars().enumerate() {
        if utf16_seen >= utf16_offset {
            return idx;
        }
        utf16_seen += c.len_utf16();
    }
    text.chars().count()
}

/// Convert a char offset into a UTF-16 code unit offset within `text`.
pub fn char_to_utf16_offset(text: &str, char_offset: usize) -> usize {
    text.chars().take(char_offset).map(char::len_utf16).sum()
}

/// Slice `text` by char range. Out of range bounds clamp.
pub fn slice_chars(text: &str, range: Range<usize>) -> &str {
    let start = char_to_byte(text, range.start);
    let end = char_to_byte(text, range.end.max(range.start));
    &text[start..end]
}

/// Byte index of the char at `char_offset`, or `text.len()` past the end.
pub fn char_to_byte(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<(&'static str, usize)> {
        // "Hello " | "brave" | " new world"
        vec![("a", 6), ("b", 5), ("c", 10)]
    }

    #[test]
    fn test_text_offset_of_found() {
        assert_eq!(text_offset_of(nodes(), &"a", 2), 2);
        assert_eq!(text_offset_of(nodes(), &"b", 0), 6);
        assert_eq!(text_offset_of(nodes(), &"c", 4), 15);
    }

    #[test]
    fn test_text_offset_of_missing_returns_total() {
        assert_eq!(text_offset_of(nodes(), &"zzz", 3), 21);
    }

    #[test]
    fn test_text_offset_of_clamps_within_node() {
        assert_eq!(text_offset_of(nodes(), &"b", 99), 11);
    }

    #[test]
    fn test_intersecting_spans_cross_node() {
        let spans = text_node_spans(nodes());
        let hits = intersecting_spans(&spans, 4..13);
        assert_eq!(
            hits,
            vec![
                NodeSlice { node: "a", local: 4..6 },
                NodeSlice { node: "b", local: 0..5 },
                NodeSlice { node: "c", local: 0..2 },
            ]
        );
    }

    #[test]
    fn test_intersecting_spans_skips_touching() {
        let spans = text_node_spans(nodes());
        // Ends exactly where "b" starts.
        let hits = intersecting_spans(&spans, 2..6);
        assert_eq!(hits, vec![NodeSlice { node: "a", local: 2..6 }]);
    }

    #[test]
    fn test_intersecting_spans_skips_empty_nodes() {
        let spans = text_node_spans(vec![("x", 3), ("empty", 0), ("y", 3)]);
        let hits = intersecting_spans(&spans, 0..6);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.node != "empty"));
    }

    #[test]
    fn test_snap_partial_words() {
        let text = "The quick brown fox";
        let snapped = snap_to_word_boundaries(text, 5..13);
        assert_eq!(snapped, 4..15);
        assert_eq!(slice_chars(text, snapped), "quick brown");
    }

    #[test]
    fn test_snap_at_text_edges() {
        let text = "word";
        assert_eq!(snap_to_word_boundaries(text, 1..3), 0..4);
        assert_eq!(snap_to_word_boundaries(text, 0..99), 0..4);
    }

    #[test]
    fn test_snap_already_whole() {
        let text = "alpha beta gamma";
        assert_eq!(snap_to_word_boundaries(text, 6..10), 6..10);
    }

    #[test]
    fn test_utf16_conversion() {
        // '🌍' is two UTF-16 units, one char.
        let text = "a🌍b";
        assert_eq!(utf16_to_char_offset(text, 0), 0);
        assert_eq!(utf16_to_char_offset(text, 1), 1);
        assert_eq!(utf16_to_char_offset(text, 3), 2);
        assert_eq!(utf16_to_char_offset(text, 4), 3);
        assert_eq!(utf16_to_char_offset(text, 40), 3);
        assert_eq!(char_to_utf16_offset(text, 2), 3);
    }

    #[test]
    fn test_slice_chars_multibyte() {
        assert_eq!(slice_chars("héllo wörld", 6..11), "wörld");
        assert_eq!(slice_chars("abc", 2..10), "c");
    }
}
