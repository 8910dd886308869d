//! Feedback block formatting.
//!
//! Turns an annotation set into the text injected into the chat input.
//! Sections appear in a fixed order (keep, drop, explore deeper, verify)
//! regardless of store order, and only when they have entries.

use std::borrow::Cow;

use crate::types::{Annotation, AnnotationKind};

/// First line of every feedback block.
pub const FEEDBACK_HEADER: &str = "[Feedback on your previous response]";

/// Last line of every feedback block. Also used to detect an input box that
/// holds only injected feedback.
pub const FEEDBACK_FOOTER: &str = "[Your message below]";

/// Default max chars quoted per annotation.
pub const DEFAULT_MAX_QUOTE_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

/// Section heading for a kind.
pub fn section_heading(kind: AnnotationKind) -> &'static str {
    match kind {
        AnnotationKind::Keep => "KEEP — I found these points valuable:",
        AnnotationKind::Drop => "DROP — Please disregard or reconsider:",
        AnnotationKind::ExploreDeeper => "EXPLORE DEEPER — Need more detail on:",
        AnnotationKind::Verify => "VERIFY — Please double-check:",
    }
}

/// Formats annotation sets into feedback blocks.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackFormatter {
    pub max_quote_chars: usize,
}

impl Default for FeedbackFormatter {
    fn default() -> Self {
        Self {
            max_quote_chars: DEFAULT_MAX_QUOTE_CHARS,
        }
    }
}

impl FeedbackFormatter {
    pub fn new(max_quote_chars: usize) -> Self {
        Self { max_quote_chars }
    }

    /// Build the feedback block. Empty input gives an empty string.
    pub fn format(&self, annotations: &[Annotation]) -> String {
        if annotations.is_empty() {
            return String::new();
        }

        let mut lines: Vec<Cow<'_, str>> = vec![FEEDBACK_HEADER.into(), "".into()];
        for kind in AnnotationKind::ALL {
            let mut entries = annotations.iter().filter(|a| a.kind == kind).peekable();
            if entries.peek().is_none() {
                continue;
            }
            lines.push(section_heading(kind).into());
            for a in entries {
                let quote = truncate_quote(&a.source_text, self.max_quote_chars);
                lines.push(format!("- \"{}\"", quote).into());
            }
            lines.push("".into());
        }
        lines.push(FEEDBACK_FOOTER.into());
        lines.join("\n")
    }
}

/// Format with the default quote limit.
pub fn format_feedback(annotations: &[Annotation]) -> String {
    FeedbackFormatter::default().format(annotations)
}

/// Cut `text` to `max_chars`, trimming trailing whitespace before the ellipsis.
pub fn truncate_quote(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!("{}{}", text[..cut].trim_end(), ELLIPSIS)),
    }
}

/// Whether an input box holds only injected feedback and no user text.
pub fn is_only_injected_feedback(editor_text: &str) -> bool {
    editor_text.starts_with(FEEDBACK_HEADER) && editor_text.trim_end().ends_with(FEEDBACK_FOOTER)
}
