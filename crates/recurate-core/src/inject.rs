//! When staged feedback may be written into the chat input.

use crate::format::is_only_injected_feedback;

/// What to do with the chat input given its text and the staged feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectAction {
    /// Replace the input contents with this feedback.
    SetContent(String),
    /// The user has typed something. Leave it alone.
    Hold,
    /// The input holds only stale injected feedback. Empty it.
    ClearEditor,
    Nothing,
}

/// Decide how staged feedback reaches the chat input.
///
/// User-typed text is never overwritten.
pub fn decide_injection(editor_text: &str, pending: Option<&str>) -> InjectAction {
    let editor_is_ours = is_only_injected_feedback(editor_text);
    let editor_is_empty = editor_text.trim().is_empty();

    match pending.filter(|p| !p.is_empty()) {
        Some(feedback) if editor_is_empty || editor_is_ours => {
            if editor_text == feedback {
                InjectAction::Nothing
            } else {
                InjectAction::SetContent(feedback.to_string())
            }
        }
        Some(_) => InjectAction::Hold,
        None if editor_is_ours => InjectAction::ClearEditor,
        None => InjectAction::Nothing,
    }
}
