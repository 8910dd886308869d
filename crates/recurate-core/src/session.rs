//! Response session: the retained responses and their annotation sets.
//!
//! One explicitly owned state object per panel. Every mutation goes through
//! the session so the cached overlay markup can be invalidated by revision.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::format::{DEFAULT_MAX_QUOTE_CHARS, FeedbackFormatter};
use crate::markup::Fragment;
use crate::messages::{ConnectionStatus, PanelMessage};
use crate::render::{RenderStrategy, render};
use crate::store::AnnotationStore;
use crate::types::{Annotation, AnnotationId, AnnotationKind, Rect, Response, SelectionSample};

/// Number of responses kept in rolling mode unless configured otherwise.
pub const ROLLING_HISTORY_CAPACITY: usize = 5;

/// Session behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Responses retained. 1 means single-response mode.
    pub history_capacity: usize,
    /// Expand selections to whole words.
    pub snap_to_words: bool,
    pub strategy: RenderStrategy,
    /// Max chars quoted per annotation in feedback.
    pub max_quote_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1,
            snap_to_words: true,
            strategy: RenderStrategy::default(),
            max_quote_chars: DEFAULT_MAX_QUOTE_CHARS,
        }
    }
}

impl SessionConfig {
    /// Rolling history with the default capacity.
    pub fn rolling() -> Self {
        Self {
            history_capacity: ROLLING_HISTORY_CAPACITY,
            ..Self::default()
        }
    }

    fn capacity(&self) -> usize {
        self.history_capacity.max(1)
    }
}

/// Result of offering a response to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdoptOutcome {
    /// Became the active response.
    Adopted,
    /// Already held. Nothing changed.
    Duplicate,
}

#[derive(Debug, Clone)]
struct Slot {
    response: Response,
    /// Offset coordinate space for this slot's annotations.
    container_text: String,
    store: AnnotationStore,
}

impl Slot {
    fn new(response: Response, strategy: RenderStrategy) -> Self {
        let container_text = match strategy {
            RenderStrategy::DomOverlay => Fragment::parse(&response.html).text_content(),
            RenderStrategy::TextRebuild => response.text.clone(),
        };
        Self {
            response,
            container_text,
            store: AnnotationStore::new(),
        }
    }
}

/// Owns the retained responses (newest first) and which one is active.
#[derive(Debug)]
pub struct ResponseSession {
    config: SessionConfig,
    slots: VecDeque<Slot>,
    active: usize,
    status: ConnectionStatus,
    revision: u64,
    overlay_cache: RefCell<Option<(u64, String)>>,
}

impl Default for ResponseSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl ResponseSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            slots: VecDeque::new(),
            active: 0,
            status: ConnectionStatus::Disconnected,
            revision: 0,
            overlay_cache: RefCell::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Changes on every mutation of the responses or the active annotations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Make `response` the active one.
    ///
    /// A response whose message id is already held is ignored, keeping its
    /// annotations. Otherwise it becomes the newest slot; in single-response
    /// mode that evicts the previous response and its annotations.
    pub fn adopt_response(&mut self, response: impl Into<Response>) -> AdoptOutcome {
        let response = response.into();
        if self.position_of(&response.message_id).is_some() {
            tracing::debug!(message_id = %response.message_id, "response already held");
            return AdoptOutcome::Duplicate;
        }

        tracing::debug!(
            message_id = %response.message_id,
            chars = response.text.chars().count(),
            "adopting response"
        );
        self.slots
            .push_front(Slot::new(response, self.config.strategy));
        let capacity = self.config.capacity();
        if self.slots.len() > capacity {
            let evicted = self.slots.len() - capacity;
            self.slots.truncate(capacity);
            tracing::debug!(evicted, "evicted old responses");
        }
        self.active = 0;
        self.touch();
        AdoptOutcome::Adopted
    }

    /// Replace the retained responses with `responses` (newest first).
    ///
    /// Slots whose message id was already held keep their annotations.
    /// Duplicate ids within `responses` keep only the first occurrence.
    pub fn replace_history(&mut self, responses: impl IntoIterator<Item = Response>) {
        let capacity = self.config.capacity();
        let mut old: Vec<Option<Slot>> = self.slots.drain(..).map(Some).collect();
        let mut slots: VecDeque<Slot> = VecDeque::with_capacity(capacity);

        for response in responses {
            if slots.len() == capacity {
                break;
            }
            if slots
                .iter()
                .any(|s| s.response.message_id == response.message_id)
            {
                continue;
            }
            let kept = old
                .iter_mut()
                .find(|s| {
                    s.as_ref()
                        .is_some_and(|s| s.response.message_id == response.message_id)
                })
                .and_then(Option::take);
            slots.push_back(kept.unwrap_or_else(|| Slot::new(response, self.config.strategy)));
        }

        tracing::debug!(retained = slots.len(), "history replaced");
        self.slots = slots;
        self.active = 0;
        self.touch();
    }

    fn position_of(&self, message_id: &SmolStr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| &s.response.message_id == message_id)
    }

    fn slot(&self) -> Option<&Slot> {
        self.slots.get(self.active)
    }

    fn slot_mut(&mut self) -> Option<&mut Slot> {
        self.slots.get_mut(self.active)
    }

    /// The active response.
    pub fn current(&self) -> Option<&Response> {
        self.slot().map(|s| &s.response)
    }

    /// Retained responses, newest first.
    pub fn responses(&self) -> impl Iterator<Item = &Response> {
        self.slots.iter().map(|s| &s.response)
    }

    /// Text the active annotations' offsets index into.
    pub fn container_text(&self) -> &str {
        self.slot().map(|s| s.container_text.as_str()).unwrap_or("")
    }

    pub fn store(&self) -> Option<&AnnotationStore> {
        self.slot().map(|s| &s.store)
    }

    /// Annotations on the active response, sorted by start offset.
    pub fn annotations(&self) -> &[Annotation] {
        self.slot().map(|s| s.store.as_slice()).unwrap_or(&[])
    }

    pub fn has_annotations(&self) -> bool {
        !self.annotations().is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.slots.len()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Switch to slot `index` (0 = newest). Other slots are untouched.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.slots.len() || index == self.active {
            return false;
        }
        self.active = index;
        self.touch();
        true
    }

    pub fn can_go_older(&self) -> bool {
        self.active + 1 < self.slots.len()
    }

    pub fn can_go_newer(&self) -> bool {
        self.active > 0 && !self.slots.is_empty()
    }

    pub fn go_older(&mut self) -> bool {
        self.can_go_older() && self.select(self.active + 1)
    }

    pub fn go_newer(&mut self) -> bool {
        self.can_go_newer() && self.select(self.active - 1)
    }

    /// `(k, n)` for a "k of n" label, where the oldest response is 1.
    pub fn position(&self) -> Option<(usize, usize)> {
        if self.slots.is_empty() {
            return None;
        }
        let n = self.slots.len();
        Some((n - self.active, n))
    }

    /// Resolve raw container offsets against the active response.
    pub fn sample_selection(
        &self,
        start: usize,
        end: usize,
        anchor_rect: Option<Rect>,
    ) -> Option<SelectionSample> {
        let slot = self.slot()?;
        SelectionSample::resolve(
            &slot.container_text,
            start..end,
            self.config.snap_to_words,
            slot.store.as_slice(),
            anchor_rect,
        )
    }

    /// Annotate the sampled selection on the active response.
    ///
    /// Returns `None` when there is no active response or the sample does not
    /// fit inside its text.
    pub fn add_annotation(
        &mut self,
        kind: AnnotationKind,
        sample: &SelectionSample,
    ) -> Option<AnnotationId> {
        let slot = self.slot_mut()?;
        let len = slot.container_text.chars().count();
        if sample.start_offset >= sample.end_offset || sample.end_offset > len {
            tracing::debug!(
                start = sample.start_offset,
                end = sample.end_offset,
                len,
                "selection outside response text"
            );
            return None;
        }
        let id = slot
            .store
            .add(kind, sample.text.clone(), sample.range())?;
        self.touch();
        Some(id)
    }

    pub fn remove_annotation(&mut self, id: &AnnotationId) -> bool {
        let removed = self
            .slot_mut()
            .is_some_and(|slot| slot.store.remove(id));
        if removed {
            self.touch();
        }
        removed
    }

    pub fn clear_annotations(&mut self) {
        let had_any = self.has_annotations();
        if let Some(slot) = self.slot_mut() {
            slot.store.clear();
        }
        if had_any {
            self.touch();
        }
    }

    /// Feedback block for the active annotations. Empty when there are none.
    pub fn feedback_text(&self) -> String {
        FeedbackFormatter::new(self.config.max_quote_chars).format(self.annotations())
    }

    /// Feedback to stage in the chat input, if any.
    pub fn pending_feedback(&self) -> Option<String> {
        let text = self.feedback_text();
        (!text.is_empty()).then_some(text)
    }

    pub fn pending_feedback_message(&self) -> PanelMessage {
        PanelMessage::PendingFeedback {
            feedback: self.pending_feedback(),
        }
    }

    /// Markup to display for the active response.
    ///
    /// Rebuilt from the original markup whenever the session changed since
    /// the last call.
    pub fn current_overlay_markup(&self) -> String {
        let Some(slot) = self.slot() else {
            return String::new();
        };
        if let Some((rev, markup)) = self.overlay_cache.borrow().as_ref() {
            if *rev == self.revision {
                return markup.clone();
            }
        }
        let markup = render(
            self.config.strategy,
            &slot.response.html,
            &slot.container_text,
            slot.store.as_slice(),
        );
        *self.overlay_cache.borrow_mut() = Some((self.revision, markup.clone()));
        markup
    }

    /// Replace the active response's offset space with the text a host
    /// actually displays, e.g. the live DOM text after the markup was parsed.
    ///
    /// Annotations that no longer fit are dropped. Returns whether anything
    /// changed.
    pub fn set_container_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        let Some(slot) = self.slot_mut() else {
            return false;
        };
        if slot.container_text == text {
            return false;
        }
        let len = text.chars().count();
        let stale: Vec<AnnotationId> = slot
            .store
            .iter()
            .filter(|a| a.validate(len).is_err())
            .map(|a| a.id.clone())
            .collect();
        for id in &stale {
            slot.store.remove(id);
        }
        tracing::debug!(len, dropped = stale.len(), "container text replaced");
        slot.container_text = text;
        self.touch();
        true
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    /// Apply an incoming panel message. Returns whether the session changed.
    pub fn apply_message(&mut self, message: PanelMessage) -> bool {
        match message {
            PanelMessage::ResponseReady {
                html,
                text,
                message_id,
            } => self.adopt_response(Response::new(html, text, message_id)) == AdoptOutcome::Adopted,
            PanelMessage::ResponseHistory { responses } => {
                self.replace_history(responses.into_iter().map(Response::from));
                true
            }
            PanelMessage::ConnectionStatus { status } => {
                self.status = status;
                false
            }
            PanelMessage::ResponseStreaming { message_id, .. } => {
                tracing::trace!(%message_id, "response streaming");
                self.status = ConnectionStatus::Streaming;
                false
            }
            other => {
                tracing::trace!(message = ?other, "message not handled by session");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: &str, html: &str) -> Response {
        let text = Fragment::parse(html).text_content();
        Response::new(html, text, id)
    }

    fn annotate(session: &mut ResponseSession, kind: AnnotationKind, needle: &str) -> AnnotationId {
        let text = session.container_text().to_string();
        let byte = text.find(needle).unwrap();
        let start = text[..byte].chars().count();
        let end = start + needle.chars().count();
        let sample = session.sample_selection(start, end, None).unwrap();
        session.add_annotation(kind, &sample).unwrap()
    }

    #[test]
    fn test_single_mode_adopt_clears() {
        let mut session = ResponseSession::default();
        session.adopt_response(response("m1", "<p>first answer</p>"));
        annotate(&mut session, AnnotationKind::Keep, "first");
        assert!(session.has_annotations());

        assert_eq!(
            session.adopt_response(response("m2", "<p>second answer</p>")),
            AdoptOutcome::Adopted
        );
        assert_eq!(session.history_len(), 1);
        assert!(!session.has_annotations());
        assert_eq!(session.current().unwrap().message_id, "m2");
    }

    #[test]
    fn test_duplicate_keeps_annotations() {
        let mut session = ResponseSession::default();
        session.adopt_response(response("m1", "<p>first answer</p>"));
        annotate(&mut session, AnnotationKind::Verify, "answer");
        let rev = session.revision();
        assert_eq!(
            session.adopt_response(response("m1", "<p>first answer</p>")),
            AdoptOutcome::Duplicate
        );
        assert_eq!(session.annotations().len(), 1);
        assert_eq!(session.revision(), rev);
    }

    #[test]
    fn test_rolling_switch_keeps_other_slots() {
        let mut session = ResponseSession::new(SessionConfig::rolling());
        session.adopt_response(response("m1", "<p>older text here</p>"));
        annotate(&mut session, AnnotationKind::Drop, "older");
        session.adopt_response(response("m2", "<p>newer text here</p>"));

        // New response starts with an empty set.
        assert!(!session.has_annotations());
        annotate(&mut session, AnnotationKind::Keep, "newer");
        annotate(&mut session, AnnotationKind::Keep, "here");

        assert!(session.go_older());
        assert_eq!(session.current().unwrap().message_id, "m1");
        assert_eq!(session.annotations().len(), 1);
        assert_eq!(session.annotations()[0].source_text, "older");

        session.clear_annotations();
        assert!(session.go_newer());
        assert_eq!(session.annotations().len(), 2);
    }

    #[test]
    fn test_rolling_capacity_and_position() {
        let mut session = ResponseSession::new(SessionConfig {
            history_capacity: 3,
            ..SessionConfig::default()
        });
        assert_eq!(session.position(), None);
        for i in 1..=4 {
            session.adopt_response(response(&format!("m{i}"), "<p>x y</p>"));
        }
        assert_eq!(session.history_len(), 3);
        let ids: Vec<_> = session.responses().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m4", "m3", "m2"]);
        assert_eq!(session.position(), Some((3, 3)));
        assert!(!session.can_go_newer());
        assert!(session.go_older());
        assert!(session.go_older());
        assert!(!session.can_go_older());
        assert!(!session.go_older());
        assert_eq!(session.position(), Some((1, 3)));
        assert!(!session.select(7));
    }

    #[test]
    fn test_replace_history_retains_known_sets() {
        let mut session = ResponseSession::new(SessionConfig::rolling());
        session.adopt_response(response("m1", "<p>alpha beta</p>"));
        annotate(&mut session, AnnotationKind::Keep, "alpha");

        session.replace_history(vec![
            response("m2", "<p>gamma</p>"),
            response("m1", "<p>alpha beta</p>"),
            response("m2", "<p>gamma again</p>"),
        ]);
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.active_index(), 0);
        assert!(!session.has_annotations());
        session.go_older();
        assert_eq!(session.annotations()[0].source_text, "alpha");
    }

    #[test]
    fn test_add_rejects_out_of_bounds_sample() {
        let mut session = ResponseSession::default();
        let sample = SelectionSample {
            text: "x".into(),
            start_offset: 0,
            end_offset: 1,
            anchor_rect: None,
            overlapping_annotation_id: None,
        };
        assert!(session.add_annotation(AnnotationKind::Keep, &sample).is_none());

        session.adopt_response(response("m1", "<p>ab</p>"));
        let wide = SelectionSample {
            end_offset: 9,
            ..sample
        };
        assert!(session.add_annotation(AnnotationKind::Keep, &wide).is_none());
    }

    #[test]
    fn test_overlay_cache_follows_mutations() {
        let mut session = ResponseSession::default();
        assert_eq!(session.current_overlay_markup(), "");
        session.adopt_response(response("m1", "<p>keep <em>this</em> part</p>"));
        assert_eq!(session.current_overlay_markup(), "<p>keep <em>this</em> part</p>");

        let id = annotate(&mut session, AnnotationKind::Keep, "this");
        let marked = session.current_overlay_markup();
        assert!(marked.contains("<em><mark class=\"annotation-highlight\""));
        assert_eq!(session.current_overlay_markup(), marked);

        assert!(session.remove_annotation(&id));
        assert!(!session.remove_annotation(&id));
        assert_eq!(session.current_overlay_markup(), "<p>keep <em>this</em> part</p>");
    }

    #[test]
    fn test_pending_feedback_message() {
        let mut session = ResponseSession::default();
        assert_eq!(
            session.pending_feedback_message(),
            PanelMessage::PendingFeedback { feedback: None }
        );
        session.adopt_response(response("m1", "<p>some claim</p>"));
        annotate(&mut session, AnnotationKind::Verify, "claim");
        let PanelMessage::PendingFeedback { feedback: Some(text) } =
            session.pending_feedback_message()
        else {
            panic!("expected pending feedback");
        };
        assert!(text.contains("- \"claim\""));
    }

    #[test]
    fn test_apply_message() {
        let mut session = ResponseSession::default();
        let ready = PanelMessage::ResponseReady {
            html: "<p>hi</p>".into(),
            text: "hi".into(),
            message_id: "m1".into(),
        };
        assert!(session.apply_message(ready.clone()));
        assert!(!session.apply_message(ready));
        assert!(!session.apply_message(PanelMessage::ConnectionStatus {
            status: ConnectionStatus::Watching
        }));
        assert_eq!(session.connection_status(), ConnectionStatus::Watching);

        assert!(!session.apply_message(PanelMessage::ResponseStreaming {
            html: "<p>partial</p>".into(),
            message_id: "m2".into(),
        }));
        assert_eq!(session.connection_status(), ConnectionStatus::Streaming);
        assert_eq!(session.current().map(|r| r.message_id.as_str()), Some("m1"));
    }

    #[test]
    fn test_live_container_text_is_the_offset_space() {
        // A browser drops the newline after <pre>.
        let mut session = ResponseSession::default();
        session.adopt_response(response("m1", "<pre>\nab cd</pre>"));
        assert_eq!(session.container_text(), "\nab cd");

        assert!(session.set_container_text("ab cd"));
        assert!(!session.set_container_text("ab cd"));
        let sample = session.sample_selection(3, 5, None).unwrap();
        assert_eq!(sample.text, "cd");
        assert_eq!(sample.range(), 3..5);
    }

    #[test]
    fn test_container_text_drops_annotations_past_end() {
        let mut session = ResponseSession::new(SessionConfig {
            strategy: RenderStrategy::TextRebuild,
            ..SessionConfig::default()
        });
        session.adopt_response(response("m1", "<p>one two three</p>"));
        annotate(&mut session, AnnotationKind::Keep, "one");
        annotate(&mut session, AnnotationKind::Drop, "three");

        assert!(session.set_container_text("one two"));
        assert_eq!(session.annotations().len(), 1);
        assert_eq!(
            session.current_overlay_markup(),
            "<mark class=\"annotation-highlight\" data-annotation-id=\"a-1\" data-annotation-kind=\"highlight\">one</mark> two"
        );
    }

    #[test]
    fn test_config_defaults_from_partial() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"history_capacity": 5, "strategy": "text-rebuild"}"#).unwrap();
        assert_eq!(config.history_capacity, 5);
        assert!(config.snap_to_words);
        assert_eq!(config.strategy, RenderStrategy::TextRebuild);
        assert_eq!(config.max_quote_chars, 200);
    }
}
