//! The annotation panel controller.
//!
//! Owns a [`ResponseSession`], keeps the response container in sync with it,
//! and samples the selection shortly after each pointer-up so the browser
//! has finalized it.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_events::EventListener;
use gloo_timers::callback::Timeout;
use recurate_core::{
    AnnotationId, AnnotationKind, ConnectionStatus, MessageSink, OverlayReport, PanelMessage,
    RenderStrategy, ResponseSession, SelectionSample, SessionConfig, Theme, apply_overlays,
    deliver_quietly,
};

use crate::dom::{DomSurface, container_text};
use crate::selection::{clear_selection, sample_selection};

/// Delay between pointer-up and reading the selection, in milliseconds.
pub const SELECTION_SETTLE_MS: u32 = 10;

type SelectionCallback = Rc<dyn Fn(Option<&SelectionSample>)>;

struct PanelState {
    session: ResponseSession,
    selection: Option<SelectionSample>,
    theme: Theme,
}

/// Shared handle to a panel bound to one container element.
#[derive(Clone)]
pub struct AnnotationPanel {
    container: web_sys::Element,
    document: web_sys::Document,
    state: Rc<RefCell<PanelState>>,
    sink: Rc<dyn MessageSink>,
    on_selection: Rc<RefCell<Option<SelectionCallback>>>,
}

impl AnnotationPanel {
    pub fn new(
        document: web_sys::Document,
        container: web_sys::Element,
        config: SessionConfig,
        sink: Rc<dyn MessageSink>,
    ) -> Self {
        Self {
            container,
            document,
            state: Rc::new(RefCell::new(PanelState {
                session: ResponseSession::new(config),
                selection: None,
                theme: Theme::default(),
            })),
            sink,
            on_selection: Rc::new(RefCell::new(None)),
        }
    }

    /// Called whenever the pending selection changes, e.g. to place a toolbar.
    pub fn set_on_selection(&self, callback: impl Fn(Option<&SelectionSample>) + 'static) {
        *self.on_selection.borrow_mut() = Some(Rc::new(callback));
    }

    /// Listen for pointer-up on the container. Keep the listener alive for as
    /// long as sampling should happen.
    pub fn attach(&self) -> EventListener {
        let panel = self.clone();
        EventListener::new(&self.container, "pointerup", move |_| {
            panel.schedule_sample();
        })
    }

    /// Sample the selection after [`SELECTION_SETTLE_MS`].
    pub fn schedule_sample(&self) {
        let panel = self.clone();
        Timeout::new(SELECTION_SETTLE_MS, move || panel.sample_now()).forget();
    }

    /// Read the selection immediately.
    pub fn sample_now(&self) {
        let sample = {
            let mut state = self.state.borrow_mut();
            let sample = sample_selection(&self.container, &state.session);
            state.selection = sample.clone();
            sample
        };
        self.notify_selection(sample.as_ref());
    }

    fn notify_selection(&self, sample: Option<&SelectionSample>) {
        // Released before the call so the callback may replace itself.
        let callback = self.on_selection.borrow().clone();
        if let Some(callback) = callback {
            callback(sample);
        }
    }

    pub fn selection(&self) -> Option<SelectionSample> {
        self.state.borrow().selection.clone()
    }

    pub fn theme(&self) -> Theme {
        self.state.borrow().theme
    }

    /// Run `f` against the session without mutating it.
    pub fn with_session<R>(&self, f: impl FnOnce(&ResponseSession) -> R) -> R {
        f(&self.state.borrow().session)
    }

    /// Handle a message from the host.
    pub fn handle_message(&self, message: PanelMessage) {
        tracing::debug!(message = message.type_name(), "panel message");
        let changed = {
            let mut state = self.state.borrow_mut();
            if let PanelMessage::ThemeChanged { theme } = &message {
                state.theme = *theme;
            }
            state.session.apply_message(message)
        };
        self.apply_attributes();
        if changed {
            self.dismiss();
            self.render();
            self.publish_pending();
        }
    }

    /// Reflect theme and connection status as `data-theme` / `data-status`.
    fn apply_attributes(&self) {
        let theme = match self.theme() {
            Theme::Light => "light",
            Theme::Dark => "dark",
        };
        let status = match self.with_session(|s| s.connection_status()) {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Streaming => "streaming",
            ConnectionStatus::Watching => "watching",
            ConnectionStatus::Ready => "ready",
        };
        for (name, value) in [("data-theme", theme), ("data-status", status)] {
            if let Err(e) = self.container.set_attribute(name, value) {
                tracing::debug!("set {} failed: {:?}", name, e);
            }
        }
    }

    /// Annotate the pending selection. Clears the selection either way.
    pub fn annotate(&self, kind: AnnotationKind) -> Option<AnnotationId> {
        let id = {
            let mut state = self.state.borrow_mut();
            let sample = state.selection.take()?;
            state.session.add_annotation(kind, &sample)
        };
        clear_selection();
        self.notify_selection(None);
        if id.is_some() {
            self.render();
            self.publish_pending();
        }
        id
    }

    /// Remove the annotation the pending selection overlaps.
    pub fn clear_selected(&self) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let Some(id) = state
                .selection
                .as_ref()
                .and_then(|s| s.overlapping_annotation_id.clone())
            else {
                return false;
            };
            state.selection = None;
            state.session.remove_annotation(&id)
        };
        clear_selection();
        self.notify_selection(None);
        if removed {
            self.render();
            self.publish_pending();
        }
        removed
    }

    pub fn remove(&self, id: &AnnotationId) -> bool {
        let removed = self.state.borrow_mut().session.remove_annotation(id);
        if removed {
            self.render();
            self.publish_pending();
        }
        removed
    }

    pub fn clear_all(&self) {
        self.state.borrow_mut().session.clear_annotations();
        self.render();
        self.publish_pending();
    }

    /// Forget the pending selection without annotating.
    pub fn dismiss(&self) {
        let had = self.state.borrow_mut().selection.take().is_some();
        if had {
            self.notify_selection(None);
        }
    }

    pub fn go_older(&self) -> bool {
        self.navigate(|session| session.go_older())
    }

    pub fn go_newer(&self) -> bool {
        self.navigate(|session| session.go_newer())
    }

    fn navigate(&self, step: impl FnOnce(&mut ResponseSession) -> bool) -> bool {
        let moved = step(&mut self.state.borrow_mut().session);
        if moved {
            self.dismiss();
            self.render();
            self.publish_pending();
        }
        moved
    }

    /// Redraw the container from the active response's original markup.
    ///
    /// Afterwards the session counts offsets over the container's live text,
    /// which is what selections are measured against.
    pub fn render(&self) -> OverlayReport {
        let report = self.draw();
        match container_text(&self.document, &self.container) {
            Ok(text) => {
                self.state.borrow_mut().session.set_container_text(text);
            }
            Err(e) => tracing::debug!("reading container text failed: {}", e),
        }
        report
    }

    fn draw(&self) -> OverlayReport {
        let state = self.state.borrow();
        let session = &state.session;
        let Some(response) = session.current() else {
            self.container.set_inner_html("");
            return OverlayReport::default();
        };

        match session.config().strategy {
            RenderStrategy::DomOverlay => {
                let mut surface = DomSurface::new(self.document.clone(), self.container.clone());
                let report = apply_overlays(&mut surface, &response.html, session.annotations());
                tracing::trace!(wrapped = report.wrapped, skipped = report.skipped, "rendered overlays");
                report
            }
            RenderStrategy::TextRebuild => {
                self.container
                    .set_inner_html(&session.current_overlay_markup());
                OverlayReport::default()
            }
        }
    }

    /// Stage the current feedback (or its absence) with the host.
    pub fn publish_pending(&self) {
        let message = self.state.borrow().session.pending_feedback_message();
        deliver_quietly(self.sink.as_ref(), &message);
    }

    /// Ask the host to insert the feedback now. No-op without annotations.
    pub fn send_feedback(&self) -> bool {
        let feedback = self.state.borrow().session.feedback_text();
        if feedback.is_empty() {
            return false;
        }
        deliver_quietly(self.sink.as_ref(), &PanelMessage::InjectFeedback { feedback });
        true
    }

    /// Copy the feedback to the clipboard and tell the host.
    pub fn copy_feedback(&self) -> bool {
        let feedback = self.state.borrow().session.feedback_text();
        if feedback.is_empty() {
            return false;
        }
        crate::clipboard::copy_text(feedback.clone());
        deliver_quietly(self.sink.as_ref(), &PanelMessage::CopyFeedback { feedback });
        true
    }

    /// Tell the host the panel is ready for messages.
    pub fn announce_ready(&self) {
        deliver_quietly(self.sink.as_ref(), &PanelMessage::WebviewReady);
    }
}
