//! JavaScript entry point for embedding the panel in a webview.

use std::rc::Rc;

use gloo_events::EventListener;
use gloo_utils::format::JsValueSerdeExt;
use recurate_core::{AnnotationId, AnnotationKind, SessionConfig};
use wasm_bindgen::prelude::*;

use crate::messaging::{CallbackSink, decode_message, listen_for_messages};
use crate::panel::AnnotationPanel;

/// A mounted annotation panel.
///
/// Messages from the host are read from `window` `message` events. Messages
/// to the host go through the `post` callback.
#[wasm_bindgen]
pub struct JsAnnotationPanel {
    panel: AnnotationPanel,
    _listeners: Vec<EventListener>,
}

#[wasm_bindgen]
impl JsAnnotationPanel {
    /// Mount on the element with `container_id`.
    ///
    /// `config` is an optional session config object, e.g.
    /// `{ history_capacity: 5 }`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        container_id: &str,
        post: js_sys::Function,
        config: JsValue,
    ) -> Result<JsAnnotationPanel, JsError> {
        let window = web_sys::window().ok_or_else(|| JsError::new("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsError::new("no document"))?;
        let container = document
            .get_element_by_id(container_id)
            .ok_or_else(|| JsError::new(&format!("no element #{container_id}")))?;

        let config = if config.is_undefined() || config.is_null() {
            SessionConfig::default()
        } else {
            config
                .into_serde::<SessionConfig>()
                .map_err(|e| JsError::new(&format!("invalid config: {e}")))?
        };

        let panel = AnnotationPanel::new(document, container, config, Rc::new(CallbackSink::new(post)));
        let pointer = panel.attach();
        let receiver = panel.clone();
        let messages = listen_for_messages(&window, move |message| receiver.handle_message(message));

        panel.announce_ready();
        Ok(Self {
            panel,
            _listeners: vec![pointer, messages],
        })
    }

    /// Feed a message directly, bypassing `window` events.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) {
        if let Some(message) = decode_message(&message) {
            self.panel.handle_message(message);
        }
    }

    /// Called with the pending selection (or `null`) whenever it changes.
    #[wasm_bindgen(js_name = setOnSelection)]
    pub fn set_on_selection(&self, callback: js_sys::Function) {
        self.panel.set_on_selection(move |sample| {
            let value = match sample {
                Some(sample) => JsValue::from_serde(sample).unwrap_or(JsValue::NULL),
                None => JsValue::NULL,
            };
            if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                tracing::debug!("selection callback failed: {:?}", e);
            }
        });
    }

    /// Annotate the pending selection with `kind`
    /// (`highlight`, `strikethrough`, `deeper` or `verify`).
    pub fn annotate(&self, kind: &str) -> Result<Option<String>, JsError> {
        let kind: AnnotationKind = kind.parse().map_err(|e| JsError::new(&format!("{e}")))?;
        Ok(self.panel.annotate(kind).map(|id| id.to_string()))
    }

    #[wasm_bindgen(js_name = clearSelected)]
    pub fn clear_selected(&self) -> bool {
        self.panel.clear_selected()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.panel.remove(&AnnotationId::from(id))
    }

    #[wasm_bindgen(js_name = clearAll)]
    pub fn clear_all(&self) {
        self.panel.clear_all();
    }

    pub fn dismiss(&self) {
        self.panel.dismiss();
    }

    #[wasm_bindgen(js_name = goOlder)]
    pub fn go_older(&self) -> bool {
        self.panel.go_older()
    }

    #[wasm_bindgen(js_name = goNewer)]
    pub fn go_newer(&self) -> bool {
        self.panel.go_newer()
    }

    /// "k of n" position in the history, or `undefined` when empty.
    pub fn position(&self) -> Option<String> {
        self.panel
            .with_session(|s| s.position())
            .map(|(k, n)| format!("{k} of {n}"))
    }

    /// Annotations on the active response as plain objects.
    pub fn annotations(&self) -> JsValue {
        self.panel
            .with_session(|s| JsValue::from_serde(s.annotations()))
            .unwrap_or(JsValue::NULL)
    }

    /// Summary like `2 keep, 1 drop`.
    pub fn summary(&self) -> String {
        self.panel
            .with_session(|s| s.store().map(|store| store.counts().to_string()))
            .unwrap_or_default()
    }

    #[wasm_bindgen(js_name = feedbackText)]
    pub fn feedback_text(&self) -> String {
        self.panel.with_session(|s| s.feedback_text())
    }

    #[wasm_bindgen(js_name = sendFeedback)]
    pub fn send_feedback(&self) -> bool {
        self.panel.send_feedback()
    }

    #[wasm_bindgen(js_name = copyFeedback)]
    pub fn copy_feedback(&self) -> bool {
        self.panel.copy_feedback()
    }
}
