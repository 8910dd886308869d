//! Panel message transport in the browser.
//!
//! Outgoing messages go through a JS callback (e.g. a bound
//! `vscode.postMessage`) or `window.postMessage`. Incoming messages arrive as
//! `message` events. Delivery is fire and forget.

use gloo_events::EventListener;
use gloo_utils::format::JsValueSerdeExt;
use recurate_core::{DeliveryError, MessageSink, PanelMessage};
use wasm_bindgen::{JsCast, JsValue};

fn to_js(message: &PanelMessage) -> Result<JsValue, DeliveryError> {
    JsValue::from_serde(message).map_err(|e| DeliveryError(e.to_string()))
}

/// Sink calling a JS function with each message as a plain object.
pub struct CallbackSink {
    callback: js_sys::Function,
}

impl CallbackSink {
    pub fn new(callback: js_sys::Function) -> Self {
        Self { callback }
    }
}

impl MessageSink for CallbackSink {
    fn deliver(&self, message: &PanelMessage) -> Result<(), DeliveryError> {
        let value = to_js(message)?;
        self.callback
            .call1(&JsValue::NULL, &value)
            .map(|_| ())
            .map_err(|e| DeliveryError(format!("{:?}", e)))
    }
}

/// Sink posting to a window, e.g. the parent frame.
pub struct WindowSink {
    target: web_sys::Window,
    origin: String,
}

impl WindowSink {
    pub fn new(target: web_sys::Window, origin: impl Into<String>) -> Self {
        Self {
            target,
            origin: origin.into(),
        }
    }
}

impl MessageSink for WindowSink {
    fn deliver(&self, message: &PanelMessage) -> Result<(), DeliveryError> {
        let value = to_js(message)?;
        self.target
            .post_message(&value, &self.origin)
            .map_err(|e| DeliveryError(format!("{:?}", e)))
    }
}

/// Decode the payload of a `message` event. Strings are parsed as JSON.
pub fn decode_message(data: &JsValue) -> Option<PanelMessage> {
    let decoded = match data.as_string() {
        Some(json) => PanelMessage::from_json(&json).map_err(|e| e.to_string()),
        None => data.into_serde::<PanelMessage>().map_err(|e| e.to_string()),
    };
    match decoded {
        Ok(message) => Some(message),
        Err(error) => {
            tracing::debug!(%error, "ignoring unrecognized message");
            None
        }
    }
}

/// Call `on_message` for every panel message posted to `target`.
///
/// Dropping the returned listener detaches it.
pub fn listen_for_messages<F>(target: &web_sys::EventTarget, mut on_message: F) -> EventListener
where
    F: FnMut(PanelMessage) + 'static,
{
    EventListener::new(target, "message", move |event| {
        let Some(event) = event.dyn_ref::<web_sys::MessageEvent>() else {
            return;
        };
        if let Some(message) = decode_message(&event.data()) {
            on_message(message);
        }
    })
}
