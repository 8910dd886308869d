//! Messages exchanged between the annotation panel and its host.
//!
//! JSON objects tagged by `type`, e.g.
//! `{"type":"RESPONSE_READY","html":"...","text":"...","messageId":"..."}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::RecurateError;
use crate::types::ResponseExtracted;

/// Connection state shown in the panel status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Streaming,
    Watching,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelMessage {
    /// Partial response while the assistant is still writing.
    #[serde(rename_all = "camelCase")]
    ResponseStreaming { html: String, message_id: SmolStr },
    /// A completed response.
    #[serde(rename_all = "camelCase")]
    ResponseReady {
        html: String,
        text: String,
        message_id: SmolStr,
    },
    /// Recent responses, newest first.
    ResponseHistory { responses: Vec<ResponseExtracted> },
    /// Insert feedback into the chat input now.
    InjectFeedback { feedback: String },
    /// Feedback staged for the chat input. `None` clears it.
    PendingFeedback { feedback: Option<String> },
    CopyFeedback { feedback: String },
    ConnectionStatus { status: ConnectionStatus },
    ThemeChanged { theme: Theme },
    /// The panel finished loading and can receive messages.
    WebviewReady,
}

impl PanelMessage {
    pub fn from_json(json: &str) -> Result<Self, RecurateError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RecurateError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of this message's `type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            PanelMessage::ResponseStreaming { .. } => "RESPONSE_STREAMING",
            PanelMessage::ResponseReady { .. } => "RESPONSE_READY",
            PanelMessage::ResponseHistory { .. } => "RESPONSE_HISTORY",
            PanelMessage::InjectFeedback { .. } => "INJECT_FEEDBACK",
            PanelMessage::PendingFeedback { .. } => "PENDING_FEEDBACK",
            PanelMessage::CopyFeedback { .. } => "COPY_FEEDBACK",
            PanelMessage::ConnectionStatus { .. } => "CONNECTION_STATUS",
            PanelMessage::ThemeChanged { .. } => "THEME_CHANGED",
            PanelMessage::WebviewReady => "WEBVIEW_READY",
        }
    }
}

/// A failed delivery. The recipient may simply not exist any more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError(pub String);

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delivery failed: {}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// Somewhere panel messages can be posted.
pub trait MessageSink {
    fn deliver(&self, message: &PanelMessage) -> Result<(), DeliveryError>;
}

/// Post `message`, logging and dropping any failure.
pub fn deliver_quietly<S: MessageSink + ?Sized>(sink: &S, message: &PanelMessage) {
    if let Err(err) = sink.deliver(message) {
        tracing::debug!(message = message.type_name(), error = %err, "dropped panel message");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_response_ready_wire_shape() {
        let json = r#"{"type":"RESPONSE_READY","html":"<p>x</p>","text":"x","messageId":"m-1"}"#;
        let msg = PanelMessage::from_json(json).unwrap();
        assert_eq!(
            msg,
            PanelMessage::ResponseReady {
                html: "<p>x</p>".into(),
                text: "x".into(),
                message_id: "m-1".into(),
            }
        );
        assert_eq!(msg.to_json().unwrap(), json);
    }

    #[test]
    fn test_unit_and_enum_payloads() {
        assert_eq!(
            PanelMessage::WebviewReady.to_json().unwrap(),
            r#"{"type":"WEBVIEW_READY"}"#
        );
        let status = PanelMessage::from_json(r#"{"type":"CONNECTION_STATUS","status":"watching"}"#)
            .unwrap();
        assert_eq!(
            status,
            PanelMessage::ConnectionStatus {
                status: ConnectionStatus::Watching
            }
        );
        let theme = PanelMessage::from_json(r#"{"type":"THEME_CHANGED","theme":"light"}"#).unwrap();
        assert_eq!(theme.type_name(), "THEME_CHANGED");
    }

    #[test]
    fn test_pending_feedback_null() {
        let msg = PanelMessage::PendingFeedback { feedback: None };
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"PENDING_FEEDBACK","feedback":null}"#
        );
    }

    #[test]
    fn test_history_ignores_extra_fields() {
        let json = r#"{"type":"RESPONSE_HISTORY","responses":[
            {"html":"<p>b</p>","text":"b","messageId":"2","timestamp":"2025-01-01T00:00:00Z"},
            {"html":"<p>a</p>","text":"a","messageId":"1"}
        ]}"#;
        let PanelMessage::ResponseHistory { responses } = PanelMessage::from_json(json).unwrap()
        else {
            panic!("expected history");
        };
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].message_id, "2");
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(matches!(
            PanelMessage::from_json(r#"{"type":"NOPE"}"#),
            Err(RecurateError::Message(_))
        ));
        assert!(PanelMessage::from_json("not json").is_err());
    }

    struct Closed;

    impl MessageSink for Closed {
        fn deliver(&self, _: &PanelMessage) -> Result<(), DeliveryError> {
            Err(DeliveryError("panel closed".into()))
        }
    }

    struct Recorder(RefCell<Vec<PanelMessage>>);

    impl MessageSink for Recorder {
        fn deliver(&self, message: &PanelMessage) -> Result<(), DeliveryError> {
            self.0.borrow_mut().push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn test_deliver_quietly() {
        deliver_quietly(&Closed, &PanelMessage::WebviewReady);

        let recorder = Recorder(RefCell::new(Vec::new()));
        let sink: &dyn MessageSink = &recorder;
        deliver_quietly(sink, &PanelMessage::WebviewReady);
        assert_eq!(recorder.0.borrow().as_slice(), &[PanelMessage::WebviewReady]);
    }
}
