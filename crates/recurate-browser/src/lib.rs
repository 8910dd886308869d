//! Browser DOM layer for recurate.
//!
//! Maps browser selections to character offsets, draws annotation overlays
//! on the live DOM and carries panel messages to and from the host. It
//! assumes a `wasm32-unknown-unknown` target environment.
//!
//! # Architecture
//!
//! - `dom`: text node walking, UTF-16 conversion and the DOM overlay surface
//! - `selection`: sampling the document selection inside a container
//! - `panel`: controller tying a `ResponseSession` to a container element
//! - `messaging`: message sinks and the `message` event listener
//! - `bindings`: `JsAnnotationPanel` for JavaScript hosts
//!
//! # Re-exports
//!
//! This crate re-exports `recurate-core` for convenience.

pub use recurate_core;
pub use recurate_core::*;

pub mod bindings;
pub mod clipboard;
pub mod dom;
pub mod messaging;
pub mod panel;
pub mod selection;

pub use bindings::JsAnnotationPanel;
pub use dom::{DomSurface, container_text, dom_position_to_text_offset, text_nodes_under};
pub use messaging::{CallbackSink, WindowSink, decode_message, listen_for_messages};
pub use panel::{AnnotationPanel, SELECTION_SETTLE_MS};
pub use selection::{RawSelection, clear_selection, read_selection, sample_selection};
