//! Overlays on the live DOM.
//!
//! The DOM counts text in UTF-16 code units. Everything here converts to
//! char offsets before handing positions to the core.

use recurate_core::offset_map::{char_to_utf16_offset, text_offset_of, utf16_to_char_offset};
use recurate_core::render::marker_open_tag;
use recurate_core::{Annotation, OverlaySurface, WrapError};
use smol_str::SmolStr;
use std::ops::Range;
use wasm_bindgen::JsCast;

/// `NodeFilter.SHOW_TEXT`
const SHOW_TEXT: u32 = 0x4;

/// Elements whose text content is not markup.
const RAW_TEXT_TAGS: &[&str] = &["SCRIPT", "STYLE", "TEXTAREA", "TITLE"];

/// Text nodes under `root` in document order.
pub fn text_nodes_under(
    document: &web_sys::Document,
    root: &web_sys::Node,
) -> Result<Vec<web_sys::Node>, WrapError> {
    let walker = document
        .create_tree_walker_with_what_to_show(root, SHOW_TEXT)
        .map_err(|e| WrapError::Platform(format!("create_tree_walker failed: {:?}", e)))?;
    let mut nodes = Vec::new();
    while let Ok(Some(node)) = walker.next_node() {
        nodes.push(node);
    }
    Ok(nodes)
}

/// Text of `root` as the offset mapping counts it: its text nodes, joined.
pub fn container_text(
    document: &web_sys::Document,
    root: &web_sys::Node,
) -> Result<String, WrapError> {
    Ok(text_nodes_under(document, root)?
        .iter()
        .map(node_text)
        .collect())
}

fn node_text(node: &web_sys::Node) -> String {
    node.text_content().unwrap_or_default()
}

/// Char offset of a DOM boundary point inside `container`.
///
/// Text node positions walk the text nodes and add the converted local
/// offset. A text node outside `container` maps to the total length.
/// Element positions (child index offsets) are measured with a range from
/// the container start.
pub fn dom_position_to_text_offset(
    document: &web_sys::Document,
    container: &web_sys::Node,
    node: &web_sys::Node,
    offset_utf16: u32,
) -> Option<usize> {
    if node.node_type() == web_sys::Node::TEXT_NODE {
        let nodes = text_nodes_under(document, container).ok()?;
        let local = utf16_to_char_offset(&node_text(node), offset_utf16 as usize);
        let lengths = nodes.into_iter().map(|n| {
            let len = node_text(&n).chars().count();
            (n, len)
        });
        return Some(text_offset_of(lengths, node, local));
    }

    let range = document.create_range().ok()?;
    range.set_start(container, 0).ok()?;
    range.set_end(node, offset_utf16).ok()?;
    Some(String::from(range.to_string()).chars().count())
}

/// Overlay surface over a live container element.
pub struct DomSurface {
    document: web_sys::Document,
    container: web_sys::Element,
}

impl DomSurface {
    pub fn new(document: web_sys::Document, container: web_sys::Element) -> Self {
        Self {
            document,
            container,
        }
    }

    /// Surface over the element with `id` in the current document.
    pub fn for_element_id(id: &str) -> Option<Self> {
        let document = web_sys::window()?.document()?;
        let container = document.get_element_by_id(id)?;
        Some(Self::new(document, container))
    }

    pub fn container(&self) -> &web_sys::Element {
        &self.container
    }

    fn marker_element(&self, annotation: &Annotation) -> Result<web_sys::Element, WrapError> {
        let platform = |e: wasm_bindgen::JsValue| WrapError::Platform(format!("{:?}", e));
        let marker = self
            .document
            .create_element(annotation.kind.marker_tag())
            .map_err(platform)?;
        marker.set_class_name(annotation.kind.marker_class());
        marker
            .set_attribute("data-annotation-id", annotation.id.as_str())
            .map_err(platform)?;
        marker
            .set_attribute("data-annotation-kind", annotation.kind.as_str())
            .map_err(platform)?;
        Ok(marker)
    }
}

impl OverlaySurface for DomSurface {
    type Node = web_sys::Node;

    fn reset(&mut self, html: &str) {
        self.container.set_inner_html(html);
    }

    fn text_nodes(&self) -> Vec<(web_sys::Node, usize)> {
        match text_nodes_under(&self.document, &self.container) {
            Ok(nodes) => nodes
                .into_iter()
                .map(|node| {
                    let len = node_text(&node).chars().count();
                    (node, len)
                })
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "could not enumerate text nodes");
                Vec::new()
            }
        }
    }

    fn wrap(
        &mut self,
        node: &web_sys::Node,
        local: Range<usize>,
        annotation: &Annotation,
    ) -> Result<(), WrapError> {
        if node.dyn_ref::<web_sys::Text>().is_none() {
            return Err(WrapError::NotText);
        }
        if !self.container.contains(Some(node)) {
            return Err(WrapError::Stale);
        }
        if let Some(parent) = node.parent_element() {
            let tag = parent.tag_name();
            if RAW_TEXT_TAGS.contains(&tag.as_str()) {
                return Err(WrapError::RawTextParent(SmolStr::new(tag.to_lowercase())));
            }
        }

        let text = node_text(node);
        let len = text.chars().count();
        if local.start >= local.end || local.end > len {
            return Err(WrapError::OutOfBounds {
                start: local.start,
                end: local.end,
                len,
            });
        }

        let start = char_to_utf16_offset(&text, local.start) as u32;
        let end = char_to_utf16_offset(&text, local.end) as u32;
        let platform = |e: wasm_bindgen::JsValue| WrapError::Platform(format!("{:?}", e));

        let range = self.document.create_range().map_err(platform)?;
        range.set_start(node, start).map_err(platform)?;
        range.set_end(node, end).map_err(platform)?;
        let marker = self.marker_element(annotation)?;
        range.surround_contents(&marker).map_err(platform)?;

        tracing::trace!(
            annotation = %annotation.id,
            open_tag = %marker_open_tag(annotation),
            start,
            end,
            "wrapped dom text"
        );
        Ok(())
    }
}
