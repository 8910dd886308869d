//! Owned HTML fragment tree for environments without a live DOM.
//!
//! The parser is lenient: it never fails, and anything it does not understand
//! is kept as a raw node. Untouched nodes serialize back to their exact source
//! bytes, so `Fragment::parse(html).to_html() == html`.
//!
//! Text offsets are counted over decoded text in chars, in document order,
//! which matches what a browser's text-node walk reports.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use markdown_weaver_escape::escape_html;
use smol_str::SmolStr;

use crate::error::WrapError;
use crate::offset_map::slice_chars;

/// Elements that never have children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is a single unparsed text run.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Raw-text elements whose content still has entities decoded.
const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

/// Handle to a node in a [`Fragment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The synthetic container every fragment is parsed into.
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone)]
enum NodeData {
    Root,
    Element {
        name: SmolStr,
        open_tag: String,
        close_tag: Option<String>,
    },
    Text {
        text: String,
        /// Source bytes, kept until the node is split.
        raw: Option<String>,
    },
    /// Comments, doctypes, processing instructions, stray end tags.
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed HTML fragment.
#[derive(Debug, Clone)]
pub struct Fragment {
    nodes: Vec<Node>,
}

impl Default for Fragment {
    fn default() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }
}

impl Fragment {
    /// Parse an HTML fragment.
    pub fn parse(html: &str) -> Self {
        let mut frag = Fragment::default();
        let mut stack = vec![NodeId::ROOT];
        let mut pos = 0;

        while pos < html.len() {
            let rest = &html[pos..];
            let parent = *stack.last().unwrap_or(&NodeId::ROOT);

            let tag_start = find_tag_start(rest);
            match tag_start {
                Some(0) => {}
                Some(n) => {
                    frag.push_text(parent, &rest[..n], true);
                    pos += n;
                    continue;
                }
                None => {
                    frag.push_text(parent, rest, true);
                    break;
                }
            }

            if rest.starts_with("<!--") {
                let end = rest.find("-->").map(|i| i + 3).unwrap_or(rest.len());
                frag.push_raw(parent, &rest[..end]);
                pos += end;
            } else if rest.starts_with("</") {
                let end = find_tag_end(rest).unwrap_or(rest.len());
                let raw = &rest[..end];
                let name = tag_name(&rest[2..]);
                let open_idx = stack.iter().rposition(|id| frag.element_name(*id) == Some(&name));
                match open_idx {
                    Some(idx) if !name.is_empty() && idx > 0 => {
                        let id = stack[idx];
                        if let NodeData::Element { close_tag, .. } = &mut frag.nodes[id.0].data {
                            *close_tag = Some(raw.to_string());
                        }
                        stack.truncate(idx);
                    }
                    _ => {
                        tracing::trace!(tag = %raw, "stray end tag kept as raw node");
                        frag.push_raw(parent, raw);
                    }
                }
                pos += end;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
                frag.push_raw(parent, &rest[..end]);
                pos += end;
            } else {
                let Some(end) = find_tag_end(rest) else {
                    // Unterminated tag: keep the remainder verbatim.
                    frag.push_raw(parent, rest);
                    break;
                };
                let open_tag = &rest[..end];
                let name = tag_name(&rest[1..]);
                let self_closing = open_tag.ends_with("/>");
                let id = frag.push_element(parent, name.clone(), open_tag.to_string());
                pos += end;

                if VOID_ELEMENTS.contains(&name.as_str()) || self_closing {
                    continue;
                }

                if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                    let body = &html[pos..];
                    let needle = format!("</{}", name);
                    let close_at = body.to_ascii_lowercase().find(&needle);
                    let content_end = close_at.unwrap_or(body.len());
                    let decode = ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&name.as_str());
                    frag.push_text(id, &body[..content_end], decode);
                    pos += content_end;
                    if close_at.is_some() {
                        let close_rest = &html[pos..];
                        let close_end = find_tag_end(close_rest).unwrap_or(close_rest.len());
                        if let NodeData::Element { close_tag, .. } = &mut frag.nodes[id.0].data {
                            *close_tag = Some(close_rest[..close_end].to_string());
                        }
                        pos += close_end;
                    }
                    continue;
                }

                stack.push(id);
            }
        }

        frag
    }

    /// Serialize back to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_node(NodeId::ROOT, &mut out);
        out
    }

    /// Text nodes in document order with their char lengths.
    pub fn text_nodes(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        self.collect_text_nodes(NodeId::ROOT, &mut out);
        out
    }

    /// Concatenated text of every text node.
    pub fn text_content(&self) -> String {
        self.text_nodes()
            .into_iter()
            .filter_map(|(id, _)| self.text(id))
            .collect()
    }

    /// Decoded text of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.data {
            NodeData::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Lowercased tag name of an element node.
    pub fn element_name(&self, id: NodeId) -> Option<&SmolStr> {
        match &self.nodes.get(id.0)?.data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Wrap `local` chars of a text node in a new element.
    ///
    /// The original node keeps the text before the range, the new element
    /// holds the range, and a new text node holds what follows. Keeping the
    /// original as the prefix means lower offsets in the same node stay valid.
    pub fn wrap_text(
        &mut self,
        id: NodeId,
        local: Range<usize>,
        tag: &str,
        open_tag: String,
    ) -> Result<NodeId, WrapError> {
        let node = self.nodes.get(id.0).ok_or(WrapError::Stale)?;
        let NodeData::Text { text, raw } = &node.data else {
            return Err(WrapError::NotText);
        };
        let parent = node.parent.ok_or(WrapError::Stale)?;
        if let Some(name) = self.element_name(parent) {
            if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                return Err(WrapError::RawTextParent(name.clone()));
            }
        }

        let len = text.chars().count();
        if local.start >= local.end || local.end > len {
            return Err(WrapError::OutOfBounds {
                start: local.start,
                end: local.end,
                len,
            });
        }

        let verbatim = raw.as_deref() == Some(text.as_str());
        let prefix = slice_chars(text, 0..local.start).to_string();
        let middle = slice_chars(text, local.clone()).to_string();
        let suffix = slice_chars(text, local.end..len).to_string();
        let piece_raw = |s: &str| verbatim.then(|| s.to_string());

        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == id)
            .ok_or(WrapError::Stale)?;

        self.nodes[id.0].data = NodeData::Text {
            raw: piece_raw(&prefix),
            text: prefix,
        };

        let marker = self.alloc(
            parent,
            NodeData::Element {
                name: SmolStr::new(tag),
                open_tag,
                close_tag: Some(format!("</{}>", tag)),
            },
        );
        let inner = self.alloc(
            marker,
            NodeData::Text {
                raw: piece_raw(&middle),
                text: middle,
            },
        );
        self.nodes[marker.0].children.push(inner);

        let mut inserted = vec![marker];
        if !suffix.is_empty() {
            inserted.push(self.alloc(
                parent,
                NodeData::Text {
                    raw: piece_raw(&suffix),
                    text: suffix,
                },
            ));
        }
        let siblings = &mut self.nodes[parent.0].children;
        for (offset, node) in inserted.into_iter().enumerate() {
            siblings.insert(index + 1 + offset, node);
        }

        Ok(marker)
    }

    fn alloc(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        id
    }

    fn push_child(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.alloc(parent, data);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_text(&mut self, parent: NodeId, raw: &str, decode: bool) {
        if raw.is_empty() {
            return;
        }
        let text = if decode {
            decode_entities(raw).into_owned()
        } else {
            raw.to_string()
        };
        self.push_child(
            parent,
            NodeData::Text {
                text,
                raw: Some(raw.to_string()),
            },
        );
    }

    fn push_raw(&mut self, parent: NodeId, raw: &str) {
        self.push_child(parent, NodeData::Raw(raw.to_string()));
    }

    fn push_element(&mut self, parent: NodeId, name: SmolStr, open_tag: String) -> NodeId {
        self.push_child(
            parent,
            NodeData::Element {
                name,
                open_tag,
                close_tag: None,
            },
        )
    }

    fn collect_text_nodes(&self, id: NodeId, out: &mut Vec<(NodeId, usize)>) {
        let node = &self.nodes[id.0];
        if let NodeData::Text { text, .. } = &node.data {
            out.push((id, text.chars().count()));
        }
        for child in &node.children {
            self.collect_text_nodes(*child, out);
        }
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.data {
            NodeData::Root => {}
            NodeData::Element { open_tag, .. } => out.push_str(open_tag),
            NodeData::Text { raw: Some(raw), .. } => out.push_str(raw),
            NodeData::Text { text, raw: None } => {
                let _ = escape_html(&mut *out, text);
            }
            NodeData::Raw(raw) => out.push_str(raw),
        }
        for child in &node.children {
            self.write_node(*child, out);
        }
        if let NodeData::Element {
            close_tag: Some(close),
            ..
        } = &node.data
        {
            out.push_str(close);
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

/// Byte offset of the next `<` that opens a tag, comment or declaration.
fn find_tag_start(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    s.match_indices('<').map(|(i, _)| i).find(|&i| {
        matches!(bytes.get(i + 1), Some(&b) if b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
    })
}

/// Byte offset one past the `>` closing the tag at the start of `s`.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, b) in s.bytes().enumerate().skip(1) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

fn tag_name(s: &str) -> SmolStr {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ':'))
        .unwrap_or(s.len());
    SmolStr::new(s[..end].to_ascii_lowercase())
}

/// Decode character references. Unknown references are left as written.
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match rest.find(';').filter(|&semi| semi > 1 && semi <= 32) {
            Some(semi) => match decode_reference(&rest[1..semi]) {
                Some(c) => {
                    out.push(c);
                    rest = &rest[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &rest[1..];
                }
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "bull" => '•',
        "middot" => '·',
        "times" => '×',
        "divide" => '÷',
        "deg" => '°',
        "plusmn" => '±',
        "para" => '¶',
        "sect" => '§',
        "euro" => '€',
        "larr" => '←',
        "rarr" => '→',
        "uarr" => '↑',
        "darr" => '↓',
        "harr" => '↔',
        "le" => '≤',
        "ge" => '≥',
        "ne" => '≠',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<h2 id=\"x\">Setup</h2>\n<p>Run <code>cargo &amp;&amp; go</code> now.</p>\n<ul><li>one<li>two</ul><!-- c --><br>";

    #[test]
    fn test_round_trip_is_byte_identical() {
        for html in [
            SAMPLE,
            "",
            "plain text only",
            "a < b and c > d",
            "<p>unclosed <em>tags",
            "</div>stray<p>x</p>",
            "<script>if (a < b) { x = '</p>'; }</script><p>after</p>",
            "<img src=\"a.png\" alt='x > y'/>tail",
            "<p title=\"q\">&unknown; &#x1F30D; &#169;</p>",
            "<div",
        ] {
            assert_eq!(Fragment::parse(html).to_html(), html, "round trip of {html:?}");
        }
    }

    #[test]
    fn test_text_content_decodes_entities() {
        let frag = Fragment::parse(SAMPLE);
        assert_eq!(frag.text_content(), "Setup\nRun cargo && go now.\nonetwo");
    }

    #[test]
    fn test_text_nodes_in_document_order() {
        let frag = Fragment::parse("<p>ab<b>cd</b>ef</p>");
        let texts: Vec<_> = frag
            .text_nodes()
            .into_iter()
            .map(|(id, len)| (frag.text(id).unwrap().to_string(), len))
            .collect();
        assert_eq!(
            texts,
            vec![("ab".into(), 2), ("cd".into(), 2), ("ef".into(), 2)]
        );
    }

    #[test]
    fn test_script_text_counts_but_is_not_parsed() {
        let frag = Fragment::parse("<script>a<b</script>z");
        assert_eq!(frag.text_content(), "a<bz");
    }

    #[test]
    fn test_wrap_splits_and_keeps_prefix() {
        let mut frag = Fragment::parse("<p>hello world</p>");
        let (id, _) = frag.text_nodes()[0];
        frag.wrap_text(id, 6..11, "mark", "<mark>".into()).unwrap();
        assert_eq!(frag.text(id), Some("hello "));
        frag.wrap_text(id, 0..5, "del", "<del>".into()).unwrap();
        assert_eq!(
            frag.to_html(),
            "<p><del>hello</del> <mark>world</mark></p>"
        );
        assert_eq!(frag.text_content(), "hello world");
    }

    #[test]
    fn test_wrap_reescapes_split_entities() {
        let mut frag = Fragment::parse("<p>a &amp; b</p>");
        let (id, len) = frag.text_nodes()[0];
        assert_eq!(len, 5);
        frag.wrap_text(id, 2..3, "mark", "<mark>".into()).unwrap();
        assert_eq!(frag.to_html(), "<p>a <mark>&amp;</mark> b</p>");
    }

    #[test]
    fn test_wrap_rejects_bad_targets() {
        let mut frag = Fragment::parse("<style>p{}</style><p>x</p>");
        let nodes = frag.text_nodes();
        let (style_text, _) = nodes[0];
        let (p_text, _) = nodes[1];
        assert_eq!(
            frag.wrap_text(style_text, 0..1, "mark", "<mark>".into()),
            Err(WrapError::RawTextParent("style".into()))
        );
        assert!(matches!(
            frag.wrap_text(p_text, 0..5, "mark", "<mark>".into()),
            Err(WrapError::OutOfBounds { .. })
        ));
        let p = frag.parent(p_text).unwrap();
        assert_eq!(
            frag.wrap_text(p, 0..1, "mark", "<mark>".into()),
            Err(WrapError::NotText)
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("no refs"), "no refs");
        assert_eq!(decode_entities("&lt;a&gt; &#65;&#x42;"), "<a> AB");
        assert_eq!(decode_entities("AT&T & co"), "AT&T & co");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }
}
