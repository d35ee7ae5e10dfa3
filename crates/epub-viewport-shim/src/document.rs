//! In-memory XHTML content tree.

use epub_viewport::{ClientRect, ContentOffset, ContentTree, NodeId, NodeKind};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ShimError;
use crate::layout::TextLine;

pub(crate) struct ShimNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub text: Option<String>,
    pub rects: Vec<ClientRect>,
    pub lines: Vec<TextLine>,
}

impl ShimNode {
    fn element(parent: Option<NodeId>, name: String) -> Self {
        Self {
            kind: NodeKind::Element,
            parent,
            children: Vec::new(),
            name: Some(name),
            id: None,
            classes: Vec::new(),
            text: None,
            rects: Vec::new(),
            lines: Vec::new(),
        }
    }

    fn text(parent: NodeId, text: &str) -> Self {
        Self {
            kind: NodeKind::Text,
            parent: Some(parent),
            children: Vec::new(),
            name: None,
            id: None,
            classes: Vec::new(),
            text: Some(text.to_string()),
            rects: Vec::new(),
            lines: Vec::new(),
        }
    }
}

/// A parsed XHTML document with host-assigned geometry.
///
/// Structure is fixed after parsing; geometry is assigned with
/// [`ShimDocument::flow`] or set per node.
pub struct ShimDocument {
    pub(crate) nodes: Vec<ShimNode>,
    pub(crate) document_element: Option<NodeId>,
    /// Nodes in document order.
    pub(crate) order: Vec<NodeId>,
    /// Document-order index per node.
    pub(crate) order_index: Vec<usize>,
    /// Document-order index just past each node's last descendant.
    pub(crate) subtree_end: Vec<usize>,
    /// Text nodes in document order.
    pub(crate) text_order: Vec<NodeId>,
    pub(crate) ready: bool,
    pub(crate) visible_offset: Option<ContentOffset>,
    /// Viewport scroll position; reported geometry is shifted by it.
    pub(crate) scroll: ContentOffset,
}

fn decode_error(what: &'static str, err: impl core::fmt::Debug, offset: u64) -> ShimError {
    ShimError::new("XML_DECODE", format!("{} decode error: {:?}", what, err))
        .with_offset(usize::try_from(offset).unwrap_or(usize::MAX))
}

fn resolve_named_entity(name: &str) -> Option<&'static str> {
    if let Some(predefined) = quick_xml::escape::resolve_predefined_entity(name) {
        return Some(predefined);
    }
    match name {
        "nbsp" => Some("\u{a0}"),
        "shy" => Some("\u{ad}"),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "hellip" => Some("\u{2026}"),
        _ => None,
    }
}

impl ShimDocument {
    fn empty() -> Self {
        Self {
            nodes: Vec::with_capacity(64),
            document_element: None,
            order: Vec::new(),
            order_index: Vec::new(),
            subtree_end: Vec::new(),
            text_order: Vec::new(),
            ready: true,
            visible_offset: None,
            scroll: ContentOffset::zero(),
        }
    }

    /// Parse an XHTML document. Elements, text, CDATA and entity references
    /// become nodes; `id` and `class` attributes are kept.
    pub fn parse(xhtml: &[u8]) -> Result<Self, ShimError> {
        let mut reader = Reader::from_reader(xhtml);
        reader.config_mut().trim_text(false);
        let mut doc = Self::empty();
        let mut stack: Vec<NodeId> = Vec::with_capacity(16);
        let mut buf = Vec::with_capacity(64);
        let mut entity_buf = String::with_capacity(16);

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let node = doc.open_element(&reader, &e, stack.last().copied())?;
                    stack.push(node);
                }
                Ok(Event::Empty(e)) => {
                    doc.open_element(&reader, &e, stack.last().copied())?;
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(e)) => {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| decode_error("text", err, reader.buffer_position()))?;
                    doc.append_text(stack.last().copied(), &text);
                }
                Ok(Event::CData(e)) => {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| decode_error("cdata", err, reader.buffer_position()))?;
                    doc.append_text(stack.last().copied(), &text);
                }
                Ok(Event::GeneralRef(e)) => {
                    let name = e
                        .decode()
                        .map_err(|err| decode_error("entity", err, reader.buffer_position()))?;
                    entity_buf.clear();
                    entity_buf.push('&');
                    entity_buf.push_str(name.as_ref());
                    entity_buf.push(';');
                    match quick_xml::escape::unescape_with(&entity_buf, resolve_named_entity) {
                        Ok(resolved) => doc.append_text(stack.last().copied(), &resolved),
                        Err(err) => {
                            log::warn!("unresolved entity {}: {:?}", entity_buf, err);
                            doc.append_text(stack.last().copied(), &entity_buf);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(err) => {
                    let offset = usize::try_from(reader.error_position()).unwrap_or(usize::MAX);
                    return Err(ShimError::new("XML_PARSE", format!("{:?}", err)).with_offset(offset));
                }
                _ => {}
            }
            buf.clear();
        }

        if doc.document_element.is_none() {
            return Err(ShimError::new(
                "NO_DOCUMENT_ELEMENT",
                "document contains no elements",
            ));
        }
        doc.index();
        Ok(doc)
    }

    fn open_element(
        &mut self,
        reader: &Reader<&[u8]>,
        start: &BytesStart<'_>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ShimError> {
        let name = reader
            .decoder()
            .decode(start.local_name().as_ref())
            .map_err(|err| decode_error("tag", err, reader.buffer_position()))?
            .into_owned();
        if parent.is_none() && self.document_element.is_some() {
            return Err(ShimError::new(
                "MULTIPLE_ROOTS",
                format!("second root element <{}>", name),
            ));
        }
        let mut node = ShimNode::element(parent, name);
        for attr in start.attributes().flatten() {
            let key = attr.key.as_ref();
            if key != b"id" && key != b"class" {
                continue;
            }
            let value = reader
                .decoder()
                .decode(attr.value.as_ref())
                .map_err(|err| decode_error("attribute", err, reader.buffer_position()))?;
            if key == b"id" {
                node.id = Some(value.into_owned());
            } else {
                node.classes = value.split_whitespace().map(str::to_string).collect();
            }
        }
        let id = self.push(node);
        if parent.is_none() {
            self.document_element = Some(id);
        }
        Ok(id)
    }

    fn append_text(&mut self, parent: Option<NodeId>, text: &str) {
        let Some(parent) = parent else {
            return;
        };
        if text.is_empty() {
            return;
        }
        let last_text = self.nodes[parent.0 as usize]
            .children
            .last()
            .copied()
            .filter(|&child| self.nodes[child.0 as usize].kind == NodeKind::Text);
        match last_text {
            Some(child) => {
                if let Some(existing) = self.nodes[child.0 as usize].text.as_mut() {
                    existing.push_str(text);
                }
            }
            None => {
                self.push(ShimNode::text(parent, text));
            }
        }
    }

    fn push(&mut self, node: ShimNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        if let Some(parent) = node.parent {
            self.nodes[parent.0 as usize].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    fn index(&mut self) {
        let count = self.nodes.len();
        self.order = Vec::with_capacity(count);
        self.order_index = vec![0; count];
        self.subtree_end = vec![0; count];
        let Some(root) = self.document_element else {
            return;
        };
        // Explicit stack: (node, children visited).
        let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];
        while let Some((node, visited)) = stack.pop() {
            let idx = node.0 as usize;
            if visited {
                self.subtree_end[idx] = self.order.len();
                continue;
            }
            self.order_index[idx] = self.order.len();
            self.order.push(node);
            stack.push((node, true));
            for &child in self.nodes[idx].children.iter().rev() {
                stack.push((child, false));
            }
        }
        self.text_order = self
            .order
            .iter()
            .copied()
            .filter(|&node| self.nodes[node.0 as usize].kind == NodeKind::Text)
            .collect();
    }

    pub(crate) fn node(&self, node: NodeId) -> Option<&ShimNode> {
        self.nodes.get(usize::try_from(node.0).ok()?)
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> Option<&mut ShimNode> {
        self.nodes.get_mut(usize::try_from(node.0).ok()?)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The `<body>` element, if present.
    pub fn body(&self) -> Option<NodeId> {
        let root = self.document_element?;
        self.node(root)?
            .children
            .iter()
            .copied()
            .find(|&child| self.local_name(child) == Some("body"))
    }

    /// Elements with the given local name, in document order.
    pub fn elements_named(&self, name: &str) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|&node| self.local_name(node) == Some(name))
            .collect()
    }

    /// First text descendant of `node`, in document order.
    pub fn first_text(&self, node: NodeId) -> Option<NodeId> {
        let start = *self.order_index.get(node.0 as usize)?;
        let end = *self.subtree_end.get(node.0 as usize)?;
        self.order
            .get(start..end)?
            .iter()
            .copied()
            .find(|&n| self.is_text(n))
    }

    /// Text nodes in document order.
    pub fn text_nodes(&self) -> &[NodeId] {
        &self.text_order
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_visible_content_offset(&mut self, offset: Option<ContentOffset>) {
        self.visible_offset = offset;
    }

    /// Scroll the viewport so that content x `left` and y `top` sit at the
    /// viewport origin, the way a paginated frame scrolls between spreads.
    pub fn scroll_to(&mut self, left: f64, top: f64) {
        self.scroll = ContentOffset::new(top, left);
    }

    pub fn scroll(&self) -> ContentOffset {
        self.scroll
    }
}

impl ContentTree for ShimDocument {
    fn document_element(&self) -> Option<NodeId> {
        self.document_element
    }

    fn content_root(&self) -> Option<NodeId> {
        self.body().or(self.document_element)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.node(node).map(|n| n.kind)
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.text.as_deref()
    }

    fn local_name(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.name.as_deref()
    }

    fn element_id(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.id.as_deref()
    }

    fn class_names(&self, node: NodeId) -> Vec<&str> {
        self.node(node)
            .map(|n| n.classes.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.order
            .iter()
            .copied()
            .find(|&node| self.element_id(node) == Some(id))
    }
}
