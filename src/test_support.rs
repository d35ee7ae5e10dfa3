//! In-crate surface double for unit tests.

use crate::cfi::{CfiAddress, CfiCodec, CfiError};
use crate::geometry::{ClientRect, ContentOffset, RectList};
use crate::tree::{
    Blacklist, CaretPosition, ContentTree, NodeId, NodeKind, NodePosition, NodeRange,
    RenderSurface,
};

struct MockNode {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    name: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    text: Option<String>,
    rects: Vec<ClientRect>,
    char_width: f64,
}

pub(crate) struct MockSurface {
    nodes: Vec<MockNode>,
    pub ready: bool,
    pub offset: Option<ContentOffset>,
    /// Carets reported for points inside these boxes take precedence.
    pub caret_overrides: Vec<(ClientRect, Option<CaretPosition>)>,
}

impl MockSurface {
    /// `<html>` (node 0) containing an empty `<body>` (node 1).
    pub fn new() -> Self {
        let mut surface = Self {
            nodes: Vec::new(),
            ready: true,
            offset: None,
            caret_overrides: Vec::new(),
        };
        let html = surface.push(NodeKind::Element, None, Some("html"), None, &[], 0.0);
        surface.push(NodeKind::Element, Some(html), Some("body"), None, &[], 0.0);
        surface
    }

    pub fn html(&self) -> NodeId {
        NodeId(0)
    }

    pub fn body(&self) -> NodeId {
        NodeId(1)
    }

    fn push(
        &mut self,
        kind: NodeKind,
        parent: Option<NodeId>,
        name: Option<&str>,
        text: Option<&str>,
        rects: &[ClientRect],
        char_width: f64,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(MockNode {
            kind,
            parent,
            children: Vec::new(),
            name: name.map(str::to_string),
            id: None,
            classes: Vec::new(),
            text: text.map(str::to_string),
            rects: rects.to_vec(),
            char_width,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0 as usize].children.push(id);
        }
        id
    }

    pub fn element(&mut self, parent: NodeId, name: &str, rects: &[ClientRect]) -> NodeId {
        self.push(NodeKind::Element, Some(parent), Some(name), None, rects, 0.0)
    }

    /// Single-line monospace text run.
    pub fn text_run(
        &mut self,
        parent: NodeId,
        text: &str,
        left: f64,
        top: f64,
        char_width: f64,
        height: f64,
    ) -> NodeId {
        let width = char_width * text.chars().count() as f64;
        let rect = ClientRect::from_xywh(left, top, width, height);
        self.push(NodeKind::Text, Some(parent), None, Some(text), &[rect], char_width)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        self.nodes[node.0 as usize].classes.push(class.to_string());
    }

    pub fn set_id(&mut self, node: NodeId, id: &str) {
        self.nodes[node.0 as usize].id = Some(id.to_string());
    }

    pub fn set_rects(&mut self, node: NodeId, rects: &[ClientRect]) {
        self.nodes[node.0 as usize].rects = rects.to_vec();
    }

    fn node(&self, node: NodeId) -> Option<&MockNode> {
        self.nodes.get(node.0 as usize)
    }

    fn text_caret(&self, x: f64, y: f64) -> Option<CaretPosition> {
        self.nodes.iter().enumerate().find_map(|(idx, node)| {
            if node.kind != NodeKind::Text {
                return None;
            }
            let rect = node.rects.first()?;
            if !rect.contains_point(x, y) || node.char_width <= 0.0 {
                return None;
            }
            let len = node.text.as_deref().map_or(0, |t| t.chars().count());
            let offset = ((x - rect.left) / node.char_width).round().max(0.0) as usize;
            Some(CaretPosition::new(NodeId(idx as u64), offset.min(len)))
        })
    }
}

impl ContentTree for MockSurface {
    fn document_element(&self) -> Option<NodeId> {
        Some(self.html())
    }

    fn content_root(&self) -> Option<NodeId> {
        Some(self.body())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
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
        self.nodes
            .iter()
            .position(|n| n.id.as_deref() == Some(id))
            .map(|idx| NodeId(idx as u64))
    }
}

impl RenderSurface for MockSurface {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn client_rects(&self, node: NodeId) -> RectList {
        self.node(node)
            .map(|n| n.rects.iter().copied().collect())
            .unwrap_or_default()
    }

    fn range_client_rects(&self, range: &NodeRange) -> RectList {
        let mut out = RectList::new();
        let Some(start) = self.node(range.start.node) else {
            return out;
        };
        let Some(rect) = start.rects.first() else {
            return out;
        };
        if range.start.node == range.end.node && start.kind == NodeKind::Text {
            let cw = start.char_width;
            out.push(ClientRect::new(
                rect.left + cw * range.start.offset as f64,
                rect.top,
                rect.left + cw * range.end.offset as f64,
                rect.bottom,
            ));
            return out;
        }
        out.push(*rect);
        if let Some(end) = self.node(range.end.node).and_then(|n| n.rects.last()) {
            out.push(*end);
        }
        out
    }

    fn caret_position_from_point(&self, x: f64, y: f64) -> Option<CaretPosition> {
        if let Some((_, caret)) = self
            .caret_overrides
            .iter()
            .find(|(rect, _)| rect.contains_point(x, y))
        {
            return *caret;
        }
        self.text_caret(x, y)
    }

    fn element_from_point(&self, x: f64, y: f64) -> Option<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.kind == NodeKind::Element)
            .filter(|(_, n)| n.rects.iter().any(|r| r.contains_point(x, y)))
            .map(|(idx, _)| NodeId(idx as u64))
            .last()
    }

    fn visible_content_offset(&self) -> Option<ContentOffset> {
        self.offset
    }
}

/// Codec double: element CFIs are `/<id>`, range CFIs are
/// `/<parent>,/<start>:<offset>,/<end>:<offset>`.
#[derive(Default)]
pub(crate) struct MockCodec;

fn parse_step(raw: &str, cfi: &str) -> Result<u64, CfiError> {
    raw.strip_prefix('/')
        .and_then(|step| step.parse().ok())
        .ok_or_else(|| CfiError::syntax(cfi, 0, "step must be `/<number>`"))
}

fn parse_position(raw: &str, cfi: &str) -> Result<NodePosition, CfiError> {
    let (node, offset) = raw
        .split_once(':')
        .ok_or_else(|| CfiError::syntax(cfi, 0, "missing offset"))?;
    let offset = offset
        .parse()
        .map_err(|_| CfiError::syntax(cfi, 0, "offset must be numeric"))?;
    Ok(NodePosition::new(NodeId(parse_step(node, cfi)?), offset))
}

impl CfiCodec for MockCodec {
    fn generate_element_cfi(
        &self,
        tree: &dyn ContentTree,
        node: NodeId,
        _blacklist: &Blacklist,
    ) -> Result<CfiAddress, CfiError> {
        if tree.node_kind(node).is_none() {
            return Err(CfiError::unaddressable(node, "unknown node"));
        }
        Ok(CfiAddress::new(format!("/{}", node.0)))
    }

    fn generate_range_cfi(
        &self,
        tree: &dyn ContentTree,
        range: &NodeRange,
        _blacklist: &Blacklist,
    ) -> Result<CfiAddress, CfiError> {
        let parent = tree
            .parent(range.start.node)
            .ok_or_else(|| CfiError::unaddressable(range.start.node, "no parent"))?;
        Ok(CfiAddress::new(format!(
            "/{},/{}:{},/{}:{}",
            parent.0, range.start.node.0, range.start.offset, range.end.node.0, range.end.offset
        )))
    }

    fn resolve_partial_cfi(
        &self,
        tree: &dyn ContentTree,
        cfi: &str,
        _blacklist: &Blacklist,
    ) -> Result<Option<NodeId>, CfiError> {
        let node = NodeId(parse_step(cfi, cfi)?);
        Ok(tree.node_kind(node).map(|_| node))
    }

    fn resolve_range_cfi(
        &self,
        tree: &dyn ContentTree,
        cfi: &str,
        _blacklist: &Blacklist,
    ) -> Result<Option<NodeRange>, CfiError> {
        let mut parts = cfi.split(',');
        let (Some(_), Some(start), Some(end)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CfiError::syntax(cfi, 0, "expected three components"));
        };
        let start = parse_position(start, cfi)?;
        let end = parse_position(end, cfi)?;
        if tree.node_kind(start.node).is_none() || tree.node_kind(end.node).is_none() {
            return Ok(None);
        }
        Ok(Some(NodeRange::new(start, end)))
    }
}
