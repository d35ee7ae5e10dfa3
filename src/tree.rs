//! Capability traits for the content tree and the surface that renders it.
//!
//! Any concrete surface (a browser DOM bridge, a headless layout shim, a test
//! double) implements [`ContentTree`] and [`RenderSurface`]; the engine never
//! depends on anything more specific.

use crate::geometry::{ClientRect, ContentOffset, RectList};

/// Stable identity assigned to a node by the host.
///
/// Identities are only meaningful within one spine item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// Kind of a content node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
}

/// A position inside a node: a character offset for text nodes, a child
/// index for elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodePosition {
    pub node: NodeId,
    pub offset: usize,
}

impl NodePosition {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Result of caret hit testing at a point.
pub type CaretPosition = NodePosition;

/// A concrete range between two node positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRange {
    pub start: NodePosition,
    pub end: NodePosition,
}

impl NodeRange {
    pub fn new(start: NodePosition, end: NodePosition) -> Self {
        Self { start, end }
    }

    /// Range inside a single text node.
    pub fn in_text(node: NodeId, start: usize, end: usize) -> Self {
        Self::new(NodePosition::new(node, start), NodePosition::new(node, end))
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Denylist of injected nodes (CFI markers, MathJax scaffolding, highlight
/// wrappers) that must be invisible to traversal and CFI generation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blacklist {
    pub classes: Vec<String>,
    pub elements: Vec<String>,
    pub ids: Vec<String>,
}

impl Blacklist {
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.elements.push(element.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.elements.is_empty() && self.ids.is_empty()
    }

    /// Match an element by its local name, id and class list.
    pub fn matches<'a>(
        &self,
        local_name: Option<&str>,
        id: Option<&str>,
        mut classes: impl Iterator<Item = &'a str>,
    ) -> bool {
        if let Some(name) = local_name {
            if self
                .elements
                .iter()
                .any(|element| element.eq_ignore_ascii_case(name))
            {
                return true;
            }
        }
        if let Some(id) = id {
            if self.ids.iter().any(|candidate| candidate == id) {
                return true;
            }
        }
        classes.any(|class| self.classes.iter().any(|candidate| candidate == class))
    }
}

/// Read-only structure of one rendered spine item.
pub trait ContentTree {
    /// Document element (`<html>`).
    fn document_element(&self) -> Option<NodeId>;

    /// Root of visible content (`<body>`); defaults to the document element.
    fn content_root(&self) -> Option<NodeId> {
        self.document_element()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Children in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn node_kind(&self, node: NodeId) -> Option<NodeKind>;

    /// Text content of a text node.
    fn text(&self, node: NodeId) -> Option<&str>;

    /// Local element name, lowercase.
    fn local_name(&self, node: NodeId) -> Option<&str>;

    fn element_id(&self, node: NodeId) -> Option<&str>;

    fn class_names(&self, node: NodeId) -> Vec<&str>;

    fn element_by_id(&self, id: &str) -> Option<NodeId>;

    /// Whether `node` is an injected marker that traversal must skip.
    fn is_blacklisted(&self, node: NodeId, blacklist: &Blacklist) -> bool {
        if blacklist.is_empty() || self.node_kind(node) != Some(NodeKind::Element) {
            return false;
        }
        blacklist.matches(
            self.local_name(node),
            self.element_id(node),
            self.class_names(node).into_iter(),
        )
    }

    /// Length of a text node in characters.
    fn text_len(&self, node: NodeId) -> usize {
        self.text(node).map_or(0, |text| text.chars().count())
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.node_kind(node) == Some(NodeKind::Element)
    }

    fn is_text(&self, node: NodeId) -> bool {
        self.node_kind(node) == Some(NodeKind::Text)
    }
}

/// Geometry and hit testing provided by the rendering surface.
///
/// All coordinates are in the surface viewport.
pub trait RenderSurface: ContentTree {
    /// `false` while the surface is loading or after it was torn down.
    fn is_ready(&self) -> bool {
        true
    }

    /// Client rectangles of an element or text node.
    fn client_rects(&self, node: NodeId) -> RectList;

    /// Client rectangles of a range.
    fn range_client_rects(&self, range: &NodeRange) -> RectList;

    /// Caret insertion point nearest to `(x, y)`.
    fn caret_position_from_point(&self, x: f64, y: f64) -> Option<CaretPosition>;

    /// Innermost element under `(x, y)`.
    fn element_from_point(&self, x: f64, y: f64) -> Option<NodeId>;

    /// Offset between viewport and visible content when the surface scrolls
    /// on its own (scrolled documents); `None` keeps the engine default.
    fn visible_content_offset(&self) -> Option<ContentOffset> {
        None
    }

    /// Bounding box of the node's client rectangles.
    fn bounding_client_rect(&self, node: NodeId) -> Option<ClientRect> {
        let rects = self.client_rects(node);
        let (first, rest) = rects.split_first()?;
        Some(rest.iter().fold(*first, |acc, rect| {
            ClientRect::new(
                acc.left.min(rect.left),
                acc.top.min(rect.top),
                acc.right.max(rect.right),
                acc.bottom.max(rect.bottom),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_matches_by_name_id_or_class() {
        let blacklist = Blacklist::default()
            .with_class("cfi-marker")
            .with_element("MathJax_Preview")
            .with_id("reader-overlay");
        assert!(blacklist.matches(Some("mathjax_preview"), None, std::iter::empty()));
        assert!(blacklist.matches(Some("div"), Some("reader-overlay"), std::iter::empty()));
        assert!(blacklist.matches(Some("span"), None, ["a", "cfi-marker"].into_iter()));
        assert!(!blacklist.matches(Some("span"), Some("x"), ["a", "b"].into_iter()));
    }

    #[test]
    fn empty_blacklist_matches_nothing() {
        let blacklist = Blacklist::default();
        assert!(blacklist.is_empty());
        assert!(!blacklist.matches(Some("div"), Some("id"), ["c"].into_iter()));
    }

    #[test]
    fn text_range_helpers() {
        let range = NodeRange::in_text(NodeId(4), 2, 3);
        assert!(!range.is_collapsed());
        assert_eq!(range.start.node, range.end.node);
        assert!(NodeRange::in_text(NodeId(4), 2, 2).is_collapsed());
    }
}
