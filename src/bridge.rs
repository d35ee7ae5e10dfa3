//! Bridging between rendered geometry and CFI addresses.
//!
//! Forward direction: a point, a range between two points, or a visible leaf
//! becomes a CFI through caret hit testing. Reverse direction: a CFI resolves
//! to an element or node range and then to a rectangle or page index.

use crate::cfi::{split_cfi, CfiAddress, CfiCodec};
use crate::collector::LeafDescriptor;
use crate::error::NavigationError;
use crate::geometry::{
    normalize, normalize_rects, ContentOffset, FrameDimensions, PaginationState, Rect,
};
use crate::page_index::page_index_for;
use crate::picker::Picker;
use crate::tree::{Blacklist, ContentTree, NodeId, NodeKind, NodePosition, NodeRange, RenderSurface};
use crate::visibility::is_visible;

/// Stage a query had reached; carried in errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryStage {
    Idle,
    HitTesting,
    TextNodeRefinement,
    ElementResolution,
    CodecInvocation,
}

/// Resolved location of a CFI plus its normalized bounding rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRangeInfo {
    pub start: Option<NodePosition>,
    pub end: Option<NodePosition>,
    pub client_rect: Rect,
}

/// One-character span around `offset` in a text node of `len` characters.
///
/// A single-character node always yields `[0, 1]`; an offset at or past the
/// end selects the last character.
pub fn one_char_span(len: usize, offset: usize) -> (usize, usize) {
    if len == 0 {
        return (0, 0);
    }
    if len == 1 {
        return (0, 1);
    }
    if offset >= len {
        return (len - 1, len);
    }
    (offset, offset + 1)
}

/// Borrowed view of everything a single bridge query needs.
pub(crate) struct Bridge<'a, S, C: ?Sized> {
    pub surface: &'a S,
    pub codec: &'a C,
    pub blacklist: &'a Blacklist,
    pub pagination: &'a PaginationState,
    pub frame: FrameDimensions,
    pub max_caret_probes: usize,
}

impl<'a, S: RenderSurface, C: CfiCodec + ?Sized> Bridge<'a, S, C> {
    fn tree(&self) -> &'a dyn ContentTree {
        self.surface
    }

    fn visible_offset(&self) -> ContentOffset {
        self.surface
            .visible_content_offset()
            .unwrap_or_else(ContentOffset::zero)
    }

    fn page_offset(&self) -> ContentOffset {
        ContentOffset::for_pagination(self.pagination)
    }

    pub fn ensure_ready(&self, stage: QueryStage) -> Result<NodeId, NavigationError> {
        if !self.surface.is_ready() {
            return Err(NavigationError::geometry_unavailable(
                stage,
                "rendering surface is not ready",
            ));
        }
        self.surface.content_root().ok_or_else(|| {
            NavigationError::geometry_unavailable(stage, "document has no content root")
        })
    }

    pub fn element_cfi(&self, node: NodeId) -> Result<CfiAddress, NavigationError> {
        self.codec
            .generate_element_cfi(self.tree(), node, self.blacklist)
            .map_err(NavigationError::from)
    }

    pub fn range_cfi(&self, range: &NodeRange) -> Result<CfiAddress, NavigationError> {
        self.codec
            .generate_range_cfi(self.tree(), range, self.blacklist)
            .map_err(NavigationError::from)
    }

    /// CFI for a host range. Collapsed text ranges are widened to one
    /// character; collapsed element ranges address the element itself.
    pub fn cfi_for_range(&self, range: &NodeRange) -> Result<CfiAddress, NavigationError> {
        self.ensure_ready(QueryStage::CodecInvocation)?;
        if !range.is_collapsed() {
            return self.range_cfi(range);
        }
        let node = range.start.node;
        match self.surface.node_kind(node) {
            Some(NodeKind::Text) => {
                let (start, end) = one_char_span(self.surface.text_len(node), range.start.offset);
                if start == end {
                    return Err(NavigationError::no_result(
                        QueryStage::TextNodeRefinement,
                        "EMPTY_TEXT_NODE",
                        "collapsed range sits in an empty text node",
                    ));
                }
                self.range_cfi(&NodeRange::in_text(node, start, end))
            }
            Some(NodeKind::Element) => self.element_cfi(node),
            None => Err(NavigationError::resolution_miss(
                QueryStage::ElementResolution,
                "UNKNOWN_NODE",
                "range starts in a node outside the document",
            )),
        }
    }

    fn check_point_inside(
        &self,
        rect: Option<Rect>,
        x: f64,
        y: f64,
        stage: QueryStage,
    ) -> Result<(), NavigationError> {
        let inside = rect.is_some_and(|rect| {
            is_visible(&rect, self.frame, self.pagination.vertical_writing_mode, false)
                && rect.contains_point(x, y)
        });
        if inside {
            Ok(())
        } else {
            Err(NavigationError::no_result(
                stage,
                "POINT_OUTSIDE_CONTENT",
                format!("({x}, {y}) is not inside visible content"),
            ))
        }
    }

    fn span_rect(&self, range: &NodeRange) -> Option<Rect> {
        union_rects(
            self.surface
                .range_client_rects(range)
                .iter()
                .map(|raw| normalize(raw, ContentOffset::zero())),
        )
    }

    /// CFI of the content under a viewport point.
    pub fn visible_cfi_from_point(
        &self,
        x: f64,
        y: f64,
        precise: bool,
    ) -> Result<CfiAddress, NavigationError> {
        self.ensure_ready(QueryStage::HitTesting)?;
        let document_element = self.surface.document_element();
        let element = self
            .surface
            .element_from_point(x, y)
            .filter(|&el| Some(el) != document_element);

        if precise {
            let element = element.ok_or_else(|| {
                NavigationError::no_result(
                    QueryStage::HitTesting,
                    "NO_ELEMENT_AT_POINT",
                    "precise hit test found no element",
                )
            })?;
            let rect = self
                .surface
                .bounding_client_rect(element)
                .map(|raw| normalize(&raw, ContentOffset::zero()));
            self.check_point_inside(rect, x, y, QueryStage::HitTesting)?;
        }

        let Some(caret) = self.surface.caret_position_from_point(x, y) else {
            let element = element.ok_or_else(|| {
                NavigationError::resolution_miss(
                    QueryStage::HitTesting,
                    "NO_ELEMENT_AT_POINT",
                    "no caret and no element under the point",
                )
            })?;
            return self.element_cfi(element);
        };

        match self.surface.node_kind(caret.node) {
            Some(NodeKind::Text) => {
                if precise && self.surface.parent(caret.node) != element {
                    return Err(NavigationError::no_result(
                        QueryStage::TextNodeRefinement,
                        "CARET_OUTSIDE_ELEMENT",
                        "caret text node is not a child of the element under the point",
                    ));
                }
                let len = self.surface.text_len(caret.node);
                let (start, end) = one_char_span(len, caret.offset);
                if start == end {
                    return Err(NavigationError::no_result(
                        QueryStage::TextNodeRefinement,
                        "EMPTY_TEXT_NODE",
                        "caret landed in an empty text node",
                    ));
                }
                let mut range = NodeRange::in_text(caret.node, start, end);
                if precise {
                    let mut rect = self.span_rect(&range);
                    // Carets snap to the nearest boundary; a point on the right
                    // half of a glyph reports the offset after it.
                    if start > 0 && !rect.is_some_and(|r| r.contains_point(x, y)) {
                        let before = NodeRange::in_text(caret.node, start - 1, start);
                        let before_rect = self.span_rect(&before);
                        if before_rect.is_some_and(|r| r.contains_point(x, y)) {
                            range = before;
                            rect = before_rect;
                        }
                    }
                    self.check_point_inside(rect, x, y, QueryStage::TextNodeRefinement)?;
                }
                self.range_cfi(&range)
                    .map_err(|err| err.with_stage(QueryStage::TextNodeRefinement))
            }
            Some(NodeKind::Element) => {
                let children = self.surface.children(caret.node);
                let node = children
                    .get(caret.offset)
                    .or_else(|| children.first())
                    .copied()
                    .unwrap_or(caret.node);
                if precise && Some(node) != element {
                    return Err(NavigationError::no_result(
                        QueryStage::ElementResolution,
                        "CARET_OUTSIDE_ELEMENT",
                        "caret element differs from the element under the point",
                    ));
                }
                let target = if self.surface.is_element(node) {
                    node
                } else {
                    caret.node
                };
                if Some(target) == document_element {
                    return Err(NavigationError::resolution_miss(
                        QueryStage::ElementResolution,
                        "DOCUMENT_ROOT_ONLY",
                        "hit test resolved to the document element",
                    ));
                }
                self.element_cfi(target)
                    .map_err(|err| err.with_stage(QueryStage::ElementResolution))
            }
            None => Err(NavigationError::resolution_miss(
                QueryStage::HitTesting,
                "UNKNOWN_NODE",
                "caret reported a node outside the document",
            )),
        }
    }

    /// Range CFI between two viewport points.
    pub fn range_cfi_from_points(
        &self,
        start: (f64, f64),
        end: (f64, f64),
    ) -> Result<CfiAddress, NavigationError> {
        self.ensure_ready(QueryStage::HitTesting)?;
        let miss = || {
            NavigationError::resolution_miss(
                QueryStage::HitTesting,
                "NO_CARET_AT_POINT",
                "range endpoint has no caret",
            )
        };
        let mut from = self
            .surface
            .caret_position_from_point(start.0, start.1)
            .ok_or_else(miss)?;
        let mut to = self
            .surface
            .caret_position_from_point(end.0, end.1)
            .ok_or_else(miss)?;
        if from.node == to.node && to.offset < from.offset {
            core::mem::swap(&mut from, &mut to);
        }
        if self.surface.is_text(from.node)
            && self.surface.is_text(to.node)
            && self.surface.text_len(to.node) > to.offset + 1
        {
            to.offset += 1;
        }
        self.cfi_for_range(&NodeRange::new(from, to))
    }

    /// CFI of a judged leaf: a one-character range inside a text leaf, or the
    /// element CFI otherwise.
    pub fn leaf_cfi(
        &self,
        leaf: &LeafDescriptor,
        picker: Picker,
    ) -> Result<CfiAddress, NavigationError> {
        match leaf.text_node {
            Some(text) => {
                let range = self.visible_text_span(text, picker)?;
                self.range_cfi(&range)
            }
            None => self.element_cfi(leaf.element),
        }
    }

    /// One-character range at the visible start (or end) of a text node.
    pub fn visible_text_span(
        &self,
        text_node: NodeId,
        picker: Picker,
    ) -> Result<NodeRange, NavigationError> {
        let offset = self.visible_offset();
        let vertical = self.pagination.vertical_writing_mode;
        let fragments: Vec<Rect> = self
            .surface
            .client_rects(text_node)
            .iter()
            .map(|raw| normalize(raw, offset))
            .filter(|rect| is_visible(rect, self.frame, vertical, false))
            .collect();
        let fragment = picker.pick(&fragments).ok_or_else(|| {
            NavigationError::no_result(
                QueryStage::TextNodeRefinement,
                "NO_VISIBLE_FRAGMENT",
                "text node has no visible fragment",
            )
        })?;
        let (corner_x, corner_y) = picker.corner(fragment);
        let (x, y) = (corner_x - offset.left, corner_y - offset.top);

        let mut last_caret = None;
        let mut hit = None;
        for attempt in 0..self.max_caret_probes.max(1) {
            let nudge = picker.nudge(attempt);
            let Some(caret) = self.surface.caret_position_from_point(x + nudge, y + nudge) else {
                continue;
            };
            if caret.node == text_node {
                hit = Some(caret);
                break;
            }
            last_caret = Some(caret);
        }

        let caret = hit
            .or_else(|| {
                let fallback = last_caret.filter(|caret| self.surface.is_text(caret.node));
                if let Some(caret) = fallback {
                    log::debug!(
                        "caret probes missed text node {:?}; anchoring on {:?}",
                        text_node,
                        caret.node
                    );
                }
                fallback
            })
            .unwrap_or_else(|| {
                let len = self.surface.text_len(text_node);
                NodePosition::new(text_node, picker.edge_offset(len))
            });

        let len = self.surface.text_len(caret.node);
        let (start, end) = one_char_span(len, picker.char_offset(caret.offset));
        if start == end {
            return Err(NavigationError::no_result(
                QueryStage::TextNodeRefinement,
                "EMPTY_TEXT_NODE",
                "visible text node is empty",
            ));
        }
        Ok(NodeRange::in_text(caret.node, start, end))
    }

    /// One-character range at the document edge of a text leaf, or the
    /// element CFI, ignoring visibility.
    pub fn edge_cfi(&self, node: NodeId, picker: Picker) -> Result<CfiAddress, NavigationError> {
        if !self.surface.is_text(node) {
            return self.element_cfi(node);
        }
        let len = self.surface.text_len(node);
        let (start, end) = one_char_span(len, picker.char_offset(picker.edge_offset(len)));
        if start == end {
            return self.element_cfi(self.surface.parent(node).unwrap_or(node));
        }
        self.range_cfi(&NodeRange::in_text(node, start, end))
    }

    /// Element addressed by a point CFI (spatial offset ignored).
    pub fn element_by_cfi(&self, cfi: &str) -> Result<NodeId, NavigationError> {
        self.ensure_ready(QueryStage::ElementResolution)?;
        let split = split_cfi(cfi)?;
        self.codec
            .resolve_partial_cfi(self.tree(), &split.cfi, self.blacklist)?
            .ok_or_else(|| {
                NavigationError::resolution_miss(
                    QueryStage::ElementResolution,
                    "CFI_NO_TARGET",
                    "CFI does not address an element in this document",
                )
                .with_cfi(cfi)
            })
    }

    fn resolve_range(&self, cfi: &str) -> Result<NodeRange, NavigationError> {
        self.codec
            .resolve_range_cfi(self.tree(), cfi, self.blacklist)?
            .ok_or_else(|| {
                NavigationError::resolution_miss(
                    QueryStage::ElementResolution,
                    "CFI_NO_TARGET",
                    "range CFI does not resolve in this document",
                )
                .with_cfi(cfi)
            })
    }

    /// Range covering the node `cfi` addresses: the range itself for range
    /// CFIs, or the target element's slot in its parent.
    fn resolve_any(&self, cfi: &str) -> Result<NodeRange, NavigationError> {
        if self.codec.is_range_cfi(cfi) {
            return self.resolve_range(cfi);
        }
        let element = self.element_by_cfi(cfi)?;
        let Some(parent) = self.surface.parent(element) else {
            return Ok(NodeRange::new(
                NodePosition::new(element, 0),
                NodePosition::new(element, self.surface.children(element).len()),
            ));
        };
        let index = self
            .surface
            .children(parent)
            .iter()
            .position(|&child| child == element)
            .unwrap_or(0);
        Ok(NodeRange::new(
            NodePosition::new(parent, index),
            NodePosition::new(parent, index + 1),
        ))
    }

    /// Location and normalized bounding rectangle of a CFI.
    pub fn node_range_info(&self, cfi: &str) -> Result<NodeRangeInfo, NavigationError> {
        self.ensure_ready(QueryStage::ElementResolution)?;
        let offset = self.visible_offset();
        if self.codec.is_range_cfi(cfi) {
            let range = self.resolve_range(cfi)?;
            let rect = union_rects(
                self.surface
                    .range_client_rects(&range)
                    .iter()
                    .map(|raw| normalize(raw, offset)),
            )
            .ok_or_else(|| no_geometry(cfi))?;
            return Ok(NodeRangeInfo {
                start: Some(range.start),
                end: Some(range.end),
                client_rect: rect,
            });
        }
        let element = self.element_by_cfi(cfi)?;
        let rect = union_rects(
            self.surface
                .client_rects(element)
                .iter()
                .map(|raw| normalize(raw, offset)),
        )
        .ok_or_else(|| no_geometry(cfi))?;
        Ok(NodeRangeInfo {
            start: None,
            end: None,
            client_rect: rect,
        })
    }

    /// Whether the content a range CFI addresses is at least partially visible.
    pub fn is_range_cfi_visible(&self, cfi: &str) -> Result<bool, NavigationError> {
        let info = self.node_range_info(cfi)?;
        Ok(is_visible(
            &info.client_rect,
            self.frame,
            self.pagination.vertical_writing_mode,
            false,
        ))
    }

    /// Page index of an element, optionally at a vertical offset percentage.
    pub fn page_for_element(
        &self,
        element: NodeId,
        vertical_offset_percent: Option<f64>,
    ) -> Result<usize, NavigationError> {
        self.ensure_ready(QueryStage::ElementResolution)?;
        let rects = normalize_rects(
            &self.surface.client_rects(element),
            self.page_offset(),
            self.pagination.column_width,
        );
        page_index_for(&rects, vertical_offset_percent, self.frame, self.pagination).ok_or_else(
            || {
                NavigationError::no_result(
                    QueryStage::ElementResolution,
                    "ELEMENT_WITHOUT_GEOMETRY",
                    format!("element {element:?} has no client rectangles"),
                )
            },
        )
    }

    /// Page index of the content a CFI addresses.
    pub fn page_for_cfi(&self, cfi: &str) -> Result<usize, NavigationError> {
        self.ensure_ready(QueryStage::ElementResolution)?;
        if self.codec.is_range_cfi(cfi) {
            let range = self.resolve_range(cfi)?;
            let page_offset = self.page_offset();
            let rect = union_rects(
                self.surface
                    .range_client_rects(&range)
                    .iter()
                    .map(|raw| normalize(raw, page_offset)),
            )
            .ok_or_else(|| no_geometry(cfi))?;
            return page_index_for(&[rect], None, self.frame, self.pagination)
                .ok_or_else(|| no_geometry(cfi));
        }
        let split = split_cfi(cfi)?;
        let element = self.element_by_cfi(&split.cfi)?;
        self.page_for_element(element, split.spatial.map(|offset| offset.y))
            .map_err(|err| err.with_cfi(cfi))
    }

    /// Node range spanning `cfi` and, when given, `end_cfi`.
    ///
    /// With `inclusive`, the range ends where `end_cfi` ends; otherwise it ends
    /// where `end_cfi` starts.
    pub fn dom_range(
        &self,
        cfi: &str,
        end_cfi: Option<&str>,
        inclusive: bool,
    ) -> Result<NodeRange, NavigationError> {
        self.ensure_ready(QueryStage::ElementResolution)?;
        let start = self.resolve_any(cfi)?;
        let Some(end_cfi) = end_cfi else {
            return Ok(start);
        };
        let end = self.resolve_any(end_cfi)?;
        let end = if inclusive { end.end } else { end.start };
        Ok(NodeRange::new(start.start, end))
    }
}

fn no_geometry(cfi: &str) -> NavigationError {
    NavigationError::no_result(
        QueryStage::ElementResolution,
        "CFI_WITHOUT_GEOMETRY",
        "addressed content has no client rectangles",
    )
    .with_cfi(cfi)
}

fn union_rects(rects: impl Iterator<Item = Rect>) -> Option<Rect> {
    rects.reduce(|acc, rect| acc.union(&rect))
}
