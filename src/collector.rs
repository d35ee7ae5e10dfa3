//! Leaf candidate collection for visibility queries.
//!
//! The walk is depth-first in document order. Fully visible subtrees are
//! taken wholesale, partially visible ones are descended into, and once a run
//! of invisible siblings follows visible content the rest of that sibling list
//! is skipped: content renders in reading order, so visible nodes cluster.

use core::num::NonZeroU8;

use crate::geometry::{normalize_rects, ContentOffset};
use crate::picker::Picker;
use crate::tree::{Blacklist, NodeId, NodeKind, RenderSurface};
use crate::visibility::{percent_visible, VisibilityContext};

/// Bounds for candidate collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectorLimits {
    /// Invisible element siblings tolerated after visible content before the
    /// remaining siblings are skipped.
    pub max_consecutive_misses: usize,
    /// Maximum element nesting walked; deeper elements count as leaves.
    pub max_depth: usize,
}

impl Default for CollectorLimits {
    fn default() -> Self {
        Self {
            max_consecutive_misses: 3,
            max_depth: 64,
        }
    }
}

impl CollectorLimits {
    /// Embedded-focused preset with tighter bounds.
    pub fn embedded() -> Self {
        Self {
            max_consecutive_misses: 2,
            max_depth: 32,
        }
    }
}

/// One visible unit of renderable content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeafDescriptor {
    /// Element owning the leaf (the text node's parent for text runs).
    pub element: NodeId,
    /// Text run inside `element`, when the leaf is text.
    pub text_node: Option<NodeId>,
    /// Visible share, `1..=100`.
    pub percent_visible: NonZeroU8,
}

impl LeafDescriptor {
    /// The node that was judged: the text run, or the element.
    pub fn node(&self) -> NodeId {
        self.text_node.unwrap_or(self.element)
    }

    pub fn is_fully_visible(&self) -> bool {
        self.percent_visible.get() == 100
    }
}

/// Per-query geometry parameters shared by collection and judging.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GeometryQuery<'a> {
    pub offset: ContentOffset,
    pub visibility: VisibilityContext,
    pub column_width: f64,
    pub blacklist: &'a Blacklist,
}

/// Visibility percentage of one node under `query`.
pub(crate) fn node_percent_visible<S: RenderSurface + ?Sized>(
    surface: &S,
    node: NodeId,
    query: &GeometryQuery<'_>,
) -> u8 {
    let raws = surface.client_rects(node);
    let rects = normalize_rects(&raws, query.offset, query.column_width);
    percent_visible(&rects, &query.visibility)
}

fn has_printable_text<S: RenderSurface + ?Sized>(surface: &S, node: NodeId) -> bool {
    surface
        .text(node)
        .is_some_and(|text| !text.trim().is_empty())
}

/// Children that count towards leaf structure: printable text and
/// non-blacklisted elements.
fn leaf_bearing_children<S: RenderSurface + ?Sized>(
    surface: &S,
    node: NodeId,
    blacklist: &Blacklist,
) -> Vec<NodeId> {
    surface
        .children(node)
        .into_iter()
        .filter(|&child| match surface.node_kind(child) {
            Some(NodeKind::Text) => has_printable_text(surface, child),
            Some(NodeKind::Element) => !surface.is_blacklisted(child, blacklist),
            None => false,
        })
        .collect()
}

/// Collect leaf candidates under `root` in document order.
pub(crate) fn collect_candidates<S: RenderSurface + ?Sized>(
    surface: &S,
    root: NodeId,
    query: &GeometryQuery<'_>,
    limits: CollectorLimits,
) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(16);
    collect_children(surface, root, 0, query, limits, &mut out);
    out
}

fn collect_children<S: RenderSurface + ?Sized>(
    surface: &S,
    parent: NodeId,
    depth: usize,
    query: &GeometryQuery<'_>,
    limits: CollectorLimits,
    out: &mut Vec<NodeId>,
) {
    let mut consecutive_misses = 0usize;
    let mut seen_visible = false;

    for child in surface.children(parent) {
        if seen_visible && consecutive_misses > limits.max_consecutive_misses {
            break;
        }
        if surface.is_blacklisted(child, query.blacklist) {
            continue;
        }
        match surface.node_kind(child) {
            Some(NodeKind::Text) => {
                if has_printable_text(surface, child) {
                    out.push(child);
                }
            }
            Some(NodeKind::Element) => {
                let percent = node_percent_visible(surface, child, query);
                if percent == 0 {
                    consecutive_misses += 1;
                    continue;
                }
                consecutive_misses = 0;
                seen_visible = true;
                if percent == 100 {
                    collect_all_leaves(surface, child, depth + 1, query.blacklist, limits, out);
                } else if depth + 1 >= limits.max_depth
                    || leaf_bearing_children(surface, child, query.blacklist).is_empty()
                {
                    out.push(child);
                } else {
                    collect_children(surface, child, depth + 1, query, limits, out);
                }
            }
            None => {}
        }
    }
}

/// Every leaf under `node` without visibility checks.
fn collect_all_leaves<S: RenderSurface + ?Sized>(
    surface: &S,
    node: NodeId,
    depth: usize,
    blacklist: &Blacklist,
    limits: CollectorLimits,
    out: &mut Vec<NodeId>,
) {
    let children = leaf_bearing_children(surface, node, blacklist);
    if children.is_empty() || depth >= limits.max_depth {
        out.push(node);
        return;
    }
    for child in children {
        if surface.is_text(child) {
            out.push(child);
        } else {
            collect_all_leaves(surface, child, depth + 1, blacklist, limits, out);
        }
    }
}

/// Judge candidates and keep the visible ones, in `picker` order.
pub(crate) fn judge_candidates<S: RenderSurface + ?Sized>(
    surface: &S,
    candidates: &[NodeId],
    query: &GeometryQuery<'_>,
    picker: Picker,
) -> Vec<LeafDescriptor> {
    let mut leaves: Vec<LeafDescriptor> = candidates
        .iter()
        .filter_map(|&node| {
            let percent = NonZeroU8::new(node_percent_visible(surface, node, query))?;
            if surface.is_text(node) {
                let element = surface.parent(node)?;
                Some(LeafDescriptor {
                    element,
                    text_node: Some(node),
                    percent_visible: percent,
                })
            } else {
                Some(LeafDescriptor {
                    element: node,
                    text_node: None,
                    percent_visible: percent,
                })
            }
        })
        .collect();
    picker.order(&mut leaves);
    leaves
}

/// First or last leaf of the whole document, ignoring visibility.
pub(crate) fn document_edge_leaf<S: RenderSurface + ?Sized>(
    surface: &S,
    root: NodeId,
    blacklist: &Blacklist,
    picker: Picker,
    limits: CollectorLimits,
) -> Option<NodeId> {
    let mut node = root;
    for _ in 0..limits.max_depth {
        let children = leaf_bearing_children(surface, node, blacklist);
        let Some(&next) = picker.pick(&children) else {
            return (node != root).then_some(node);
        };
        if surface.is_text(next) {
            return Some(next);
        }
        node = next;
    }
    Some(node)
}
