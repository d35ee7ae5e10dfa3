//! Public navigation facade over a rendered spine item.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::bridge::{Bridge, NodeRangeInfo, QueryStage};
use crate::cache::{CacheClock, CacheLimits, GeometryCache, GeometryFingerprint, SystemClock};
use crate::cfi::{CfiAddress, CfiCodec};
use crate::collector::{
    collect_candidates, document_edge_leaf, judge_candidates, node_percent_visible,
    CollectorLimits, GeometryQuery, LeafDescriptor,
};
use crate::error::{NavigationError, NavigationErrorKind};
use crate::geometry::{ContentOffset, FrameDimensions, PaginationState};
use crate::picker::Picker;
use crate::tree::{Blacklist, NodeId, NodeRange, RenderSurface};
use crate::visibility::VisibilityContext;

/// Structured navigator diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigatorDiagnostic {
    CacheHit {
        table: &'static str,
    },
    CacheMiss {
        table: &'static str,
    },
    CacheInvalidated {
        reason: &'static str,
        dropped: usize,
    },
    QueryFailed {
        query: &'static str,
        kind: NavigationErrorKind,
        code: &'static str,
    },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(NavigatorDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

/// Navigator options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigatorOptions {
    /// Candidate walk bounds.
    pub collector: CollectorLimits,
    /// Geometry cache bounds.
    pub cache: CacheLimits,
    /// Caret probes per visible text fragment before falling back.
    pub max_caret_probes: usize,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            collector: CollectorLimits::default(),
            cache: CacheLimits::default(),
            max_caret_probes: 3,
        }
    }
}

impl NavigatorOptions {
    /// Embedded-focused preset with smaller caches and shallower walks.
    pub fn embedded() -> Self {
        Self {
            collector: CollectorLimits::embedded(),
            cache: CacheLimits::embedded(),
            max_caret_probes: 2,
        }
    }
}

/// Visibility and CFI queries for one rendered spine item.
///
/// Every query returns `None` on failure; the cause is logged and reported
/// through the diagnostics sink. Changing pagination, the blacklist, the
/// spine item, or the surface clears all cached geometry before the call
/// returns.
pub struct CfiNavigator<S, C> {
    surface: S,
    codec: C,
    blacklist: Blacklist,
    options: NavigatorOptions,
    pagination: PaginationState,
    frame: FrameDimensions,
    spine_item: Option<String>,
    cache: GeometryCache,
    clock: Box<dyn CacheClock>,
    diagnostic_sink: DiagnosticSink,
}

impl<S, C> fmt::Debug for CfiNavigator<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CfiNavigator")
            .field("options", &self.options)
            .field("pagination", &self.pagination)
            .field("frame", &self.frame)
            .field("spine_item", &self.spine_item)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<S: RenderSurface, C: CfiCodec> CfiNavigator<S, C> {
    pub fn new(surface: S, codec: C, options: NavigatorOptions) -> Self {
        Self {
            surface,
            codec,
            blacklist: Blacklist::default(),
            options,
            pagination: PaginationState::default(),
            frame: FrameDimensions::default(),
            spine_item: None,
            cache: GeometryCache::new(options.cache),
            clock: Box::new(SystemClock),
            diagnostic_sink: None,
        }
    }

    /// Replace the time source used for cache ageing.
    pub fn with_clock(mut self, clock: impl CacheClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(NavigatorDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: NavigatorDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    pub fn options(&self) -> NavigatorOptions {
        self.options
    }

    pub fn pagination(&self) -> &PaginationState {
        &self.pagination
    }

    pub fn frame(&self) -> FrameDimensions {
        self.frame
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Idref of the loaded spine item, if one was named.
    pub fn spine_item(&self) -> Option<&str> {
        self.spine_item.as_deref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable surface access. Cached geometry is dropped up front since the
    /// caller may relayout.
    pub fn surface_mut(&mut self) -> &mut S {
        self.invalidate("surface_mutation");
        &mut self.surface
    }

    /// Live cache entries across all tables.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn set_blacklist(&mut self, blacklist: Blacklist) {
        if self.blacklist != blacklist {
            self.blacklist = blacklist;
            self.invalidate("blacklist");
        }
    }

    pub fn set_pagination(&mut self, pagination: PaginationState, frame: FrameDimensions) {
        if self.pagination != pagination || self.frame != frame {
            self.pagination = pagination;
            self.frame = frame;
            self.invalidate("pagination");
        }
    }

    /// Swap in the surface of another spine item.
    pub fn load_spine_item(&mut self, idref: impl Into<String>, surface: S) -> S {
        self.spine_item = Some(idref.into());
        self.invalidate("spine_item");
        core::mem::replace(&mut self.surface, surface)
    }

    fn invalidate(&mut self, reason: &'static str) {
        let dropped = self.cache.len();
        self.cache.clear();
        log::debug!("geometry cache invalidated ({reason}), dropped {dropped} entries");
        self.emit_diagnostic(NavigatorDiagnostic::CacheInvalidated { reason, dropped });
    }

    fn bridge(&self) -> Bridge<'_, S, C> {
        Bridge {
            surface: &self.surface,
            codec: &self.codec,
            blacklist: &self.blacklist,
            pagination: &self.pagination,
            frame: self.frame,
            max_caret_probes: self.options.max_caret_probes,
        }
    }

    fn visible_offset(&self) -> ContentOffset {
        self.surface
            .visible_content_offset()
            .unwrap_or_else(ContentOffset::zero)
    }

    fn absorb<T>(&self, query: &'static str, result: Result<T, NavigationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                if err.is_anomaly() {
                    log::warn!("{query} failed: {err}");
                } else {
                    log::debug!("{query} failed: {err}");
                }
                self.emit_diagnostic(NavigatorDiagnostic::QueryFailed {
                    query,
                    kind: err.kind,
                    code: err.code,
                });
                None
            }
        }
    }

    fn record_lookup(&self, table: &'static str, hit: bool) {
        if hit {
            log::debug!("{table} cache hit");
            self.emit_diagnostic(NavigatorDiagnostic::CacheHit { table });
        } else {
            log::debug!("{table} cache miss");
            self.emit_diagnostic(NavigatorDiagnostic::CacheMiss { table });
        }
    }

    fn visible_leaves_inner(
        &mut self,
        offset: ContentOffset,
        frame: FrameDimensions,
        picker: Picker,
    ) -> Result<Vec<LeafDescriptor>, NavigationError> {
        let root = self.bridge().ensure_ready(QueryStage::Idle)?;
        let key = GeometryFingerprint::for_query(&self.pagination, &offset, &frame, picker);
        let now = self.clock.now();
        let cached = self.cache.visible_leaves(&key, now);
        self.record_lookup("visible_leaves", cached.is_some());
        if let Some(leaves) = cached {
            return Ok(leaves);
        }

        let query = GeometryQuery {
            offset,
            visibility: VisibilityContext::new(frame, &self.pagination),
            column_width: self.pagination.column_width,
            blacklist: &self.blacklist,
        };
        let candidates = collect_candidates(&self.surface, root, &query, self.options.collector);
        let leaves = judge_candidates(&self.surface, &candidates, &query, picker);
        self.cache.store_visible_leaves(key, leaves.clone(), now);
        Ok(leaves)
    }

    fn memoized_element_cfi(&mut self, element: NodeId) -> Result<CfiAddress, NavigationError> {
        let now = self.clock.now();
        let cached = self.cache.element_cfi(element, now);
        self.record_lookup("element_cfi", cached.is_some());
        if let Some(cfi) = cached {
            return Ok(cfi);
        }
        let cfi = self.bridge().element_cfi(element)?;
        self.cache.store_element_cfi(element, cfi.clone(), now);
        Ok(cfi)
    }

    fn leaf_cfi(
        &mut self,
        leaf: &LeafDescriptor,
        picker: Picker,
    ) -> Result<CfiAddress, NavigationError> {
        if leaf.text_node.is_some() {
            self.bridge().leaf_cfi(leaf, picker)
        } else {
            self.memoized_element_cfi(leaf.element)
        }
    }

    fn visible_cfi(&mut self, picker: Picker) -> Result<CfiAddress, NavigationError> {
        let offset = self.visible_offset();
        let frame = self.frame;
        self.bridge().ensure_ready(QueryStage::Idle)?;
        let key = GeometryFingerprint::for_query(&self.pagination, &offset, &frame, picker);
        let now = self.clock.now();
        let cached = self.cache.visible_cfi(&key, now);
        self.record_lookup("visible_cfi", cached.is_some());
        if let Some(cfi) = cached {
            return Ok(cfi);
        }

        let leaves = self.visible_leaves_inner(offset, frame, picker)?;
        for leaf in &leaves {
            match self.leaf_cfi(leaf, picker) {
                Ok(cfi) => {
                    self.cache.store_visible_cfi(key, cfi.clone(), now);
                    return Ok(cfi);
                }
                Err(err) if err.kind == NavigationErrorKind::NoResult => {
                    log::debug!("skipping leaf {:?}: {err}", leaf.node());
                }
                Err(err) => return Err(err),
            }
        }
        Err(NavigationError::no_result(
            QueryStage::Idle,
            "NO_VISIBLE_LEAF",
            "no visible leaf could be addressed",
        ))
    }

    fn edge_cfi(&mut self, picker: Picker) -> Result<CfiAddress, NavigationError> {
        let root = self.bridge().ensure_ready(QueryStage::Idle)?;
        let leaf = document_edge_leaf(
            &self.surface,
            root,
            &self.blacklist,
            picker,
            self.options.collector,
        )
        .ok_or_else(|| {
            NavigationError::no_result(
                QueryStage::Idle,
                "EMPTY_DOCUMENT",
                "document has no leaf content",
            )
        })?;
        if self.surface.is_text(leaf) {
            self.bridge().edge_cfi(leaf, picker)
        } else {
            self.memoized_element_cfi(leaf)
        }
    }

    /// CFI of the first visible leaf.
    pub fn first_visible_cfi(&mut self) -> Option<CfiAddress> {
        let result = self.visible_cfi(Picker::First);
        self.absorb("first_visible_cfi", result)
    }

    /// CFI of the last visible leaf.
    pub fn last_visible_cfi(&mut self) -> Option<CfiAddress> {
        let result = self.visible_cfi(Picker::Last);
        self.absorb("last_visible_cfi", result)
    }

    /// CFI of the content under a viewport point. In `precise` mode the
    /// point must lie inside the hit content's own rectangle.
    pub fn visible_cfi_from_point(&self, x: f64, y: f64, precise: bool) -> Option<CfiAddress> {
        let result = self.bridge().visible_cfi_from_point(x, y, precise);
        self.absorb("visible_cfi_from_point", result)
    }

    /// Range CFI between two viewport points.
    pub fn range_cfi_from_points(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Option<CfiAddress> {
        let result = self.bridge().range_cfi_from_points((x1, y1), (x2, y2));
        self.absorb("range_cfi_from_points", result)
    }

    /// Zero-based page of the content a CFI addresses. A spatial offset on a
    /// point CFI selects the page holding that vertical position.
    pub fn page_for_element_cfi(&self, cfi: &str) -> Option<usize> {
        let result = self.bridge().page_for_cfi(cfi);
        self.absorb("page_for_element_cfi", result)
    }

    pub fn element_by_cfi(&self, cfi: &str) -> Option<NodeId> {
        let result = self.bridge().element_by_cfi(cfi);
        self.absorb("element_by_cfi", result)
    }

    pub fn node_range_info_from_cfi(&self, cfi: &str) -> Option<NodeRangeInfo> {
        let result = self.bridge().node_range_info(cfi);
        self.absorb("node_range_info_from_cfi", result)
    }

    pub fn is_node_from_range_cfi_visible(&self, cfi: &str) -> Option<bool> {
        let result = self.bridge().is_range_cfi_visible(cfi);
        self.absorb("is_node_from_range_cfi_visible", result)
    }

    /// Visible leaves, in document order for [`Picker::First`] and reversed
    /// for [`Picker::Last`].
    ///
    /// `offset` defaults to the surface's visible content offset, `frame` to
    /// the current frame, and `picker` to [`Picker::First`].
    pub fn visible_leaf_nodes(
        &mut self,
        offset: Option<ContentOffset>,
        frame: Option<FrameDimensions>,
        picker: Option<Picker>,
    ) -> Option<Vec<LeafDescriptor>> {
        let offset = offset.unwrap_or_else(|| self.visible_offset());
        let frame = frame.unwrap_or(self.frame);
        let result = self.visible_leaves_inner(offset, frame, picker.unwrap_or_default());
        self.absorb("visible_leaf_nodes", result)
    }

    /// Visible share of an element, `0..=100`.
    pub fn element_visibility(&self, element: NodeId) -> Option<u8> {
        let result = self
            .bridge()
            .ensure_ready(QueryStage::ElementResolution)
            .map(|_| {
                let query = GeometryQuery {
                    offset: self.visible_offset(),
                    visibility: VisibilityContext::new(self.frame, &self.pagination),
                    column_width: self.pagination.column_width,
                    blacklist: &self.blacklist,
                };
                node_percent_visible(&self.surface, element, &query)
            });
        self.absorb("element_visibility", result)
    }

    /// CFI of the first leaf in the document, visible or not.
    pub fn start_cfi(&mut self) -> Option<CfiAddress> {
        let result = self.edge_cfi(Picker::First);
        self.absorb("start_cfi", result)
    }

    /// CFI of the last leaf in the document, visible or not.
    pub fn end_cfi(&mut self) -> Option<CfiAddress> {
        let result = self.edge_cfi(Picker::Last);
        self.absorb("end_cfi", result)
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let result = self
            .bridge()
            .ensure_ready(QueryStage::ElementResolution)
            .and_then(|_| {
                self.surface.element_by_id(id).ok_or_else(|| {
                    NavigationError::resolution_miss(
                        QueryStage::ElementResolution,
                        "ID_NOT_FOUND",
                        format!("no element with id `{id}`"),
                    )
                })
            });
        self.absorb("element_by_id", result)
    }

    pub fn page_for_element(&self, element: NodeId) -> Option<usize> {
        let result = self.bridge().page_for_element(element, None);
        self.absorb("page_for_element", result)
    }

    pub fn page_for_element_id(&self, id: &str) -> Option<usize> {
        let element = self.element_by_id(id)?;
        self.page_for_element(element)
    }

    /// Element CFI, memoized per node until the next invalidation.
    pub fn cfi_for_element(&mut self, element: NodeId) -> Option<CfiAddress> {
        let ready = self.bridge().ensure_ready(QueryStage::CodecInvocation);
        let result = ready.and_then(|_| self.memoized_element_cfi(element));
        self.absorb("cfi_for_element", result)
    }

    /// Node range spanning `cfi` and, when given, `end_cfi`.
    pub fn dom_range_from_range_cfi(
        &self,
        cfi: &str,
        end_cfi: Option<&str>,
        inclusive: bool,
    ) -> Option<NodeRange> {
        let result = self.bridge().dom_range(cfi, end_cfi, inclusive);
        self.absorb("dom_range_from_range_cfi", result)
    }

    pub fn range_cfi_from_node_range(&self, range: &NodeRange) -> Option<CfiAddress> {
        let result = self.bridge().cfi_for_range(range);
        self.absorb("range_cfi_from_node_range", result)
    }
}
