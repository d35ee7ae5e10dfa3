//! Visibility, pagination geometry, and CFI bridging for rendered EPUB content.
//!
//! `epub-viewport` answers two questions for a rendered spine item:
//! what is visible in the viewport right now, and which content-relative
//! address (CFI) corresponds to a visible thing. It works over an abstract
//! [`ContentTree`]/[`RenderSurface`] pair supplied by the host and treats the
//! CFI string grammar as an external [`CfiCodec`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use epub_viewport::{
//!     Blacklist, CfiCodec, CfiNavigator, FrameDimensions, NavigatorOptions, PaginationState,
//!     RenderSurface,
//! };
//!
//! fn first_visible<S: RenderSurface, C: CfiCodec>(surface: S, codec: C) -> Option<String> {
//!     let mut nav = CfiNavigator::new(surface, codec, NavigatorOptions::default());
//!     nav.set_blacklist(Blacklist::default().with_class("cfi-marker"));
//!     nav.set_pagination(
//!         PaginationState::columns(400.0, 20.0, 6, 3),
//!         FrameDimensions::new(1260.0, 800.0),
//!     );
//!     nav.first_visible_cfi().map(|cfi| cfi.into_string())
//! }
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod bridge;
pub mod cache;
pub mod cfi;
pub mod collector;
pub mod error;
pub mod geometry;
pub mod navigator;
pub mod page_index;
pub mod picker;
#[cfg(feature = "async")]
pub mod readiness;
#[cfg(test)]
mod test_support;
pub mod tree;
pub mod visibility;

pub use bridge::{one_char_span, NodeRangeInfo, QueryStage};
pub use cache::{CacheClock, CacheLimits, GeometryCache, GeometryFingerprint, SystemClock};
pub use cfi::{split_cfi, CfiAddress, CfiCodec, CfiError, SpatialOffset, SplitCfi};
pub use collector::{CollectorLimits, LeafDescriptor};
pub use error::{NavigationError, NavigationErrorKind};
pub use geometry::{
    normalize, normalize_rects, rebase, ClientRect, ContentOffset, FrameDimensions,
    PaginationState, Rect, RectList,
};
pub use navigator::{CfiNavigator, NavigatorDiagnostic, NavigatorOptions};
pub use page_index::page_index_for;
pub use picker::Picker;
#[cfg(feature = "async")]
pub use readiness::{ReadinessOutcome, ReadinessSignal};
pub use tree::{
    Blacklist, CaretPosition, ContentTree, NodeId, NodeKind, NodePosition, NodeRange,
    RenderSurface,
};
pub use visibility::{is_visible, percent_visible, VisibilityContext};
