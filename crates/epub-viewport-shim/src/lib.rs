//! Headless rendering surface for `epub-viewport`.
//!
//! Parses an XHTML content document with `quick-xml`, lays its text out in
//! fixed-width columns, and answers the hit-testing and rectangle queries a
//! browser engine would. [`PathCfiCodec`] supplies a path-based CFI grammar
//! over the same tree. Together they let the navigator run end to end
//! without a real layout engine.
//!
//! ```rust,no_run
//! use epub_viewport::{CfiNavigator, FrameDimensions, NavigatorOptions, PaginationState};
//! use epub_viewport_shim::{FlowLayout, PathCfiCodec, ShimDocument};
//!
//! # fn main() -> Result<(), epub_viewport_shim::ShimError> {
//! let mut doc = ShimDocument::parse(b"<html><body><p>Hello</p></body></html>")?;
//! doc.flow(FlowLayout::default());
//! let mut nav = CfiNavigator::new(doc, PathCfiCodec::new(), NavigatorOptions::default());
//! nav.set_pagination(
//!     PaginationState::columns(400.0, 20.0, 1, 1),
//!     FrameDimensions::new(420.0, 800.0),
//! );
//! let _first = nav.first_visible_cfi();
//! # Ok(())
//! # }
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

mod codec;
mod document;
mod error;
mod layout;

pub use codec::PathCfiCodec;
pub use document::ShimDocument;
pub use error::ShimError;
pub use layout::{FlowLayout, TextLine};
