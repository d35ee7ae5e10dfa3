//! Visibility judgments for normalized rectangles.

use crate::geometry::{rebase, FrameDimensions, PaginationState, Rect};

/// Frame and column parameters needed to judge a footprint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibilityContext {
    pub frame: FrameDimensions,
    pub column_full_width: f64,
    pub right_to_left: bool,
    pub vertical_writing_mode: bool,
}

impl VisibilityContext {
    pub fn new(frame: FrameDimensions, pagination: &PaginationState) -> Self {
        Self {
            frame,
            column_full_width: pagination.column_full_width(),
            right_to_left: pagination.right_to_left,
            vertical_writing_mode: pagination.vertical_writing_mode,
        }
    }

    /// Single-page frame without column rebasing.
    pub fn single_frame(frame: FrameDimensions) -> Self {
        Self {
            frame,
            column_full_width: frame.width,
            right_to_left: false,
            vertical_writing_mode: false,
        }
    }
}

/// Whether `rect` is (partially) inside the frame along the paging axis.
///
/// Horizontal layouts page along x, so only `left`/`right` are compared;
/// vertical writing mode pages along y. With `ignore_partial`, a rectangle
/// straddling the leading edge does not count.
pub fn is_visible(
    rect: &Rect,
    frame: FrameDimensions,
    vertical_writing_mode: bool,
    ignore_partial: bool,
) -> bool {
    if rect.is_degenerate() {
        return false;
    }
    let (start, end, extent) = if vertical_writing_mode {
        (rect.top(), rect.bottom(), frame.height)
    } else {
        (rect.left(), rect.right(), frame.width)
    };
    (start >= 0.0 && start < extent) || (!ignore_partial && start < 0.0 && end >= 0.0)
}

/// Visibility percentage of a node footprint, `0` or `1..=100`.
///
/// One rectangle: exact intersection area against the frame box, rounded up.
/// Several rectangles (a node split across columns): the share of rectangles
/// that are individually visible, rounded up.
pub fn percent_visible(rects: &[Rect], ctx: &VisibilityContext) -> u8 {
    match rects {
        [] => 0,
        [single] => single_rect_percent(single, ctx),
        _ => {
            let visible = rects
                .iter()
                .filter(|rect| is_visible(rect, ctx.frame, ctx.vertical_writing_mode, false))
                .count();
            ratio_to_percent(visible as f64 / rects.len() as f64)
        }
    }
}

fn single_rect_percent(rect: &Rect, ctx: &VisibilityContext) -> u8 {
    let rect = rebase(
        *rect,
        ctx.frame,
        ctx.column_full_width,
        ctx.right_to_left,
        ctx.vertical_writing_mode,
        true,
    );
    if rect.is_degenerate() {
        return 0;
    }
    let (width, height) = (rect.width(), rect.height());
    if width <= 0.0 || height <= 0.0 {
        // Collapsed boxes (empty elements, line breaks) have no area to measure.
        return if is_visible(&rect, ctx.frame, ctx.vertical_writing_mode, false) {
            100
        } else {
            0
        };
    }
    match rect.intersection(&ctx.frame.as_rect()) {
        Some(ix) => ratio_to_percent((ix.width() / width) * (ix.height() / height)),
        None => 0,
    }
}

fn ratio_to_percent(ratio: f64) -> u8 {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 0;
    }
    (100.0 * ratio).ceil().clamp(0.0, 100.0) as u8
}
