//! Page index calculation for node footprints.

use smallvec::SmallVec;

use crate::geometry::{rebase, FrameDimensions, PaginationState, Rect, MAX_REBASE_STEPS};

/// Zero-based page index of a footprint inside the current spine item.
///
/// `vertical_offset_percent` selects a point part-way down the footprint
/// (as carried by spatial CFI offsets): leading rectangles, or the leading
/// part of a single rectangle, are trimmed before the index is taken.
///
/// Returns `None` for an empty footprint. The result is always clamped to
/// `[0, column_count - 1]`.
pub fn page_index_for(
    rects: &[Rect],
    vertical_offset_percent: Option<f64>,
    frame: FrameDimensions,
    pagination: &PaginationState,
) -> Option<usize> {
    if rects.is_empty() {
        return None;
    }
    let mut rects: SmallVec<[Rect; 4]> = rects.iter().copied().collect();
    let column_full_width = pagination.column_full_width();
    let rtl = pagination.right_to_left;
    let vertical = pagination.vertical_writing_mode;

    if let Some(percent) = vertical_offset_percent.filter(|p| p.is_finite() && *p > 0.0) {
        // Trimming is defined along the inline-to-block flow of horizontal text only.
        if !vertical {
            trim_by_vertical_offset(&mut rects, percent, frame, column_full_width, rtl);
        }
    }

    let first = match rects.as_slice() {
        [single] => rebase(*single, frame, column_full_width, rtl, vertical, false),
        _ => rects[0],
    };

    let raw_index = if vertical {
        if frame.height <= 0.0 {
            return Some(0);
        }
        first.top() / frame.height
    } else {
        if column_full_width <= 0.0 {
            return Some(0);
        }
        let left = if rtl {
            column_full_width * pagination.visible_column_count.max(1) as f64 - first.left()
        } else {
            first.left()
        };
        left / column_full_width
    };
    Some(clamp_page_index(raw_index.floor(), pagination))
}

fn clamp_page_index(raw: f64, pagination: &PaginationState) -> usize {
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    (raw as usize).min(pagination.last_page_index())
}

fn trim_by_vertical_offset(
    rects: &mut SmallVec<[Rect; 4]>,
    percent: f64,
    frame: FrameDimensions,
    column_full_width: f64,
    rtl: bool,
) {
    let total_height: f64 = rects.iter().map(Rect::height).sum();
    let height_to_hide = total_height * percent / 100.0;

    if rects.len() > 1 {
        let mut accumulated = 0.0;
        while rects.len() > 1 {
            accumulated += rects[0].height();
            if accumulated > height_to_hide {
                break;
            }
            rects.remove(0);
        }
        return;
    }

    let Some(rect) = rects.first_mut() else {
        return;
    };
    // Walk to the last column the rectangle could occupy so that the residual
    // added to `top` is rebased forward from there.
    let stride = if rtl {
        -column_full_width
    } else {
        column_full_width
    };
    if frame.height > 0.0 {
        let mut steps = 0usize;
        while rect.bottom() >= frame.height && steps < MAX_REBASE_STEPS {
            rect.translate(stride, -frame.height);
            steps += 1;
        }
    }
    rect.trim_top(height_to_hide);
}
