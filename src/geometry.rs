//! Rectangle normalization and multi-column rebasing.
//!
//! Rendering surfaces report [`ClientRect`]s in viewport coordinates. Every
//! query converts them into [`Rect`]s exactly once through [`normalize`] or
//! [`normalize_rects`]; downstream code only ever sees normalized rectangles.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::visibility::is_visible;

/// Upper bound on column steps taken by a single [`rebase`] phase.
pub const MAX_REBASE_STEPS: usize = 4096;

/// Raw rectangle as reported by a rendering surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ClientRect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build from origin and size.
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// Rectangle list returned by surfaces; most nodes yield one to three boxes.
pub type RectList = SmallVec<[ClientRect; 4]>;

/// Axis-aligned rectangle in content-relative coordinates.
///
/// Width and height are derived from the edges and cannot be set on their own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// All four edges exactly zero; surfaces report this for unrendered text.
    pub fn is_degenerate(&self) -> bool {
        self.left == 0.0 && self.right == 0.0 && self.top == 0.0 && self.bottom == 0.0
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Shift all edges.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }

    /// Move the top edge down by `dy`, shrinking the height.
    pub fn trim_top(&mut self, dy: f64) {
        self.top += dy;
    }

    fn clamp_width(&mut self, max_width: f64) {
        if max_width > 0.0 && self.width() > max_width {
            self.right = self.left + max_width;
        }
    }

    /// Smallest rectangle covering `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Overlap with `other`, or `None` when the rectangles do not intersect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right, bottom))
    }
}

/// Translation between surface coordinates and content-relative coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentOffset {
    pub top: f64,
    pub left: f64,
}

impl ContentOffset {
    pub fn new(top: f64, left: f64) -> Self {
        Self { top, left }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Offset that maps the current spread back into whole-chapter coordinates.
    ///
    /// Vertical writing mode scrolls along the block axis, RTL pages advance
    /// towards negative x.
    pub fn for_pagination(pagination: &PaginationState) -> Self {
        if pagination.vertical_writing_mode {
            return Self::new(pagination.page_offset, 0.0);
        }
        let sign = if pagination.right_to_left { -1.0 } else { 1.0 };
        Self::new(0.0, pagination.page_offset * sign)
    }
}

/// Size of the viewing area (one page or spread).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: f64,
    pub height: f64,
}

impl FrameDimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Frame box in viewport coordinates.
    pub fn as_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// Multi-column layout parameters owned by the view orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaginationState {
    /// Width of one CSS column in pixels.
    pub column_width: f64,
    /// Gap between adjacent columns in pixels.
    pub column_gap: f64,
    /// Total columns (pages) in the current spine item.
    pub column_count: usize,
    /// Columns shown side by side in the frame.
    pub visible_column_count: usize,
    /// Page progression is right-to-left.
    pub right_to_left: bool,
    /// Content uses a vertical writing mode.
    pub vertical_writing_mode: bool,
    /// Scroll offset of the current spread in pixels.
    pub page_offset: f64,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            column_width: 0.0,
            column_gap: 0.0,
            column_count: 1,
            visible_column_count: 1,
            right_to_left: false,
            vertical_writing_mode: false,
            page_offset: 0.0,
        }
    }
}

impl PaginationState {
    /// Left-to-right horizontal layout with the given column geometry.
    pub fn columns(
        column_width: f64,
        column_gap: f64,
        column_count: usize,
        visible_column_count: usize,
    ) -> Self {
        Self {
            column_width,
            column_gap,
            column_count,
            visible_column_count,
            ..Self::default()
        }
    }

    pub fn with_right_to_left(mut self, rtl: bool) -> Self {
        self.right_to_left = rtl;
        self
    }

    pub fn with_vertical_writing_mode(mut self, vertical: bool) -> Self {
        self.vertical_writing_mode = vertical;
        self
    }

    pub fn with_page_offset(mut self, page_offset: f64) -> Self {
        self.page_offset = page_offset;
        self
    }

    /// Column width plus gap: the horizontal stride between pages.
    pub fn column_full_width(&self) -> f64 {
        self.column_width + self.column_gap
    }

    /// Highest valid page index.
    pub fn last_page_index(&self) -> usize {
        self.column_count.max(1) - 1
    }
}

/// Translate a raw rectangle by `offset`.
pub fn normalize(raw: &ClientRect, offset: ContentOffset) -> Rect {
    let mut rect = Rect::new(raw.left, raw.top, raw.right, raw.bottom);
    rect.translate(offset.left, offset.top);
    rect
}

/// Normalize every rectangle of one node footprint.
///
/// A lone rectangle wider than `column_width` is a non-breaking run that the
/// layout engine let overflow its column; its width is clamped so it is not
/// mistaken for a two-column span.
pub fn normalize_rects(
    raws: &[ClientRect],
    offset: ContentOffset,
    column_width: f64,
) -> SmallVec<[Rect; 4]> {
    let mut rects: SmallVec<[Rect; 4]> = raws.iter().map(|raw| normalize(raw, offset)).collect();
    if rects.len() == 1 {
        if let Some(rect) = rects.first_mut() {
            rect.clamp_width(column_width);
        }
    }
    rects
}

/// Walk a single rectangle into the column frame it belongs to.
///
/// Some layout engines report an element spanning several columns as one
/// rectangle anchored to a later column with a negative `top`. Phase one steps
/// back one column (and down one frame height) until `top >= 0`. With
/// `find_first_visible`, phase two steps forward again while the rectangle
/// still extends below the frame and is not yet visible.
pub fn rebase(
    rect: Rect,
    frame: FrameDimensions,
    column_full_width: f64,
    right_to_left: bool,
    vertical_writing_mode: bool,
    find_first_visible: bool,
) -> Rect {
    let mut rect = rect;
    if vertical_writing_mode || frame.height <= 0.0 {
        return rect;
    }
    let stride = if right_to_left {
        -column_full_width
    } else {
        column_full_width
    };

    let mut steps = 0usize;
    while rect.top < 0.0 && steps < MAX_REBASE_STEPS {
        rect.translate(-stride, frame.height);
        steps += 1;
    }

    if find_first_visible {
        let mut steps = 0usize;
        while rect.bottom >= frame.height && steps < MAX_REBASE_STEPS {
            if is_visible(&rect, frame, false, false) {
                break;
            }
            rect.translate(stride, -frame.height);
            steps += 1;
        }
    }
    rect
}
