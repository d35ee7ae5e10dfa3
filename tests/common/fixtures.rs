use epub_viewport::{
    CfiNavigator, FrameDimensions, NavigatorOptions, PaginationState,
};
use epub_viewport_shim::{FlowLayout, PathCfiCodec, ShimDocument};

pub const COLUMN_WIDTH: f64 = 400.0;
pub const COLUMN_GAP: f64 = 20.0;
pub const STRIDE: f64 = COLUMN_WIDTH + COLUMN_GAP;
/// Two 20px lines per column.
pub const FRAME_HEIGHT: f64 = 40.0;
/// Eighty characters: exactly one column at 40 characters per line.
pub const PARAGRAPH_TEXT: &str =
    "abcdefghijabcdefghijabcdefghijabcdefghijabcdefghijabcdefghijabcdefghijabcdefghij";

pub type ShimNavigator = CfiNavigator<ShimDocument, PathCfiCodec>;

/// A chapter of `paragraphs` column-filling paragraphs with ids `p0..`.
pub fn chapter_xhtml(paragraphs: usize) -> String {
    let mut body = String::new();
    for i in 0..paragraphs {
        body.push_str(&format!("<p id=\"p{i}\">{PARAGRAPH_TEXT}</p>"));
    }
    format!("<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head><body>{body}</body></html>")
}

pub fn flow_layout(right_to_left: bool) -> FlowLayout {
    FlowLayout {
        column_width: COLUMN_WIDTH,
        column_gap: COLUMN_GAP,
        frame_height: FRAME_HEIGHT,
        right_to_left,
        ..FlowLayout::default()
    }
}

/// Parse and lay out `xhtml`, scrolled to `page`.
pub fn laid_out(xhtml: &str, page: usize, right_to_left: bool) -> (ShimDocument, usize) {
    let mut doc = ShimDocument::parse(xhtml.as_bytes()).expect("fixture parses");
    let columns = doc.flow(flow_layout(right_to_left));
    let scroll = page as f64 * STRIDE;
    doc.scroll_to(if right_to_left { -scroll } else { scroll }, 0.0);
    (doc, columns)
}

pub fn pagination(columns: usize, page: usize, right_to_left: bool) -> PaginationState {
    PaginationState::columns(COLUMN_WIDTH, COLUMN_GAP, columns, 1)
        .with_right_to_left(right_to_left)
        .with_page_offset(page as f64 * STRIDE)
}

pub fn frame(right_to_left: bool) -> FrameDimensions {
    // RTL columns sit gap-first inside the frame.
    let width = if right_to_left { STRIDE } else { COLUMN_WIDTH };
    FrameDimensions::new(width, FRAME_HEIGHT)
}

/// Navigator over a laid-out chapter, showing `page`.
pub fn navigator_at(xhtml: &str, page: usize, right_to_left: bool) -> ShimNavigator {
    let (doc, columns) = laid_out(xhtml, page, right_to_left);
    let mut nav = CfiNavigator::new(doc, PathCfiCodec::new(), NavigatorOptions::default());
    nav.set_pagination(pagination(columns, page, right_to_left), frame(right_to_left));
    nav
}
