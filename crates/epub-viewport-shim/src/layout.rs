//! Monospace column layout and hit testing.

use epub_viewport::{
    CaretPosition, ClientRect, ContentOffset, ContentTree, NodeId, NodeKind, NodeRange, RectList,
    RenderSurface,
};

use crate::document::ShimDocument;

/// One laid-out line of a text node: characters `start..end` drawn in a
/// monospace run starting at (`left`, `top`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextLine {
    pub start: usize,
    pub end: usize,
    pub left: f64,
    pub top: f64,
    pub char_width: f64,
    pub height: f64,
}

impl TextLine {
    pub fn rect(&self) -> ClientRect {
        self.span_rect(self.start, self.end)
    }

    fn span_rect(&self, start: usize, end: usize) -> ClientRect {
        let from = (start - self.start) as f64 * self.char_width;
        let to = (end - self.start) as f64 * self.char_width;
        ClientRect::new(
            self.left + from,
            self.top,
            self.left + to,
            self.top + self.height,
        )
    }

    /// Rectangle of the part of `start..end` that falls on this line.
    fn clip(&self, start: usize, end: usize) -> Option<ClientRect> {
        let from = start.max(self.start);
        let to = end.min(self.end);
        (from < to).then(|| self.span_rect(from, to))
    }

    /// Caret offset at the leading edge of the glyph under `x`.
    fn caret_offset(&self, x: f64) -> usize {
        if self.char_width <= 0.0 {
            return self.start;
        }
        let steps = ((x - self.left) / self.char_width).floor().max(0.0) as usize;
        (self.start + steps).min(self.end)
    }
}

/// Parameters for [`ShimDocument::flow`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowLayout {
    pub column_width: f64,
    pub column_gap: f64,
    /// Height of one column; lines overflowing it continue in the next one.
    pub frame_height: f64,
    pub char_width: f64,
    pub line_height: f64,
    /// Columns progress right to left, starting from the rightmost visible
    /// column of the first spread.
    pub right_to_left: bool,
    pub visible_column_count: usize,
}

impl Default for FlowLayout {
    fn default() -> Self {
        Self {
            column_width: 400.0,
            column_gap: 20.0,
            frame_height: 800.0,
            char_width: 10.0,
            line_height: 20.0,
            right_to_left: false,
            visible_column_count: 1,
        }
    }
}

impl FlowLayout {
    fn column_left(&self, column: usize) -> f64 {
        let stride = self.column_width + self.column_gap;
        if self.right_to_left {
            let visible = self.visible_column_count.max(1) as f64;
            (visible - 1.0 - column as f64) * stride + self.column_gap
        } else {
            column as f64 * stride
        }
    }
}

impl ShimDocument {
    /// Lay out every printable text node under the content root in
    /// columns. Each text node starts on a fresh line; elements get one
    /// rectangle per column their text touches. Returns the number of
    /// columns used.
    pub fn flow(&mut self, layout: FlowLayout) -> usize {
        for node in &mut self.nodes {
            node.rects.clear();
            node.lines.clear();
        }
        let Some(root) = self.content_root() else {
            return 0;
        };
        let chars_per_line = if layout.char_width > 0.0 {
            ((layout.column_width / layout.char_width).floor() as usize).max(1)
        } else {
            usize::MAX
        };
        let lines_per_column = if layout.line_height > 0.0 {
            ((layout.frame_height / layout.line_height).floor() as usize).max(1)
        } else {
            usize::MAX
        };

        let root_start = self.order_index[root.0 as usize];
        let root_end = self.subtree_end[root.0 as usize];
        let texts: Vec<NodeId> = self
            .text_order
            .iter()
            .copied()
            .filter(|&t| {
                let idx = self.order_index[t.0 as usize];
                idx > root_start && idx < root_end
            })
            .collect();

        let (mut column, mut line) = (0usize, 0usize);
        let mut touched = false;
        // Per element: (column, rect) accumulators.
        let mut boxes: Vec<Vec<(usize, ClientRect)>> = vec![Vec::new(); self.nodes.len()];
        for text in texts {
            let (printable, len) = match self.text(text) {
                Some(t) => (!t.trim().is_empty(), t.chars().count()),
                None => (false, 0),
            };
            if !printable {
                continue;
            }
            let mut start = 0;
            while start < len {
                if line >= lines_per_column {
                    column += 1;
                    line = 0;
                }
                let end = start.saturating_add(chars_per_line).min(len);
                let text_line = TextLine {
                    start,
                    end,
                    left: layout.column_left(column),
                    top: line as f64 * layout.line_height,
                    char_width: layout.char_width,
                    height: layout.line_height,
                };
                let rect = text_line.rect();
                if let Some(node) = self.node_mut(text) {
                    node.lines.push(text_line);
                }
                let mut ancestor = self.parent(text);
                while let Some(element) = ancestor {
                    merge_box(&mut boxes[element.0 as usize], column, rect);
                    ancestor = self.parent(element);
                }
                touched = true;
                line += 1;
                start = end;
            }
        }

        for (idx, per_column) in boxes.into_iter().enumerate() {
            self.nodes[idx].rects = per_column.into_iter().map(|(_, rect)| rect).collect();
        }
        log::debug!("shim flow used {} columns", column + 1);
        if touched {
            column + 1
        } else {
            0
        }
    }

    /// Override an element's rectangles.
    pub fn set_element_rects(&mut self, node: NodeId, rects: &[ClientRect]) {
        if let Some(n) = self.node_mut(node) {
            n.rects = rects.to_vec();
        }
    }

    /// Override a text node's line layout.
    pub fn set_text_lines(&mut self, node: NodeId, lines: Vec<TextLine>) {
        if let Some(n) = self.node_mut(node) {
            n.lines = lines;
        }
    }

    pub fn text_lines(&self, node: NodeId) -> &[TextLine] {
        self.node(node).map(|n| n.lines.as_slice()).unwrap_or_default()
    }

    fn to_viewport(&self, rect: ClientRect) -> ClientRect {
        ClientRect::new(
            rect.left - self.scroll.left,
            rect.top - self.scroll.top,
            rect.right - self.scroll.left,
            rect.bottom - self.scroll.top,
        )
    }

    /// Map a position to (document-order index of a text node, offset).
    /// Element positions map to the start of the first text at or after the
    /// boundary; past the last text they map to `(usize::MAX, 0)`.
    fn text_key(&self, position: CaretPosition) -> Option<(usize, usize)> {
        let node = self.node(position.node)?;
        let idx = position.node.0 as usize;
        if node.kind == NodeKind::Text {
            return Some((self.order_index[idx], position.offset));
        }
        let boundary = match node.children.get(position.offset) {
            Some(child) => self.order_index[child.0 as usize],
            None => self.subtree_end[idx],
        };
        let key = self
            .text_order
            .iter()
            .map(|t| self.order_index[t.0 as usize])
            .find(|&order| order >= boundary)
            .map_or((usize::MAX, 0), |order| (order, 0));
        Some(key)
    }
}

fn merge_box(boxes: &mut Vec<(usize, ClientRect)>, column: usize, rect: ClientRect) {
    if let Some((_, existing)) = boxes.iter_mut().find(|(c, _)| *c == column) {
        *existing = ClientRect::new(
            existing.left.min(rect.left),
            existing.top.min(rect.top),
            existing.right.max(rect.right),
            existing.bottom.max(rect.bottom),
        );
    } else {
        boxes.push((column, rect));
    }
}

impl RenderSurface for ShimDocument {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn client_rects(&self, node: NodeId) -> RectList {
        let Some(n) = self.node(node) else {
            return RectList::new();
        };
        match n.kind {
            NodeKind::Text => n
                .lines
                .iter()
                .map(|line| self.to_viewport(line.rect()))
                .collect(),
            NodeKind::Element => n.rects.iter().map(|&r| self.to_viewport(r)).collect(),
        }
    }

    fn range_client_rects(&self, range: &NodeRange) -> RectList {
        let mut out = RectList::new();
        let (Some(start), Some(end)) = (self.text_key(range.start), self.text_key(range.end))
        else {
            return out;
        };
        for &text in &self.text_order {
            let order = self.order_index[text.0 as usize];
            if order < start.0 {
                continue;
            }
            if order > end.0 {
                break;
            }
            let len = self.text_len(text);
            let from = if order == start.0 { start.1 } else { 0 };
            let to = if order == end.0 { end.1 } else { len };
            for line in self.text_lines(text) {
                if let Some(rect) = line.clip(from, to) {
                    out.push(self.to_viewport(rect));
                }
            }
        }
        if out.is_empty() && self.is_element(range.start.node) {
            if let Some(&child) = self
                .node(range.start.node)
                .and_then(|n| n.children.get(range.start.offset))
            {
                return self.client_rects(child);
            }
        }
        out
    }

    fn caret_position_from_point(&self, x: f64, y: f64) -> Option<CaretPosition> {
        let (x, y) = (x + self.scroll.left, y + self.scroll.top);
        self.text_order.iter().find_map(|&text| {
            self.text_lines(text)
                .iter()
                .find(|line| line.rect().contains_point(x, y))
                .map(|line| CaretPosition::new(text, line.caret_offset(x)))
        })
    }

    fn element_from_point(&self, x: f64, y: f64) -> Option<NodeId> {
        let (x, y) = (x + self.scroll.left, y + self.scroll.top);
        self.order.iter().rev().copied().find(|&node| {
            self.node(node).is_some_and(|n| {
                n.kind == NodeKind::Element && n.rects.iter().any(|r| r.contains_point(x, y))
            })
        })
    }

    fn visible_content_offset(&self) -> Option<ContentOffset> {
        self.visible_offset
    }
}
