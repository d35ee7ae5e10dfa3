//! Path-based CFI codec over any [`ContentTree`].
//!
//! Paths start below the document element. Element children get even steps
//! `2(k+1)` counting only non-blacklisted elements; the text between them is
//! addressed with odd steps `2k+1` and a `:offset` counted across every text
//! node of that run, including text inside blacklisted wrappers. Range CFIs
//! are `parent,/start,/end`. Syntax error positions are byte offsets into the
//! CFI with any `epubcfi(...)` wrapper removed.

use epub_viewport::cfi::unwrap_cfi;
use epub_viewport::{
    split_cfi, Blacklist, CfiAddress, CfiCodec, CfiError, ContentTree, NodeId, NodePosition,
    NodeRange,
};

/// Reference CFI codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathCfiCodec {
    /// Emit `[id]` assertions on element steps.
    pub id_assertions: bool,
}

impl Default for PathCfiCodec {
    fn default() -> Self {
        Self {
            id_assertions: true,
        }
    }
}

impl PathCfiCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_id_assertions() -> Self {
        Self {
            id_assertions: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Step {
    index: usize,
    assertion: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Path {
    steps: Vec<Step>,
    offset: Option<usize>,
}

fn is_indexed(tree: &dyn ContentTree, node: NodeId, blacklist: &Blacklist) -> bool {
    tree.is_element(node) && !tree.is_blacklisted(node, blacklist)
}

fn escape_assertion(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '^' | '[' | ']' | '(' | ')' | ',' | ';' | '=') {
            out.push('^');
        }
        out.push(ch);
    }
    out
}

/// Every text node under `node` (or `node` itself), in document order.
fn flatten_texts(tree: &dyn ContentTree, node: NodeId, out: &mut Vec<NodeId>) {
    if tree.is_text(node) {
        out.push(node);
        return;
    }
    for child in tree.children(node) {
        flatten_texts(tree, child, out);
    }
}

/// Text nodes of the `run`-th text run of `container`.
fn run_texts(
    tree: &dyn ContentTree,
    container: NodeId,
    run: usize,
    blacklist: &Blacklist,
) -> Vec<NodeId> {
    let mut seen = 0usize;
    let mut out = Vec::new();
    for child in tree.children(container) {
        if is_indexed(tree, child, blacklist) {
            seen += 1;
            if seen > run {
                break;
            }
            continue;
        }
        if seen == run {
            flatten_texts(tree, child, &mut out);
        }
    }
    out
}

fn text_length(tree: &dyn ContentTree, texts: &[NodeId]) -> usize {
    texts.iter().map(|&t| tree.text_len(t)).sum()
}

impl PathCfiCodec {
    fn element_step(
        &self,
        tree: &dyn ContentTree,
        node: NodeId,
        blacklist: &Blacklist,
    ) -> Result<String, CfiError> {
        let parent = tree
            .parent(node)
            .ok_or_else(|| CfiError::unaddressable(node, "detached element"))?;
        let k = tree
            .children(parent)
            .into_iter()
            .filter(|&child| is_indexed(tree, child, blacklist))
            .position(|child| child == node)
            .ok_or_else(|| CfiError::unaddressable(node, "blacklisted element"))?;
        let mut step = format!("/{}", 2 * (k + 1));
        if self.id_assertions {
            if let Some(id) = tree.element_id(node).filter(|id| !id.is_empty()) {
                step.push('[');
                step.push_str(&escape_assertion(id));
                step.push(']');
            }
        }
        Ok(step)
    }

    /// Steps from the document element down to `node`.
    fn element_steps(
        &self,
        tree: &dyn ContentTree,
        node: NodeId,
        blacklist: &Blacklist,
    ) -> Result<Vec<String>, CfiError> {
        let root = tree
            .document_element()
            .ok_or_else(|| CfiError::unaddressable(node, "document has no root"))?;
        let mut steps = Vec::with_capacity(8);
        let mut current = node;
        while current != root {
            steps.push(self.element_step(tree, current, blacklist)?);
            current = tree
                .parent(current)
                .ok_or_else(|| CfiError::unaddressable(node, "outside the document"))?;
        }
        steps.reverse();
        Ok(steps)
    }

    /// Steps and character offset for a position.
    fn position_steps(
        &self,
        tree: &dyn ContentTree,
        position: NodePosition,
        blacklist: &Blacklist,
    ) -> Result<(Vec<String>, Option<usize>), CfiError> {
        let node = position.node;
        if tree.is_text(node) {
            let mut child = node;
            let mut container = tree
                .parent(node)
                .ok_or_else(|| CfiError::unaddressable(node, "detached text"))?;
            while tree.is_blacklisted(container, blacklist) {
                child = container;
                container = tree
                    .parent(container)
                    .ok_or_else(|| CfiError::unaddressable(node, "detached text"))?;
            }
            let children = tree.children(container);
            let index = children
                .iter()
                .position(|&c| c == child)
                .ok_or_else(|| CfiError::unaddressable(node, "inconsistent tree"))?;
            let run = children[..index]
                .iter()
                .filter(|&&c| is_indexed(tree, c, blacklist))
                .count();
            let texts = run_texts(tree, container, run, blacklist);
            let before = texts.iter().position(|&t| t == node).unwrap_or(texts.len());
            let offset = text_length(tree, &texts[..before]) + position.offset;
            let mut steps = self.element_steps(tree, container, blacklist)?;
            steps.push(format!("/{}", 2 * run + 1));
            return Ok((steps, Some(offset)));
        }

        if tree.is_blacklisted(node, blacklist) {
            return Err(CfiError::unaddressable(node, "blacklisted element"));
        }
        let children = tree.children(node);
        if let Some(&child) = children.get(position.offset) {
            if is_indexed(tree, child, blacklist) {
                return Ok((self.element_steps(tree, child, blacklist)?, None));
            }
        }
        let boundary = position.offset.min(children.len());
        let run = children[..boundary]
            .iter()
            .filter(|&&c| is_indexed(tree, c, blacklist))
            .count();
        let mut texts_before = Vec::new();
        let run_start = children[..boundary]
            .iter()
            .rposition(|&c| is_indexed(tree, c, blacklist))
            .map_or(0, |i| i + 1);
        for &child in &children[run_start..boundary] {
            flatten_texts(tree, child, &mut texts_before);
        }
        let mut steps = self.element_steps(tree, node, blacklist)?;
        steps.push(format!("/{}", 2 * run + 1));
        Ok((steps, Some(text_length(tree, &texts_before))))
    }

    fn locate_element(
        &self,
        tree: &dyn ContentTree,
        from: NodeId,
        steps: &[Step],
        blacklist: &Blacklist,
    ) -> Option<NodeId> {
        let mut node = from;
        for step in steps {
            if let Some(found) = step
                .assertion
                .as_deref()
                .and_then(|id| tree.element_by_id(id))
            {
                node = found;
                continue;
            }
            if step.index % 2 == 1 {
                return None;
            }
            let k = step.index / 2 - 1;
            node = tree
                .children(node)
                .into_iter()
                .filter(|&child| is_indexed(tree, child, blacklist))
                .nth(k)?;
        }
        Some(node)
    }

    /// Resolve a path relative to `from` into a position. An offset on the
    /// seam between two text nodes lands at the end of the first one when
    /// `at_end` is set and at the start of the second otherwise.
    fn locate_position(
        &self,
        tree: &dyn ContentTree,
        from: NodeId,
        path: &Path,
        blacklist: &Blacklist,
        at_end: bool,
    ) -> Option<NodePosition> {
        let (last, init) = path.steps.split_last()?;
        let container = self.locate_element(tree, from, init, blacklist)?;
        if last.index % 2 == 0 {
            let element =
                self.locate_element(tree, container, core::slice::from_ref(last), blacklist)?;
            let parent = tree.parent(element)?;
            let index = tree.children(parent).iter().position(|&c| c == element)?;
            return Some(NodePosition::new(parent, index));
        }

        let run = last.index / 2;
        let mut remaining = path.offset.unwrap_or(0);
        let texts = run_texts(tree, container, run, blacklist);
        for (i, &text) in texts.iter().enumerate() {
            let len = tree.text_len(text);
            let last_text = i + 1 == texts.len();
            if remaining < len || (remaining == len && (at_end || last_text)) {
                return Some(NodePosition::new(text, remaining));
            }
            remaining -= len;
        }
        if texts.is_empty() && remaining == 0 {
            // Empty run: the boundary just after the run-th indexed element.
            let children = tree.children(container);
            let index = if run == 0 {
                0
            } else {
                children
                    .iter()
                    .enumerate()
                    .filter(|&(_, &c)| is_indexed(tree, c, blacklist))
                    .nth(run - 1)
                    .map(|(i, _)| i + 1)?
            };
            return Some(NodePosition::new(container, index));
        }
        None
    }
}

fn join(steps: &[String]) -> String {
    steps.concat()
}

fn with_offset(mut path: String, offset: Option<usize>) -> String {
    if let Some(offset) = offset {
        path.push(':');
        path.push_str(&offset.to_string());
    }
    path
}

/// Split `body` at top-level occurrences of `sep`.
fn split_top_level(body: &str, sep: char) -> Vec<(usize, &str)> {
    let mut parts = Vec::with_capacity(3);
    let mut depth = 0usize;
    let mut escaped = false;
    let mut start = 0usize;
    for (idx, ch) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '^' => escaped = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push((start, &body[start..idx]));
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push((start, &body[start..]));
    parts
}

/// Content-document part of a CFI body: whatever follows the last
/// top-level `!`.
fn content_part(body: &str) -> (usize, &str) {
    split_top_level(body, '!')
        .pop()
        .unwrap_or((0, body))
}

fn parse_number(
    chars: &mut core::iter::Peekable<core::str::CharIndices<'_>>,
    cfi: &str,
    base: usize,
    at: usize,
) -> Result<usize, CfiError> {
    let mut value: Option<usize> = None;
    while let Some(&(_, ch)) = chars.peek() {
        let Some(digit) = ch.to_digit(10) else {
            break;
        };
        chars.next();
        value = Some(
            value
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit as usize))
                .ok_or_else(|| CfiError::syntax(cfi, base + at, "number overflows"))?,
        );
    }
    value.ok_or_else(|| CfiError::syntax(cfi, base + at, "expected a number"))
}

fn parse_assertion(
    chars: &mut core::iter::Peekable<core::str::CharIndices<'_>>,
    cfi: &str,
    base: usize,
    at: usize,
) -> Result<String, CfiError> {
    let mut out = String::new();
    let mut escaped = false;
    for (_, ch) in chars.by_ref() {
        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '^' => escaped = true,
            ']' => {
                // Parameters such as `;s=b` are not part of the id.
                let id = out.split(';').next().unwrap_or_default().to_string();
                return Ok(id);
            }
            _ => out.push(ch),
        }
    }
    Err(CfiError::syntax(cfi, base + at, "unterminated assertion"))
}

/// Parse `/n[assertion]/n...[:offset]`, ignoring a trailing temporal or
/// spatial suffix.
fn parse_path(segment: &str, cfi: &str, base: usize) -> Result<Path, CfiError> {
    let mut path = Path::default();
    let mut chars = segment.char_indices().peekable();
    while let Some(&(at, ch)) = chars.peek() {
        match ch {
            '/' => {
                chars.next();
                let index = parse_number(&mut chars, cfi, base, at + 1)?;
                if index == 0 {
                    return Err(CfiError::syntax(
                        cfi,
                        base + at,
                        "step index must be positive",
                    ));
                }
                let mut step = Step {
                    index,
                    assertion: None,
                };
                if let Some(&(open, '[')) = chars.peek() {
                    chars.next();
                    let id = parse_assertion(&mut chars, cfi, base, open)?;
                    step.assertion = (!id.is_empty()).then_some(id);
                }
                path.steps.push(step);
            }
            ':' => {
                chars.next();
                path.offset = Some(parse_number(&mut chars, cfi, base, at + 1)?);
                if let Some(&(open, '[')) = chars.peek() {
                    chars.next();
                    parse_assertion(&mut chars, cfi, base, open)?;
                }
                match chars.peek() {
                    None | Some(&(_, '~')) | Some(&(_, '@')) => break,
                    Some(&(pos, _)) => {
                        return Err(CfiError::syntax(
                            cfi,
                            base + pos,
                            "text offset must end the path",
                        ));
                    }
                }
            }
            '~' | '@' => break,
            _ => return Err(CfiError::syntax(cfi, base + at, "unexpected character")),
        }
    }
    Ok(path)
}

impl CfiCodec for PathCfiCodec {
    fn generate_element_cfi(
        &self,
        tree: &dyn ContentTree,
        node: NodeId,
        blacklist: &Blacklist,
    ) -> Result<CfiAddress, CfiError> {
        if !tree.is_element(node) {
            return Err(CfiError::unaddressable(node, "not an element"));
        }
        let steps = self.element_steps(tree, node, blacklist)?;
        if steps.is_empty() {
            return Err(CfiError::unaddressable(node, "document element has no path"));
        }
        Ok(CfiAddress::new(join(&steps)))
    }

    fn generate_range_cfi(
        &self,
        tree: &dyn ContentTree,
        range: &NodeRange,
        blacklist: &Blacklist,
    ) -> Result<CfiAddress, CfiError> {
        let (start, start_offset) = self.position_steps(tree, range.start, blacklist)?;
        let (end, end_offset) = self.position_steps(tree, range.end, blacklist)?;
        let limit = start.len().min(end.len()).saturating_sub(1);
        let common = start
            .iter()
            .zip(end.iter())
            .take(limit)
            .take_while(|(a, b)| a == b)
            .count();
        Ok(CfiAddress::new(format!(
            "{},{},{}",
            join(&start[..common]),
            with_offset(join(&start[common..]), start_offset),
            with_offset(join(&end[common..]), end_offset),
        )))
    }

    fn resolve_partial_cfi(
        &self,
        tree: &dyn ContentTree,
        cfi: &str,
        blacklist: &Blacklist,
    ) -> Result<Option<NodeId>, CfiError> {
        let split = split_cfi(cfi)?;
        let body = unwrap_cfi(split.cfi.trim());
        let (base, content) = content_part(body);
        let path = parse_path(content, body, base)?;
        if path.steps.is_empty() {
            return Err(CfiError::syntax(body, base, "empty path"));
        }
        let Some(root) = tree.document_element() else {
            return Ok(None);
        };
        let steps = match path.steps.split_last() {
            Some((last, init)) if last.index % 2 == 1 => init,
            _ => path.steps.as_slice(),
        };
        if steps.is_empty() {
            return Ok(None);
        }
        Ok(self.locate_element(tree, root, steps, blacklist))
    }

    fn resolve_range_cfi(
        &self,
        tree: &dyn ContentTree,
        cfi: &str,
        blacklist: &Blacklist,
    ) -> Result<Option<NodeRange>, CfiError> {
        let body = unwrap_cfi(cfi.trim());
        let parts = split_top_level(body, ',');
        let [(parent_at, parent), (start_at, start), (end_at, end)] = parts.as_slice() else {
            return Err(CfiError::syntax(body, 0, "range CFI needs exactly three parts"));
        };
        let (content_at, parent) = content_part(parent);
        let parent_path = parse_path(parent, body, parent_at + content_at)?;
        if parent_path.offset.is_some() {
            return Err(CfiError::syntax(
                body,
                *parent_at,
                "range parent cannot carry an offset",
            ));
        }
        let start_path = parse_path(start, body, *start_at)?;
        let end_path = parse_path(end, body, *end_at)?;
        if start_path.steps.is_empty() || end_path.steps.is_empty() {
            return Err(CfiError::syntax(body, *start_at, "range endpoints need a path"));
        }

        let Some(root) = tree.document_element() else {
            return Ok(None);
        };
        let Some(parent) = self.locate_element(tree, root, &parent_path.steps, blacklist) else {
            return Ok(None);
        };
        let start = self.locate_position(tree, parent, &start_path, blacklist, false);
        let end = self.locate_position(tree, parent, &end_path, blacklist, true);
        Ok(start.zip(end).map(|(start, end)| NodeRange::new(start, end)))
    }
}
