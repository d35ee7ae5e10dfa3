//! CFI values and the codec boundary.
//!
//! The engine never parses CFI steps itself. It only needs to tell point and
//! range forms apart and to peel off a trailing spatial offset; everything
//! else goes through a [`CfiCodec`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::{Blacklist, ContentTree, NodeId, NodeRange};

const CFI_WRAPPER_PREFIX: &str = "epubcfi(";
const CFI_WRAPPER_SUFFIX: &str = ")";

/// Opaque persistent location string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CfiAddress(String);

impl CfiAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Range form carries a parent path and two component paths.
    pub fn is_range(&self) -> bool {
        looks_like_range(&self.0)
    }
}

impl fmt::Display for CfiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CfiAddress {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CfiAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for CfiAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strip an optional `epubcfi(...)` wrapper.
pub fn unwrap_cfi(raw: &str) -> &str {
    raw.strip_prefix(CFI_WRAPPER_PREFIX)
        .and_then(|rest| rest.strip_suffix(CFI_WRAPPER_SUFFIX))
        .unwrap_or(raw)
}

/// Walk top-level characters of a CFI body, skipping `^` escapes and
/// bracketed assertions.
fn top_level_chars(body: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut depth = 0usize;
    let mut escaped = false;
    body.char_indices().filter(move |&(_, ch)| {
        if escaped {
            escaped = false;
            return false;
        }
        match ch {
            '^' => {
                escaped = true;
                false
            }
            '[' => {
                depth += 1;
                false
            }
            ']' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        }
    })
}

/// Syntactic range check: exactly two top-level commas.
pub fn looks_like_range(raw: &str) -> bool {
    let body = unwrap_cfi(raw.trim());
    top_level_chars(body).filter(|&(_, ch)| ch == ',').count() == 2
}

/// Spatial position carried by a point CFI, in percent of the target box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialOffset {
    pub x: f64,
    pub y: f64,
}

/// A CFI with its spatial offset split off.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitCfi {
    /// CFI without the spatial suffix, wrapper preserved.
    pub cfi: String,
    pub spatial: Option<SpatialOffset>,
}

/// Split a trailing `@x:y` spatial offset off a CFI.
pub fn split_cfi(raw: &str) -> Result<SplitCfi, CfiError> {
    let trimmed = raw.trim();
    let body = unwrap_cfi(trimmed);
    let wrapped = body.len() != trimmed.len();
    let Some((at, _)) = top_level_chars(body).find(|&(_, ch)| ch == '@') else {
        return Ok(SplitCfi {
            cfi: trimmed.to_string(),
            spatial: None,
        });
    };

    let (path, suffix) = body.split_at(at);
    let spatial = parse_spatial(&suffix[1..]).ok_or_else(|| {
        CfiError::syntax(raw, at, "spatial offset must be `@x:y` with numeric x and y")
    })?;
    let cfi = if wrapped {
        format!("{}{}{}", CFI_WRAPPER_PREFIX, path, CFI_WRAPPER_SUFFIX)
    } else {
        path.to_string()
    };
    Ok(SplitCfi {
        cfi,
        spatial: Some(spatial),
    })
}

fn parse_spatial(raw: &str) -> Option<SpatialOffset> {
    let (x, y) = raw.split_once(':')?;
    let x: f64 = x.trim().parse().ok()?;
    let y: f64 = y.trim().parse().ok()?;
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some(SpatialOffset { x, y })
}

/// Errors reported by a [`CfiCodec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CfiError {
    /// The CFI string does not follow the grammar.
    Syntax {
        cfi: Box<str>,
        position: usize,
        reason: &'static str,
    },
    /// A node cannot be addressed (detached, or not part of this document).
    Unaddressable { node: NodeId, reason: &'static str },
}

impl CfiError {
    pub fn syntax(cfi: &str, position: usize, reason: &'static str) -> Self {
        Self::Syntax {
            cfi: cfi.into(),
            position,
            reason,
        }
    }

    pub fn unaddressable(node: NodeId, reason: &'static str) -> Self {
        Self::Unaddressable { node, reason }
    }
}

impl fmt::Display for CfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax {
                cfi,
                position,
                reason,
            } => write!(f, "invalid CFI `{}` at {}: {}", cfi, position, reason),
            Self::Unaddressable { node, reason } => {
                write!(f, "node {} cannot be addressed: {}", node.0, reason)
            }
        }
    }
}

impl std::error::Error for CfiError {}

/// CFI grammar implementation consumed by the engine.
pub trait CfiCodec {
    /// Point CFI addressing an element.
    fn generate_element_cfi(
        &self,
        tree: &dyn ContentTree,
        node: NodeId,
        blacklist: &Blacklist,
    ) -> Result<CfiAddress, CfiError>;

    /// Range CFI spanning `range`.
    fn generate_range_cfi(
        &self,
        tree: &dyn ContentTree,
        range: &NodeRange,
        blacklist: &Blacklist,
    ) -> Result<CfiAddress, CfiError>;

    /// Element addressed by a point CFI; `Ok(None)` when nothing matches.
    fn resolve_partial_cfi(
        &self,
        tree: &dyn ContentTree,
        cfi: &str,
        blacklist: &Blacklist,
    ) -> Result<Option<NodeId>, CfiError>;

    /// Node range addressed by a range CFI; `Ok(None)` when nothing matches.
    fn resolve_range_cfi(
        &self,
        tree: &dyn ContentTree,
        cfi: &str,
        blacklist: &Blacklist,
    ) -> Result<Option<NodeRange>, CfiError>;

    fn is_range_cfi(&self, cfi: &str) -> bool {
        looks_like_range(cfi)
    }
}
