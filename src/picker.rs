//! First/last selection policy shared by ordering, fragment choice, caret
//! probing, and cache identity.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Which end of the visible content a query is interested in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Picker {
    #[default]
    First,
    Last,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PickerRule {
    /// Reverse document order in collected output.
    pub reverse_output: bool,
    /// Probe the bottom-right corner of a fragment instead of the top-left.
    pub trailing_corner: bool,
    /// Inward pixel step applied per caret probe retry.
    pub nudge: f64,
    /// Caret offsets point past the character of interest.
    pub caret_bias: usize,
    pub cache_tag: &'static str,
}

const PICKER_RULES: [PickerRule; 2] = [
    PickerRule {
        reverse_output: false,
        trailing_corner: false,
        nudge: 1.0,
        caret_bias: 0,
        cache_tag: "first",
    },
    PickerRule {
        reverse_output: true,
        trailing_corner: true,
        nudge: -1.0,
        caret_bias: 1,
        cache_tag: "last",
    },
];

impl Picker {
    pub(crate) fn rule(self) -> &'static PickerRule {
        match self {
            Self::First => &PICKER_RULES[0],
            Self::Last => &PICKER_RULES[1],
        }
    }

    /// Stable identity used in cache fingerprints.
    pub fn tag(self) -> &'static str {
        self.rule().cache_tag
    }

    /// Pick from a list in document order.
    pub fn pick<T>(self, items: &[T]) -> Option<&T> {
        if self.rule().reverse_output {
            items.last()
        } else {
            items.first()
        }
    }

    /// Put a document-order list into this picker's output order.
    pub fn order<T>(self, items: &mut [T]) {
        if self.rule().reverse_output {
            items.reverse();
        }
    }

    /// Corner of a fragment to probe: `(x, y)`.
    pub fn corner(self, rect: &Rect) -> (f64, f64) {
        if self.rule().trailing_corner {
            (rect.right(), rect.bottom())
        } else {
            (rect.left(), rect.top())
        }
    }

    /// Inward nudge for the `attempt`-th probe (`0` is the exact corner).
    pub fn nudge(self, attempt: usize) -> f64 {
        self.rule().nudge * attempt as f64
    }

    /// Character offset of interest for a caret offset.
    pub fn char_offset(self, caret_offset: usize) -> usize {
        caret_offset.saturating_sub(self.rule().caret_bias)
    }

    /// Fallback caret offset at the fragment edge of a text run.
    pub fn edge_offset(self, text_len: usize) -> usize {
        if self.rule().trailing_corner {
            text_len
        } else {
            0
        }
    }
}
