//! Structured errors for navigation queries.
//!
//! Errors never cross the public [`CfiNavigator`](crate::CfiNavigator)
//! contract: they are logged, reported to the diagnostics sink, and turned
//! into `None` at the nearest public method.

use core::fmt;

use crate::bridge::QueryStage;
use crate::cfi::CfiError;

/// Failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationErrorKind {
    /// Rendering surface not ready, torn down, or without a content root.
    GeometryUnavailable,
    /// Malformed CFI string.
    CodecSyntax,
    /// Well-formed CFI, or a hit test, that matched nothing in this document.
    ResolutionMiss,
    /// The query ran but produced nothing usable (no visible leaf, no
    /// visible fragment, point outside content).
    NoResult,
}

impl fmt::Display for NavigationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::GeometryUnavailable => "geometry_unavailable",
            Self::CodecSyntax => "codec_syntax",
            Self::ResolutionMiss => "resolution_miss",
            Self::NoResult => "no_result",
        };
        f.write_str(label)
    }
}

/// Structured error for a single navigation query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationError {
    pub kind: NavigationErrorKind,
    /// Query stage reached when the failure happened.
    pub stage: QueryStage,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: Box<str>,
    /// Offending CFI, when the query was CFI-driven.
    pub cfi: Option<Box<str>>,
}

impl NavigationError {
    pub(crate) fn new(
        kind: NavigationErrorKind,
        stage: QueryStage,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            stage,
            code,
            message: message.into().into_boxed_str(),
            cfi: None,
        }
    }

    pub(crate) fn geometry_unavailable(stage: QueryStage, message: impl Into<String>) -> Self {
        Self::new(
            NavigationErrorKind::GeometryUnavailable,
            stage,
            "SURFACE_NOT_READY",
            message,
        )
    }

    pub(crate) fn resolution_miss(
        stage: QueryStage,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(NavigationErrorKind::ResolutionMiss, stage, code, message)
    }

    pub(crate) fn no_result(
        stage: QueryStage,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(NavigationErrorKind::NoResult, stage, code, message)
    }

    pub(crate) fn with_cfi(mut self, cfi: impl Into<String>) -> Self {
        self.cfi = Some(cfi.into().into_boxed_str());
        self
    }

    pub(crate) fn with_stage(mut self, stage: QueryStage) -> Self {
        self.stage = stage;
        self
    }

    /// Whether this failure deserves a warning rather than a debug trace.
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self.kind,
            NavigationErrorKind::GeometryUnavailable | NavigationErrorKind::CodecSyntax
        )
    }
}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [stage={:?}]",
            self.kind, self.code, self.message, self.stage
        )?;
        if let Some(cfi) = self.cfi.as_deref() {
            write!(f, " [cfi={}]", cfi)?;
        }
        Ok(())
    }
}

impl std::error::Error for NavigationError {}

impl From<CfiError> for NavigationError {
    fn from(err: CfiError) -> Self {
        match &err {
            CfiError::Syntax { cfi, .. } => {
                let cfi = cfi.to_string();
                Self::new(
                    NavigationErrorKind::CodecSyntax,
                    QueryStage::CodecInvocation,
                    "CFI_SYNTAX",
                    err.to_string(),
                )
                .with_cfi(cfi)
            }
            CfiError::Unaddressable { .. } => Self::new(
                NavigationErrorKind::ResolutionMiss,
                QueryStage::CodecInvocation,
                "CFI_UNADDRESSABLE",
                err.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeId;

    #[test]
    fn syntax_errors_map_to_codec_kind_with_cfi() {
        let err: NavigationError = CfiError::syntax("/4/x", 3, "step must be numeric").into();
        assert_eq!(err.kind, NavigationErrorKind::CodecSyntax);
        assert_eq!(err.stage, QueryStage::CodecInvocation);
        assert_eq!(err.cfi.as_deref(), Some("/4/x"));
        assert!(err.is_anomaly());
    }

    #[test]
    fn unaddressable_nodes_are_misses() {
        let err: NavigationError = CfiError::unaddressable(NodeId(9), "detached").into();
        assert_eq!(err.kind, NavigationErrorKind::ResolutionMiss);
        assert!(!err.is_anomaly());
    }

    #[test]
    fn display_includes_code_stage_and_cfi() {
        let err = NavigationError::resolution_miss(
            QueryStage::ElementResolution,
            "CFI_NO_TARGET",
            "no element",
        )
        .with_cfi("/4/2");
        let text = err.to_string();
        assert!(text.starts_with("resolution_miss:CFI_NO_TARGET: no element"));
        assert!(text.contains("[cfi=/4/2]"));
        assert!(text.contains("ElementResolution"));
    }
}
