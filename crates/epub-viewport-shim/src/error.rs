use core::fmt;

/// Error raised while building a [`ShimDocument`](crate::ShimDocument).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShimError {
    pub code: &'static str,
    pub message: Box<str>,
    /// Byte offset in the source markup, when known.
    pub offset: Option<usize>,
}

impl ShimError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into().into_boxed_str(),
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for ShimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " [offset={}]", offset)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShimError {}
