//! Source positions attached to failures, skips, and expectations.

use std::fmt;

/// An immutable file/line pair identifying where a failure, skip, or
/// expectation originated.
///
/// Captured at call sites with the [`here!`](crate::here) macro; every
/// reported failure line is anchored to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl SourceLocation {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Captures the [`SourceLocation`] of the call site.
#[macro_export]
macro_rules! here {
    () => {
        $crate::location::SourceLocation::new(file!(), line!())
    };
}
