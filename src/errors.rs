//! Error taxonomy for test bodies and the harness surface.
//!
//! Every error thrown from a set-up, body, or tear-down phase is funneled
//! through [`ErrorClassification`], which decides how it affects the
//! enclosing case's result record: recorded as a failure, recorded as a
//! skip, and/or suppressing the body invocation.

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::location::SourceLocation;

/// The error type test phases return.
///
/// Ordinary failures are [`TestError::Raised`]; requesting that the
/// current case be skipped is [`TestError::Skip`] (usually via the
/// [`skip!`](crate::skip) macro). [`TestError::UnwrapFailure`] is the
/// internal sentinel produced by [`check_unwrap!`](crate::check_unwrap)
/// after the failure has already been recorded, so the engine will not
/// record it a second time.
#[derive(Debug, Clone, Error)]
pub enum TestError {
    #[error("{description}")]
    Raised { description: String },
    #[error("{0}")]
    Skip(SkipInfo),
    #[error("error while unwrapping value")]
    UnwrapFailure,
}

impl TestError {
    pub fn raised(description: impl Into<String>) -> Self {
        Self::Raised {
            description: description.into(),
        }
    }

    /// Wraps an arbitrary error value, preserving its debug rendering as
    /// the failure description.
    pub fn from_error<E: fmt::Debug>(error: E) -> Self {
        Self::raised(format!("{error:?}"))
    }

    pub fn skip(message: Option<String>, location: SourceLocation) -> Self {
        Self::Skip(SkipInfo { message, location })
    }

    pub fn classification(&self) -> ErrorClassification {
        match self {
            Self::Raised { .. } => ErrorClassification::default(),
            Self::Skip(_) => ErrorClassification {
                record_as_failure: false,
                skip_invocation: true,
                record_as_skip: true,
            },
            Self::UnwrapFailure => ErrorClassification {
                record_as_failure: false,
                skip_invocation: true,
                record_as_skip: false,
            },
        }
    }
}

/// How a caught error affects the enclosing case's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassification {
    /// Record a failure on the case's result record.
    pub record_as_failure: bool,
    /// When thrown from a pre-body phase, suppress the body invocation.
    pub skip_invocation: bool,
    /// Record a skip instead of running the body.
    pub record_as_skip: bool,
}

impl Default for ErrorClassification {
    fn default() -> Self {
        Self {
            record_as_failure: true,
            skip_invocation: true,
            record_as_skip: false,
        }
    }
}

/// Payload of a skip request: an optional reason and where it was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipInfo {
    pub message: Option<String>,
    pub location: SourceLocation,
}

impl SkipInfo {
    /// One-line summary used for the skip record and the reporter line.
    pub fn summary(&self) -> String {
        match &self.message {
            Some(message) => format!("Test skipped - {message}"),
            None => "Test skipped".to_string(),
        }
    }
}

impl fmt::Display for SkipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Skips the current test: `skip!()` or `skip!("reason {}", detail)`.
///
/// Expands to an early `return` with a skip error, so it is only usable
/// in phases returning `Result<(), TestError>`.
#[macro_export]
macro_rules! skip {
    () => {
        return Err($crate::errors::TestError::skip(None, $crate::here!()))
    };
    ($($msg:tt)+) => {
        return Err($crate::errors::TestError::skip(
            Some(format!($($msg)+)),
            $crate::here!(),
        ))
    };
}

// ============================================================================
// CLI-surface errors
// ============================================================================

/// Errors surfaced by the driver and listing commands.
#[derive(Debug, Error, Diagnostic)]
pub enum UsageError {
    #[error("malformed selector '{selector}'")]
    #[diagnostic(
        code(attest::cli::malformed_selector),
        help("selectors are `ClassName` or `ClassName/methodName`")
    )]
    MalformedSelector { selector: String },

    #[error("failed to render the test listing")]
    #[diagnostic(code(attest::cli::listing))]
    ListingRender(#[source] serde_json::Error),
}

/// Prints a [`UsageError`] with full miette diagnostics to stderr.
pub fn print_error(error: UsageError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}
