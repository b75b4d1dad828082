//! Predicate-style assertions.
//!
//! Every assertion is a thin adapter over [`evaluate`]: run a predicate,
//! classify the outcome, and route any failure to the currently running
//! case's record. With no case active the failure is silently dropped,
//! so these helpers stay safely callable from library diagnostics.
//!
//! Assertions do not unwind; a failing check records and returns. The
//! one exception is [`assert_unwrap`], which hands back a sentinel error
//! (already recorded) so the body can abort with `?`.

use std::fmt::Debug;

use crate::context::with_current_case;
use crate::errors::TestError;
use crate::location::SourceLocation;

/// Outcome of an assertion predicate.
pub enum AssertionOutcome {
    Success,
    /// The asserted condition did not hold; the detail explains how.
    ExpectedFailure(Option<String>),
    /// The predicate itself threw.
    UnexpectedFailure(TestError),
}

/// The single evaluator behind every assertion. `name` is the assertion
/// macro's name as it appears in failure descriptions.
pub fn evaluate(
    name: &str,
    location: SourceLocation,
    message: &str,
    predicate: impl FnOnce() -> Result<AssertionOutcome, TestError>,
) {
    let outcome = match predicate() {
        Ok(outcome) => outcome,
        Err(error) => AssertionOutcome::UnexpectedFailure(error),
    };
    let (explanation, expected) = match outcome {
        AssertionOutcome::Success => return,
        AssertionOutcome::ExpectedFailure(Some(detail)) => (format!("failed: {detail}"), true),
        AssertionOutcome::ExpectedFailure(None) => ("failed".to_string(), true),
        AssertionOutcome::UnexpectedFailure(error) => {
            (format!("failed: threw error \"{error}\""), false)
        }
    };
    let mut description = format!("{name} {explanation}");
    if !message.is_empty() {
        description.push_str(" - ");
        description.push_str(message);
    }
    let _ = with_current_case(|case| case.record_failure(description.clone(), Some(location), expected));
}

// ============================================================================
// Assertion family
// ============================================================================

pub fn assert_true(condition: bool, message: &str, location: SourceLocation) {
    evaluate("check", location, message, || {
        Ok(if condition {
            AssertionOutcome::Success
        } else {
            AssertionOutcome::ExpectedFailure(None)
        })
    });
}

pub fn assert_false(condition: bool, message: &str, location: SourceLocation) {
    evaluate("check_false", location, message, || {
        Ok(if condition {
            AssertionOutcome::ExpectedFailure(None)
        } else {
            AssertionOutcome::Success
        })
    });
}

pub fn assert_equal<T: PartialEq + Debug>(
    lhs: &T,
    rhs: &T,
    message: &str,
    location: SourceLocation,
) {
    evaluate("check_eq", location, message, || {
        Ok(if lhs == rhs {
            AssertionOutcome::Success
        } else {
            AssertionOutcome::ExpectedFailure(Some(format!(
                "(\"{lhs:?}\") is not equal to (\"{rhs:?}\")"
            )))
        })
    });
}

pub fn assert_not_equal<T: PartialEq + Debug>(
    lhs: &T,
    rhs: &T,
    message: &str,
    location: SourceLocation,
) {
    evaluate("check_ne", location, message, || {
        Ok(if lhs != rhs {
            AssertionOutcome::Success
        } else {
            AssertionOutcome::ExpectedFailure(Some(format!(
                "(\"{lhs:?}\") is equal to (\"{rhs:?}\")"
            )))
        })
    });
}

/// Numbers comparable within an absolute accuracy. Exact equality is
/// tested first so infinities and self-equality hold regardless of the
/// accuracy arithmetic.
pub trait AccuracyComparable: Copy + PartialEq + Debug {
    fn within(self, other: Self, accuracy: Self) -> bool;
}

macro_rules! impl_accuracy_float {
    ($($ty:ty),*) => {$(
        impl AccuracyComparable for $ty {
            fn within(self, other: Self, accuracy: Self) -> bool {
                (self - other).abs() <= accuracy
            }
        }
    )*};
}

macro_rules! impl_accuracy_int {
    ($($ty:ty),*) => {$(
        impl AccuracyComparable for $ty {
            fn within(self, other: Self, accuracy: Self) -> bool {
                self.abs_diff(other) <= accuracy.unsigned_abs()
            }
        }
    )*};
}

macro_rules! impl_accuracy_uint {
    ($($ty:ty),*) => {$(
        impl AccuracyComparable for $ty {
            fn within(self, other: Self, accuracy: Self) -> bool {
                self.abs_diff(other) <= accuracy
            }
        }
    )*};
}

impl_accuracy_float!(f32, f64);
impl_accuracy_int!(i32, i64);
impl_accuracy_uint!(u32, u64);

pub fn assert_equal_with_accuracy<T: AccuracyComparable>(
    lhs: T,
    rhs: T,
    accuracy: T,
    message: &str,
    location: SourceLocation,
) {
    evaluate("check_eq_accuracy", location, message, || {
        Ok(if lhs == rhs || lhs.within(rhs, accuracy) {
            AssertionOutcome::Success
        } else {
            AssertionOutcome::ExpectedFailure(Some(format!(
                "(\"{lhs:?}\") is not equal to (\"{rhs:?}\") +/- (\"{accuracy:?}\")"
            )))
        })
    });
}

macro_rules! comparison_assertion {
    ($fn_name:ident, $name:literal, $op:tt, $explain:literal) => {
        pub fn $fn_name<T: PartialOrd + Debug>(
            lhs: &T,
            rhs: &T,
            message: &str,
            location: SourceLocation,
        ) {
            evaluate($name, location, message, || {
                Ok(if lhs $op rhs {
                    AssertionOutcome::Success
                } else {
                    AssertionOutcome::ExpectedFailure(Some(format!(
                        concat!("(\"{:?}\") ", $explain, " (\"{:?}\")"),
                        lhs, rhs
                    )))
                })
            });
        }
    };
}

comparison_assertion!(assert_greater_than, "check_gt", >, "is not greater than");
comparison_assertion!(assert_greater_than_or_equal, "check_ge", >=, "is less than");
comparison_assertion!(assert_less_than, "check_lt", <, "is not less than");
comparison_assertion!(assert_less_than_or_equal, "check_le", <=, "is greater than");

pub fn assert_some<T: Debug>(value: &Option<T>, message: &str, location: SourceLocation) {
    evaluate("check_some", location, message, || {
        Ok(if value.is_some() {
            AssertionOutcome::Success
        } else {
            AssertionOutcome::ExpectedFailure(Some("found nil".to_string()))
        })
    });
}

pub fn assert_none<T: Debug>(value: &Option<T>, message: &str, location: SourceLocation) {
    evaluate("check_none", location, message, || {
        Ok(match value {
            None => AssertionOutcome::Success,
            Some(inner) => AssertionOutcome::ExpectedFailure(Some(format!(
                "(\"{inner:?}\") is not nil"
            ))),
        })
    });
}

/// Unwraps an optional value or records a failure and returns the
/// sentinel error, which the engine will not record a second time.
pub fn assert_unwrap<T>(
    value: Option<T>,
    message: &str,
    location: SourceLocation,
) -> Result<T, TestError> {
    match value {
        Some(inner) => Ok(inner),
        None => {
            evaluate("check_unwrap", location, message, || {
                Ok(AssertionOutcome::ExpectedFailure(Some(
                    "found nil when unwrapping value".to_string(),
                )))
            });
            Err(TestError::UnwrapFailure)
        }
    }
}

pub fn assert_throws<T: Debug, E>(
    result: &Result<T, E>,
    message: &str,
    location: SourceLocation,
) {
    evaluate("check_throws", location, message, || {
        Ok(match result {
            Err(_) => AssertionOutcome::Success,
            Ok(_) => AssertionOutcome::ExpectedFailure(Some("did not throw an error".to_string())),
        })
    });
}

pub fn assert_no_throw<T, E: std::fmt::Display>(
    result: &Result<T, E>,
    message: &str,
    location: SourceLocation,
) {
    evaluate("check_no_throw", location, message, || {
        Ok(match result {
            Ok(_) => AssertionOutcome::Success,
            Err(error) => AssertionOutcome::ExpectedFailure(Some(format!(
                "threw error \"{error}\""
            ))),
        })
    });
}

pub fn record_unconditional_failure(message: &str, location: SourceLocation) {
    evaluate("fail", location, message, || {
        Ok(AssertionOutcome::ExpectedFailure(None))
    });
}

// ============================================================================
// Macros: capture the call site and forward to the functions above.
// ============================================================================

/// Asserts a condition holds: `check!(cond)` or `check!(cond, "why {}", x)`.
#[macro_export]
macro_rules! check {
    ($condition:expr $(,)?) => {
        $crate::assertions::assert_true($condition, "", $crate::here!())
    };
    ($condition:expr, $($msg:tt)+) => {
        $crate::assertions::assert_true($condition, &format!($($msg)+), $crate::here!())
    };
}

/// Asserts a condition does not hold.
#[macro_export]
macro_rules! check_false {
    ($condition:expr $(,)?) => {
        $crate::assertions::assert_false($condition, "", $crate::here!())
    };
    ($condition:expr, $($msg:tt)+) => {
        $crate::assertions::assert_false($condition, &format!($($msg)+), $crate::here!())
    };
}

/// Asserts two values compare equal.
#[macro_export]
macro_rules! check_eq {
    ($lhs:expr, $rhs:expr $(,)?) => {
        $crate::assertions::assert_equal(&$lhs, &$rhs, "", $crate::here!())
    };
    ($lhs:expr, $rhs:expr, $($msg:tt)+) => {
        $crate::assertions::assert_equal(&$lhs, &$rhs, &format!($($msg)+), $crate::here!())
    };
}

/// Asserts two values compare unequal.
#[macro_export]
macro_rules! check_ne {
    ($lhs:expr, $rhs:expr $(,)?) => {
        $crate::assertions::assert_not_equal(&$lhs, &$rhs, "", $crate::here!())
    };
    ($lhs:expr, $rhs:expr, $($msg:tt)+) => {
        $crate::assertions::assert_not_equal(&$lhs, &$rhs, &format!($($msg)+), $crate::here!())
    };
}

/// Asserts two numbers are equal within an absolute accuracy.
#[macro_export]
macro_rules! check_eq_accuracy {
    ($lhs:expr, $rhs:expr, $accuracy:expr $(,)?) => {
        $crate::assertions::assert_equal_with_accuracy($lhs, $rhs, $accuracy, "", $crate::here!())
    };
    ($lhs:expr, $rhs:expr, $accuracy:expr, $($msg:tt)+) => {
        $crate::assertions::assert_equal_with_accuracy(
            $lhs,
            $rhs,
            $accuracy,
            &format!($($msg)+),
            $crate::here!(),
        )
    };
}

#[macro_export]
macro_rules! check_gt {
    ($lhs:expr, $rhs:expr $(,)?) => {
        $crate::assertions::assert_greater_than(&$lhs, &$rhs, "", $crate::here!())
    };
    ($lhs:expr, $rhs:expr, $($msg:tt)+) => {
        $crate::assertions::assert_greater_than(&$lhs, &$rhs, &format!($($msg)+), $crate::here!())
    };
}

#[macro_export]
macro_rules! check_ge {
    ($lhs:expr, $rhs:expr $(,)?) => {
        $crate::assertions::assert_greater_than_or_equal(&$lhs, &$rhs, "", $crate::here!())
    };
    ($lhs:expr, $rhs:expr, $($msg:tt)+) => {
        $crate::assertions::assert_greater_than_or_equal(
            &$lhs,
            &$rhs,
            &format!($($msg)+),
            $crate::here!(),
        )
    };
}

#[macro_export]
macro_rules! check_lt {
    ($lhs:expr, $rhs:expr $(,)?) => {
        $crate::assertions::assert_less_than(&$lhs, &$rhs, "", $crate::here!())
    };
    ($lhs:expr, $rhs:expr, $($msg:tt)+) => {
        $crate::assertions::assert_less_than(&$lhs, &$rhs, &format!($($msg)+), $crate::here!())
    };
}

#[macro_export]
macro_rules! check_le {
    ($lhs:expr, $rhs:expr $(,)?) => {
        $crate::assertions::assert_less_than_or_equal(&$lhs, &$rhs, "", $crate::here!())
    };
    ($lhs:expr, $rhs:expr, $($msg:tt)+) => {
        $crate::assertions::assert_less_than_or_equal(
            &$lhs,
            &$rhs,
            &format!($($msg)+),
            $crate::here!(),
        )
    };
}

/// Asserts an `Option` is `Some`.
#[macro_export]
macro_rules! check_some {
    ($value:expr $(,)?) => {
        $crate::assertions::assert_some(&$value, "", $crate::here!())
    };
    ($value:expr, $($msg:tt)+) => {
        $crate::assertions::assert_some(&$value, &format!($($msg)+), $crate::here!())
    };
}

/// Asserts an `Option` is `None`.
#[macro_export]
macro_rules! check_none {
    ($value:expr $(,)?) => {
        $crate::assertions::assert_none(&$value, "", $crate::here!())
    };
    ($value:expr, $($msg:tt)+) => {
        $crate::assertions::assert_none(&$value, &format!($($msg)+), $crate::here!())
    };
}

/// Unwraps an `Option` or fails the test; pairs with `?`:
/// `let value = check_unwrap!(maybe)?;`
#[macro_export]
macro_rules! check_unwrap {
    ($value:expr $(,)?) => {
        $crate::assertions::assert_unwrap($value, "", $crate::here!())
    };
    ($value:expr, $($msg:tt)+) => {
        $crate::assertions::assert_unwrap($value, &format!($($msg)+), $crate::here!())
    };
}

/// Asserts a `Result` is `Err`.
#[macro_export]
macro_rules! check_throws {
    ($result:expr $(,)?) => {
        $crate::assertions::assert_throws(&$result, "", $crate::here!())
    };
    ($result:expr, $($msg:tt)+) => {
        $crate::assertions::assert_throws(&$result, &format!($($msg)+), $crate::here!())
    };
}

/// Asserts a `Result` is `Ok`.
#[macro_export]
macro_rules! check_no_throw {
    ($result:expr $(,)?) => {
        $crate::assertions::assert_no_throw(&$result, "", $crate::here!())
    };
    ($result:expr, $($msg:tt)+) => {
        $crate::assertions::assert_no_throw(&$result, &format!($($msg)+), $crate::here!())
    };
}

/// Records an unconditional failure.
#[macro_export]
macro_rules! fail {
    () => {
        $crate::assertions::record_unconditional_failure("", $crate::here!())
    };
    ($($msg:tt)+) => {
        $crate::assertions::record_unconditional_failure(&format!($($msg)+), $crate::here!())
    };
}
