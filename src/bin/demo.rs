//! Functional demo target for the harness.
//!
//! Registers a few sample classes — passing, deliberately failing, and
//! skipping — so the driver's selector, listing, and exit-code behavior
//! can be exercised end to end.

use std::thread;
use std::time::Duration;

use attest::{
    check, check_eq, check_eq_accuracy, check_some, check_unwrap, expectation, skip, wait_for,
    Registration, TestClass, TestError, WaitResult,
};

struct ArithmeticTests;

impl TestClass for ArithmeticTests {
    fn class_name() -> &'static str {
        "ArithmeticTests"
    }

    fn new() -> Self {
        ArithmeticTests
    }
}

impl ArithmeticTests {
    fn test_addition(&mut self) -> Result<(), TestError> {
        check_eq!(2 + 2, 4);
        Ok(())
    }

    fn test_division(&mut self) -> Result<(), TestError> {
        check_eq_accuracy!(10.0 / 3.0, 3.333, 0.001);
        Ok(())
    }

    fn test_unwrap(&mut self) -> Result<(), TestError> {
        let halved = check_unwrap!(20u32.checked_div(2))?;
        check_eq!(halved, 10);
        Ok(())
    }
}

struct CollectionTests {
    items: Vec<&'static str>,
}

impl TestClass for CollectionTests {
    fn class_name() -> &'static str {
        "CollectionTests"
    }

    fn new() -> Self {
        CollectionTests { items: Vec::new() }
    }

    fn set_up(&mut self) {
        self.items = vec!["ant", "bee"];
    }
}

impl CollectionTests {
    fn test_lookup(&mut self) -> Result<(), TestError> {
        check_some!(self.items.first());
        check!(self.items.contains(&"bee"));
        Ok(())
    }

    fn test_async_growth(&mut self) -> Result<(), TestError> {
        let grown = expectation!("items grown on another thread");
        let handle = {
            let grown = grown.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                grown.fulfill();
            })
        };
        let result = wait_for!(&[&grown], Duration::from_secs(1));
        check_eq!(result, WaitResult::Completed);
        handle.join().map_err(|_| TestError::raised("worker panicked"))?;
        Ok(())
    }
}

struct FailureDemoTests;

impl TestClass for FailureDemoTests {
    fn class_name() -> &'static str {
        "FailureDemoTests"
    }

    fn new() -> Self {
        FailureDemoTests
    }
}

impl FailureDemoTests {
    /// Deliberately fails to demonstrate failure reporting.
    fn test_deliberate_failure(&mut self) -> Result<(), TestError> {
        check_eq!(1, 2, "this failure is intentional");
        Ok(())
    }
}

struct SkipDemoTests;

impl TestClass for SkipDemoTests {
    fn class_name() -> &'static str {
        "SkipDemoTests"
    }

    fn new() -> Self {
        SkipDemoTests
    }

    fn set_up_checked(&mut self) -> Result<(), TestError> {
        skip!("demo environment never has the fixture service");
    }
}

impl SkipDemoTests {
    fn test_never_runs(&mut self) -> Result<(), TestError> {
        check!(false, "unreachable: the class skips in set_up_checked");
        Ok(())
    }
}

fn main() {
    let registration = Registration::new("attest-demo")
        .class::<ArithmeticTests>(&[
            ("test_addition", ArithmeticTests::test_addition),
            ("test_division", ArithmeticTests::test_division),
            ("test_unwrap", ArithmeticTests::test_unwrap),
        ])
        .class::<CollectionTests>(&[
            ("test_lookup", CollectionTests::test_lookup),
            ("test_async_growth", CollectionTests::test_async_growth),
        ])
        .class::<FailureDemoTests>(&[(
            "test_deliberate_failure",
            FailureDemoTests::test_deliberate_failure,
        )])
        .class::<SkipDemoTests>(&[("test_never_runs", SkipDemoTests::test_never_runs)]);

    attest::cli::run(registration);
}
