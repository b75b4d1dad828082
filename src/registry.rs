//! Declarative registration of test classes, name filtering, and
//! root-suite assembly.

use std::rc::Rc;

use tracing::warn;

use crate::errors::{TestError, UsageError};
use crate::tree::{Case, CaseInvocation, ClassHooks, Suite, TestEntity};

/// A test class: a type holding per-case state, constructed fresh for
/// every case, with instance-level and class-level lifecycle hooks.
/// All hooks have empty defaults.
pub trait TestClass: Sized + 'static {
    fn class_name() -> &'static str;
    fn new() -> Self;

    /// Class-level set-up, run once before the first case of the class.
    fn set_up_class() {}
    /// Class-level tear-down, run once after the last case of the class.
    fn tear_down_class() {}

    /// Throwing instance-level set-up, run before the non-throwing one.
    fn set_up_checked(&mut self) -> Result<(), TestError> {
        Ok(())
    }
    fn set_up(&mut self) {}
    fn tear_down(&mut self) {}
    /// Throwing instance-level tear-down, run after the non-throwing one.
    fn tear_down_checked(&mut self) -> Result<(), TestError> {
        Ok(())
    }
}

/// A test method: a function over the case instance.
pub type TestMethod<T> = fn(&mut T) -> Result<(), TestError>;

/// Binds a fresh instance of a test class to one of its methods.
struct MethodInvocation<T: TestClass> {
    instance: T,
    method: TestMethod<T>,
}

impl<T: TestClass> CaseInvocation for MethodInvocation<T> {
    fn set_up_checked(&mut self) -> Result<(), TestError> {
        self.instance.set_up_checked()
    }

    fn set_up(&mut self) {
        self.instance.set_up();
    }

    fn invoke(&mut self) -> Result<(), TestError> {
        (self.method)(&mut self.instance)
    }

    fn tear_down(&mut self) {
        self.instance.tear_down();
    }

    fn tear_down_checked(&mut self) -> Result<(), TestError> {
        self.instance.tear_down_checked()
    }
}

#[derive(Clone)]
pub(crate) struct MethodRegistration {
    pub(crate) name: String,
    pub(crate) factory: Rc<dyn Fn() -> Box<dyn CaseInvocation>>,
}

#[derive(Clone)]
pub(crate) struct ClassRegistration {
    pub(crate) name: String,
    pub(crate) set_up_class: Rc<dyn Fn()>,
    pub(crate) tear_down_class: Rc<dyn Fn()>,
    pub(crate) methods: Vec<MethodRegistration>,
}

/// An ordered bundle of test classes and their methods, built with the
/// [`class`](Registration::class) builder.
#[derive(Clone)]
pub struct Registration {
    bundle_name: String,
    classes: Vec<ClassRegistration>,
}

impl Registration {
    pub fn new(bundle_name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            classes: Vec::new(),
        }
    }

    /// Registers a class and its methods, preserving order.
    pub fn class<T: TestClass>(mut self, methods: &[(&str, TestMethod<T>)]) -> Self {
        let methods = methods
            .iter()
            .map(|(name, method)| {
                let method = *method;
                MethodRegistration {
                    name: (*name).to_string(),
                    factory: Rc::new(move || {
                        Box::new(MethodInvocation {
                            instance: T::new(),
                            method,
                        })
                    }),
                }
            })
            .collect();
        self.classes.push(ClassRegistration {
            name: T::class_name().to_string(),
            set_up_class: Rc::new(T::set_up_class),
            tear_down_class: Rc::new(T::tear_down_class),
            methods,
        });
        self
    }

    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    pub fn case_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }

    /// Applies a filter, keeping registration order and dropping classes
    /// whose method list becomes empty. Idempotent.
    pub fn filtered(&self, filter: &TestFilter) -> Registration {
        let classes = self
            .classes
            .iter()
            .filter_map(|class| {
                let methods: Vec<MethodRegistration> = class
                    .methods
                    .iter()
                    .filter(|method| filter.includes(&class.name, &method.name))
                    .cloned()
                    .collect();
                if methods.is_empty() {
                    None
                } else {
                    Some(ClassRegistration {
                        name: class.name.clone(),
                        set_up_class: class.set_up_class.clone(),
                        tear_down_class: class.tear_down_class.clone(),
                        methods,
                    })
                }
            })
            .collect();
        Registration {
            bundle_name: self.bundle_name.clone(),
            classes,
        }
    }

    pub(crate) fn classes(&self) -> &[ClassRegistration] {
        &self.classes
    }
}

// ============================================================================
// Selectors and filtering
// ============================================================================

/// `ClassName` or `ClassName/methodName`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub class: String,
    pub method: Option<String>,
}

impl Selector {
    /// Parses `Identifier ('/' Identifier)?`. More than one `/`, or an
    /// empty segment, is malformed.
    pub fn parse(text: &str) -> Result<Selector, UsageError> {
        let malformed = || UsageError::MalformedSelector {
            selector: text.to_string(),
        };
        let mut segments = text.split('/');
        let class = segments.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        let method = match segments.next() {
            Some(segment) if segment.is_empty() => return Err(malformed()),
            Some(segment) => Some(segment.to_string()),
            None => None,
        };
        if segments.next().is_some() {
            return Err(malformed());
        }
        Ok(Selector {
            class: class.to_string(),
            method,
        })
    }
}

/// Which registered cases a run includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFilter {
    All,
    Selected(Vec<Selector>),
}

impl TestFilter {
    /// Builds a filter from raw selector strings. Malformed selectors
    /// are discarded with a warning; no strings at all means run
    /// everything.
    pub fn from_selectors(raw: &[String]) -> TestFilter {
        if raw.is_empty() {
            return TestFilter::All;
        }
        let selectors = raw
            .iter()
            .filter_map(|text| match Selector::parse(text) {
                Ok(selector) => Some(selector),
                Err(error) => {
                    warn!(selector = %text, "discarding selector: {error}");
                    None
                }
            })
            .collect();
        TestFilter::Selected(selectors)
    }

    /// A case is included iff the selector set contains its class, or
    /// its exact class/method pair.
    pub fn includes(&self, class: &str, method: &str) -> bool {
        match self {
            TestFilter::All => true,
            TestFilter::Selected(selectors) => selectors.iter().any(|selector| {
                selector.class == class
                    && selector
                        .method
                        .as_deref()
                        .map_or(true, |selected| selected == method)
            }),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, TestFilter::All)
    }
}

// ============================================================================
// Root-suite assembly
// ============================================================================

/// Builds the executable tree for a registration under a filter.
///
/// Without selectors the root is `All tests` containing one bundle-named
/// suite containing one suite per class; with selectors the root is
/// `Selected tests` containing the class suites directly.
pub fn build_root_suite(registration: &Registration, filter: &TestFilter) -> Suite {
    let filtered = registration.filtered(filter);
    let class_suites = filtered.classes().iter().map(class_suite);

    if filter.is_all() {
        let mut bundle = Suite::new(registration.bundle_name());
        for suite in class_suites {
            bundle.push(suite);
        }
        let mut root = Suite::new("All tests");
        root.push(TestEntity::Suite(bundle));
        root
    } else {
        let mut root = Suite::new("Selected tests");
        for suite in class_suites {
            root.push(suite);
        }
        root
    }
}

fn class_suite(class: &ClassRegistration) -> TestEntity {
    let mut suite = Suite::with_class_hooks(
        class.name.as_str(),
        ClassHooks {
            set_up: class.set_up_class.clone(),
            tear_down: class.tear_down_class.clone(),
        },
    );
    for method in &class.methods {
        suite.push(TestEntity::Case(Case::new(
            class.name.as_str(),
            method.name.as_str(),
            method.factory.clone(),
        )));
    }
    TestEntity::Suite(suite)
}
