//! The hierarchical test model: a tagged tree of leaf cases and
//! composite suites.
//!
//! Shared behavior lives in the result-record types; the tree itself is
//! a plain tagged variant rather than a class hierarchy. A case does not
//! hold its test method directly — it holds a factory producing a
//! [`CaseInvocation`], the seam that erases the concrete test-class type.

use std::rc::Rc;

use crate::errors::TestError;

/// One case invocation's hooks, erased over the concrete test class.
/// The instance behind it is constructed fresh for each execution.
pub trait CaseInvocation {
    /// Throwing instance-level set-up, run first.
    fn set_up_checked(&mut self) -> Result<(), TestError>;
    /// Non-throwing instance-level set-up, run second.
    fn set_up(&mut self);
    /// The test body.
    fn invoke(&mut self) -> Result<(), TestError>;
    /// Non-throwing instance-level tear-down.
    fn tear_down(&mut self);
    /// Throwing instance-level tear-down, run last.
    fn tear_down_checked(&mut self) -> Result<(), TestError>;
}

pub type InvocationFactory = Rc<dyn Fn() -> Box<dyn CaseInvocation>>;

/// A leaf entity: one test method of one class.
pub struct Case {
    class_name: String,
    method_name: String,
    factory: InvocationFactory,
}

impl Case {
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        factory: InvocationFactory,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            factory,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn display_name(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    pub(crate) fn new_invocation(&self) -> Box<dyn CaseInvocation> {
        (self.factory)()
    }
}

/// Class-level set-up/tear-down run once around a class's cases, in the
/// owning suite's pre-body and post-body.
#[derive(Clone)]
pub struct ClassHooks {
    pub set_up: Rc<dyn Fn()>,
    pub tear_down: Rc<dyn Fn()>,
}

/// A composite entity: an ordered list of children it exclusively owns.
pub struct Suite {
    name: String,
    children: Vec<TestEntity>,
    class_hooks: Option<ClassHooks>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            class_hooks: None,
        }
    }

    pub fn with_class_hooks(name: impl Into<String>, hooks: ClassHooks) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            class_hooks: Some(hooks),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, child: TestEntity) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[TestEntity] {
        &self.children
    }

    pub(crate) fn class_hooks(&self) -> Option<&ClassHooks> {
        self.class_hooks.as_ref()
    }
}

/// A node of the test tree.
pub enum TestEntity {
    Case(Case),
    Suite(Suite),
}

impl TestEntity {
    pub fn name(&self) -> String {
        match self {
            Self::Case(case) => case.display_name(),
            Self::Suite(suite) => suite.name().to_string(),
        }
    }

    /// Number of leaf cases beneath this entity.
    pub fn case_count(&self) -> usize {
        match self {
            Self::Case(_) => 1,
            Self::Suite(suite) => suite.children().iter().map(TestEntity::case_count).sum(),
        }
    }

    /// Depth-first leaf display names, in execution order.
    pub fn leaf_names(&self) -> Vec<String> {
        match self {
            Self::Case(case) => vec![case.display_name()],
            Self::Suite(suite) => suite
                .children()
                .iter()
                .flat_map(TestEntity::leaf_names)
                .collect(),
        }
    }

    /// Executes this entity through the engine, producing its record.
    pub fn execute(&self, engine: &crate::engine::ExecutionEngine) -> crate::record::RunRecord {
        engine.run(self)
    }
}
