//! Explicit load-time context.
//!
//! A [`Context`] is created once by the caller and handed to both the loader and
//! the base evaluator, so limits are configured in one place instead of living in
//! process-wide state.

/// Default limit on nested function activations.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 4096;

/// Default limit on the number of locals a single function may use.
pub const DEFAULT_MAX_LOCALS: usize = 1 << 16;

/// Settings shared by program loading and evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    max_stack_depth: usize,
    max_locals: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            max_locals: DEFAULT_MAX_LOCALS,
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum call depth the evaluator accepts before faulting.
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Sets the maximum number of locals per function accepted by the loader.
    pub fn with_max_locals(mut self, locals: usize) -> Self {
        self.max_locals = locals;
        self
    }

    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    pub fn max_locals(&self) -> usize {
        self.max_locals
    }
}
