use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use sg_core::{CodeVersion, FailureKind};

use crate::context::CorrectionContext;
use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub elapsed: f64,
    pub delta: f64,
}

pub type FrameCallback = Box<dyn FnMut(&FrameState) -> Result<(), RenderError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Ran(usize),
    Suppressed,
    Failed,
}

/// Runs registered per-frame callbacks. The first failure is reported and
/// every later tick for that code version is skipped.
pub struct FrameLoop {
    context: Rc<CorrectionContext>,
    callbacks: Vec<FrameCallback>,
    registered_for: CodeVersion,
    suppressed_for: Option<CodeVersion>,
    elapsed: f64,
}

impl FrameLoop {
    pub fn new(context: Rc<CorrectionContext>) -> Self {
        let registered_for = context.version();
        Self {
            context,
            callbacks: Vec::new(),
            registered_for,
            suppressed_for: None,
            elapsed: 0.0,
        }
    }

    /// Callbacks belong to the version active when they were registered; a
    /// newer version drops them.
    pub fn register(&mut self, callback: FrameCallback) {
        self.sync_version();
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed_for == Some(self.context.version())
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn tick(&mut self, delta: f64) -> FrameOutcome {
        self.sync_version();
        if self.is_suppressed() {
            return FrameOutcome::Suppressed;
        }
        self.elapsed += delta;
        let state = FrameState {
            elapsed: self.elapsed,
            delta,
        };
        for (index, callback) in self.callbacks.iter_mut().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(&state)))
                .unwrap_or_else(|payload| Err(RenderError::from_panic(payload)));
            if let Err(error) = outcome {
                self.context.report(
                    FailureKind::PerFrame,
                    &format!("frame callback #{}: {}", index, error.message),
                    &error,
                );
                self.suppressed_for = Some(self.context.version());
                return FrameOutcome::Failed;
            }
        }
        FrameOutcome::Ran(self.callbacks.len())
    }

    fn sync_version(&mut self) {
        let version = self.context.version();
        if self.registered_for != version {
            self.callbacks.clear();
            self.registered_for = version;
            self.elapsed = 0.0;
        }
    }
}
