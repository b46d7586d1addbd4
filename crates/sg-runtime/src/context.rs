use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use sg_core::{CodeVersion, FailureKind, FailureReport};

use crate::error::RenderError;

/// Receives every contained failure of a render tree.
pub trait FailureSink {
    fn on_error(&self, report: FailureReport);
}

/// Keeps reports in memory until the host drains them.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: RefCell<Vec<FailureReport>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<FailureReport> {
        self.reports.take()
    }

    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }
}

impl FailureSink for CollectingSink {
    fn on_error(&self, report: FailureReport) {
        self.reports.borrow_mut().push(report);
    }
}

/// Failure hand-off state for one render tree: the active code version, the
/// static warnings attached to every report and the set of failures already
/// reported for that version.
pub struct CorrectionContext {
    version: Cell<CodeVersion>,
    static_warnings: RefCell<Vec<String>>,
    reported: RefCell<BTreeSet<(FailureKind, String)>>,
    sink: Rc<dyn FailureSink>,
}

impl CorrectionContext {
    pub fn new(sink: Rc<dyn FailureSink>) -> Self {
        Self {
            version: Cell::new(CodeVersion(0)),
            static_warnings: RefCell::new(Vec::new()),
            reported: RefCell::new(BTreeSet::new()),
            sink,
        }
    }

    pub fn version(&self) -> CodeVersion {
        self.version.get()
    }

    /// Switches to a new code version. Dedup state is cleared only when the
    /// version actually changes.
    pub fn adopt_version(&self, version: CodeVersion, static_warnings: Vec<String>) {
        if self.version.get() != version {
            self.version.set(version);
            self.reported.borrow_mut().clear();
        }
        *self.static_warnings.borrow_mut() = static_warnings;
    }

    /// Forwards the failure to the sink unless the same `(kind, description)`
    /// pair was already reported for the current version. Returns whether it
    /// was forwarded.
    pub fn report(&self, kind: FailureKind, description: &str, error: &RenderError) -> bool {
        let key = (kind, description.to_string());
        if !self.reported.borrow_mut().insert(key) {
            log::debug!(
                "{} failure already reported for {}: {}",
                kind.label(),
                self.version(),
                description
            );
            return false;
        }
        log::warn!(
            "contained {} failure in {}: {}{}",
            kind.label(),
            self.version(),
            error.message,
            error
                .stack
                .as_deref()
                .map(|stack| format!("\n{}", stack))
                .unwrap_or_default()
        );
        let report = FailureReport::new(kind, error.message.clone())
            .with_stack(error.stack.clone())
            .with_static_warnings(self.static_warnings.borrow().clone());
        self.sink.on_error(report);
        true
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;

    fn context() -> (Rc<CollectingSink>, CorrectionContext) {
        let sink = Rc::new(CollectingSink::new());
        let context = CorrectionContext::new(sink.clone());
        (sink, context)
    }

    #[test]
    fn reports_each_pair_once_per_version() {
        let (sink, context) = context();
        context.adopt_version(CodeVersion(1), vec!["tdz".to_string()]);
        let error = RenderError::new("boom").with_stack("at onClick");
        assert!(context.report(FailureKind::EventHandler, "onClick: boom", &error));
        assert!(!context.report(FailureKind::EventHandler, "onClick: boom", &error));
        assert!(context.report(FailureKind::PerFrame, "onClick: boom", &error));

        let reports = sink.take();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].message, "boom");
        assert_eq!(reports[0].stack.as_deref(), Some("at onClick"));
        assert_eq!(reports[0].static_warnings, vec!["tdz".to_string()]);
    }

    #[test]
    fn new_version_clears_dedup_but_same_version_does_not() {
        let (sink, context) = context();
        let error = RenderError::new("boom");
        context.adopt_version(CodeVersion(1), Vec::new());
        assert!(context.report(FailureKind::RenderPhase, "boom", &error));
        context.adopt_version(CodeVersion(1), Vec::new());
        assert!(!context.report(FailureKind::RenderPhase, "boom", &error));
        context.adopt_version(CodeVersion(2), Vec::new());
        assert!(context.report(FailureKind::RenderPhase, "boom", &error));
        assert_eq!(sink.len(), 2);
        assert_eq!(context.version(), CodeVersion(2));
    }
}
