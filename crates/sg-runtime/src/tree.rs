use std::collections::BTreeMap;
use std::rc::Rc;

use sg_core::{CodeVersion, SgValue};

use crate::boundary::{RenderBoundary, RenderOutcome};
use crate::context::{CorrectionContext, FailureSink};
use crate::element::{Element, Node, Props};
use crate::error::RenderError;
use crate::factory::{ElementFactory, InterceptingFactory};
use crate::frame::{FrameCallback, FrameLoop, FrameOutcome};

/// Executable form of a unit's component.
pub trait RenderUnit {
    fn render(&self, scope: &mut RenderScope<'_>) -> Result<Option<Element>, RenderError>;
}

impl<T> RenderUnit for T
where
    T: Fn(&mut RenderScope<'_>) -> Result<Option<Element>, RenderError>,
{
    fn render(&self, scope: &mut RenderScope<'_>) -> Result<Option<Element>, RenderError> {
        self(scope)
    }
}

/// What unit code can reach while rendering: the intercepted element factory,
/// the per-frame registration hook and the current parameter values.
pub struct RenderScope<'a> {
    factory: &'a dyn ElementFactory,
    frames: &'a mut FrameLoop,
    params: &'a BTreeMap<String, SgValue>,
}

impl RenderScope<'_> {
    pub fn create_element(
        &self,
        element_type: &str,
        props: Props,
        children: Vec<Node>,
    ) -> Result<Element, RenderError> {
        self.factory.create_element(element_type, props, children)
    }

    pub fn use_frame(&mut self, callback: FrameCallback) {
        self.frames.register(callback);
    }

    pub fn param(&self, name: &str) -> Option<&SgValue> {
        self.params.get(name)
    }
}

/// One render tree: its correction context, intercepted factory, render
/// boundary and frame loop.
pub struct RenderTree<F: ElementFactory> {
    context: Rc<CorrectionContext>,
    factory: InterceptingFactory<F>,
    boundary: RenderBoundary,
    frames: FrameLoop,
    params: BTreeMap<String, SgValue>,
}

impl<F: ElementFactory> RenderTree<F> {
    pub fn new(inner: F, sink: Rc<dyn FailureSink>, fallback_message_chars: usize) -> Self {
        let context = Rc::new(CorrectionContext::new(sink));
        Self {
            factory: InterceptingFactory::new(inner, Rc::clone(&context)),
            boundary: RenderBoundary::new(Rc::clone(&context), fallback_message_chars),
            frames: FrameLoop::new(Rc::clone(&context)),
            context,
            params: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> &Rc<CorrectionContext> {
        &self.context
    }

    pub fn adopt_version(&mut self, version: CodeVersion, static_warnings: Vec<String>) {
        self.context.adopt_version(version, static_warnings);
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: SgValue) {
        self.params.insert(name.into(), value);
    }

    /// Renders the unit inside the boundary. Frame callbacks registered by a
    /// previous render of the same version are replaced.
    pub fn render(&mut self, unit: &dyn RenderUnit) -> RenderOutcome {
        let factory = &self.factory;
        let frames = &mut self.frames;
        let params = &self.params;
        self.boundary.render(|| {
            frames.clear();
            let mut scope = RenderScope {
                factory,
                frames,
                params,
            };
            unit.render(&mut scope)
        })
    }

    pub fn tick(&mut self, delta: f64) -> FrameOutcome {
        if self.boundary.has_failed() {
            return FrameOutcome::Suppressed;
        }
        self.frames.tick(delta)
    }

    pub fn fallback_visible(&self) -> bool {
        self.boundary.has_failed()
    }
}

#[cfg(test)]
mod tree_tests {
    use super::*;
    use crate::context::CollectingSink;
    use crate::element::{Handler, PropValue};
    use crate::factory::DeclarativeFactory;
    use sg_core::FailureKind;

    fn tree() -> (Rc<CollectingSink>, RenderTree<DeclarativeFactory>) {
        let sink = Rc::new(CollectingSink::new());
        let mut tree = RenderTree::new(DeclarativeFactory, sink.clone(), 120);
        tree.adopt_version(CodeVersion(1), Vec::new());
        (sink, tree)
    }

    fn spinning_box(scope: &mut RenderScope<'_>) -> Result<Option<Element>, RenderError> {
        let speed = scope.param("speed").and_then(SgValue::as_number).unwrap_or(1.0);
        scope.use_frame(Box::new(move |state| {
            if state.elapsed * speed > 1.0 {
                return Err(RenderError::new("rotation overflow"));
            }
            Ok(())
        }));
        let mut props = Props::new();
        props.insert(
            "onClick".to_string(),
            PropValue::Handler(Handler::new(|_| Err(RenderError::new("setCount is not a function")))),
        );
        scope.create_element("mesh", props, Vec::new()).map(Some)
    }

    #[test]
    fn renders_through_interception_and_routes_all_tiers_to_one_sink() {
        let (sink, mut tree) = tree();
        tree.set_param("speed", SgValue::from(2.0));
        let outcome = tree.render(&spinning_box);
        assert!(!outcome.is_fallback());
        let mesh = outcome.element();
        assert!(mesh.prop("frustumCulled").is_some());

        mesh.handler("onClick")
            .expect("click handler")
            .call(&SgValue::Null)
            .expect("handler failures are contained");
        assert_eq!(tree.tick(0.25), FrameOutcome::Ran(1));
        assert_eq!(tree.tick(0.5), FrameOutcome::Failed);
        assert_eq!(tree.tick(0.5), FrameOutcome::Suppressed);

        let kinds: Vec<FailureKind> = sink.take().into_iter().map(|report| report.kind).collect();
        assert_eq!(kinds, vec![FailureKind::EventHandler, FailureKind::PerFrame]);
    }

    #[test]
    fn rerender_replaces_frame_callbacks() {
        let (_, mut tree) = tree();
        tree.render(&spinning_box);
        tree.render(&spinning_box);
        assert_eq!(tree.tick(0.1), FrameOutcome::Ran(1));
    }

    #[test]
    fn failed_render_suppresses_frames_until_new_version() {
        let (sink, mut tree) = tree();
        fn broken(_: &mut RenderScope<'_>) -> Result<Option<Element>, RenderError> {
            Err(RenderError::new("THREE.Foo is not a constructor"))
        }
        assert!(tree.render(&broken).is_fallback());
        assert!(tree.fallback_visible());
        assert_eq!(tree.tick(0.1), FrameOutcome::Suppressed);
        assert_eq!(sink.len(), 1);

        tree.adopt_version(CodeVersion(2), Vec::new());
        assert!(!tree.fallback_visible());
        assert!(!tree.render(&spinning_box).is_fallback());
    }
}
