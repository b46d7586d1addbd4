use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use sg_core::{CodeVersion, FailureKind, SgValue};

use crate::context::CorrectionContext;
use crate::element::{Element, Node, PropValue, Props};
use crate::error::RenderError;

pub const MISSING_OUTPUT_MESSAGE: &str =
    "Unit rendered no output: the component must return an element (did it forget `return`?)";

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(Element),
    Fallback(Element),
}

impl RenderOutcome {
    pub fn element(&self) -> &Element {
        match self {
            Self::Rendered(element) | Self::Fallback(element) => element,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Contains render-phase failures of one unit. Once a version fails, its
/// placeholder is shown until a different version is rendered.
pub struct RenderBoundary {
    context: Rc<CorrectionContext>,
    fallback_message_chars: usize,
    failure: Option<(CodeVersion, String)>,
}

impl RenderBoundary {
    pub fn new(context: Rc<CorrectionContext>, fallback_message_chars: usize) -> Self {
        Self {
            context,
            fallback_message_chars,
            failure: None,
        }
    }

    pub fn has_failed(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|(version, _)| *version == self.context.version())
    }

    pub fn render<R>(&mut self, render: R) -> RenderOutcome
    where
        R: FnOnce() -> Result<Option<Element>, RenderError>,
    {
        let version = self.context.version();
        match &self.failure {
            Some((failed, message)) if *failed == version => {
                return RenderOutcome::Fallback(fallback_element(
                    message,
                    self.fallback_message_chars,
                ));
            }
            Some(_) => {
                log::info!("render boundary reset for {}", version);
                self.failure = None;
            }
            None => {}
        }

        let outcome = catch_unwind(AssertUnwindSafe(render))
            .unwrap_or_else(|payload| Err(RenderError::from_panic(payload)));
        let (kind, error) = match outcome {
            Ok(Some(element)) => return RenderOutcome::Rendered(element),
            Ok(None) => (
                FailureKind::MissingOutput,
                RenderError::new(MISSING_OUTPUT_MESSAGE),
            ),
            Err(error) => (FailureKind::RenderPhase, error),
        };
        self.context.report(kind, &error.message, &error);
        let fallback = fallback_element(&error.message, self.fallback_message_chars);
        self.failure = Some((version, error.message));
        RenderOutcome::Fallback(fallback)
    }
}

/// Wireframe placeholder labelled with the (truncated) failure message.
pub fn fallback_element(message: &str, max_chars: usize) -> Element {
    let mut material = Props::new();
    material.insert("color".to_string(), PropValue::Value(SgValue::from("#ff4d4f")));
    material.insert("wireframe".to_string(), PropValue::Value(SgValue::Bool(true)));

    let mut geometry = Props::new();
    geometry.insert(
        "args".to_string(),
        PropValue::Value(SgValue::Array(vec![
            SgValue::from(1.0),
            SgValue::from(1.0),
            SgValue::from(1.0),
        ])),
    );

    let mut label = Props::new();
    label.insert("center".to_string(), PropValue::Value(SgValue::Bool(true)));

    Element::new(
        "group",
        Props::new(),
        vec![
            Node::Element(Element::new(
                "mesh",
                Props::new(),
                vec![
                    Node::Element(Element::new("boxGeometry", geometry, Vec::new())),
                    Node::Element(Element::new("meshBasicMaterial", material, Vec::new())),
                ],
            )),
            Node::Element(Element::new(
                "Html",
                label,
                vec![Node::Text(truncate_message(message, max_chars))],
            )),
        ],
    )
}

pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let kept: String = message.chars().take(max_chars).collect();
    format!("{}...", kept.trim_end())
}

#[cfg(test)]
mod boundary_tests {
    use super::*;
    use crate::context::CollectingSink;
    use std::cell::Cell;

    fn boundary() -> (Rc<CollectingSink>, Rc<CorrectionContext>, RenderBoundary) {
        let sink = Rc::new(CollectingSink::new());
        let context = Rc::new(CorrectionContext::new(sink.clone()));
        context.adopt_version(CodeVersion(1), Vec::new());
        let boundary = RenderBoundary::new(Rc::clone(&context), 12);
        (sink, context, boundary)
    }

    fn label(outcome: &RenderOutcome) -> String {
        let html = outcome
            .element()
            .child_elements()
            .find(|child| child.element_type == "Html")
            .expect("fallback label");
        match &html.children[0] {
            Node::Text(text) => text.clone(),
            other => panic!("unexpected label child {:?}", other),
        }
    }

    #[test]
    fn successful_render_passes_through() {
        let (sink, _, mut boundary) = boundary();
        let outcome =
            boundary.render(|| Ok(Some(Element::new("mesh", Props::new(), Vec::new()))));
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.element().element_type, "mesh");
        assert!(sink.is_empty());
    }

    #[test]
    fn failure_shows_truncated_fallback_until_version_changes() {
        let (sink, context, mut boundary) = boundary();
        let calls = Cell::new(0);
        let failing = || {
            calls.set(calls.get() + 1);
            Err(RenderError::new("geometry is not a constructor"))
        };
        let outcome = boundary.render(failing);
        assert!(outcome.is_fallback());
        assert_eq!(label(&outcome), "geometry is...");
        assert!(boundary.has_failed());

        let again = boundary.render(failing);
        assert!(again.is_fallback());
        assert_eq!(calls.get(), 1);
        assert_eq!(sink.len(), 1);

        context.adopt_version(CodeVersion(2), Vec::new());
        assert!(!boundary.has_failed());
        let recovered = boundary.render(|| Ok(Some(Element::new("group", Props::new(), Vec::new()))));
        assert!(!recovered.is_fallback());
    }

    #[test]
    fn panics_are_contained_as_render_failures() {
        let (sink, _, mut boundary) = boundary();
        let outcome = boundary.render(|| panic!("index out of bounds"));
        assert!(outcome.is_fallback());
        let reports = sink.take();
        assert_eq!(reports[0].kind, FailureKind::RenderPhase);
        assert_eq!(reports[0].message, "index out of bounds");
    }

    #[test]
    fn missing_output_is_reported_with_its_own_kind() {
        let (sink, _, mut boundary) = boundary();
        let outcome = boundary.render(|| Ok(None));
        assert!(outcome.is_fallback());
        let reports = sink.take();
        assert_eq!(reports[0].kind, FailureKind::MissingOutput);
        assert_eq!(reports[0].message, MISSING_OUTPUT_MESSAGE);
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_message("short", 12), "short");
        assert_eq!(truncate_message("ααααα", 3), "ααα...");
    }
}
