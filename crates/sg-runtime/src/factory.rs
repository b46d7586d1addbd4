use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use sg_core::{FailureKind, SgValue};

use crate::context::CorrectionContext;
use crate::element::{is_handler_prop, Element, Handler, Node, PropValue, Props};
use crate::error::RenderError;

/// The element-creation entry point unit code renders through.
pub trait ElementFactory {
    fn create_element(
        &self,
        element_type: &str,
        props: Props,
        children: Vec<Node>,
    ) -> Result<Element, RenderError>;
}

/// Builds plain element trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclarativeFactory;

impl ElementFactory for DeclarativeFactory {
    fn create_element(
        &self,
        element_type: &str,
        props: Props,
        children: Vec<Node>,
    ) -> Result<Element, RenderError> {
        if element_type.trim().is_empty() {
            return Err(RenderError::new("Element type must not be empty."));
        }
        Ok(Element::new(element_type, props, children))
    }
}

/// Repairs element arguments before handing them to the wrapped factory and
/// guards every event handler so failures reach the correction context.
pub struct InterceptingFactory<F: ElementFactory> {
    inner: F,
    context: Rc<CorrectionContext>,
}

impl<F: ElementFactory> InterceptingFactory<F> {
    pub fn new(inner: F, context: Rc<CorrectionContext>) -> Self {
        Self { inner, context }
    }

    pub fn context(&self) -> &Rc<CorrectionContext> {
        &self.context
    }
}

impl<F: ElementFactory> ElementFactory for InterceptingFactory<F> {
    fn create_element(
        &self,
        element_type: &str,
        props: Props,
        children: Vec<Node>,
    ) -> Result<Element, RenderError> {
        let mesh_like = crate::element::MESH_LIKE_TYPES.contains(&element_type);
        let mut children: Vec<Node> = children.into_iter().map(declarative_child).collect();
        let mut repaired = Props::new();

        for (name, value) in props {
            match value {
                PropValue::Element(element)
                    if mesh_like && (name == "geometry" || name == "material") =>
                {
                    log::debug!("moved '{}' prop of <{}> into children", name, element_type);
                    children.push(Node::Element(element));
                }
                PropValue::Handler(handler) if is_handler_prop(&name) => {
                    let guarded = guard_handler(&self.context, element_type, &name, handler);
                    repaired.insert(name, PropValue::Handler(guarded));
                }
                other => {
                    repaired.insert(name, other);
                }
            }
        }
        if mesh_like {
            repaired.insert(
                "frustumCulled".to_string(),
                PropValue::Value(SgValue::Bool(false)),
            );
        }

        self.inner.create_element(element_type, repaired, children)
    }
}

fn declarative_child(child: Node) -> Node {
    match child {
        Node::Instance(instance) => match instance.to_declarative() {
            Some(element) => {
                log::debug!(
                    "converted {} instance child to <{}>",
                    instance.class_name,
                    element.element_type
                );
                Node::Element(element)
            }
            None => Node::Instance(instance),
        },
        other => other,
    }
}

fn guard_handler(
    context: &Rc<CorrectionContext>,
    element_type: &str,
    prop: &str,
    handler: Handler,
) -> Handler {
    let context = Rc::clone(context);
    let description = format!("<{}> {}", element_type, prop);
    Handler::new(move |event| {
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.call(event)))
            .unwrap_or_else(|payload| Err(RenderError::from_panic(payload)));
        if let Err(error) = outcome {
            context.report(
                FailureKind::EventHandler,
                &format!("{}: {}", description, error.message),
                &error,
            );
        }
        Ok(())
    })
}
