use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use sg_core::SgValue;

use crate::error::RenderError;

pub type Props = BTreeMap<String, PropValue>;

/// Element types whose geometry and material belong in the children.
pub const MESH_LIKE_TYPES: &[&str] = &[
    "mesh",
    "instancedMesh",
    "skinnedMesh",
    "points",
    "line",
    "lineSegments",
    "lineLoop",
    "sprite",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Geometry,
    Material,
    /// Any other scene-graph object (groups, meshes, cameras).
    Object,
}

/// An imperatively constructed scene object, e.g. `new THREE.BoxGeometry(1, 1, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneInstance {
    pub class_name: String,
    pub kind: InstanceKind,
    pub args: Vec<SgValue>,
    pub properties: BTreeMap<String, SgValue>,
}

impl SceneInstance {
    pub fn new(class_name: impl Into<String>, args: Vec<SgValue>) -> Self {
        let class_name = class_name.into();
        let kind = if class_name.ends_with("Geometry") {
            InstanceKind::Geometry
        } else if class_name.ends_with("Material") {
            InstanceKind::Material
        } else {
            InstanceKind::Object
        };
        Self {
            class_name,
            kind,
            args,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<SgValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// The declarative element equivalent for geometry and material instances.
    pub fn to_declarative(&self) -> Option<Element> {
        let element_type = lower_first(&self.class_name);
        match self.kind {
            InstanceKind::Geometry => {
                let mut props = Props::new();
                props.insert(
                    "args".to_string(),
                    PropValue::Value(SgValue::Array(self.args.clone())),
                );
                Some(Element::new(element_type, props, Vec::new()))
            }
            InstanceKind::Material => {
                let mut props: Props = self
                    .properties
                    .iter()
                    .map(|(name, value)| (name.clone(), PropValue::Value(value.clone())))
                    .collect();
                if let Some(SgValue::Map(parameters)) = self.args.first() {
                    for (name, value) in parameters {
                        props
                            .entry(name.clone())
                            .or_insert_with(|| PropValue::Value(value.clone()));
                    }
                }
                Some(Element::new(element_type, props, Vec::new()))
            }
            InstanceKind::Object => None,
        }
    }
}

pub type HandlerFn = dyn Fn(&SgValue) -> Result<(), RenderError>;

/// Event handler attached to an `on<Event>` prop.
#[derive(Clone)]
pub struct Handler(Rc<HandlerFn>);

impl Handler {
    pub fn new(handler: impl Fn(&SgValue) -> Result<(), RenderError> + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &SgValue) -> Result<(), RenderError> {
        (self.0)(event)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Value(SgValue),
    Element(Element),
    Instance(SceneInstance),
    Handler(Handler),
}

impl From<SgValue> for PropValue {
    fn from(value: SgValue) -> Self {
        Self::Value(value)
    }
}

impl From<Element> for PropValue {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<SceneInstance> for PropValue {
    fn from(instance: SceneInstance) -> Self {
        Self::Instance(instance)
    }
}

impl From<Handler> for PropValue {
    fn from(handler: Handler) -> Self {
        Self::Handler(handler)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Instance(SceneInstance),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub element_type: String,
    pub props: Props,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(element_type: impl Into<String>, props: Props, children: Vec<Node>) -> Self {
        Self {
            element_type: element_type.into(),
            props,
            children,
        }
    }

    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    pub fn handler(&self, name: &str) -> Option<&Handler> {
        match self.props.get(name) {
            Some(PropValue::Handler(handler)) => Some(handler),
            _ => None,
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn is_mesh_like(&self) -> bool {
        MESH_LIKE_TYPES.contains(&self.element_type.as_str())
    }
}

/// `onClick`, `onPointerOver`, ... but not `one` or `online`.
pub fn is_handler_prop(name: &str) -> bool {
    name.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|first| first.is_ascii_uppercase())
}

pub(crate) fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod element_tests {
    use super::*;

    #[test]
    fn classifies_instances_by_class_suffix() {
        assert_eq!(
            SceneInstance::new("BoxGeometry", Vec::new()).kind,
            InstanceKind::Geometry
        );
        assert_eq!(
            SceneInstance::new("MeshStandardMaterial", Vec::new()).kind,
            InstanceKind::Material
        );
        assert_eq!(SceneInstance::new("Group", Vec::new()).kind, InstanceKind::Object);
    }

    #[test]
    fn geometry_instance_becomes_args_element() {
        let instance = SceneInstance::new("SphereGeometry", vec![SgValue::from(1.0)]);
        let element = instance.to_declarative().expect("geometry converts");
        assert_eq!(element.element_type, "sphereGeometry");
        assert_eq!(
            element.prop("args"),
            Some(&PropValue::Value(SgValue::Array(vec![SgValue::from(1.0)])))
        );
    }

    #[test]
    fn material_instance_copies_properties_and_parameters() {
        let mut parameters = BTreeMap::new();
        parameters.insert("color".to_string(), SgValue::from("red"));
        parameters.insert("wireframe".to_string(), SgValue::from(false));
        let instance = SceneInstance::new("MeshBasicMaterial", vec![SgValue::Map(parameters)])
            .with_property("wireframe", true);
        let element = instance.to_declarative().expect("material converts");
        assert_eq!(element.element_type, "meshBasicMaterial");
        assert_eq!(element.prop("color"), Some(&PropValue::Value(SgValue::from("red"))));
        assert_eq!(element.prop("wireframe"), Some(&PropValue::Value(SgValue::from(true))));
        assert!(SceneInstance::new("Group", Vec::new()).to_declarative().is_none());
    }

    #[test]
    fn handler_prop_names_need_uppercase_after_on() {
        assert!(is_handler_prop("onClick"));
        assert!(is_handler_prop("onPointerOver"));
        assert!(!is_handler_prop("one"));
        assert!(!is_handler_prop("on"));
        assert!(!is_handler_prop("position"));
    }
}
