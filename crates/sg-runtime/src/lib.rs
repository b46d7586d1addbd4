mod boundary;
mod context;
mod element;
mod error;
mod factory;
mod frame;
mod tree;

pub use boundary::{
    fallback_element, truncate_message, RenderBoundary, RenderOutcome, MISSING_OUTPUT_MESSAGE,
};
pub use context::{CollectingSink, CorrectionContext, FailureSink};
pub use element::{
    is_handler_prop, Element, Handler, HandlerFn, InstanceKind, Node, PropValue, Props,
    SceneInstance, MESH_LIKE_TYPES,
};
pub use error::RenderError;
pub use factory::{DeclarativeFactory, ElementFactory, InterceptingFactory};
pub use frame::{FrameCallback, FrameLoop, FrameOutcome, FrameState};
pub use tree::{RenderScope, RenderTree, RenderUnit};
