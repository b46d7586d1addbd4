use std::any::Any;

use sg_core::SceneGuardError;
use thiserror::Error;

/// A failure raised by unit code while rendering, ticking or handling an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
    pub stack: Option<String>,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unit code panicked".to_string()
        };
        Self::new(message)
    }
}

impl From<SceneGuardError> for RenderError {
    fn from(error: SceneGuardError) -> Self {
        Self::new(error.to_string())
    }
}
