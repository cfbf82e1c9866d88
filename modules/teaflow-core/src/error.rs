use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Terminal cause of a component's scope.
///
/// Cloneable so that one failure can be handed to every subscriber.
#[derive(Error, Debug, Clone)]
pub enum ComponentError {
    #[error("component scope was cancelled")]
    Cancelled,

    #[error("initializer failed: {0:#}")]
    Initializer(Arc<anyhow::Error>),

    #[error("updater failed: {0:#}")]
    Updater(Arc<anyhow::Error>),

    #[error("resolver failed: {0:#}")]
    Resolver(Arc<anyhow::Error>),

    #[error("{task} panicked: {message}")]
    Panicked { task: &'static str, message: String },
}

impl ComponentError {
    pub(crate) fn initializer(err: anyhow::Error) -> Self {
        Self::Initializer(Arc::new(err))
    }

    pub(crate) fn updater(err: anyhow::Error) -> Self {
        Self::Updater(Arc::new(err))
    }

    pub(crate) fn resolver(err: anyhow::Error) -> Self {
        Self::Resolver(Arc::new(err))
    }

    pub(crate) fn panicked(task: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { task, message }
    }

    /// True when the scope was cancelled on purpose rather than by a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
