//! Owning lifecycle of a component.
//!
//! A scope is either active or terminated with a cause. Termination is
//! permanent: the first cause wins and every later cancel/fail is ignored.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::error::ComponentError;

#[derive(Clone, Debug)]
pub struct Scope {
    exit: Arc<watch::Sender<Option<ComponentError>>>,
}

impl Scope {
    pub fn new() -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            exit: Arc::new(exit),
        }
    }

    /// Cancel on purpose. Subscribers observe [`ComponentError::Cancelled`].
    pub fn cancel(&self) {
        if self.terminate(ComponentError::Cancelled) {
            info!("Scope cancelled");
        }
    }

    /// Terminate with a failure cause. Returns false if already terminated.
    pub fn fail(&self, cause: ComponentError) -> bool {
        let message = cause.to_string();
        let first = self.terminate(cause);
        if first {
            error!(cause = %message, "Scope failed");
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// The terminal cause, if the scope has ended.
    pub fn cause(&self) -> Option<ComponentError> {
        self.exit.borrow().clone()
    }

    /// Resolves with the terminal cause once the scope ends.
    pub async fn cancelled(&self) -> ComponentError {
        let mut exit = self.exit.subscribe();
        let cause = match exit.wait_for(Option::is_some).await {
            Ok(cause) => cause.clone().unwrap_or(ComponentError::Cancelled),
            // Unreachable while `self` holds the sender.
            Err(_) => ComponentError::Cancelled,
        };
        cause
    }

    /// Run `fut` until it finishes or the scope ends, whichever is first.
    pub fn cancellable<F>(&self, fut: F) -> impl Future<Output = Option<F::Output>> + Send + 'static
    where
        F: Future + Send + 'static,
        F::Output: Send,
    {
        let scope = self.clone();
        async move {
            tokio::select! {
                biased;
                _ = scope.cancelled() => None,
                out = fut => Some(out),
            }
        }
    }

    fn terminate(&self, cause: ComponentError) -> bool {
        let mut cause = Some(cause);
        self.exit.send_if_modified(|exit| {
            if exit.is_some() {
                return false;
            }
            *exit = cause.take();
            true
        })
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}
