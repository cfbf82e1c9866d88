//! Execution contexts for io work and updater computation.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};

/// Where a piece of runtime work executes.
#[derive(Debug, Clone, Default)]
pub enum Context {
    /// The tokio runtime the caller is running on. For computation this means
    /// the updater runs inline on the generation task.
    #[default]
    Current,

    /// A specific runtime. For computation this means the updater runs on
    /// that runtime's blocking pool.
    Runtime(Handle),
}

impl Context {
    /// Whether work can be spawned from the calling thread.
    pub(crate) fn is_available(&self) -> bool {
        match self {
            Context::Current => Handle::try_current().is_ok(),
            Context::Runtime(_) => true,
        }
    }

    pub(crate) fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match self {
            Context::Current => tokio::spawn(fut),
            Context::Runtime(handle) => handle.spawn(fut),
        }
    }

    /// Spawn as a child of `tasks`, so dropping or shutting down the set
    /// cancels it.
    pub(crate) fn spawn_child<T, F>(&self, tasks: &mut JoinSet<T>, fut: F)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        match self {
            Context::Current => {
                tasks.spawn(fut);
            }
            Context::Runtime(handle) => {
                tasks.spawn_on(fut, handle);
            }
        }
    }
}
