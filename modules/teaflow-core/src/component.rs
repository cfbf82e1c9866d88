//! The public face of the runtime.
//!
//! A component owns one shared upstream. Every subscription forwards its own
//! message stream into the shared input and reads snapshots from the shared
//! multicast sequence.

use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::env::Env;
use crate::error::ComponentError;
use crate::scope::Scope;
use crate::share::Shared;
use crate::snapshot::{Initial, Snapshot};
use crate::traits::{CommandLike, Interceptor, MessageLike, StateLike};

pub type SnapshotStream<M, S, C> =
    Pin<Box<dyn Stream<Item = Result<Snapshot<M, S, C>, ComponentError>> + Send>>;

pub type StateStream<S> = Pin<Box<dyn Stream<Item = Result<S, ComponentError>> + Send>>;

/// A running Model-Update-Command loop shared by all of its subscribers.
///
/// Cheap to clone: clones share the same upstream and scope.
pub struct Component<M, S, C> {
    shared: Arc<Shared<M, S, C>>,
    interceptors: Vec<Arc<dyn Interceptor<M, S, C>>>,
}

impl<M, S, C> Component<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    /// Under [`Started::Eagerly`](crate::Started::Eagerly) the first
    /// generation is spawned here. Outside a tokio runtime with the io
    /// context [`Context::Current`](crate::Context::Current) it starts on the
    /// first subscriber instead.
    pub fn new(env: Env<M, S, C>) -> Self {
        Self {
            shared: Shared::new(env),
            interceptors: Vec::new(),
        }
    }

    /// Feed `messages` into the shared loop and observe its snapshots.
    ///
    /// The stream yields the replay cache first, then live snapshots. When
    /// the owning scope ends it yields whatever was already delivered, one
    /// `Err` carrying the terminal cause, and then ends. Dropping the stream
    /// detaches the subscriber and stops forwarding `messages`.
    pub fn subscribe<St>(&self, messages: St) -> SnapshotStream<M, S, C>
    where
        St: Stream<Item = M> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let interceptors = self.interceptors.clone();

        Box::pin(async_stream::stream! {
            let scope = shared.scope().clone();
            if let Some(cause) = scope.cause() {
                yield Err(cause);
                return;
            }

            let mut subscription = shared.attach();
            let _forwarder = AbortOnDrop(shared.forward(messages));

            loop {
                let next = tokio::select! {
                    biased;
                    snapshot = subscription.recv() => match snapshot {
                        Some(snapshot) => Next::Snapshot(snapshot),
                        None => Next::Closed,
                    },
                    cause = scope.cancelled() => Next::Terminated(cause),
                };

                match next {
                    Next::Snapshot(snapshot) => {
                        for interceptor in &interceptors {
                            interceptor.intercept(snapshot.clone()).await;
                        }
                        yield Ok(snapshot);
                    }
                    Next::Terminated(cause) => {
                        yield Err(cause);
                        break;
                    }
                    Next::Closed => break,
                }
            }
        })
    }

    /// Observe without sending anything.
    pub fn observe_snapshots(&self) -> SnapshotStream<M, S, C> {
        self.subscribe(stream::empty())
    }

    pub fn observe_states(&self) -> StateStream<S> {
        self.states().observe()
    }

    /// The same component, projected to states only.
    pub fn states(&self) -> States<M, S, C> {
        States {
            component: self.clone(),
        }
    }

    /// A component whose subscriptions run `interceptor` on every snapshot,
    /// after any interceptors already attached.
    pub fn with(&self, interceptor: impl Interceptor<M, S, C> + 'static) -> Self {
        let mut component = self.clone();
        component.interceptors.push(Arc::new(interceptor));
        component
    }

    pub fn invoke(&self, message: M) -> SnapshotStream<M, S, C> {
        self.subscribe(stream::once(async move { message }))
    }

    pub fn invoke_all<I>(&self, messages: I) -> SnapshotStream<M, S, C>
    where
        I: IntoIterator<Item = M>,
        I::IntoIter: Send + 'static,
    {
        self.subscribe(stream::iter(messages))
    }

    /// Replace the live generation with one seeded from `initial`, without
    /// calling the initializer. Returns false when no generation is live.
    pub fn reset(&self, initial: Initial<S, C>) -> bool {
        self.shared.reset(initial)
    }

    pub fn scope(&self) -> &Scope {
        self.shared.scope()
    }
}

impl<M, S, C> Clone for Component<M, S, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            interceptors: self.interceptors.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// State-only projection
// ---------------------------------------------------------------------------

/// A [`Component`] whose streams carry states instead of snapshots.
pub struct States<M, S, C> {
    component: Component<M, S, C>,
}

impl<M, S, C> States<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    pub fn subscribe<St>(&self, messages: St) -> StateStream<S>
    where
        St: Stream<Item = M> + Send + 'static,
    {
        into_states(self.component.subscribe(messages))
    }

    pub fn observe(&self) -> StateStream<S> {
        into_states(self.component.observe_snapshots())
    }

    pub fn invoke(&self, message: M) -> StateStream<S> {
        into_states(self.component.invoke(message))
    }

    pub fn component(&self) -> &Component<M, S, C> {
        &self.component
    }
}

impl<M, S, C> Clone for States<M, S, C> {
    fn clone(&self) -> Self {
        Self {
            component: self.component.clone(),
        }
    }
}

fn into_states<M, S, C>(snapshots: SnapshotStream<M, S, C>) -> StateStream<S>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    Box::pin(snapshots.map(|snapshot| snapshot.map(Snapshot::into_state)))
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

enum Next<M, S, C> {
    Snapshot(Snapshot<M, S, C>),
    Terminated(ComponentError),
    Closed,
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
