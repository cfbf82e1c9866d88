//! Core traits for the runtime.
//!
//! Consumers define their domain by implementing `Updater` (pure state
//! transitions), `Resolver` (side-effectful command handlers that emit new
//! messages) and `Initializer` (the seed of each generation). Closures with
//! the matching shape implement all three.

use std::future::Future;
use std::hash::Hash;

use anyhow::Result;
use async_trait::async_trait;

use crate::snapshot::{Commands, Initial, Messages, Snapshot};

/// Messages drive state transitions. Resolvers return them as sets.
pub trait MessageLike: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T> MessageLike for T where T: Clone + Eq + Hash + Send + Sync + 'static {}

/// The model. Treated as immutable once emitted.
pub trait StateLike: Clone + Send + Sync + 'static {}

impl<T> StateLike for T where T: Clone + Send + Sync + 'static {}

/// Effect descriptors. Steps emit them as sets.
pub trait CommandLike: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T> CommandLike for T where T: Clone + Eq + Hash + Send + Sync + 'static {}

/// Produces the first snapshot of a generation. Runs on the io context.
#[async_trait]
pub trait Initializer<S, C>: Send + Sync {
    async fn initialize(&self) -> Result<Initial<S, C>>;
}

/// Pure state transition. No I/O, no side effects.
///
/// Never invoked concurrently with itself for the same generation. An `Err`
/// is fatal to the owning scope.
pub trait Updater<M, S, C>: Send + Sync {
    fn update(&self, message: &M, state: &S) -> Result<(S, Commands<C>)>;
}

/// Executes one command. May perform I/O, may emit new messages.
///
/// An `Err` is fatal to the owning scope unless the resolver is wrapped with
/// [`ResolverExt::isolate`](crate::ResolverExt::isolate).
#[async_trait]
pub trait Resolver<C, M>: Send + Sync {
    async fn resolve(&self, command: C) -> Result<Messages<M>>;
}

/// Side-observing hook over the raw snapshot sequence.
#[async_trait]
pub trait Interceptor<M, S, C>: Send + Sync {
    async fn intercept(&self, snapshot: Snapshot<M, S, C>);
}

// ---------------------------------------------------------------------------
// Closure blankets
// ---------------------------------------------------------------------------

#[async_trait]
impl<S, C, F, Fut> Initializer<S, C> for F
where
    S: StateLike,
    C: CommandLike,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Initial<S, C>>> + Send + 'static,
{
    async fn initialize(&self) -> Result<Initial<S, C>> {
        (self)().await
    }
}

impl<M, S, C, F> Updater<M, S, C> for F
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
    F: Fn(&M, &S) -> Result<(S, Commands<C>)> + Send + Sync,
{
    fn update(&self, message: &M, state: &S) -> Result<(S, Commands<C>)> {
        (self)(message, state)
    }
}

#[async_trait]
impl<C, M, F, Fut> Resolver<C, M> for F
where
    C: CommandLike,
    M: MessageLike,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Messages<M>>> + Send + 'static,
{
    async fn resolve(&self, command: C) -> Result<Messages<M>> {
        (self)(command).await
    }
}

#[async_trait]
impl<M, S, C, F, Fut> Interceptor<M, S, C> for F
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
    F: Fn(Snapshot<M, S, C>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn intercept(&self, snapshot: Snapshot<M, S, C>) {
        (self)(snapshot).await
    }
}
