use std::sync::Arc;

use crate::config::ShareOptions;
use crate::context::Context;
use crate::scope::Scope;
use crate::traits::{CommandLike, Initializer, MessageLike, Resolver, StateLike, Updater};

/// Immutable configuration of one component.
///
/// Built once, handed to [`Component::new`](crate::Component::new), never
/// mutated afterwards.
pub struct Env<M, S, C> {
    pub(crate) initializer: Arc<dyn Initializer<S, C>>,
    pub(crate) resolver: Arc<dyn Resolver<C, M>>,
    pub(crate) updater: Arc<dyn Updater<M, S, C>>,
    pub(crate) scope: Scope,
    pub(crate) io: Context,
    pub(crate) computation: Context,
    pub(crate) share: ShareOptions,
}

impl<M, S, C> Env<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    /// Both contexts default to [`Context::Current`] and sharing to
    /// [`ShareOptions::default`].
    pub fn new(
        initializer: impl Initializer<S, C> + 'static,
        resolver: impl Resolver<C, M> + 'static,
        updater: impl Updater<M, S, C> + 'static,
        scope: Scope,
    ) -> Self {
        Self {
            initializer: Arc::new(initializer),
            resolver: Arc::new(resolver),
            updater: Arc::new(updater),
            scope,
            io: Context::Current,
            computation: Context::Current,
            share: ShareOptions::default(),
        }
    }

    pub fn with_io(mut self, io: Context) -> Self {
        self.io = io;
        self
    }

    pub fn with_computation(mut self, computation: Context) -> Self {
        self.computation = computation;
        self
    }

    pub fn with_share_options(mut self, share: ShareOptions) -> Self {
        self.share = share;
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn share_options(&self) -> &ShareOptions {
        &self.share
    }
}

impl<M, S, C> Clone for Env<M, S, C> {
    fn clone(&self) -> Self {
        Self {
            initializer: Arc::clone(&self.initializer),
            resolver: Arc::clone(&self.resolver),
            updater: Arc::clone(&self.updater),
            scope: self.scope.clone(),
            io: self.io.clone(),
            computation: self.computation.clone(),
            share: self.share.clone(),
        }
    }
}
