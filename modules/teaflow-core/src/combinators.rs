//! Combinators for updater and resolver authors.

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::snapshot::{Commands, Messages};
use crate::traits::{CommandLike, MessageLike, Resolver};

// ---------------------------------------------------------------------------
// Updater side: building (state, commands) pairs
// ---------------------------------------------------------------------------

/// Pairs a new state with the commands a step emits.
///
/// ```ignore
/// fn update(message: &Msg, state: &Todos) -> anyhow::Result<(Todos, Commands<Cmd>)> {
///     match message {
///         Msg::Add(item) => Ok(state.clone().command(Cmd::Save(item.clone()))),
///         Msg::Saved(items) => Ok(Todos::from(items).no_command()),
///     }
/// }
/// ```
pub trait UpdateExt: Sized {
    fn command<C: CommandLike>(self, command: C) -> (Self, Commands<C>) {
        (self, Commands::from([command]))
    }

    /// Duplicates collapse: commands are a set.
    fn with_commands<C, I>(self, commands: I) -> (Self, Commands<C>)
    where
        C: CommandLike,
        I: IntoIterator<Item = C>,
    {
        (self, commands.into_iter().collect())
    }

    fn no_command<C: CommandLike>(self) -> (Self, Commands<C>) {
        (self, Commands::new())
    }
}

impl<S> UpdateExt for S {}

// ---------------------------------------------------------------------------
// Resolver side: turning commands into zero or one message
// ---------------------------------------------------------------------------

pub trait EffectExt: Sized + Send {
    /// Run `action` for its side effect only. Resolves to no messages.
    fn side_effect<M, F, Fut>(self, action: F) -> impl Future<Output = Result<Messages<M>>> + Send
    where
        M: MessageLike,
        F: FnOnce(Self) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        async move {
            action(self).await?;
            Ok(Messages::new())
        }
    }

    /// Run `action` and resolve to the message it returns, if any.
    fn effect<M, F, Fut>(self, action: F) -> impl Future<Output = Result<Messages<M>>> + Send
    where
        M: MessageLike,
        F: FnOnce(Self) -> Fut + Send,
        Fut: Future<Output = Result<Option<M>>> + Send,
    {
        async move { Ok(action(self).await?.into_iter().collect()) }
    }
}

impl<C: CommandLike> EffectExt for C {}

// ---------------------------------------------------------------------------
// Opt-in per-command isolation
// ---------------------------------------------------------------------------

pub trait ResolverExt<C: CommandLike, M: MessageLike>: Resolver<C, M> + Sized {
    /// Convert resolution failures into messages instead of failing the scope.
    ///
    /// Panics inside the wrapped resolver stay fatal.
    fn isolate<F>(self, on_error: F) -> Isolated<Self, F>
    where
        F: Fn(&C, anyhow::Error) -> Messages<M> + Send + Sync,
    {
        Isolated {
            resolver: self,
            on_error,
        }
    }
}

impl<C, M, R> ResolverExt<C, M> for R
where
    C: CommandLike,
    M: MessageLike,
    R: Resolver<C, M>,
{
}

/// Resolver wrapper produced by [`ResolverExt::isolate`].
pub struct Isolated<R, F> {
    resolver: R,
    on_error: F,
}

#[async_trait]
impl<C, M, R, F> Resolver<C, M> for Isolated<R, F>
where
    C: CommandLike,
    M: MessageLike,
    R: Resolver<C, M>,
    F: Fn(&C, anyhow::Error) -> Messages<M> + Send + Sync,
{
    async fn resolve(&self, command: C) -> Result<Messages<M>> {
        match self.resolver.resolve(command.clone()).await {
            Ok(messages) => Ok(messages),
            Err(err) => {
                warn!(error = %err, "Command failed, converting to messages");
                Ok((self.on_error)(&command, err))
            }
        }
    }
}
