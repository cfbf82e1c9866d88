//! The generation loop.
//!
//! Initialize → publish → dispatch → (receive → update → publish → dispatch)*
//! until the generation is cancelled or something fails. Resolver tasks are
//! children of the generation and never outlive it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, info_span, Instrument};

use crate::context::Context;
use crate::env::Env;
use crate::error::ComponentError;
use crate::multicast::Multicast;
use crate::rendezvous;
use crate::snapshot::{Commands, Initial, Snapshot};
use crate::traits::{CommandLike, MessageLike, StateLike};

pub(crate) type GenerationId = u64;

/// Where a queued message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A subscriber's message stream.
    External,
    /// A resolver task of the given generation.
    Resolved(GenerationId),
}

pub(crate) struct Input<M> {
    pub(crate) origin: Origin,
    pub(crate) message: M,
}

impl<M> Input<M> {
    pub(crate) fn external(message: M) -> Self {
        Self {
            origin: Origin::External,
            message,
        }
    }

    fn resolved(generation: GenerationId, message: M) -> Self {
        Self {
            origin: Origin::Resolved(generation),
            message,
        }
    }
}

/// How a generation obtains its first snapshot.
pub(crate) enum Seed<S, C> {
    Initializer,
    Provided(Initial<S, C>),
}

type TaskResult = Result<(), ComponentError>;

/// Everything a generation needs, shared across generations.
pub(crate) struct Upstream<M, S, C> {
    pub(crate) env: Env<M, S, C>,
    pub(crate) input: rendezvous::Sender<Input<M>>,
    inbox: AsyncMutex<rendezvous::Receiver<Input<M>>>,
    pub(crate) hub: Multicast<Snapshot<M, S, C>>,
}

impl<M, S, C> Upstream<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    pub(crate) fn new(env: Env<M, S, C>) -> Self {
        let (input, inbox) = rendezvous::channel();
        let hub = Multicast::new(env.share.replay, env.share.buffer);
        Self {
            env,
            input,
            inbox: AsyncMutex::new(inbox),
            hub,
        }
    }

    /// Run one generation until `cancel` flips or a fatal error occurs.
    ///
    /// On exit every resolver task of this generation has finished or been
    /// cancelled. Fatal errors terminate the owning scope.
    pub(crate) async fn run_generation(
        self: Arc<Self>,
        id: GenerationId,
        seed: Seed<S, C>,
        mut cancel: watch::Receiver<bool>,
    ) {
        let span = info_span!("generation", id);
        async move {
            let mut tasks: JoinSet<TaskResult> = JoinSet::new();
            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut cancel) => Ok(()),
                outcome = self.drive(id, seed, &mut tasks) => outcome,
            };

            let pending = tasks.len();
            tasks.shutdown().await;

            match outcome {
                Ok(()) => info!(cancelled_tasks = pending, "Generation stopped"),
                Err(cause) => {
                    self.env.scope.fail(cause);
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        id: GenerationId,
        seed: Seed<S, C>,
        tasks: &mut JoinSet<TaskResult>,
    ) -> TaskResult {
        let Initial { state, commands } = match seed {
            Seed::Initializer => self.initialize().await?,
            Seed::Provided(initial) => initial,
        };
        info!(commands = commands.len(), "Generation started");

        self.hub
            .publish(Snapshot::Initial {
                state: state.clone(),
                commands: commands.clone(),
            })
            .await;
        self.dispatch(id, commands, tasks);

        let mut current = state;
        let mut inbox = self.inbox.lock().await;
        loop {
            tokio::select! {
                Some(joined) = tasks.join_next() => settle(joined)?,
                received = inbox.recv() => {
                    // The component holds a sender for as long as it lives.
                    let Some(Input { origin, message }) = received else {
                        return Ok(());
                    };
                    if let Origin::Resolved(from) = origin {
                        if from != id {
                            debug!(stale_generation = from, "Discarding stale resolved message");
                            continue;
                        }
                    }

                    let (next, commands) = self.step(&message, &current).await?;
                    debug!(commands = commands.len(), "Step computed");

                    self.hub
                        .publish(Snapshot::Regular {
                            state: next.clone(),
                            commands: commands.clone(),
                            previous_state: current,
                            message,
                        })
                        .await;
                    self.dispatch(id, commands, tasks);
                    current = next;
                }
            }
        }
    }

    async fn initialize(&self) -> Result<Initial<S, C>, ComponentError> {
        match AssertUnwindSafe(self.env.initializer.initialize())
            .catch_unwind()
            .await
        {
            Ok(Ok(initial)) => Ok(initial),
            Ok(Err(err)) => Err(ComponentError::initializer(err)),
            Err(payload) => Err(ComponentError::panicked("initializer", payload)),
        }
    }

    /// Invoke the updater on the computation context.
    async fn step(&self, message: &M, state: &S) -> Result<(S, Commands<C>), ComponentError> {
        let outcome = match &self.env.computation {
            Context::Current => {
                panic::catch_unwind(AssertUnwindSafe(|| self.env.updater.update(message, state)))
                    .map_err(|payload| ComponentError::panicked("updater", payload))?
            }
            Context::Runtime(handle) => {
                let updater = Arc::clone(&self.env.updater);
                let message = message.clone();
                let state = state.clone();
                handle
                    .spawn_blocking(move || updater.update(&message, &state))
                    .await
                    .map_err(|err| joined_panic("updater", err))?
            }
        };
        outcome.map_err(ComponentError::updater)
    }

    /// Launch one resolver task per command. Does not wait for them.
    fn dispatch(&self, id: GenerationId, commands: Commands<C>, tasks: &mut JoinSet<TaskResult>) {
        for command in commands {
            let resolver = Arc::clone(&self.env.resolver);
            let input = self.input.clone();
            self.env.io.spawn_child(tasks, async move {
                let messages = resolver
                    .resolve(command)
                    .await
                    .map_err(ComponentError::resolver)?;
                for message in messages {
                    if input.send(Input::resolved(id, message)).await.is_err() {
                        break;
                    }
                }
                Ok(())
            });
        }
    }
}

async fn stopped(cancel: &mut watch::Receiver<bool>) {
    // An error means the handle was dropped, which also ends the generation.
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

fn settle(joined: Result<TaskResult, JoinError>) -> TaskResult {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => Err(joined_panic("resolver", err)),
    }
}

fn joined_panic(task: &'static str, err: JoinError) -> ComponentError {
    match err.try_into_panic() {
        Ok(payload) => ComponentError::panicked(task, payload),
        Err(_) => ComponentError::Panicked {
            task,
            message: "task was cancelled".to_string(),
        },
    }
}
