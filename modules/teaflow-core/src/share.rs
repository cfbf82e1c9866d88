//! Subscriber-driven lifecycle of the shared upstream.
//!
//! All transitions happen under one lock, which is what makes "exactly one
//! initializer call per generation" hold for any number of concurrent
//! subscribers.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Started;
use crate::engine::{GenerationId, Input, Seed, Upstream};
use crate::env::Env;
use crate::multicast::SubscriberId;
use crate::scope::Scope;
use crate::snapshot::{Initial, Snapshot};
use crate::traits::{CommandLike, MessageLike, StateLike};

pub(crate) struct Shared<M, S, C> {
    upstream: Arc<Upstream<M, S, C>>,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    subscribers: usize,
    /// A generation is live (or about to be).
    active: bool,
    /// The most recently started generation, possibly already told to stop.
    /// The next generation awaits it before doing anything.
    generation: Option<Generation>,
    next_id: GenerationId,
    stop_timer: Option<JoinHandle<()>>,
    expiry_timer: Option<JoinHandle<()>>,
}

struct Generation {
    id: GenerationId,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<Option<()>>,
}

impl Generation {
    fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    async fn cancel_and_wait(self) {
        self.cancel();
        let _ = self.handle.await;
    }
}

impl<M, S, C> Shared<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    pub(crate) fn new(env: Env<M, S, C>) -> Arc<Self> {
        let eager = matches!(env.share.started, Started::Eagerly);
        let shared = Arc::new(Self {
            upstream: Arc::new(Upstream::new(env)),
            lifecycle: Mutex::new(Lifecycle::default()),
        });
        if eager {
            if shared.upstream.env.io.is_available() {
                let mut lifecycle = shared.lifecycle.lock();
                shared.start(&mut lifecycle, Seed::Initializer);
            } else {
                debug!("No runtime to start on, deferring eager start to the first subscriber");
            }
        }
        shared
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.upstream.env.scope
    }

    /// Register a subscriber, starting the upstream if the policy says so.
    pub(crate) fn attach(self: &Arc<Self>) -> Subscription<M, S, C> {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(timer) = lifecycle.stop_timer.take() {
            timer.abort();
        }
        if let Some(timer) = lifecycle.expiry_timer.take() {
            timer.abort();
        }

        lifecycle.subscribers += 1;
        // Subscribe before starting so the initial snapshot cannot be missed.
        let (id, receiver) = self.upstream.hub.subscribe();

        if !lifecycle.active {
            self.start(&mut lifecycle, Seed::Initializer);
        }
        debug!(subscribers = lifecycle.subscribers, "Subscriber attached");

        Subscription {
            shared: Arc::clone(self),
            id,
            receiver,
        }
    }

    fn detach(self: &Arc<Self>, id: SubscriberId) {
        self.upstream.hub.unsubscribe(id);

        let mut lifecycle = self.lifecycle.lock();
        lifecycle.subscribers = lifecycle.subscribers.saturating_sub(1);
        debug!(subscribers = lifecycle.subscribers, "Subscriber detached");
        if lifecycle.subscribers > 0 || !lifecycle.active {
            return;
        }

        let Started::WhileSubscribed { stop_timeout, .. } = self.upstream.env.share.started else {
            return;
        };
        if stop_timeout.is_zero() {
            self.stop(&mut lifecycle);
            return;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(self);
                lifecycle.stop_timer = Some(runtime.spawn(async move {
                    tokio::time::sleep(stop_timeout).await;
                    let mut lifecycle = shared.lifecycle.lock();
                    lifecycle.stop_timer = None;
                    if lifecycle.subscribers == 0 && lifecycle.active {
                        shared.stop(&mut lifecycle);
                    }
                }));
            }
            // Dropped outside any runtime: no timer to wait on.
            Err(_) => self.stop(&mut lifecycle),
        }
    }

    /// Replace the live generation with one seeded from `initial`.
    pub(crate) fn reset(self: &Arc<Self>, initial: Initial<S, C>) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.active || self.scope().is_cancelled() {
            return false;
        }
        self.start(&mut lifecycle, Seed::Provided(initial));
        true
    }

    /// Forward a subscriber's messages into the shared input until the stream
    /// ends, the task is aborted, or the scope ends.
    pub(crate) fn forward<St>(&self, messages: St) -> JoinHandle<Option<()>>
    where
        St: Stream<Item = M> + Send + 'static,
    {
        let input = self.upstream.input.clone();
        let env = &self.upstream.env;
        env.io.spawn(env.scope.cancellable(async move {
            let mut messages = Box::pin(messages);
            while let Some(message) = messages.next().await {
                if input.send(Input::external(message)).await.is_err() {
                    break;
                }
            }
        }))
    }

    /// Start a new generation, superseding whatever generation exists.
    fn start(&self, lifecycle: &mut Lifecycle, seed: Seed<S, C>) {
        let scope = &self.upstream.env.scope;
        if scope.is_cancelled() {
            return;
        }

        let previous = lifecycle.generation.take();
        let id = lifecycle.next_id;
        lifecycle.next_id += 1;

        if let Some(previous) = &previous {
            info!(previous = previous.id, next = id, "Replacing generation");
        }

        let (cancel, cancelled) = watch::channel(false);
        let upstream = Arc::clone(&self.upstream);
        let handle = self.upstream.env.io.spawn(scope.cancellable(async move {
            if let Some(previous) = previous {
                previous.cancel_and_wait().await;
            }
            upstream.run_generation(id, seed, cancelled).await;
        }));

        lifecycle.generation = Some(Generation { id, cancel, handle });
        lifecycle.active = true;
    }

    fn stop(self: &Arc<Self>, lifecycle: &mut Lifecycle) {
        if let Some(generation) = &lifecycle.generation {
            info!(generation = generation.id, "Stopping idle upstream");
            generation.cancel();
        }
        lifecycle.active = false;

        let Started::WhileSubscribed {
            replay_expiration: Some(expiration),
            ..
        } = self.upstream.env.share.started
        else {
            return;
        };
        if expiration.is_zero() {
            self.upstream.hub.reset_cache();
            return;
        }
        if let Ok(runtime) = Handle::try_current() {
            let shared = Arc::clone(self);
            lifecycle.expiry_timer = Some(runtime.spawn(async move {
                tokio::time::sleep(expiration).await;
                let mut lifecycle = shared.lifecycle.lock();
                lifecycle.expiry_timer = None;
                if !lifecycle.active {
                    debug!("Replay cache expired");
                    shared.upstream.hub.reset_cache();
                }
            }));
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lifecycle.lock().subscribers
    }
}

/// A registered subscriber. Detaches on drop.
pub(crate) struct Subscription<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    shared: Arc<Shared<M, S, C>>,
    id: SubscriberId,
    receiver: mpsc::Receiver<Snapshot<M, S, C>>,
}

impl<M, S, C> Subscription<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    /// Cancel safe.
    pub(crate) async fn recv(&mut self) -> Option<Snapshot<M, S, C>> {
        self.receiver.recv().await
    }
}

impl<M, S, C> Drop for Subscription<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    fn drop(&mut self) {
        self.shared.detach(self.id);
    }
}
