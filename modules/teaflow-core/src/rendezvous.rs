//! Zero-buffer handoff channel.
//!
//! `send` completes only once the receiver has taken the value. A value whose
//! sender gave up before the handoff (dropped or cancelled) is discarded by the
//! receiver instead of being delivered late.

use tokio::sync::{mpsc, oneshot};

struct Handoff<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

pub(crate) struct Sender<T> {
    inner: mpsc::Sender<Handoff<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct Receiver<T> {
    inner: mpsc::Receiver<Handoff<T>>,
}

/// The receiving side went away.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Closed;

pub(crate) fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (Sender { inner: tx }, Receiver { inner: rx })
}

impl<T> Sender<T> {
    /// Wait until the receiver takes `value`. Waiting senders are served in
    /// arrival order.
    pub(crate) async fn send(&self, value: T) -> Result<(), Closed> {
        let (taken, on_taken) = oneshot::channel();
        self.inner
            .send(Handoff { value, taken })
            .await
            .map_err(|_| Closed)?;
        on_taken.await.map_err(|_| Closed)
    }
}

impl<T> Receiver<T> {
    /// Cancel safe.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        loop {
            let handoff = self.inner.recv().await?;
            if handoff.taken.send(()).is_ok() {
                return Some(handoff.value);
            }
        }
    }
}
