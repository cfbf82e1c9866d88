//! Drives the todo component from an input stream.
//!
//! Once the input ends, the session keeps rendering until no snapshot has
//! arrived for `quiet`, so appends still in the store land before the scope is
//! cancelled.

use std::time::Duration;

use anyhow::Result;
use futures::{Stream, StreamExt};
use teaflow_core::Component;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::info;

use crate::todo::{Cmd, Msg, Todos};

/// Returns the last state seen.
pub async fn run<St>(
    component: &Component<Msg, Todos, Cmd>,
    messages: St,
    quiet: Duration,
    mut on_state: impl FnMut(&Todos),
) -> Result<Todos>
where
    St: Stream<Item = Msg> + Send + 'static,
{
    let scope = component.scope().clone();
    let (closed, mut on_closed) = oneshot::channel::<()>();
    let messages = async_stream::stream! {
        let mut messages = Box::pin(messages);
        while let Some(message) = messages.next().await {
            yield message;
        }
        let _ = closed.send(());
    };

    let mut snapshots = component.subscribe(messages);
    let mut last = Todos::default();
    let mut input_open = true;
    let mut deadline: Option<Instant> = None;

    loop {
        let idle = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            next = snapshots.next() => match next {
                Some(Ok(snapshot)) => {
                    on_state(snapshot.state());
                    if deadline.is_some() {
                        deadline = Some(Instant::now() + quiet);
                    }
                    last = snapshot.into_state();
                }
                Some(Err(cause)) if cause.is_cancellation() => break,
                Some(Err(cause)) => return Err(cause.into()),
                None => break,
            },
            _ = &mut on_closed, if input_open => {
                input_open = false;
                deadline = Some(Instant::now() + quiet);
            }
            _ = idle => {
                info!("Input closed and work settled, shutting down");
                deadline = None;
                scope.cancel();
            }
        }
    }

    Ok(last)
}
