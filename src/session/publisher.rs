//! Outbound side of a stream: events out, termination signal back

use crate::protocol::{encode_event, Event};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// How an outbound stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every event was delivered and the channel completed
    Finished,
    /// The consumer dropped the stream early
    Cancelled,
}

/// Encoded JSON lines for one session, in emission order
///
/// Dropping the stream before it completes reports
/// [`Termination::Cancelled`] to the paired [`TerminationSignal`].
pub struct EventStream {
    events: mpsc::Receiver<Event>,
    done: Option<oneshot::Sender<Termination>>,
}

/// Resolves once the paired [`EventStream`] has finished or been dropped
pub struct TerminationSignal {
    rx: oneshot::Receiver<Termination>,
}

impl TerminationSignal {
    /// Must not be polled again once it has resolved
    pub async fn wait(&mut self) -> Termination {
        (&mut self.rx).await.unwrap_or(Termination::Cancelled)
    }
}

/// Wrap a session's event receiver for delivery
pub fn publish(events: mpsc::Receiver<Event>) -> (EventStream, TerminationSignal) {
    let (tx, rx) = oneshot::channel();
    (
        EventStream {
            events,
            done: Some(tx),
        },
        TerminationSignal { rx },
    )
}

impl EventStream {
    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(Termination::Finished);
        }
    }
}

impl Stream for EventStream {
    type Item = Result<Vec<u8>, serde_json::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                tracing::trace!(?event, "Publishing event");
                Poll::Ready(Some(encode_event(&event)))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(Termination::Cancelled);
        }
    }
}
