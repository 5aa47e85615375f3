//! The per-batch result channel.
//!
//! Runners write through cloned [`ResultSink`]s; the consumer reads the
//! single [`ResultStream`]. The channel is bounded, so a runner suspends
//! while the consumer lags. Closing or dropping the stream is the only
//! cancellation signal.

use crate::envelope::Envelope;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// The consumer closed the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("result stream closed by consumer")]
pub struct SinkClosed;

/// Creates a result channel. A capacity of zero is raised to one.
pub fn channel(capacity: usize) -> (ResultSink, ResultStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ResultSink { tx }, ResultStream { rx })
}

/// A stream that yields `envelope` and ends.
pub(crate) fn single(envelope: Envelope) -> ResultStream {
    let (sink, stream) = channel(1);
    // A fresh channel of capacity one always has room for one envelope.
    let _ = sink.tx.try_send(envelope);
    stream
}

/// The writing half of a result channel.
#[derive(Debug, Clone)]
pub struct ResultSink {
    tx: mpsc::Sender<Envelope>,
}

impl ResultSink {
    /// Writes an envelope, suspending while the channel is full.
    pub async fn write(&self, envelope: Envelope) -> Result<(), SinkClosed> {
        self.tx.send(envelope).await.map_err(|_| SinkClosed)
    }

    /// Waits until the channel has room for one envelope. The room is not
    /// kept: other writers may take it before the caller writes.
    pub async fn ready(&self) -> Result<(), SinkClosed> {
        let permit = self.tx.reserve().await.map_err(|_| SinkClosed)?;
        drop(permit);
        Ok(())
    }

    /// Resolves once the consumer has closed or dropped the stream.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The reading half of a result channel.
///
/// Ends once every runner of the batch has terminated.
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::Receiver<Envelope>,
}

impl ResultStream {
    /// Closes the stream. Running subscriptions stop and release their
    /// producers; envelopes already buffered can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Receives the next envelope.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

impl Stream for ResultStream {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        self.rx.poll_recv(cx)
    }
}
