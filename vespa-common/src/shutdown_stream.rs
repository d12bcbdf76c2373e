// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! A module to simplify selecting between a shutdown signal and a stream.
//!
//! The `ShutdownStream` type can be used to replace this pattern:
//! ```ignore
//! loop {
//!     select! {
//!         _ = shutdown => break,
//!         item = stream.next() => { /* actual logic */ },
//!     }
//! }
//! ```
//! by this one:
//! ```ignore
//! let mut shutdown_stream = ShutdownStream::new(shutdown, stream);
//!
//! while let Some(item) = shutdown_stream.next().await {
//!     /* actual logic */
//! }
//! ```

use futures::{
    channel::oneshot,
    future::{self, FusedFuture},
    stream::{self, FusedStream},
    task::{Context, Poll},
    FutureExt, Stream, StreamExt,
};

use std::{marker::Unpin, pin::Pin};

/// A stream that ends when the wrapped shutdown receiver is triggered or when
/// the wrapped stream ends, whichever happens first.
pub struct ShutdownStream<S> {
    shutdown: future::Fuse<oneshot::Receiver<()>>,
    stream: S,
}

impl<S: Stream> ShutdownStream<stream::Fuse<S>> {
    /// Creates a new `ShutdownStream` from a shutdown receiver and an unfused stream.
    ///
    /// Both the stream and the shutdown receiver are fused to avoid polling already
    /// completed futures.
    pub fn new(shutdown: oneshot::Receiver<()>, stream: S) -> Self {
        Self {
            shutdown: shutdown.fuse(),
            stream: stream.fuse(),
        }
    }
}

impl<S: Stream<Item = T> + FusedStream + Unpin, T> Stream for ShutdownStream<S> {
    type Item = T;

    /// The shutdown receiver is polled first so that checking for shutdown always
    /// happens before producing the next item.
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        if !self.shutdown.is_terminated() {
            if self.shutdown.poll_unpin(cx).is_ready() {
                return Poll::Ready(None);
            }

            if !self.stream.is_terminated() {
                return self.stream.poll_next_unpin(cx);
            }
        }

        Poll::Ready(None)
    }
}

impl<S: Stream<Item = T> + FusedStream + Unpin, T> FusedStream for ShutdownStream<S> {
    fn is_terminated(&self) -> bool {
        self.shutdown.is_terminated() && self.stream.is_terminated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::stream;

    #[tokio::test]
    async fn ends_on_shutdown() {
        let (sender, receiver) = oneshot::channel();
        let mut stream = ShutdownStream::new(receiver, stream::repeat(42));

        assert_eq!(stream.next().await, Some(42));

        sender.send(()).unwrap();

        assert_eq!(stream.next().await, None);
    }
}
