//! # Summary
//!
//! This module abstracts over internal connections between a role's state
//! machine and the tasks that own its sockets and output sinks.
//!
//! Currently backed by `futures::channel::mpsc`: multiple-producer
//! single-consumer channels. Since the channels are unbounded, handlers can
//! push outgoing messages while holding the role's lock without ever waiting.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::Stream;

/// Intra-process receiving channel.
#[derive(Debug)]
pub struct Rx<T>(mpsc::UnboundedReceiver<T>);

/// Intra-process transmission channel. All clones send to the same receiving end.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
#[derive(Debug)]
pub struct Tx<T>(mpsc::UnboundedSender<T>);

/// Create a new pair of linked receiving and transmitting channels.
pub fn new<T>() -> (Rx<T>, Tx<T>) {
    let (tx, rx) = mpsc::unbounded();
    (Rx(rx), Tx(tx))
}

impl<T> Tx<T> {
    /// Sends a message through the channel.
    /// Does nothing if the receiving end has been dropped, which only
    /// happens while the process is shutting down.
    pub fn send(&self, message: T) {
        self.0.unbounded_send(message).ok();
    }
}

impl<T> Rx<T> {
    /// Takes every message currently buffered without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut messages = Vec::new();
        while let Ok(Some(message)) = self.0.try_next() {
            messages.push(message);
        }
        messages
    }
}

impl<T> Stream for Rx<T> {
    type Item = T;

    #[inline]
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0).poll_next(cx)
    }
}
