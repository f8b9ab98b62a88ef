//! # Summary
//!
//! This module defines the client driver, which submits values to the
//! proposer group. Submission is fire-and-forget: the protocol never
//! acknowledges a value, so a client that wants one learns of it through a
//! learner's output.

use std::marker::PhantomData;
use std::time::Duration;

use crate::error::Error;
use crate::message::{Message, Phase};
use crate::network::Role;
use crate::socket;
use crate::state::Value;

pub struct Client<V> {
    tx: socket::Tx,

    /// Upper bound on a single send
    timeout: Duration,

    _marker: PhantomData<V>,
}

impl<V: Value> Client<V> {
    pub(crate) fn new(tx: socket::Tx, timeout: Duration) -> Self {
        Client {
            tx,
            timeout,
            _marker: PhantomData,
        }
    }

    /// Sends `v` to every proposer as a request awaiting an instance.
    pub async fn propose(&self, v: V) -> Result<(), Error> {
        debug!("proposing {:?}", v);
        let request = Message::control(Phase::Request { v: Some(v) });
        tokio::time::timeout(self.timeout, self.tx.send(Role::Proposers, &request)).await?
    }
}
