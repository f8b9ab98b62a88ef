//! # Summary
//!
//! This module contains the asynchronous tasks that surround a role's state
//! machine. The receive loop feeds inbound datagrams to the role, the
//! forwarder drains the role's outgoing channel onto the network, and
//! proposers additionally run a heartbeat and a leader listener on timers.
//!
//! Handlers never await: every task takes the role's lock, runs one
//! handler to completion and releases it before its next suspension point.

use std::time::{Duration, Instant};

use futures::StreamExt;
use rand::Rng;

use crate::error::Error;
use crate::internal;
use crate::message::Out;
use crate::proposer::Proposer;
use crate::shared::Shared;
use crate::socket;
use crate::state::{Handler, Value};

/// Sends everything the role queues until every transmitter is dropped.
pub async fn forward<V: Value>(mut rx: internal::Rx<Out<V>>, tx: socket::Tx) {
    while let Some((role, message)) = rx.next().await {
        if let Err(error) = tx.send(role, &message).await {
            warn!("failed to send {:?} to {}: {}", message.phase, role, error);
        }
    }
    debug!("outgoing channel closed");
}

/// Hands every decodable datagram to the role. Returns only on socket failure.
pub async fn serve<V, H>(mut rx: socket::Rx<V>, shared: Shared<H>) -> Result<(), Error>
where V: Value,
      H: Handler<V>,
{
    loop {
        let received = rx.recv().await;
        match received {
        | Ok(message) => shared.lock().respond(message),
        | Err(Error::Codec(error)) => warn!("dropping malformed datagram: {}", error),
        | Err(error) => return Err(error),
        }
    }
}

/// Announces leadership every `period` while the proposer is leader.
pub async fn heartbeat<V: Value>(shared: Shared<Proposer<V>>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        shared.lock().send_heartbeat();
    }
}

/// Checks for a silent leader every `period`. The first check is delayed by
/// a random fraction of the period so that followers started together do
/// not all take over at once.
pub async fn listen<V: Value>(shared: Shared<Proposer<V>>, period: Duration) {
    let jitter = rand::thread_rng().gen_range(0..=period.as_millis() as u64 / 2);
    let start = tokio::time::Instant::now() + period + Duration::from_millis(jitter);
    let mut interval = tokio::time::interval_at(start, period);
    loop {
        interval.tick().await;
        shared.lock().check_leader(Instant::now());
    }
}
