//! # Summary
//!
//! This module wires a role's state machine to the network. A `Config`
//! collects the process identity, the membership table and the tuning
//! knobs, and its terminal methods bind the sockets, spawn the surrounding
//! tasks and run the role until its socket fails.

use std::marker::PhantomData;
use std::time::Duration;

use futures::StreamExt;

use crate::acceptor::Acceptor;
use crate::client::Client;
use crate::error::Error;
use crate::internal;
use crate::learner::Learner;
use crate::message::Out;
use crate::network::{Network, Role};
use crate::proposer::{Proposer, ROUND_STRIDE};
use crate::shared::Shared;
use crate::socket;
use crate::state::{Handler, Instance, Round, Value};
use crate::thread;

#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct Config<V> {
    /// Unique ID within the role
    id: usize,

    /// Group address of every role
    network: Network,

    /// Total number of acceptors
    acceptors: usize,

    /// Whether a proposer starts as leader
    leader: bool,

    /// Period between leader heartbeats
    heartbeat_interval: Duration,

    /// Heartbeat silence after which a follower takes over
    listener_interval: Duration,

    /// Upper bound on a single client send
    send_timeout: Duration,

    #[derivative(Debug = "ignore")]
    _marker: PhantomData<V>,
}

impl<V: Value> Config<V> {
    pub fn new(id: usize, network: Network) -> Self {
        Config {
            id,
            acceptors: network.acceptors(),
            network,
            leader: id == 0,
            heartbeat_interval: Duration::from_millis(500),
            listener_interval: Duration::from_secs(2),
            send_timeout: Duration::from_millis(100),
            _marker: PhantomData,
        }
    }

    pub fn with_acceptors(mut self, acceptors: usize) -> Self {
        self.acceptors = acceptors;
        self
    }

    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    pub fn with_heartbeat(mut self, sender: Duration, listener: Duration) -> Self {
        self.heartbeat_interval = sender;
        self.listener_interval = listener;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Binds the receiving socket of `role` and spawns the outgoing forwarder.
    fn connect(&self, role: Role) -> Result<(socket::Rx<V>, internal::Tx<Out<V>>), Error> {
        let rx = socket::Rx::bind(self.network.group(role)?)?;
        let tx = socket::Tx::bind(self.network.clone())?;
        let (outgoing, sender) = internal::new();
        tokio::spawn(thread::forward(outgoing, tx));
        Ok((rx, sender))
    }

    async fn serve<H>(rx: socket::Rx<V>, shared: Shared<H>) -> Result<(), Error>
    where H: Handler<V>,
    {
        let result = thread::serve(rx, shared).await;
        if let Err(error) = &result {
            error!("receive loop failed: {}", error);
        }
        result
    }

    pub async fn acceptor(self) -> Result<(), Error> {
        let (rx, tx) = self.connect(Role::Acceptors)?;
        info!("starting acceptor {}", self.id);
        let acceptor = Shared::new(Acceptor::new(self.id, tx));
        Self::serve(rx, acceptor).await
    }

    pub async fn proposer(self) -> Result<(), Error> {
        if self.id as Round >= ROUND_STRIDE {
            return Err(Error::InvalidId { id: self.id, max: ROUND_STRIDE as usize })
        }
        let (rx, tx) = self.connect(Role::Proposers)?;
        let proposer = Proposer::new(self.id, self.acceptors, tx)
            .with_leader(self.leader)
            .with_listener_interval(self.listener_interval);
        let proposer = Shared::new(proposer);
        tokio::spawn(thread::heartbeat(proposer.clone(), self.heartbeat_interval));
        tokio::spawn(thread::listen(proposer.clone(), self.listener_interval));
        proposer.lock().start();
        Self::serve(rx, proposer).await
    }

    /// Runs a learner, calling `sink` once per delivered value in instance order.
    pub async fn learner<F>(self, mut sink: F) -> Result<(), Error>
    where F: FnMut(Instance, V) + Send + 'static,
    {
        let (rx, tx) = self.connect(Role::Learners)?;
        let (mut delivered, output) = internal::new();
        tokio::spawn(async move {
            while let Some((instance, value)) = delivered.next().await {
                sink(instance, value);
            }
        });
        let learner = Shared::new(Learner::new(self.id, tx, output));
        learner.lock().start();
        Self::serve(rx, learner).await
    }

    /// Opens a client handle. Must be called within a tokio runtime.
    pub fn client(self) -> Result<Client<V>, Error> {
        info!("starting client {}", self.id);
        let tx = socket::Tx::bind(self.network)?;
        Ok(Client::new(tx, self.send_timeout))
    }
}
