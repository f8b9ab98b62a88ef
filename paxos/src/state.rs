//! # Summary
//!
//! This module defines the values agreed upon by the protocol and the
//! per-instance records each role keeps. Records are created lazily the first
//! time an instance is referenced and are never removed.

use serde_derive::{Deserialize, Serialize};

use crate::message;
use crate::quorum;

/// Index of one independent run of Paxos.
pub type Instance = usize;

/// Ballot number used to order competing proposals for an instance.
pub type Round = u64;

/// Client-submitted value that can be replicated.
pub trait Value: std::fmt::Debug
    + std::marker::Unpin
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Clone
    + Eq
    + Send
    + Sync
    + 'static
{
}

impl<T> Value for T where T: std::fmt::Debug
    + std::marker::Unpin
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Clone
    + Eq
    + Send
    + Sync
    + 'static
{
}

/// Outcome of a single instance.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decree<V> {
    /// A client value
    Value(V),

    /// Filler for an instance nobody proposed a value for
    Noop,
}

impl<V> Decree<V> {
    pub fn value(&self) -> Option<&V> {
        match self {
        | Decree::Value(value) => Some(value),
        | Decree::Noop => None,
        }
    }
}

impl<V> From<Option<V>> for Decree<V> {
    fn from(value: Option<V>) -> Self {
        value.map(Decree::Value).unwrap_or(Decree::Noop)
    }
}

/// Handles one inbound message to completion.
pub trait Handler<V: Value> {
    fn respond(&mut self, message: message::Message<V>);
}

/// Proposer bookkeeping for one instance.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""))]
pub struct Proposing<V: Value> {
    /// Current round, unique to this proposer
    pub c_rnd: Round,

    /// Value sent in phase 2A for `c_rnd`
    pub c_val: Option<Decree<V>>,

    /// Value this proposer was asked to propose
    pub v: Option<V>,

    /// Highest vote round reported in phase 1B
    pub max_v_rnd: Round,

    /// Value voted in `max_v_rnd`
    pub max_v_val: Option<Decree<V>>,

    /// Acceptors that promised `c_rnd`
    pub quorum_1b: quorum::Votes,

    /// Acceptors that voted in `c_rnd`
    pub quorum_2b: quorum::Votes,

    /// Whether this proposer is running phases for `c_rnd`
    pub driving: bool,

    /// Whether `c_val` is known to be chosen
    pub decided: bool,
}

impl<V: Value> Proposing<V> {
    /// Decided decree, if any.
    pub fn decision(&self) -> Option<&Decree<V>> {
        if self.decided { self.c_val.as_ref() } else { None }
    }
}

/// Acceptor memory for one instance.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""))]
pub struct Accepting<V: Value> {
    /// Highest round promised
    pub rnd: Round,

    /// Round of the last vote, zero if never voted
    pub v_rnd: Round,

    /// Value of the last vote, `None` iff `v_rnd == 0`
    pub v_val: Option<Decree<V>>,
}
