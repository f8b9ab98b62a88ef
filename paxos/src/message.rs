//! # Summary
//!
//! Wire format shared by every role. A message is a tagged record
//! `{"instance": .., "phase": .., "data": {..}}` encoded as one JSON
//! document per datagram. `instance` is `null` for control messages that
//! are not tied to a single instance.

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::network::Role;
use crate::state::{Decree, Instance, Round};

/// Message addressed to every member of a role group.
pub type Out<V> = (Role, Message<V>);

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message<V> {
    pub instance: Option<Instance>,

    #[serde(flatten)]
    pub phase: Phase<V>,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[serde(tag = "phase", content = "data")]
pub enum Phase<V> {
    /// Client value awaiting an instance, or with an instance and no value,
    /// a request for the decision of that instance
    #[serde(rename = "REQUEST")]
    Request { v: Option<V> },

    #[serde(rename = "PHASE_1A")]
    P1A { c_rnd: Round },

    #[serde(rename = "PHASE_1B")]
    P1B {
        a_id: usize,
        rnd: Round,
        v_rnd: Round,
        v_val: Option<Decree<V>>,
    },

    #[serde(rename = "PHASE_2A")]
    P2A { c_rnd: Round, c_val: Decree<V> },

    #[serde(rename = "PHASE_2B")]
    P2B {
        a_id: usize,
        v_rnd: Round,
        v_val: Decree<V>,
    },

    #[serde(rename = "DECISION")]
    Decision { c_rnd: Round, v_val: Decree<V> },

    /// Leader heartbeat
    #[serde(rename = "leader_sender")]
    LeaderSender { p_id: usize },

    #[serde(rename = "catch_up_instance")]
    CatchUpInstance(InstanceQuery),

    #[serde(rename = "catch_up_learners")]
    CatchUpLearners(DecisionQuery<V>),
}

/// Highest instance number known to the acceptors.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstanceQuery {
    /// Sent to acceptors; the reply goes to `role`
    Request { role: Role },
    Reply { a_id: usize, num_instance: Option<Instance> },
}

/// Decided values known to the proposers.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionQuery<V> {
    /// Sent by a learner missing decisions at or above `from`
    Request { from: Instance },
    Reply { decisions: Vec<(Instance, Decree<V>)> },
}

impl<V> Message<V> {
    pub fn new(instance: Option<Instance>, phase: Phase<V>) -> Self {
        Message { instance, phase }
    }

    /// Instance-independent control message.
    pub fn control(phase: Phase<V>) -> Self {
        Message { instance: None, phase }
    }
}

impl<V: serde::Serialize> Message<V> {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<V: serde::de::DeserializeOwned> Message<V> {
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
