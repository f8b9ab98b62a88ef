//! # Summary
//!
//! This module defines the `Acceptor`, which acts as Paxos's distributed
//! memory. Acceptors keep track of the highest round promised and the last
//! vote cast for each instance, and answer catch-up queries with the highest
//! instance number they have seen.

use hashbrown::HashMap as Map;

use crate::internal;
use crate::message::{InstanceQuery, Message, Out, Phase};
use crate::network::Role;
use crate::state::{Accepting, Decree, Handler, Instance, Round, Value};

pub struct Acceptor<V: Value> {
    /// Unique ID of acceptor
    id: usize,

    /// Per-instance memory
    states: Map<Instance, Accepting<V>>,

    /// Highest instance referenced by any message
    num_instance: Option<Instance>,

    /// Outgoing messages
    tx: internal::Tx<Out<V>>,
}

impl<V: Value> Acceptor<V> {
    pub fn new(id: usize, tx: internal::Tx<Out<V>>) -> Self {
        Acceptor {
            id,
            states: Map::default(),
            num_instance: None,
            tx,
        }
    }

    pub fn num_instance(&self) -> Option<Instance> {
        self.num_instance
    }

    pub fn state(&self, instance: Instance) -> Option<&Accepting<V>> {
        self.states.get(&instance)
    }

    /// Promises `c_rnd` if it is at least as high as any round seen,
    /// and reports the last vote. Lower rounds are dropped silently.
    fn respond_p1a(&mut self, instance: Instance, c_rnd: Round) {
        let state = self.states.entry(instance).or_default();
        if c_rnd < state.rnd {
            debug!("rejecting round {} for instance {}, promised {}", c_rnd, instance, state.rnd);
            return
        }
        state.rnd = c_rnd;
        let p1b = Phase::P1B {
            a_id: self.id,
            rnd: state.rnd,
            v_rnd: state.v_rnd,
            v_val: state.v_val.clone(),
        };
        self.tx.send((Role::Proposers, Message::new(Some(instance), p1b)));
    }

    /// Votes for `c_val` in `c_rnd` unless a higher round was promised.
    fn respond_p2a(&mut self, instance: Instance, c_rnd: Round, c_val: Decree<V>) {
        let state = self.states.entry(instance).or_default();
        if c_rnd < state.rnd {
            debug!("refusing vote in round {} for instance {}, promised {}", c_rnd, instance, state.rnd);
            return
        }
        state.rnd = c_rnd;
        state.v_rnd = c_rnd;
        state.v_val = Some(c_val.clone());
        let p2b = Phase::P2B {
            a_id: self.id,
            v_rnd: c_rnd,
            v_val: c_val,
        };
        self.tx.send((Role::Proposers, Message::new(Some(instance), p2b)));
    }

    fn respond_catch_up(&self, role: Role) {
        let reply = InstanceQuery::Reply {
            a_id: self.id,
            num_instance: self.num_instance,
        };
        self.tx.send((role, Message::control(Phase::CatchUpInstance(reply))));
    }
}

impl<V: Value> Handler<V> for Acceptor<V> {
    fn respond(&mut self, message: Message<V>) {
        trace!("received {:?}", message);
        if let Some(instance) = message.instance {
            self.num_instance = std::cmp::max(self.num_instance, Some(instance));
        }
        match (message.instance, message.phase) {
        | (Some(instance), Phase::P1A { c_rnd }) => self.respond_p1a(instance, c_rnd),
        | (Some(instance), Phase::P2A { c_rnd, c_val }) => self.respond_p2a(instance, c_rnd, c_val),
        | (_, Phase::CatchUpInstance(InstanceQuery::Request { role })) => self.respond_catch_up(role),
        | (_, phase) => trace!("ignoring {:?}", phase),
        }
    }
}
