//! # Summary
//!
//! This module defines the `Learner`, which collects decisions and hands
//! decided values to the application strictly in instance order. Whenever a
//! decision reveals instances it has not heard of, it asks the proposers for
//! every decision it is missing before delivering anything further.

use hashbrown::HashMap as Map;

use crate::internal;
use crate::message::{DecisionQuery, InstanceQuery, Message, Out, Phase};
use crate::network::Role;
use crate::state::{Decree, Handler, Instance, Value};

/// Value handed to the application, tagged with its instance.
pub type Delivery<V> = (Instance, V);

pub struct Learner<V: Value> {
    /// Unique ID of learner
    id: usize,

    /// Decided decrees
    states: Map<Instance, Decree<V>>,

    /// Highest instance known to exist
    num_instance: Option<Instance>,

    /// Highest instance handed to the application
    last_delivered: Option<Instance>,

    /// Whether every instance up to `num_instance` is known
    can_deliver: bool,

    /// Outgoing messages
    tx: internal::Tx<Out<V>>,

    /// Application output
    sink: internal::Tx<Delivery<V>>,
}

impl<V: Value> Learner<V> {
    pub fn new(id: usize, tx: internal::Tx<Out<V>>, sink: internal::Tx<Delivery<V>>) -> Self {
        Learner {
            id,
            states: Map::default(),
            num_instance: None,
            last_delivered: None,
            can_deliver: false,
            tx,
            sink,
        }
    }

    /// Asks the acceptors how many instances exist.
    pub fn start(&self) {
        info!("starting learner {}", self.id);
        let request = InstanceQuery::Request { role: Role::Learners };
        self.tx.send((Role::Acceptors, Message::control(Phase::CatchUpInstance(request))));
    }

    pub fn num_instance(&self) -> Option<Instance> {
        self.num_instance
    }

    pub fn last_delivered(&self) -> Option<Instance> {
        self.last_delivered
    }

    pub fn can_deliver(&self) -> bool {
        self.can_deliver
    }

    pub fn decision(&self, instance: Instance) -> Option<&Decree<V>> {
        self.states.get(&instance)
    }

    fn next_undelivered(&self) -> Instance {
        self.last_delivered.map_or(0, |last| last + 1)
    }

    fn raise(&mut self, instance: Option<Instance>) {
        self.num_instance = std::cmp::max(self.num_instance, instance);
    }

    fn respond_decision(&mut self, instance: Instance, v_val: Decree<V>) {
        self.raise(Some(instance));
        self.states.entry(instance).or_insert(v_val);
        self.control();
    }

    /// Delivers if no instance up to `num_instance` is missing,
    /// and otherwise asks the proposers for the missing decisions.
    fn control(&mut self) {
        let last = match self.num_instance {
        | Some(last) => last,
        | None => return,
        };
        let from = self.next_undelivered();
        let missing = (from..=last).find(|instance| !self.states.contains_key(instance));
        self.can_deliver = missing.is_none();
        match missing {
        | None => self.deliver(),
        | Some(gap) => {
            debug!("learner {} missing instance {}, catching up from {}", self.id, gap, from);
            let request = DecisionQuery::Request { from };
            self.tx.send((Role::Proposers, Message::control(Phase::CatchUpLearners(request))));
        }
        }
    }

    /// Hands every contiguous decided value after `last_delivered` to the
    /// application. Stops at the first instance without a decision.
    fn deliver(&mut self) {
        if !self.can_deliver {
            return
        }
        let mut next = self.next_undelivered();
        while let Some(decree) = self.states.get(&next) {
            match decree {
            | Decree::Value(value) => {
                info!("delivering instance {}: {:?}", next, value);
                self.sink.send((next, value.clone()));
            }
            | Decree::Noop => debug!("skipping no-op instance {}", next),
            }
            self.last_delivered = Some(next);
            next += 1;
        }
    }

    fn respond_instance_catch_up(&mut self, num_instance: Option<Instance>) {
        if num_instance <= self.num_instance {
            return
        }
        if self.num_instance.is_none() {
            debug!("learner {} starting at instance {:?}", self.id, num_instance);
            self.num_instance = num_instance;
            self.control();
        } else {
            self.raise(num_instance);
        }
    }

    fn respond_decisions(&mut self, decisions: Vec<(Instance, Decree<V>)>) {
        let mut installed = 0;
        for (instance, v_val) in decisions {
            self.raise(Some(instance));
            if !self.states.contains_key(&instance) {
                self.states.insert(instance, v_val);
                installed += 1;
            }
        }
        if installed > 0 {
            debug!("learner {} installed {} decisions", self.id, installed);
            self.control();
        }
    }
}

impl<V: Value> Handler<V> for Learner<V> {
    fn respond(&mut self, message: Message<V>) {
        trace!("received {:?}", message);
        match (message.instance, message.phase) {
        | (Some(instance), Phase::Decision { v_val, .. }) => self.respond_decision(instance, v_val),
        | (_, Phase::CatchUpInstance(InstanceQuery::Reply { num_instance, .. })) => self.respond_instance_catch_up(num_instance),
        | (_, Phase::CatchUpLearners(DecisionQuery::Reply { decisions })) => self.respond_decisions(decisions),
        | (_, phase) => trace!("ignoring {:?}", phase),
        }
    }
}
