//! # Summary
//!
//! This module defines the `Proposer`, which drives each instance through
//! phases 1A, 2A and the decision, elects a leader among proposers by
//! heartbeat, and catches up on instance numbering and decisions it missed.
//!
//! Every proposer assigns instance numbers to client values, but only a
//! proposer that believes itself leader and has caught up on instance
//! numbering sends phase messages. Leadership is not exclusive: two
//! proposers may drive the same instance at once, and acceptor round
//! comparison alone keeps the decided value unique.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hashbrown::HashMap as Map;

use crate::internal;
use crate::message::{DecisionQuery, InstanceQuery, Message, Out, Phase};
use crate::network::Role;
use crate::quorum;
use crate::state::{Decree, Handler, Instance, Proposing, Round, Value};

/// Rounds are `k * ROUND_STRIDE + id`, so proposer ids must stay below it.
pub const ROUND_STRIDE: Round = 1000;

/// Maximum number of decisions per catch-up reply datagram.
pub const CATCH_UP_CHUNK: usize = 128;

pub struct Proposer<V: Value> {
    /// Unique ID of proposer
    id: usize,

    /// Acceptor majority
    quorum: usize,

    /// Per-instance bookkeeping
    states: Map<Instance, Proposing<V>>,

    /// Highest instance number assigned or heard of
    num_instance: Option<Instance>,

    /// Whether a majority of acceptors reported their instance numbering
    instance_updated: bool,

    /// Acceptors that answered instance catch-up
    catch_up: quorum::Votes,

    /// Client values received before instance catch-up completed
    pending: VecDeque<V>,

    /// Whether this proposer believes itself leader
    leader: bool,

    /// Receipt time of the last heartbeat
    last_heartbeat: Instant,

    /// Silence after which a follower promotes itself
    listener_interval: Duration,

    /// Outgoing messages
    tx: internal::Tx<Out<V>>,
}

impl<V: Value> Proposer<V> {
    pub fn new(id: usize, acceptors: usize, tx: internal::Tx<Out<V>>) -> Self {
        Proposer {
            id,
            quorum: quorum::size(acceptors),
            states: Map::default(),
            num_instance: None,
            instance_updated: false,
            catch_up: quorum::Votes::default(),
            pending: VecDeque::new(),
            leader: false,
            last_heartbeat: Instant::now(),
            listener_interval: Duration::from_secs(2),
            tx,
        }
    }

    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    pub fn with_listener_interval(mut self, interval: Duration) -> Self {
        self.listener_interval = interval;
        self
    }

    /// Asks the acceptors for their instance numbering.
    pub fn start(&mut self) {
        info!("starting proposer {} (leader: {})", self.id, self.leader);
        self.send_catch_up();
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub fn is_updated(&self) -> bool {
        self.instance_updated
    }

    pub fn num_instance(&self) -> Option<Instance> {
        self.num_instance
    }

    pub fn state(&self, instance: Instance) -> Option<&Proposing<V>> {
        self.states.get(&instance)
    }

    /// Decree known to be chosen for `instance`.
    pub fn decision(&self, instance: Instance) -> Option<&Decree<V>> {
        self.states.get(&instance).and_then(Proposing::decision)
    }

    /// Broadcasts a heartbeat if leader.
    pub fn send_heartbeat(&self) {
        if self.leader {
            trace!("sending heartbeat from {}", self.id);
            let heartbeat = Phase::LeaderSender { p_id: self.id };
            self.tx.send((Role::Proposers, Message::control(heartbeat)));
        }
    }

    /// Promotes this proposer if no heartbeat arrived for a full listener interval.
    pub fn check_leader(&mut self, now: Instant) {
        if self.leader || now.saturating_duration_since(self.last_heartbeat) <= self.listener_interval {
            return
        }
        info!("proposer {} heard no leader for {:?}, taking over", self.id, self.listener_interval);
        self.leader = true;
        self.send_catch_up();
        if self.instance_updated {
            let mut undecided = self.states.iter()
                .filter(|(_, state)| !state.decided)
                .map(|(instance, _)| *instance)
                .collect::<Vec<_>>();
            undecided.sort_unstable();
            for instance in undecided {
                self.drive(instance);
            }
        }
    }

    fn respond_heartbeat(&mut self, p_id: usize, now: Instant) {
        self.last_heartbeat = now;
        if p_id > self.id && self.leader {
            info!("proposer {} yields leadership to {}", self.id, p_id);
            self.leader = false;
        }
    }

    fn send_catch_up(&self) {
        let request = InstanceQuery::Request { role: Role::Proposers };
        self.tx.send((Role::Acceptors, Message::control(Phase::CatchUpInstance(request))));
    }

    fn next_round(&self, c_rnd: Round) -> Round {
        (c_rnd / ROUND_STRIDE + 1) * ROUND_STRIDE + self.id as Round
    }

    fn raise(&mut self, instance: Option<Instance>) {
        self.num_instance = std::cmp::max(self.num_instance, instance);
    }

    fn respond_request(&mut self, instance: Option<Instance>, v: Option<V>) {
        match (instance, v) {
        | (None, Some(v)) if !self.instance_updated => {
            debug!("queueing {:?} until instance catch-up completes", v);
            self.pending.push_back(v);
            self.send_catch_up();
        }
        | (None, Some(v)) => self.propose(v),
        | (Some(instance), v) => self.respond_fill(instance, v),
        | (None, None) => warn!("dropping request without instance or value"),
        }
    }

    /// Assigns the next instance to a client value.
    fn propose(&mut self, v: V) {
        let instance = self.num_instance.map_or(0, |n| n + 1);
        self.num_instance = Some(instance);
        debug!("assigning {:?} to instance {}", v, instance);
        self.states.entry(instance).or_default().v = Some(v);
        if self.leader {
            self.drive(instance);
        }
    }

    /// Re-announces a known decision, or as leader, drives the instance in
    /// a fresh round so that a value chosen in the past is recovered or a
    /// no-op fills it. A round already in progress is abandoned.
    fn respond_fill(&mut self, instance: Instance, v: Option<V>) {
        self.raise(Some(instance));
        if self.decision(instance).is_some() {
            self.announce(instance);
            return
        }
        if !self.leader || !self.instance_updated {
            return
        }
        let state = self.states.entry(instance).or_default();
        if state.v.is_none() {
            state.v = v;
        }
        self.drive(instance);
    }

    /// Starts phase 1 for `instance` in a fresh round.
    fn drive(&mut self, instance: Instance) {
        let c_rnd = self.next_round(self.states.get(&instance).map_or(0, |state| state.c_rnd));
        let state = self.states.entry(instance).or_default();
        if state.decided {
            return
        }
        state.c_rnd = c_rnd;
        state.c_val = None;
        state.max_v_rnd = 0;
        state.max_v_val = None;
        state.quorum_1b.clear();
        state.quorum_2b.clear();
        state.driving = true;
        debug!("driving instance {} in round {}", instance, c_rnd);
        self.tx.send((Role::Acceptors, Message::new(Some(instance), Phase::P1A { c_rnd })));
    }

    fn respond_p1b(&mut self, instance: Instance, a_id: usize, rnd: Round, v_rnd: Round, v_val: Option<Decree<V>>) {
        let quorum = self.quorum;
        let state = match self.states.get_mut(&instance) {
        | Some(state) if state.driving && !state.decided && rnd == state.c_rnd => state,
        | _ => {
            trace!("ignoring promise for round {} of instance {}", rnd, instance);
            return
        }
        };
        if let Some(v_val) = v_val {
            if v_rnd > state.max_v_rnd {
                state.max_v_rnd = v_rnd;
                state.max_v_val = Some(v_val);
            }
        }
        if !state.quorum_1b.vote(rnd, a_id, quorum) {
            return
        }
        let c_val = state.max_v_val
            .clone()
            .unwrap_or_else(|| Decree::from(state.v.clone()));
        debug!("round {} of instance {} promised, proposing {:?}", rnd, instance, c_val);
        state.c_val = Some(c_val.clone());
        let p2a = Phase::P2A { c_rnd: rnd, c_val };
        self.tx.send((Role::Acceptors, Message::new(Some(instance), p2a)));
    }

    fn respond_p2b(&mut self, instance: Instance, a_id: usize, v_rnd: Round) {
        let quorum = self.quorum;
        let state = match self.states.get_mut(&instance) {
        | Some(state) if state.driving && !state.decided && v_rnd == state.c_rnd => state,
        | _ => {
            trace!("ignoring vote for round {} of instance {}", v_rnd, instance);
            return
        }
        };
        if !state.quorum_2b.vote(v_rnd, a_id, quorum) {
            return
        }
        let c_val = match state.c_val.clone() {
        | Some(c_val) => c_val,
        | None => return,
        };
        self.learn(instance, v_rnd, c_val);
        self.announce(instance);
    }

    fn respond_decision(&mut self, instance: Instance, c_rnd: Round, v_val: Decree<V>) {
        self.raise(Some(instance));
        match self.states.get_mut(&instance) {
        | Some(state) if state.decided => {
            state.c_rnd = c_rnd;
            state.c_val = Some(v_val);
        }
        | _ => self.learn(instance, c_rnd, v_val),
        }
    }

    /// Records a chosen decree. A leader whose own client value lost the
    /// instance proposes it again in a new one.
    fn learn(&mut self, instance: Instance, c_rnd: Round, v_val: Decree<V>) {
        info!("instance {} decided {:?}", instance, v_val);
        let state = self.states.entry(instance).or_default();
        let lost = match &state.v {
        | Some(v) => v_val.value() != Some(v),
        | None => false,
        };
        state.c_rnd = c_rnd;
        state.c_val = Some(v_val);
        state.decided = true;
        state.driving = false;
        if lost && self.leader {
            if let Some(v) = state.v.take() {
                debug!("instance {} chose another value, proposing {:?} again", instance, v);
                self.respond_request(None, Some(v));
            }
        }
    }

    /// Sends the decision for `instance` to learners and proposers.
    fn announce(&self, instance: Instance) {
        let state = match self.states.get(&instance) {
        | Some(state) => state,
        | None => return,
        };
        if let Some(v_val) = state.decision() {
            let decision = Message::new(Some(instance), Phase::Decision {
                c_rnd: state.c_rnd,
                v_val: v_val.clone(),
            });
            self.tx.send((Role::Learners, decision.clone()));
            self.tx.send((Role::Proposers, decision));
        }
    }

    fn respond_catch_up(&mut self, a_id: usize, num_instance: Option<Instance>) {
        self.raise(num_instance);
        if !self.instance_updated {
            if !self.catch_up.vote(0, a_id, self.quorum) {
                return
            }
            info!("proposer {} caught up to instance {:?}", self.id, self.num_instance);
            self.instance_updated = true;
        }
        self.sweep();
        while let Some(v) = self.pending.pop_front() {
            self.propose(v);
        }
    }

    /// Requests the decision of every instance up to `num_instance` this
    /// proposer has never heard of.
    fn sweep(&self) {
        let last = match self.num_instance {
        | Some(last) => last,
        | None => return,
        };
        for instance in (0..=last).filter(|instance| !self.states.contains_key(instance)) {
            trace!("requesting decision of instance {}", instance);
            let request = Message::new(Some(instance), Phase::Request { v: None });
            self.tx.send((Role::Proposers, request));
        }
    }

    /// Sends learners every known decision from `from` on. A leader also
    /// re-drives each undecided instance up to `num_instance`.
    fn respond_learner_catch_up(&mut self, from: Instance) {
        let mut decisions = self.states.iter()
            .filter(|(instance, _)| **instance >= from)
            .filter_map(|(instance, state)| state.decision().map(|v_val| (*instance, v_val.clone())))
            .collect::<Vec<_>>();
        decisions.sort_unstable_by_key(|(instance, _)| *instance);
        debug!("sending {} decisions from instance {} to learners", decisions.len(), from);
        for chunk in decisions.chunks(CATCH_UP_CHUNK) {
            let reply = DecisionQuery::Reply { decisions: chunk.to_vec() };
            self.tx.send((Role::Learners, Message::control(Phase::CatchUpLearners(reply))));
        }
        let last = match self.num_instance {
        | Some(last) if self.leader && self.instance_updated => last,
        | _ => return,
        };
        for instance in from..=last {
            if self.decision(instance).is_none() {
                debug!("re-driving instance {} for learner catch-up", instance);
                self.drive(instance);
            }
        }
    }
}

impl<V: Value> Handler<V> for Proposer<V> {
    fn respond(&mut self, message: Message<V>) {
        trace!("received {:?}", message);
        match (message.instance, message.phase) {
        | (instance, Phase::Request { v }) => self.respond_request(instance, v),
        | (Some(instance), Phase::P1B { a_id, rnd, v_rnd, v_val }) => self.respond_p1b(instance, a_id, rnd, v_rnd, v_val),
        | (Some(instance), Phase::P2B { a_id, v_rnd, .. }) => self.respond_p2b(instance, a_id, v_rnd),
        | (Some(instance), Phase::Decision { c_rnd, v_val }) => self.respond_decision(instance, c_rnd, v_val),
        | (_, Phase::LeaderSender { p_id }) => self.respond_heartbeat(p_id, Instant::now()),
        | (_, Phase::CatchUpInstance(InstanceQuery::Reply { a_id, num_instance })) => self.respond_catch_up(a_id, num_instance),
        | (_, Phase::CatchUpLearners(DecisionQuery::Request { from })) => self.respond_learner_catch_up(from),
        | (_, phase) => trace!("ignoring {:?}", phase),
        }
    }
}
