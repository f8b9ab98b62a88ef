//! Whole-protocol tests over an in-memory network. A message sent to a
//! role reaches every live member of that role, the sender included, in
//! the order messages were sent.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use paxos::internal;
use paxos::{Acceptor, Decree, Delivery, Handler, Learner, Message, Out, Phase, Proposer, Role};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type V = String;

/// Upper bound on delivered messages before a run is considered stuck.
const MAX_STEPS: usize = 1_000_000;

struct Node<H> {
    handler: H,
    outbox: internal::Rx<Out<V>>,
    alive: bool,
}

impl<H> Node<H> {
    fn new(handler: H, outbox: internal::Rx<Out<V>>) -> Self {
        Node { handler, outbox, alive: true }
    }
}

fn broadcast<H: Handler<V>>(nodes: &mut [Node<H>], message: &Message<V>) {
    for node in nodes.iter_mut().filter(|node| node.alive) {
        node.handler.respond(message.clone());
    }
}

fn collect<H>(nodes: &mut [Node<H>], queue: &mut VecDeque<Out<V>>) {
    for node in nodes.iter_mut() {
        let sent = node.outbox.drain();
        if node.alive {
            queue.extend(sent);
        }
    }
}

struct Cluster {
    acceptors: Vec<Node<Acceptor<V>>>,
    proposers: Vec<Node<Proposer<V>>>,
    learners: Vec<Node<Learner<V>>>,
    sinks: Vec<internal::Rx<Delivery<V>>>,
    delivered: Vec<Vec<Delivery<V>>>,
    queue: VecDeque<Out<V>>,

    /// Returns true for messages the network loses
    drop: Box<dyn FnMut(&Out<V>) -> bool>,

    /// Duplicates messages with the given probability
    duplicate: Option<(StdRng, f64)>,

    /// Loses messages with the given probability
    loss: Option<(StdRng, f64)>,
}

impl Cluster {
    fn new(acceptors: usize) -> Self {
        let acceptors = (0..acceptors)
            .map(|id| {
                let (rx, tx) = internal::new();
                Node::new(Acceptor::new(id, tx), rx)
            })
            .collect();
        Cluster {
            acceptors,
            proposers: Vec::new(),
            learners: Vec::new(),
            sinks: Vec::new(),
            delivered: Vec::new(),
            queue: VecDeque::new(),
            drop: Box::new(|_| false),
            duplicate: None,
            loss: None,
        }
    }

    /// Standard deployment: acceptors, a leading proposer 0 and one learner.
    fn with(acceptors: usize, proposers: usize, learners: usize) -> Self {
        let mut cluster = Cluster::new(acceptors);
        for id in 0..proposers {
            cluster.add_proposer(id == 0);
        }
        for _ in 0..learners {
            cluster.add_learner();
        }
        cluster.run();
        cluster
    }

    fn add_proposer(&mut self, leader: bool) -> usize {
        let id = self.proposers.len();
        let (rx, tx) = internal::new();
        let mut proposer = Proposer::new(id, self.acceptors.len(), tx).with_leader(leader);
        proposer.start();
        self.proposers.push(Node::new(proposer, rx));
        id
    }

    fn add_learner(&mut self) -> usize {
        let id = self.learners.len();
        let (rx, tx) = internal::new();
        let (sink, output) = internal::new();
        let learner = Learner::new(id, tx, output);
        learner.start();
        self.learners.push(Node::new(learner, rx));
        self.sinks.push(sink);
        self.delivered.push(Vec::new());
        id
    }

    fn propose(&mut self, value: &str) {
        let request = Message::control(Phase::Request { v: Some(value.to_string()) });
        self.queue.push_back((Role::Proposers, request));
    }

    fn crash_proposer(&mut self, id: usize) {
        self.proposers[id].alive = false;
    }

    fn proposer(&mut self, id: usize) -> &mut Proposer<V> {
        &mut self.proposers[id].handler
    }

    fn collect(&mut self) {
        collect(&mut self.acceptors, &mut self.queue);
        collect(&mut self.proposers, &mut self.queue);
        collect(&mut self.learners, &mut self.queue);
    }

    /// Delivers the oldest message in flight. Returns false once the network is quiet.
    fn step(&mut self) -> bool {
        self.collect();
        let (role, message) = match self.queue.pop_front() {
        | Some(out) => out,
        | None => return false,
        };
        if (self.drop)(&(role, message.clone())) {
            return true
        }
        let lost = match (&mut self.loss, &message.phase) {
        | (_, Phase::Request { v: Some(_) }) => false,
        | (Some((rng, probability)), _) => rng.gen_bool(*probability),
        | (None, _) => false,
        };
        if lost {
            return true
        }
        let duplicate = match (&mut self.duplicate, &message.phase) {
        | (_, Phase::Request { v: Some(_) }) => false,
        | (Some((rng, probability)), _) => rng.gen_bool(*probability),
        | (None, _) => false,
        };
        let copies = if duplicate { 2 } else { 1 };
        for _ in 0..copies {
            match role {
            | Role::Acceptors => broadcast(&mut self.acceptors, &message),
            | Role::Proposers => broadcast(&mut self.proposers, &message),
            | Role::Learners => broadcast(&mut self.learners, &message),
            | Role::Clients => (),
            }
        }
        true
    }

    fn run(&mut self) {
        for _ in 0..MAX_STEPS {
            if !self.step() {
                return
            }
        }
        panic!("network never went quiet");
    }

    /// Runs until the next message in flight matches `stop`, without delivering it.
    fn run_until<F: Fn(&Out<V>) -> bool>(&mut self, stop: F) {
        for _ in 0..MAX_STEPS {
            self.collect();
            if self.queue.front().map_or(false, &stop) {
                return
            }
            assert!(self.step(), "network went quiet first");
        }
        panic!("network never went quiet");
    }

    fn deliveries(&mut self, learner: usize) -> &[Delivery<V>] {
        let sent = self.sinks[learner].drain();
        self.delivered[learner].extend(sent);
        &self.delivered[learner]
    }
}

/// Loses the first message matching `predicate` and nothing else.
fn drop_once<F>(predicate: F) -> Box<dyn FnMut(&Out<V>) -> bool>
where F: Fn(&Out<V>) -> bool + 'static,
{
    let mut dropped = false;
    Box::new(move |out: &Out<V>| {
        if dropped || !predicate(out) {
            return false
        }
        dropped = true;
        true
    })
}

fn values(expected: &[(usize, &str)]) -> Vec<Delivery<V>> {
    expected.iter()
        .map(|(instance, value)| (*instance, value.to_string()))
        .collect()
}

fn decided(value: &str) -> Option<Decree<V>> {
    Some(Decree::Value(value.to_string()))
}

/// Delivered values are exactly `0..count` in order with each proposed value once.
fn assert_complete(delivered: &[Delivery<V>], proposed: &[String]) {
    let instances = delivered.iter().map(|(instance, _)| *instance).collect::<Vec<_>>();
    assert_eq!(instances, (0..proposed.len()).collect::<Vec<_>>());
    let mut delivered = delivered.iter().map(|(_, value)| value.clone()).collect::<Vec<_>>();
    let mut proposed = proposed.to_vec();
    delivered.sort();
    proposed.sort();
    assert_eq!(delivered, proposed);
}

#[test]
fn single_value_is_delivered() {
    let mut cluster = Cluster::with(3, 1, 1);
    cluster.propose("x");
    cluster.run();
    assert_eq!(cluster.deliveries(0), values(&[(0, "x")]).as_slice());
    assert_eq!(cluster.proposer(0).decision(0).cloned(), decided("x"));
    assert_eq!(cluster.proposer(0).state(0).unwrap().c_rnd, 1000);
    for acceptor in &cluster.acceptors {
        assert_eq!(acceptor.handler.state(0).unwrap().v_val, decided("x"));
    }
}

#[test]
fn values_are_delivered_in_proposal_order() {
    let mut cluster = Cluster::with(3, 1, 1);
    for value in &["a", "b", "c"] {
        cluster.propose(value);
    }
    cluster.run();
    assert_eq!(cluster.deliveries(0), values(&[(0, "a"), (1, "b"), (2, "c")]).as_slice());
}

#[test]
fn dueling_leaders_agree() {
    let mut cluster = Cluster::with(3, 2, 1);
    cluster.proposer(1).check_leader(Instant::now() + Duration::from_secs(5));
    assert!(cluster.proposer(0).is_leader() && cluster.proposer(1).is_leader());
    cluster.run();

    // Each leader drives instance 0 with its own value in its own round
    cluster.proposer(1).respond(Message::control(Phase::Request { v: Some("b".to_string()) }));
    cluster.proposer(0).respond(Message::control(Phase::Request { v: Some("a".to_string()) }));
    cluster.run();

    // Both values survive, in some order, and every role agrees on it
    let delivered = cluster.deliveries(0).to_vec();
    assert_complete(&delivered, &["a".to_string(), "b".to_string()]);
    for (instance, value) in &delivered {
        for proposer in 0..2 {
            assert_eq!(cluster.proposer(proposer).decision(*instance).cloned(), decided(value));
        }
    }
}

#[test]
fn duplicated_messages_are_harmless() {
    let mut cluster = Cluster::with(5, 2, 2);
    cluster.duplicate = Some((StdRng::seed_from_u64(0x5eed), 0.5));
    let proposed = (0..20).map(|index| format!("v{}", index)).collect::<Vec<_>>();
    for value in &proposed {
        cluster.propose(value);
    }
    cluster.run();
    let first = cluster.deliveries(0).to_vec();
    let second = cluster.deliveries(1).to_vec();
    assert_complete(&first, &proposed);
    assert_eq!(first, second);
}

#[test]
fn lost_decision_is_recovered_by_learner_catch_up() {
    let mut cluster = Cluster::with(3, 1, 1);
    cluster.drop = Box::new(|(role, message)| {
        *role == Role::Learners && message.instance == Some(0)
    });
    cluster.propose("a");
    cluster.run();
    assert!(cluster.deliveries(0).is_empty());

    cluster.drop = Box::new(|_| false);
    cluster.propose("b");
    cluster.run();
    assert_eq!(cluster.deliveries(0), values(&[(0, "a"), (1, "b")]).as_slice());
}

#[test]
fn lost_phase_one_is_recovered() {
    let mut cluster = Cluster::with(3, 1, 1);
    cluster.drop = drop_once(|(_, message)| match message.phase {
    | Phase::P1A { .. } => message.instance == Some(0),
    | _ => false,
    });
    cluster.propose("a");
    cluster.run();
    assert!(cluster.deliveries(0).is_empty());
    assert_eq!(cluster.proposer(0).decision(0), None);

    // The learner stalls behind instance 0 and the leader drives it again
    cluster.propose("b");
    cluster.run();
    assert_eq!(cluster.deliveries(0), values(&[(0, "a"), (1, "b")]).as_slice());
    assert_eq!(cluster.proposer(0).state(0).unwrap().c_rnd, 2000);
}

#[test]
fn lost_phase_two_is_recovered() {
    let mut cluster = Cluster::with(3, 1, 1);
    cluster.drop = drop_once(|(_, message)| match message.phase {
    | Phase::P2A { .. } => message.instance == Some(0),
    | _ => false,
    });
    cluster.propose("a");
    cluster.run();
    assert!(cluster.deliveries(0).is_empty());

    for value in &["b", "c", "d"] {
        cluster.propose(value);
    }
    cluster.run();
    assert_eq!(
        cluster.deliveries(0),
        values(&[(0, "a"), (1, "b"), (2, "c"), (3, "d")]).as_slice(),
    );
}

#[test]
fn stalled_instance_is_restarted_by_fill_request() {
    let mut cluster = Cluster::with(3, 1, 1);
    cluster.drop = drop_once(|(_, message)| match message.phase {
    | Phase::P2A { .. } => message.instance == Some(0),
    | _ => false,
    });
    cluster.propose("a");
    cluster.run();
    assert_eq!(cluster.proposer(0).decision(0), None);

    // A late proposer's sweep asks for instance 0
    cluster.add_proposer(false);
    cluster.run();
    assert_eq!(cluster.proposer(0).decision(0).cloned(), decided("a"));
    assert_eq!(cluster.proposer(1).decision(0).cloned(), decided("a"));
    assert_eq!(cluster.deliveries(0), values(&[(0, "a")]).as_slice());
}

#[test]
fn random_loss_converges_once_network_heals() {
    let mut cluster = Cluster::with(5, 2, 2);
    cluster.loss = Some((StdRng::seed_from_u64(0x1055), 0.2));
    let mut proposed = (0..50).map(|index| format!("v{}", index)).collect::<Vec<_>>();
    for value in &proposed {
        cluster.propose(value);
    }
    cluster.run();

    // Nothing is delivered out of order or twice while messages are lost
    for learner in 0..2 {
        let delivered = cluster.deliveries(learner).to_vec();
        let instances = delivered.iter().map(|(instance, _)| *instance).collect::<Vec<_>>();
        assert_eq!(instances, (0..delivered.len()).collect::<Vec<_>>());
    }

    cluster.loss = None;
    proposed.push("last".to_string());
    cluster.propose("last");
    cluster.run();

    let first = cluster.deliveries(0).to_vec();
    let second = cluster.deliveries(1).to_vec();
    assert_complete(&first, &proposed);
    assert_eq!(first, second);
    for (instance, value) in &first {
        assert_eq!(cluster.proposer(0).decision(*instance).cloned(), decided(value));
    }
}

#[test]
fn follower_takes_over_silent_leader() {
    let mut cluster = Cluster::with(3, 2, 1);
    cluster.crash_proposer(0);
    cluster.propose("x");
    cluster.run();
    assert!(cluster.deliveries(0).is_empty());
    assert_eq!(cluster.proposer(1).num_instance(), Some(0));

    // Not silent long enough yet
    cluster.proposer(1).check_leader(Instant::now());
    assert!(!cluster.proposer(1).is_leader());

    cluster.proposer(1).check_leader(Instant::now() + Duration::from_secs(5));
    assert!(cluster.proposer(1).is_leader());
    cluster.run();
    assert_eq!(cluster.deliveries(0), values(&[(0, "x")]).as_slice());
    assert_eq!(cluster.proposer(1).state(0).unwrap().c_rnd, 1001);
}

#[test]
fn takeover_recovers_accepted_value() {
    let mut cluster = Cluster::with(3, 2, 1);
    cluster.proposer(0).respond(Message::control(Phase::Request { v: Some("x".to_string()) }));

    // Leader crashes after every acceptor voted, before anyone hears the votes
    cluster.run_until(|(_, message)| match message.phase {
    | Phase::P2B { .. } => true,
    | _ => false,
    });
    cluster.crash_proposer(0);
    cluster.run();
    assert!(cluster.deliveries(0).is_empty());
    assert!(cluster.proposer(1).state(0).is_none());

    // The new leader fills the instance it never saw and must not pick a no-op
    cluster.proposer(1).check_leader(Instant::now() + Duration::from_secs(5));
    cluster.run();
    assert_eq!(cluster.proposer(1).decision(0).cloned(), decided("x"));
    assert_eq!(cluster.deliveries(0), values(&[(0, "x")]).as_slice());
}

#[test]
fn unknown_instance_is_filled_with_noop() {
    let mut cluster = Cluster::with(3, 1, 1);
    cluster.propose("a");
    cluster.run();

    // Acceptors hear of instance 1 without any vote in it
    let p1a = Message::new(Some(1), Phase::P1A { c_rnd: 7 });
    for acceptor in &mut cluster.acceptors {
        acceptor.handler.respond(p1a.clone());
    }
    cluster.queue.clear();
    for acceptor in &mut cluster.acceptors {
        acceptor.outbox.drain();
    }

    // A late proposer sweeps instance 1, and the leader fills it
    cluster.add_proposer(false);
    cluster.run();
    assert_eq!(cluster.proposer(0).decision(1), Some(&Decree::Noop));
    assert_eq!(cluster.proposer(1).decision(1), Some(&Decree::Noop));

    cluster.propose("c");
    cluster.run();
    assert_eq!(cluster.deliveries(0), values(&[(0, "a"), (2, "c")]).as_slice());
}

#[test]
fn late_learner_catches_up() {
    let mut cluster = Cluster::with(3, 2, 1);
    let proposed = (0..200).map(|index| index.to_string()).collect::<Vec<_>>();
    for value in &proposed {
        cluster.propose(value);
    }
    cluster.run();

    let late = cluster.add_learner();
    cluster.run();
    let delivered = cluster.deliveries(late).to_vec();
    assert_complete(&delivered, &proposed);
    assert_eq!(cluster.deliveries(0), delivered.as_slice());
}

#[test]
fn late_proposer_catches_up() {
    let mut cluster = Cluster::with(3, 1, 1);
    for value in &["a", "b", "c", "d", "e"] {
        cluster.propose(value);
    }
    cluster.run();

    let late = cluster.add_proposer(false);
    cluster.run();
    assert!(cluster.proposer(late).is_updated());
    assert_eq!(cluster.proposer(late).num_instance(), Some(4));
    for instance in 0..5 {
        let expected = cluster.proposer(0).decision(instance).cloned();
        assert!(expected.is_some());
        assert_eq!(cluster.proposer(late).decision(instance).cloned(), expected);
    }

    // Re-announced decisions are not delivered twice
    assert_eq!(cluster.deliveries(0).len(), 5);
}

#[test]
fn requests_wait_for_instance_catch_up() {
    let mut cluster = Cluster::with(3, 1, 1);
    cluster.propose("a");
    cluster.propose("b");
    cluster.run();

    // A restarted leader must not reuse instance numbers
    cluster.crash_proposer(0);
    let restarted = cluster.add_proposer(true);
    cluster.propose("c");
    cluster.run();
    assert_eq!(cluster.proposer(restarted).num_instance(), Some(2));
    assert_eq!(cluster.deliveries(0), values(&[(0, "a"), (1, "b"), (2, "c")]).as_slice());
}

#[test]
fn higher_id_heartbeat_demotes_leader() {
    let mut cluster = Cluster::with(3, 2, 1);
    cluster.proposer(1).check_leader(Instant::now() + Duration::from_secs(5));
    assert!(cluster.proposer(0).is_leader() && cluster.proposer(1).is_leader());
    cluster.run();

    cluster.proposer(0).send_heartbeat();
    cluster.run();
    assert!(cluster.proposer(1).is_leader());

    cluster.proposer(1).send_heartbeat();
    cluster.run();
    assert!(!cluster.proposer(0).is_leader());
    assert!(cluster.proposer(1).is_leader());

    cluster.propose("x");
    cluster.run();
    assert_eq!(cluster.proposer(1).state(0).unwrap().c_rnd, 1001);
    assert_eq!(cluster.deliveries(0), values(&[(0, "x")]).as_slice());
}
