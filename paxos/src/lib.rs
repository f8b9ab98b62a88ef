#[macro_use] extern crate derivative;
#[macro_use] extern crate log;

mod acceptor;
mod client;
mod config;
mod error;
mod learner;
mod message;
mod network;
mod proposer;
mod quorum;
mod shared;
mod socket;
mod state;
mod thread;

pub mod internal;

pub use crate::acceptor::Acceptor;
pub use crate::client::Client;
pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::learner::{Delivery, Learner};
pub use crate::message::{DecisionQuery, InstanceQuery, Message, Out, Phase};
pub use crate::network::{Network, Role, DEFAULT_ACCEPTORS};
pub use crate::proposer::{Proposer, CATCH_UP_CHUNK, ROUND_STRIDE};
pub use crate::quorum::Votes;
pub use crate::state::{Accepting, Decree, Handler, Instance, Proposing, Round, Value};
