use serde_derive::{Serialize, Deserialize};

use paxos::Role;

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct Execution(pub Vec<Command>);

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start a node of `role` with the given ID
    Start {
        role: Role,
        id: usize,
    },

    /// Write `value` to the standard input of the given client
    Propose {
        id: usize,
        value: String,
    },

    /// Kill the given node
    Crash {
        role: Role,
        id: usize,
    },

    /// Sleep the test harness for `ms` milliseconds
    Sleep {
        ms: u64,
    }
}
