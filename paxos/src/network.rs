//! # Summary
//!
//! Static membership. Every role is reachable at exactly one group address,
//! read once from a membership file of `role ip port` lines. A line holding
//! a single number sets how many acceptors take part in the protocol.

use std::net::{Ipv4Addr, SocketAddrV4};

use hashbrown::HashMap as Map;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Acceptor count assumed when the membership file does not give one.
pub const DEFAULT_ACCEPTORS: usize = 3;

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Clients,
    Proposers,
    Acceptors,
    Learners,
}

impl std::fmt::Display for Role {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
        | Role::Clients => "clients",
        | Role::Proposers => "proposers",
        | Role::Acceptors => "acceptors",
        | Role::Learners => "learners",
        };
        write!(fmt, "{}", name)
    }
}

impl std::str::FromStr for Role {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
        | "client" | "clients" => Ok(Role::Clients),
        | "proposer" | "proposers" => Ok(Role::Proposers),
        | "acceptor" | "acceptors" => Ok(Role::Acceptors),
        | "learner" | "learners" => Ok(Role::Learners),
        | _ => Err(Error::UnknownRole(s.to_string())),
        }
    }
}

/// Immutable role to group address table.
#[derive(Clone, Debug, Default)]
pub struct Network {
    groups: Map<Role, SocketAddrV4>,
    acceptors: Option<usize>,
}

impl Network {
    /// Reads and parses the membership file at `path`.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, Error> {
        let mut network = Network::default();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue
            }
            let error = |reason: &str| Error::Membership {
                line: index + 1,
                reason: reason.to_string(),
            };
            let fields = line.split_whitespace().collect::<Vec<_>>();
            match fields.as_slice() {
            | [count] => {
                let count = count.parse::<usize>()
                    .map_err(|_| error("expected acceptor count"))?;
                if count == 0 {
                    return Err(error("acceptor count must be positive"))
                }
                network.acceptors = Some(count);
            }
            | [role, ip, port] => {
                let role = role.parse::<Role>()?;
                let ip = ip.parse::<Ipv4Addr>()
                    .map_err(|_| error("invalid IPv4 address"))?;
                let port = port.parse::<u16>()
                    .map_err(|_| error("invalid port"))?;
                network.groups.insert(role, SocketAddrV4::new(ip, port));
            }
            | _ => return Err(error("expected `role ip port` or an acceptor count")),
            }
        }
        Ok(network)
    }

    /// Group address of `role`.
    pub fn group(&self, role: Role) -> Result<SocketAddrV4, Error> {
        self.groups.get(&role)
            .copied()
            .ok_or(Error::MissingRole(role))
    }

    /// Number of acceptors, as configured or defaulted.
    pub fn acceptors(&self) -> usize {
        self.acceptors.unwrap_or(DEFAULT_ACCEPTORS)
    }
}
