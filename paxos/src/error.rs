use crate::network::Role;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("send timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("membership line {line}: {reason}")]
    Membership { line: usize, reason: String },

    #[error("no address for role {0}")]
    MissingRole(Role),

    #[error("unknown role {0:?}")]
    UnknownRole(String),

    /// Round numbers reserve `max` slots per proposer.
    #[error("proposer id {id} must be below {max}")]
    InvalidId { id: usize, max: usize },
}
