use thiserror::Error;

use crate::RouterId;

/// Every failure the engine reports back to an operator command or to the
/// dispatcher. None of them are fatal to the router process.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("cannot attach to self ({0})")]
    SelfAttach(RouterId),

    #[error("already attached to router {0}")]
    DuplicateAttach(RouterId),

    #[error("no free port available")]
    NoCapacity,

    #[error("invalid port number {0}")]
    InvalidPort(u32),

    #[error("invalid slot {0}: empty or not TWO_WAY")]
    InvalidSlot(usize),

    #[error("no link matches router {0}")]
    MismatchedLink(RouterId),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl From<serde_json::Error> for RouterError {
    fn from(e: serde_json::Error) -> Self {
        RouterError::MalformedMessage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
