pub mod database;
pub mod flooding;
pub mod handshake;
pub mod message_handler;
pub mod messages;

pub use database::{Ingest, LinkStateDatabase};
pub use messages::*;
