pub mod topology;
pub mod transport;

pub use topology::{NeighborLink, PortTable, DEFAULT_CAPACITY};
pub use transport::{Connection, Listener};
