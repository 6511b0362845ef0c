pub mod dijkstra;

pub use dijkstra::{PathResult, Route};
