//! Graph engine: in-memory adjacency mirror of `links`, plus Leiden-style
//! community detection.

mod engine;
mod leiden;

pub use engine::{evolution, GraphEngine, Subgraph};
pub use leiden::{aggregate, local_moving, WeightedEdge};
