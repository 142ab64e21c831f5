//! Graph-fusion compiler core for deep-learning operator graphs.
//!
//! Framework adapters build a [`Graph`](ir::Graph) of primitive tensor
//! operators, call [`build_graph`](ir::Graph::build_graph) to resolve value
//! edges, and run the pass manager to obtain [`Partition`](ir::Partition)s
//! in which pattern-matched subgraphs have been rewritten to single fused
//! operators a backend can lower into one kernel call.

pub mod error;
pub mod ir;
pub mod pass;
pub mod pattern;
pub mod schema;

pub use error::{GraphError, GraphResult};
pub use ir::{
    AttrKind, AttrValue, DataType, EngineKind, Graph, LayoutKind, LogicalTensor, Op, OpKind,
    Partition, PartitionPolicy, DIM_UNKNOWN,
};
