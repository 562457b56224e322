//! Graph execution engine: statically declared DAG workflows over a shared state.
//!
//! A workflow is a set of `Node`s connected by `Edge`s. Each node reads a
//! declared subset of the state and returns a partial update. `GraphBuilder`
//! validates the structure once; the `Executor` then runs every node exactly
//! once, fanning out where a node has several successors and joining where a
//! node has several predecessors.

pub mod builder;
pub mod edge;
pub mod executor;
pub mod node;

pub use builder::{FanOut, GraphBuilder, Join, NodeRole, WorkflowGraph};
pub use edge::Edge;
pub use executor::{ExecutionResult, Executor, NodeResult, Workflow};
pub use node::{node_fn, Node, NodeHandler};
