pub mod graph;
pub mod reconcile;
pub mod retry;

pub use graph::{
    node_fn, Edge, ExecutionResult, Executor, FanOut, GraphBuilder, Join, Node, NodeHandler,
    NodeResult, NodeRole, Workflow, WorkflowGraph,
};
pub use reconcile::{reconcile, RecordMerger};
pub use retry::{backoff_delay, retry, with_abort};
