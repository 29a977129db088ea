// src/audio_graph.rs
//
// Control-thread view of the host audio graph. Everything above this trait
// (lifecycle, effects, oscillator bank) talks to the graph only through it.

use std::fmt;

use crate::node::{NodeId, NodeKind, ParamId};
use crate::parameter::ParamEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    UnknownNode { node: NodeId },
    CapacityExceeded { max: usize },
    InvalidState { node: NodeId, reason: &'static str },
    Cycle { from: NodeId, to: NodeId },
    /// The render side has gone away.
    Disconnected,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode { node } => write!(f, "unknown node {}", node),
            GraphError::CapacityExceeded { max } => {
                write!(f, "node capacity exceeded (max {})", max)
            }
            GraphError::InvalidState { node, reason } => {
                write!(f, "invalid state for node {}: {}", node, reason)
            }
            GraphError::Cycle { from, to } => {
                write!(f, "connecting {} -> {} would create a cycle", from, to)
            }
            GraphError::Disconnected => write!(f, "renderer is gone"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Node creation, wiring, scheduling and parameter writes.
///
/// Times are seconds on the audio clock returned by [`current_time`].
///
/// [`current_time`]: AudioGraph::current_time
pub trait AudioGraph {
    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError>;

    fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), GraphError>;

    /// Remove all outgoing connections of `node`.
    fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError>;

    fn destroy_node(&mut self, node: NodeId) -> Result<(), GraphError>;

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), GraphError>;

    /// Fails with [`GraphError::InvalidState`] if the node is not playing.
    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), GraphError>;

    /// Immediate, non-automated write.
    fn set_param(&mut self, node: NodeId, param: ParamId, value: f32) -> Result<(), GraphError>;

    fn schedule_param(
        &mut self,
        node: NodeId,
        param: ParamId,
        event: ParamEvent,
    ) -> Result<(), GraphError>;

    fn current_time(&self) -> f64;

    fn destination(&self) -> NodeId;
}
