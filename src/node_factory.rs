// src/node_factory.rs

use crate::node::{FilterType, Node, NodeKind};
use crate::nodes::{FilterNode, GainNode, OscillatorNode, ReverbTank};

/// A factory capable of creating fresh node instances.
///
/// Only used on the control thread; the renderer receives finished nodes.
pub trait NodeFactory: Send {
    /// Create one node instance for `kind`.
    fn create(&self, kind: NodeKind) -> Box<dyn Node>;
}

/// Builds the node set every synth graph needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNodes;

impl NodeFactory for StandardNodes {
    fn create(&self, kind: NodeKind) -> Box<dyn Node> {
        match kind {
            NodeKind::Oscillator => Box::new(OscillatorNode::new()),
            NodeKind::Gain | NodeKind::Destination => Box::new(GainNode::new()),
            NodeKind::Filter(FilterType::Lowpass) => Box::new(FilterNode::lowpass()),
            NodeKind::Filter(FilterType::Highpass) => Box::new(FilterNode::highpass()),
            NodeKind::ReverbTank => Box::new(ReverbTank::new()),
        }
    }
}
