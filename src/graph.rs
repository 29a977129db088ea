//! Runtime audio graph with topological sorting.
//!
//! The graph owns prepared nodes and their buffers and processes them in
//! dependency order. Nodes live in fixed slots indexed by [`NodeId`]; all
//! buffers are sized up front so that adding, removing and rewiring nodes on
//! the render thread never allocates audio memory.

use crate::node::{Node, NodeId, NodeKind, ParamId, ProcessContext};
use crate::parameter::ParamEvent;

/// Slot reserved for the final mix point.
pub const DESTINATION: NodeId = 0;

/// One node in the graph.
pub struct GraphNode {
    pub kind: NodeKind,
    pub node: Box<dyn Node>,
    pub inputs: Vec<NodeId>,
}

/// Storage for one slot's output.
pub struct NodeBuffer {
    pub data: Vec<f32>,
}

impl NodeBuffer {
    pub fn new(max_block: usize) -> Self {
        Self {
            data: vec![0.0; max_block],
        }
    }
}

/// The audio graph
pub struct Graph {
    nodes: Vec<Option<GraphNode>>,
    buffers: Vec<NodeBuffer>,
    pub max_block: usize,
    pub sample_rate: f64,

    /// Topologically sorted evaluation order
    eval_order: Vec<usize>,
    order_dirty: bool,

    /// Sum of a node's inputs for the current block
    input_mix: Vec<f32>,

    // Sort scratch, sized to the slot count
    in_degree: Vec<usize>,
    ready: Vec<usize>,
}

impl Graph {
    pub fn new(max_nodes: usize, max_block: usize, sample_rate: f64) -> Self {
        Self {
            nodes: (0..max_nodes).map(|_| None).collect(),
            buffers: (0..max_nodes).map(|_| NodeBuffer::new(max_block)).collect(),
            max_block,
            sample_rate,
            eval_order: Vec::with_capacity(max_nodes),
            order_dirty: false,
            input_mix: vec![0.0; max_block],
            in_degree: vec![0; max_nodes],
            ready: Vec::with_capacity(max_nodes),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.slot(id).map(|n| n.kind)
    }

    #[inline]
    fn slot(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id as usize).and_then(Option::as_ref)
    }

    #[inline]
    fn slot_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Place a prepared node into slot `id`.
    ///
    /// Returns the node back if the slot is out of range or occupied.
    pub fn add_node(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        node: Box<dyn Node>,
    ) -> Result<(), Box<dyn Node>> {
        let Some(slot) = self.nodes.get_mut(id as usize) else {
            return Err(node);
        };
        if slot.is_some() {
            return Err(node);
        }
        *slot = Some(GraphNode {
            kind,
            node,
            inputs: Vec::with_capacity(4),
        });
        self.buffers[id as usize].data.fill(0.0);
        self.order_dirty = true;
        Ok(())
    }

    /// Take a node out of the graph, dropping every edge that touches it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Box<dyn Node>> {
        let removed = self.nodes.get_mut(id as usize)?.take()?;
        self.disconnect(id);
        self.order_dirty = true;
        Some(removed.node)
    }

    /// Add an edge: src -> dst
    pub fn connect(&mut self, src: NodeId, dst: NodeId) -> bool {
        if src == dst || !self.contains(src) {
            return false;
        }
        let Some(dst_node) = self.slot_mut(dst) else {
            return false;
        };
        if !dst_node.inputs.contains(&src) {
            dst_node.inputs.push(src);
            self.order_dirty = true;
        }
        true
    }

    /// Remove every outgoing edge of `src`.
    pub fn disconnect(&mut self, src: NodeId) {
        for node in self.nodes.iter_mut().flatten() {
            let before = node.inputs.len();
            node.inputs.retain(|&i| i != src);
            if node.inputs.len() != before {
                self.order_dirty = true;
            }
        }
    }

    #[inline]
    pub fn set_param(&mut self, id: NodeId, param_id: ParamId, value: f32) {
        if let Some(n) = self.slot_mut(id) {
            n.node.set_param(param_id, value);
        }
    }

    /// Queue a timed write. Parameters without automation take the value
    /// immediately.
    pub fn schedule(&mut self, id: NodeId, param_id: ParamId, event: ParamEvent) {
        let Some(n) = self.slot_mut(id) else {
            return;
        };
        match n.node.automation_mut(param_id) {
            Some(param) => param.schedule(event),
            None => {
                let value = match event {
                    ParamEvent::SetValue { value, .. } | ParamEvent::LinearRamp { value, .. } => {
                        value
                    }
                };
                n.node.set_param(param_id, value);
            }
        }
    }

    pub fn cancel_scheduled(&mut self, id: NodeId, param_id: ParamId, time: f64) {
        if let Some(param) = self.slot_mut(id).and_then(|n| n.node.automation_mut(param_id)) {
            param.cancel_scheduled_values(time);
        }
    }

    pub fn start(&mut self, id: NodeId, at: f64) {
        if let Some(n) = self.slot_mut(id) {
            n.node.start(at);
        }
    }

    pub fn stop(&mut self, id: NodeId, at: f64) {
        if let Some(n) = self.slot_mut(id) {
            n.node.stop(at);
        }
    }

    /// Compute topological sort of the graph (Kahn's algorithm)
    fn topological_sort(&mut self) {
        let n = self.nodes.len();
        self.eval_order.clear();
        self.ready.clear();

        for i in 0..n {
            self.in_degree[i] = self.nodes[i].as_ref().map_or(0, |node| node.inputs.len());
            if self.nodes[i].is_some() && self.in_degree[i] == 0 {
                self.ready.push(i);
            }
        }

        while let Some(idx) = self.ready.pop() {
            self.eval_order.push(idx);

            // Release every node that reads from this one
            for dep in 0..n {
                let Some(node) = &self.nodes[dep] else {
                    continue;
                };
                let edges = node.inputs.iter().filter(|&&i| i as usize == idx).count();
                if edges > 0 {
                    self.in_degree[dep] -= edges;
                    if self.in_degree[dep] == 0 {
                        self.ready.push(dep);
                    }
                }
            }
        }

        // Cycles are rejected before they reach the renderer. If one slips
        // through, the remaining nodes still run, one block late.
        if self.eval_order.len() < self.len() {
            debug_assert!(false, "graph contains a cycle");
            for i in 0..n {
                if self.nodes[i].is_some() && !self.eval_order.contains(&i) {
                    self.eval_order.push(i);
                }
            }
        }

        self.order_dirty = false;
    }

    /// Process one block of audio. `frames` must not exceed `max_block`.
    pub fn process(&mut self, frames: usize, sample_pos: u64) {
        let frames = frames.min(self.max_block);
        if self.order_dirty {
            self.topological_sort();
        }

        let ctx = ProcessContext::new(frames, self.sample_rate, sample_pos);
        let Self {
            nodes,
            buffers,
            eval_order,
            input_mix,
            ..
        } = self;

        for &idx in eval_order.iter() {
            let Some(node) = nodes[idx].as_ref() else {
                continue;
            };

            let mix = &mut input_mix[..frames];
            mix.fill(0.0);
            for &input in &node.inputs {
                for (m, s) in mix.iter_mut().zip(&buffers[input as usize].data[..frames]) {
                    *m += s;
                }
            }

            if let Some(node) = nodes[idx].as_mut() {
                node.node
                    .process(&ctx, &input_mix[..frames], &mut buffers[idx].data[..frames]);
            }
        }
    }

    /// Clear all node state and buffers.
    pub fn reset(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.node.reset();
        }
        for buf in &mut self.buffers {
            buf.data.fill(0.0);
        }
    }

    /// Destination output for the last processed block.
    pub fn output(&self, frames: usize) -> &[f32] {
        let frames = frames.min(self.max_block);
        &self.buffers[DESTINATION as usize].data[..frames]
    }
}
