// src/testing.rs
//
// In-memory AudioGraph that records what was asked of it.

use std::collections::{HashMap, HashSet};

use crate::audio_graph::{AudioGraph, GraphError};
use crate::node::{NodeId, NodeKind, ParamId};
use crate::parameter::ParamEvent;

const DESTINATION: NodeId = 0;

#[derive(Debug, Clone)]
struct Recorded {
    kind: NodeKind,
    playing: bool,
    outputs: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub struct RecordingGraph {
    nodes: HashMap<NodeId, Recorded>,
    next_id: NodeId,
    created: HashMap<NodeKind, usize>,
    failing: HashSet<NodeKind>,
    params: HashMap<(NodeId, ParamId), f32>,
    events: Vec<(NodeId, ParamId, ParamEvent)>,
    stops: usize,
    disconnects: usize,
    destroyed: usize,
    time: f64,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn fail_creation(&mut self, kind: NodeKind) {
        self.failing.insert(kind);
    }

    pub fn allow_creation(&mut self, kind: NodeKind) {
        self.failing.remove(&kind);
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Nodes of `kind` ever created.
    pub fn created(&self, kind: NodeKind) -> usize {
        self.created.get(&kind).copied().unwrap_or(0)
    }

    /// Nodes currently alive.
    pub fn live(&self) -> usize {
        self.nodes.len()
    }

    pub fn live_of(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|n| n.kind == kind).count()
    }

    /// Successful stops.
    pub fn stops(&self) -> usize {
        self.stops
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn playing(&self) -> usize {
        self.nodes.values().filter(|n| n.playing).count()
    }

    pub fn outputs(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|n| n.outputs.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, source: NodeId, dest: NodeId) -> bool {
        self.outputs(source).contains(&dest)
    }

    /// Last value written to a parameter, immediate or scheduled.
    pub fn param(&self, node: NodeId, param: ParamId) -> Option<f32> {
        self.params.get(&(node, param)).copied()
    }

    pub fn events(&self) -> &[(NodeId, ParamId, ParamEvent)] {
        &self.events
    }

    fn check(&self, node: NodeId) -> Result<&Recorded, GraphError> {
        self.nodes.get(&node).ok_or(GraphError::UnknownNode { node })
    }

    fn exists(&self, node: NodeId) -> Result<(), GraphError> {
        if node == DESTINATION {
            Ok(())
        } else {
            self.check(node).map(|_| ())
        }
    }
}

impl AudioGraph for RecordingGraph {
    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError> {
        if self.failing.contains(&kind) {
            return Err(GraphError::CapacityExceeded { max: 0 });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Recorded {
                kind,
                playing: false,
                outputs: Vec::new(),
            },
        );
        *self.created.entry(kind).or_default() += 1;
        Ok(id)
    }

    fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), GraphError> {
        self.exists(dest)?;
        let node = self
            .nodes
            .get_mut(&source)
            .ok_or(GraphError::UnknownNode { node: source })?;
        if !node.outputs.contains(&dest) {
            node.outputs.push(dest);
        }
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError> {
        let n = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode { node })?;
        n.outputs.clear();
        self.disconnects += 1;
        Ok(())
    }

    fn destroy_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.nodes
            .remove(&node)
            .ok_or(GraphError::UnknownNode { node })?;
        for other in self.nodes.values_mut() {
            other.outputs.retain(|&o| o != node);
        }
        self.destroyed += 1;
        Ok(())
    }

    fn start(&mut self, node: NodeId, _at: f64) -> Result<(), GraphError> {
        let n = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode { node })?;
        n.playing = true;
        Ok(())
    }

    fn stop(&mut self, node: NodeId, _at: f64) -> Result<(), GraphError> {
        let n = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode { node })?;
        if !n.playing {
            return Err(GraphError::InvalidState {
                node,
                reason: "not playing",
            });
        }
        n.playing = false;
        self.stops += 1;
        Ok(())
    }

    fn set_param(&mut self, node: NodeId, param: ParamId, value: f32) -> Result<(), GraphError> {
        self.exists(node)?;
        self.params.insert((node, param), value);
        Ok(())
    }

    fn schedule_param(
        &mut self,
        node: NodeId,
        param: ParamId,
        event: ParamEvent,
    ) -> Result<(), GraphError> {
        self.exists(node)?;
        let value = match event {
            ParamEvent::SetValue { value, .. } | ParamEvent::LinearRamp { value, .. } => value,
        };
        self.params.insert((node, param), value);
        self.events.push((node, param, event));
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn destination(&self) -> NodeId {
        DESTINATION
    }
}
