// src/lifecycle.rs
//
// Single owner of node creation and destruction. Effects and the oscillator
// bank ask the lifecycle for nodes; teardown releases everything it handed
// out, in one place.

use log::{debug, error, info, warn};

use crate::audio_graph::{AudioGraph, GraphError};
use crate::node::{NodeId, NodeKind, ParamId};
use crate::nodes::params;
use crate::parameter::ParamEvent;

/// Who asked for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Voice(usize),
    FilterPair,
    Reverb,
    /// The shared output bus all voices feed.
    Bus,
}

#[derive(Debug, Clone, Copy)]
struct Owned {
    id: NodeId,
    kind: NodeKind,
    owner: Owner,
}

pub struct GraphLifecycle<G: AudioGraph> {
    graph: G,
    owned: Vec<Owned>,
    output_bus: Option<NodeId>,
}

impl<G: AudioGraph> GraphLifecycle<G> {
    pub fn new(graph: G) -> Self {
        Self {
            graph,
            owned: Vec::new(),
            output_bus: None,
        }
    }

    /// Create the output bus. Idempotent.
    pub fn init(&mut self) -> Result<NodeId, GraphError> {
        if let Some(bus) = self.output_bus {
            return Ok(bus);
        }
        let bus = self.create(Owner::Bus, NodeKind::Gain)?;
        self.output_bus = Some(bus);
        info!("audio graph initialized, output bus = node {}", bus);
        Ok(bus)
    }

    #[inline]
    pub fn output_bus(&self) -> Option<NodeId> {
        self.output_bus
    }

    pub fn create(&mut self, owner: Owner, kind: NodeKind) -> Result<NodeId, GraphError> {
        match self.graph.create_node(kind) {
            Ok(id) => {
                self.owned.push(Owned { id, kind, owner });
                Ok(id)
            }
            Err(e) => {
                error!("failed to create {:?} node for {:?}: {}", kind, owner, e);
                Err(e)
            }
        }
    }

    pub fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), GraphError> {
        self.graph.connect(source, dest)
    }

    /// Route `source` into the output bus, creating the bus on first use.
    pub fn connect_to_bus(&mut self, source: NodeId) -> Result<(), GraphError> {
        let bus = self.init()?;
        self.graph.connect(source, bus)
    }

    pub fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.graph.disconnect(node)
    }

    pub fn start(&mut self, node: NodeId) -> Result<(), GraphError> {
        let now = self.graph.current_time();
        self.graph.start(node, now)
    }

    /// Stop a source now. Returns whether it was playing.
    ///
    /// Stopping a node that never started (or already stopped) is not an
    /// error at this level.
    pub fn stop(&mut self, node: NodeId) -> Result<bool, GraphError> {
        let now = self.graph.current_time();
        match self.graph.stop(node, now) {
            Ok(()) => Ok(true),
            Err(GraphError::InvalidState { reason, .. }) => {
                debug!("stop on node {} ignored: {}", node, reason);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_param(&mut self, node: NodeId, param: ParamId, value: f32) -> Result<(), GraphError> {
        self.graph.set_param(node, param, value)
    }

    /// Timed write at the current audio time.
    pub fn set_param_now(
        &mut self,
        node: NodeId,
        param: ParamId,
        value: f32,
    ) -> Result<(), GraphError> {
        let time = self.graph.current_time();
        self.graph
            .schedule_param(node, param, ParamEvent::SetValue { value, time })
    }

    /// Ramp from the current value to `value` over `seconds`.
    pub fn ramp_param(
        &mut self,
        node: NodeId,
        param: ParamId,
        value: f32,
        seconds: f64,
    ) -> Result<(), GraphError> {
        let now = self.graph.current_time();
        self.graph.schedule_param(
            node,
            param,
            ParamEvent::LinearRamp {
                value,
                end_time: now + seconds.max(0.0),
            },
        )
    }

    /// Destroy one node. Unknown ids are ignored.
    pub fn release(&mut self, node: NodeId) -> Result<(), GraphError> {
        let Some(pos) = self.owned.iter().position(|o| o.id == node) else {
            return Ok(());
        };
        let owned = self.owned.remove(pos);
        if owned.kind.is_source() {
            self.stop(node)?;
        }
        if self.output_bus == Some(node) {
            self.output_bus = None;
        }
        self.graph.destroy_node(node)
    }

    /// Destroy everything `owner` holds. Returns the number of nodes released.
    pub fn release_owner(&mut self, owner: Owner) -> usize {
        let ids: Vec<NodeId> = self
            .owned
            .iter()
            .filter(|o| o.owner == owner)
            .map(|o| o.id)
            .collect();

        let mut released = 0;
        for id in ids {
            if let Err(e) = self.graph.disconnect(id) {
                warn!("failed to disconnect node {}: {}", id, e);
            }
            match self.release(id) {
                Ok(()) => released += 1,
                Err(e) => error!("failed to release node {}: {}", id, e),
            }
        }
        released
    }

    /// Stop and destroy every node created through this lifecycle.
    pub fn teardown(&mut self) {
        let count = self.owned.len();
        let ids: Vec<NodeId> = self.owned.iter().map(|o| o.id).collect();
        for id in ids {
            if let Err(e) = self.graph.disconnect(id) {
                warn!("failed to disconnect node {} during teardown: {}", id, e);
            }
            if let Err(e) = self.release(id) {
                error!("failed to release node {} during teardown: {}", id, e);
            }
        }
        self.owned.clear();
        self.output_bus = None;
        info!("audio graph torn down, {} nodes released", count);
    }

    pub fn count_owned(&self, owner: Owner) -> usize {
        self.owned.iter().filter(|o| o.owner == owner).count()
    }

    pub fn live_nodes(&self) -> usize {
        self.owned.len()
    }

    pub fn current_time(&self) -> f64 {
        self.graph.current_time()
    }

    pub fn destination(&self) -> NodeId {
        self.graph.destination()
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    /// Set the level of the output bus.
    pub fn set_bus_gain(&mut self, gain: f32) -> Result<(), GraphError> {
        let bus = self.init()?;
        self.set_param_now(bus, params::GAIN, gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingGraph;

    #[test]
    fn init_creates_one_bus() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let bus = lifecycle.init().unwrap();
        assert_eq!(lifecycle.init().unwrap(), bus);
        assert_eq!(lifecycle.graph().created(NodeKind::Gain), 1);
    }

    #[test]
    fn stopping_twice_is_tolerated() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let osc = lifecycle.create(Owner::Voice(0), NodeKind::Oscillator).unwrap();
        lifecycle.start(osc).unwrap();

        assert_eq!(lifecycle.stop(osc), Ok(true));
        assert_eq!(lifecycle.stop(osc), Ok(false));
    }

    #[test]
    fn release_owner_only_touches_that_owner() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        lifecycle.init().unwrap();
        let osc = lifecycle.create(Owner::Voice(1), NodeKind::Oscillator).unwrap();
        lifecycle.create(Owner::Voice(1), NodeKind::Gain).unwrap();
        lifecycle.create(Owner::Voice(2), NodeKind::Oscillator).unwrap();
        lifecycle.start(osc).unwrap();

        assert_eq!(lifecycle.release_owner(Owner::Voice(1)), 2);
        assert_eq!(lifecycle.count_owned(Owner::Voice(1)), 0);
        assert_eq!(lifecycle.count_owned(Owner::Voice(2)), 1);
        assert_eq!(lifecycle.graph().stops(), 1);
        assert!(lifecycle.output_bus().is_some());
    }

    #[test]
    fn teardown_releases_everything() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        lifecycle.init().unwrap();
        lifecycle.create(Owner::Reverb, NodeKind::ReverbTank).unwrap();
        lifecycle.create(Owner::FilterPair, NodeKind::Gain).unwrap();

        lifecycle.teardown();
        assert_eq!(lifecycle.live_nodes(), 0);
        assert_eq!(lifecycle.graph().live(), 0);
        assert!(lifecycle.output_bus().is_none());
    }

    #[test]
    fn creation_failure_is_reported() {
        let mut graph = RecordingGraph::new();
        graph.fail_creation(NodeKind::ReverbTank);
        let mut lifecycle = GraphLifecycle::new(graph);

        assert!(lifecycle.create(Owner::Reverb, NodeKind::ReverbTank).is_err());
        assert_eq!(lifecycle.live_nodes(), 0);
    }
}
