// Output conditioning: highpass into lowpass.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::audio_graph::{AudioGraph, GraphError};
use crate::lifecycle::{GraphLifecycle, Owner};
use crate::node::{FilterType, NodeId, NodeKind};
use crate::nodes::params;
use crate::param_info::{AutomatedParamList, ParamInfo};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterPairState {
    pub highpass_freq_hz: f32,
    pub lowpass_freq_hz: f32,
}

impl Default for FilterPairState {
    fn default() -> Self {
        Self {
            highpass_freq_hz: 20.0,
            lowpass_freq_hz: 1200.0,
        }
    }
}

/// input -> highpass -> lowpass -> output
#[derive(Debug)]
pub struct FilterPair {
    highpass: NodeId,
    lowpass: NodeId,
    state: FilterPairState,
}

impl FilterPair {
    pub fn new<G: AudioGraph>(lifecycle: &mut GraphLifecycle<G>) -> Result<Self, GraphError> {
        let highpass = lifecycle.create(Owner::FilterPair, NodeKind::Filter(FilterType::Highpass))?;
        let lowpass = match lifecycle.create(Owner::FilterPair, NodeKind::Filter(FilterType::Lowpass)) {
            Ok(id) => id,
            Err(e) => {
                lifecycle.release_owner(Owner::FilterPair);
                return Err(e);
            }
        };

        let mut pair = Self {
            highpass,
            lowpass,
            state: FilterPairState::default(),
        };
        let wired = lifecycle
            .connect(highpass, lowpass)
            .and_then(|_| pair.set_parameters(lifecycle, pair.state));
        if let Err(e) = wired {
            lifecycle.release_owner(Owner::FilterPair);
            return Err(e);
        }
        Ok(pair)
    }

    /// Apply both cutoffs immediately.
    pub fn set_parameters<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        state: FilterPairState,
    ) -> Result<(), GraphError> {
        lifecycle.set_param(self.highpass, params::CUTOFF, state.highpass_freq_hz)?;
        lifecycle.set_param(self.lowpass, params::CUTOFF, state.lowpass_freq_hz)?;
        self.state = state;
        Ok(())
    }

    pub fn parameters(&self) -> FilterPairState {
        self.state
    }

    #[inline]
    pub fn input(&self) -> NodeId {
        self.highpass
    }

    #[inline]
    pub fn output(&self) -> NodeId {
        self.lowpass
    }

    pub fn connect<G: AudioGraph>(
        &self,
        lifecycle: &mut GraphLifecycle<G>,
        dest: NodeId,
    ) -> Result<(), GraphError> {
        lifecycle.connect(self.lowpass, dest)
    }

    /// Disconnect both stages and release them.
    pub fn destroy<G: AudioGraph>(self, lifecycle: &mut GraphLifecycle<G>) {
        for node in [self.lowpass, self.highpass] {
            if let Err(e) = lifecycle.disconnect(node) {
                warn!("filters: disconnect of node {} failed: {}", node, e);
            }
            if let Err(e) = lifecycle.release(node) {
                warn!("filters: release of node {} failed: {}", node, e);
            }
        }
    }

    pub fn automated_parameters(&self) -> AutomatedParamList {
        let mut list = AutomatedParamList::new("outputFilters");
        list.push(
            self.lowpass,
            ParamInfo::frequency(params::CUTOFF, "Lowpass Freq", 20.0, 20_000.0)
                .short_name("LPF")
                .default(1200.0),
        );
        list.push(
            self.highpass,
            ParamInfo::frequency(params::CUTOFF, "Highpass Freq", 20.0, 20_000.0)
                .short_name("HPF")
                .default(20.0),
        );
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingGraph;

    #[test]
    fn new_wires_highpass_into_lowpass() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let pair = FilterPair::new(&mut lifecycle).unwrap();

        let graph = lifecycle.graph();
        assert!(graph.is_connected(pair.input(), pair.output()));
        assert_eq!(graph.param(pair.input(), params::CUTOFF), Some(20.0));
        assert_eq!(graph.param(pair.output(), params::CUTOFF), Some(1200.0));
    }

    #[test]
    fn set_parameters_round_trips() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let mut pair = FilterPair::new(&mut lifecycle).unwrap();
        let state = FilterPairState {
            highpass_freq_hz: 80.0,
            lowpass_freq_hz: 6000.0,
        };
        pair.set_parameters(&mut lifecycle, state).unwrap();

        assert_eq!(pair.parameters(), state);
        assert_eq!(lifecycle.graph().param(pair.output(), params::CUTOFF), Some(6000.0));
    }

    #[test]
    fn destroy_releases_both_stages() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let pair = FilterPair::new(&mut lifecycle).unwrap();
        pair.destroy(&mut lifecycle);

        assert_eq!(lifecycle.count_owned(Owner::FilterPair), 0);
        assert_eq!(lifecycle.graph().live(), 0);
    }

    #[test]
    fn destroy_survives_a_stage_already_gone() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let pair = FilterPair::new(&mut lifecycle).unwrap();
        lifecycle.graph_mut().destroy_node(pair.output()).unwrap();

        pair.destroy(&mut lifecycle);
        assert_eq!(lifecycle.count_owned(Owner::FilterPair), 0);
        assert_eq!(lifecycle.graph().live(), 0);
    }

    #[test]
    fn partial_creation_is_rolled_back() {
        let mut graph = RecordingGraph::new();
        graph.fail_creation(NodeKind::Filter(FilterType::Lowpass));
        let mut lifecycle = GraphLifecycle::new(graph);

        assert!(FilterPair::new(&mut lifecycle).is_err());
        assert_eq!(lifecycle.graph().live(), 0);
    }

    #[test]
    fn exposes_both_cutoffs_for_automation() {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let pair = FilterPair::new(&mut lifecycle).unwrap();
        let list = pair.automated_parameters();

        assert_eq!(list.len(), 2);
        assert_eq!(list.find("Lowpass Freq").map(|p| p.node), Some(pair.output()));
    }
}
