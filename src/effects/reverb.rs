// src/effects/reverb.rs
//
// Algorithmic reverb: dry/wet split around a ReverbTank.
//
//   input ─┬─> dry ──────────────> output
//          └─> wet ──> tank ─────> output

use log::warn;
use serde::{Deserialize, Serialize};

use crate::audio_graph::{AudioGraph, GraphError};
use crate::lifecycle::{GraphLifecycle, Owner};
use crate::node::{NodeId, NodeKind};
use crate::nodes::{
    MAX_ALLPASS_FREQUENCY, MAX_DELAY_SECONDS, MAX_FEEDBACK_GAIN, feedback_for_decay, params,
};
use crate::param_info::{AutomatedParamList, ParamInfo, ParamUnit};

pub const DEFAULT_DECAY_TIME: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParameters {
    pub delay_time_1: f32,
    pub delay_time_2: f32,
    pub allpass_freq_1: f32,
    pub allpass_freq_2: f32,
    pub allpass_freq_3: f32,
    pub allpass_freq_4: f32,
    pub feedback_gain: f32,
    pub lowpass_freq_hz: f32,
    pub wet_dry_mix: f32,
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self {
            delay_time_1: 0.1,
            delay_time_2: 0.15,
            allpass_freq_1: 1000.0,
            allpass_freq_2: 2000.0,
            allpass_freq_3: 3000.0,
            allpass_freq_4: 4000.0,
            feedback_gain: 0.5,
            lowpass_freq_hz: 2000.0,
            wet_dry_mix: 0.5,
        }
    }
}

impl ReverbParameters {
    pub fn allpass_freqs(&self) -> [f32; 4] {
        [
            self.allpass_freq_1,
            self.allpass_freq_2,
            self.allpass_freq_3,
            self.allpass_freq_4,
        ]
    }

    fn allpass_freq_mut(&mut self, index: usize) -> Option<&mut f32> {
        match index {
            0 => Some(&mut self.allpass_freq_1),
            1 => Some(&mut self.allpass_freq_2),
            2 => Some(&mut self.allpass_freq_3),
            3 => Some(&mut self.allpass_freq_4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ReverbNodes {
    input: NodeId,
    dry: NodeId,
    wet: NodeId,
    tank: NodeId,
    output: NodeId,
}

#[derive(Debug)]
pub struct AlgorithmicReverb {
    nodes: ReverbNodes,
    params: ReverbParameters,
    decay_time: f64,
}

impl AlgorithmicReverb {
    pub fn new<G: AudioGraph>(lifecycle: &mut GraphLifecycle<G>) -> Result<Self, GraphError> {
        match Self::build(lifecycle) {
            Ok(reverb) => Ok(reverb),
            Err(e) => {
                lifecycle.release_owner(Owner::Reverb);
                Err(e)
            }
        }
    }

    fn build<G: AudioGraph>(lifecycle: &mut GraphLifecycle<G>) -> Result<Self, GraphError> {
        let nodes = ReverbNodes {
            input: lifecycle.create(Owner::Reverb, NodeKind::Gain)?,
            dry: lifecycle.create(Owner::Reverb, NodeKind::Gain)?,
            wet: lifecycle.create(Owner::Reverb, NodeKind::Gain)?,
            tank: lifecycle.create(Owner::Reverb, NodeKind::ReverbTank)?,
            output: lifecycle.create(Owner::Reverb, NodeKind::Gain)?,
        };

        lifecycle.connect(nodes.input, nodes.dry)?;
        lifecycle.connect(nodes.dry, nodes.output)?;
        lifecycle.connect(nodes.input, nodes.wet)?;
        lifecycle.connect(nodes.wet, nodes.tank)?;
        lifecycle.connect(nodes.tank, nodes.output)?;

        let mut reverb = Self {
            nodes,
            params: ReverbParameters::default(),
            decay_time: DEFAULT_DECAY_TIME,
        };
        reverb.set_all_parameters(lifecycle, ReverbParameters::default())?;
        Ok(reverb)
    }

    /// Set the wet/dry balance. Dry gain is always `1 - wet`.
    pub fn set_wet_dry_mix<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        mix: f32,
    ) -> Result<(), GraphError> {
        let mix = if mix.is_nan() { 0.0 } else { mix.clamp(0.0, 1.0) };
        lifecycle.set_param_now(self.nodes.dry, params::GAIN, 1.0 - mix)?;
        lifecycle.set_param_now(self.nodes.wet, params::GAIN, mix)?;
        self.params.wet_dry_mix = mix;
        Ok(())
    }

    pub fn wet_gain(&self) -> f32 {
        self.params.wet_dry_mix
    }

    pub fn dry_gain(&self) -> f32 {
        1.0 - self.params.wet_dry_mix
    }

    /// Change the first delay line's length. The tank crossfades to it.
    pub fn set_delay_time_1<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        seconds: f32,
    ) -> Result<(), GraphError> {
        let seconds = seconds.clamp(0.0, MAX_DELAY_SECONDS as f32);
        lifecycle.set_param(self.nodes.tank, params::DELAY_TIME_1, seconds)?;
        self.params.delay_time_1 = seconds;
        Ok(())
    }

    pub fn set_delay_time_2<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        seconds: f32,
    ) -> Result<(), GraphError> {
        let seconds = seconds.clamp(0.0, MAX_DELAY_SECONDS as f32);
        lifecycle.set_param(self.nodes.tank, params::DELAY_TIME_2, seconds)?;
        self.params.delay_time_2 = seconds;
        Ok(())
    }

    /// Set allpass stage `index` (0..4). Stages 0-1 follow delay line 1,
    /// stages 2-3 follow delay line 2. Frequencies are clamped to
    /// `[20, MAX_ALLPASS_FREQUENCY]` Hz.
    pub fn set_allpass_freq<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        index: usize,
        freq: f32,
    ) -> Result<(), GraphError> {
        let Some(slot) = self.params.allpass_freq_mut(index) else {
            return Err(GraphError::InvalidState {
                node: self.nodes.tank,
                reason: "allpass index out of range",
            });
        };
        let freq = freq.clamp(20.0, MAX_ALLPASS_FREQUENCY);
        *slot = freq;
        lifecycle.set_param(self.nodes.tank, params::allpass_freq(index), freq)
    }

    /// Set the loop gain directly.
    ///
    /// Values up to 2.0 are accepted. At 1.0 and above the tail grows
    /// instead of decaying.
    pub fn set_feedback_gain<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        gain: f32,
    ) -> Result<(), GraphError> {
        let gain = gain.clamp(0.0, MAX_FEEDBACK_GAIN);
        if gain >= 1.0 {
            warn!("reverb feedback gain {:.3} is unstable (>= 1.0)", gain);
        }
        lifecycle.set_param_now(self.nodes.tank, params::FEEDBACK_GAIN, gain)?;
        self.params.feedback_gain = gain;
        Ok(())
    }

    /// Derive feedback gain from a -60 dB decay time in seconds.
    pub fn set_decay_time<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        seconds: f64,
    ) -> Result<(), GraphError> {
        let gain = feedback_for_decay(
            self.params.delay_time_1 as f64,
            self.params.delay_time_2 as f64,
            seconds,
        );
        lifecycle.set_param_now(self.nodes.tank, params::FEEDBACK_GAIN, gain)?;
        self.params.feedback_gain = gain;
        self.decay_time = seconds;
        Ok(())
    }

    pub fn decay_time(&self) -> f64 {
        self.decay_time
    }

    pub fn set_lowpass_freq<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        freq: f32,
    ) -> Result<(), GraphError> {
        lifecycle.set_param_now(self.nodes.tank, params::LOWPASS_FREQ, freq)?;
        self.params.lowpass_freq_hz = freq;
        Ok(())
    }

    pub fn set_all_parameters<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        p: ReverbParameters,
    ) -> Result<(), GraphError> {
        self.set_delay_time_1(lifecycle, p.delay_time_1)?;
        self.set_delay_time_2(lifecycle, p.delay_time_2)?;
        for (i, freq) in p.allpass_freqs().into_iter().enumerate() {
            self.set_allpass_freq(lifecycle, i, freq)?;
        }
        self.set_feedback_gain(lifecycle, p.feedback_gain)?;
        self.set_lowpass_freq(lifecycle, p.lowpass_freq_hz)?;
        self.set_wet_dry_mix(lifecycle, p.wet_dry_mix)
    }

    pub fn parameters(&self) -> ReverbParameters {
        self.params
    }

    #[inline]
    pub fn input(&self) -> NodeId {
        self.nodes.input
    }

    #[inline]
    pub fn output(&self) -> NodeId {
        self.nodes.output
    }

    pub fn connect<G: AudioGraph>(
        &self,
        lifecycle: &mut GraphLifecycle<G>,
        dest: NodeId,
    ) -> Result<(), GraphError> {
        lifecycle.connect(self.nodes.output, dest)
    }

    /// Disconnect the output from everything downstream.
    pub fn disconnect<G: AudioGraph>(
        &self,
        lifecycle: &mut GraphLifecycle<G>,
    ) -> Result<(), GraphError> {
        lifecycle.disconnect(self.nodes.output)
    }

    /// Disconnect every internal node explicitly, then release them.
    pub fn destroy<G: AudioGraph>(self, lifecycle: &mut GraphLifecycle<G>) {
        let n = self.nodes;
        for node in [n.output, n.input, n.dry, n.wet, n.tank] {
            if let Err(e) = lifecycle.disconnect(node) {
                warn!("reverb: disconnect of node {} failed: {}", node, e);
            }
        }
        for node in [n.output, n.input, n.dry, n.wet, n.tank] {
            if let Err(e) = lifecycle.release(node) {
                warn!("reverb: release of node {} failed: {}", node, e);
            }
        }
    }

    pub fn automated_parameters(&self) -> AutomatedParamList {
        let tank = self.nodes.tank;
        let mut list = AutomatedParamList::new("reverbAlgo");

        for (i, id) in [params::DELAY_TIME_1, params::DELAY_TIME_2].into_iter().enumerate() {
            list.push(
                tank,
                ParamInfo::new(id, format!("Delay Time {}", i + 1))
                    .short_name("DLY")
                    .range(0.0, MAX_DELAY_SECONDS as f32)
                    .unit(ParamUnit::Seconds),
            );
        }
        for i in 0..4 {
            list.push(
                tank,
                ParamInfo::frequency(
                    params::allpass_freq(i),
                    format!("Allpass Freq {}", i + 1),
                    20.0,
                    MAX_ALLPASS_FREQUENCY,
                )
                .short_name("APF"),
            );
        }
        list.push(
            tank,
            ParamInfo::new(params::FEEDBACK_GAIN, "Feedback Gain")
                .short_name("FBK")
                .range(0.0, MAX_FEEDBACK_GAIN)
                .default(0.5),
        );
        list.push(
            tank,
            ParamInfo::frequency(params::LOWPASS_FREQ, "Lowpass Freq", 20.0, 20_000.0)
                .short_name("LPF")
                .default(2000.0),
        );
        list.push(
            self.nodes.wet,
            ParamInfo::new(params::GAIN, "Wet/Dry Mix")
                .short_name("MIX")
                .default(0.5),
        );
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingGraph;

    fn reverb() -> (GraphLifecycle<RecordingGraph>, AlgorithmicReverb) {
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        let reverb = AlgorithmicReverb::new(&mut lifecycle).unwrap();
        (lifecycle, reverb)
    }

    #[test]
    fn wet_and_dry_always_sum_to_one() {
        let (mut lifecycle, mut reverb) = reverb();
        for mix in [0.0, 0.1, 0.25, 0.5, 0.73, 1.0, -0.5, 1.5] {
            reverb.set_wet_dry_mix(&mut lifecycle, mix).unwrap();

            let graph = lifecycle.graph();
            let dry = graph.param(reverb.nodes.dry, params::GAIN).unwrap();
            let wet = graph.param(reverb.nodes.wet, params::GAIN).unwrap();
            assert!((dry + wet - 1.0).abs() < 1e-6, "mix {mix}");
            assert!((0.0..=1.0).contains(&wet));
            assert!((reverb.dry_gain() + reverb.wet_gain() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn decay_time_drives_feedback() {
        let (mut lifecycle, mut reverb) = reverb();
        reverb.set_decay_time(&mut lifecycle, 3.0).unwrap();

        let expected = 0.001_f64.powf(0.25 / 3.0) as f32;
        let fb = lifecycle.graph().param(reverb.nodes.tank, params::FEEDBACK_GAIN).unwrap();
        assert!((fb - expected).abs() < 1e-6);
        assert!(fb < 1.0);
        assert_eq!(reverb.decay_time(), 3.0);
        assert_eq!(reverb.parameters().feedback_gain, fb);
    }

    #[test]
    fn unstable_feedback_is_accepted_not_clamped() {
        let (mut lifecycle, mut reverb) = reverb();
        reverb.set_feedback_gain(&mut lifecycle, 1.6).unwrap();
        assert_eq!(reverb.parameters().feedback_gain, 1.6);

        reverb.set_feedback_gain(&mut lifecycle, 3.0).unwrap();
        assert_eq!(reverb.parameters().feedback_gain, MAX_FEEDBACK_GAIN);
    }

    #[test]
    fn topology_splits_dry_and_wet() {
        let (lifecycle, reverb) = reverb();
        let g = lifecycle.graph();
        let n = reverb.nodes;
        assert!(g.is_connected(n.input, n.dry));
        assert!(g.is_connected(n.input, n.wet));
        assert!(g.is_connected(n.wet, n.tank));
        assert!(g.is_connected(n.tank, n.output));
        assert!(g.is_connected(n.dry, n.output));
        assert_eq!(g.live_of(NodeKind::ReverbTank), 1);
    }

    #[test]
    fn set_all_parameters_round_trips() {
        let (mut lifecycle, mut reverb) = reverb();
        let p = ReverbParameters {
            delay_time_1: 0.03,
            delay_time_2: 0.047,
            allpass_freq_1: 500.0,
            allpass_freq_2: 900.0,
            allpass_freq_3: 1700.0,
            allpass_freq_4: 2500.0,
            feedback_gain: 0.7,
            lowpass_freq_hz: 5000.0,
            wet_dry_mix: 0.3,
        };
        reverb.set_all_parameters(&mut lifecycle, p).unwrap();
        assert_eq!(reverb.parameters(), p);
        assert_eq!(
            lifecycle.graph().param(reverb.nodes.tank, params::allpass_freq(3)),
            Some(2500.0)
        );
    }

    #[test]
    fn allpass_index_is_checked() {
        let (mut lifecycle, mut reverb) = reverb();
        assert!(reverb.set_allpass_freq(&mut lifecycle, 4, 100.0).is_err());
    }

    #[test]
    fn destroy_releases_every_node() {
        let (mut lifecycle, reverb) = reverb();
        reverb.destroy(&mut lifecycle);
        assert_eq!(lifecycle.graph().live(), 0);
        assert_eq!(lifecycle.count_owned(Owner::Reverb), 0);
    }

    #[test]
    fn failed_tank_leaves_nothing_behind() {
        let mut graph = RecordingGraph::new();
        graph.fail_creation(NodeKind::ReverbTank);
        let mut lifecycle = GraphLifecycle::new(graph);

        assert!(AlgorithmicReverb::new(&mut lifecycle).is_err());
        assert_eq!(lifecycle.graph().live(), 0);
    }

    #[test]
    fn exposes_nine_automation_targets() {
        let (_lifecycle, reverb) = reverb();
        let list = reverb.automated_parameters();
        assert_eq!(list.len(), 9);
        assert_eq!(list.host_name, "reverbAlgo");
        assert!(list.find("Wet/Dry Mix").is_some());
    }

    #[test]
    fn allpass_range_stays_below_quarter_sample_rate() {
        let (mut lifecycle, mut reverb) = reverb();
        let list = reverb.automated_parameters();
        let info = &list.find("Allpass Freq 1").unwrap().info;
        assert_eq!(info.max, MAX_ALLPASS_FREQUENCY);
        assert!((info.max as f64) < 44_100.0 / 4.0);

        reverb.set_allpass_freq(&mut lifecycle, 0, 20_000.0).unwrap();
        assert_eq!(reverb.parameters().allpass_freq_1, MAX_ALLPASS_FREQUENCY);
        assert_eq!(
            lifecycle.graph().param(reverb.nodes.tank, params::allpass_freq(0)),
            Some(MAX_ALLPASS_FREQUENCY)
        );
    }

    #[test]
    fn destroy_survives_a_node_already_gone() {
        let (mut lifecycle, reverb) = reverb();
        lifecycle.graph_mut().destroy_node(reverb.nodes.dry).unwrap();

        reverb.destroy(&mut lifecycle);
        assert_eq!(lifecycle.graph().live(), 0);
        assert_eq!(lifecycle.count_owned(Owner::Reverb), 0);
    }
}
