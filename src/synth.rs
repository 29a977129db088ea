// src/synth.rs
//
// Control-thread facade. Owns the lifecycle, the oscillator bank and the
// effects chain, and routes UI parameter changes to whichever of them is
// responsible.
//
//   voices -> output bus -> filter pair (HP -> LP) -> reverb -> destination
//
// An effect that fails to build is bypassed; the rest of the chain still
// reaches the destination.

use std::fmt;
use std::sync::Arc;

use log::{error, info};

use crate::audio_graph::{AudioGraph, GraphError};
use crate::bank::{BankError, Claim, LoadOutcome, OscillatorBank, VoiceParams, WriteResult};
use crate::bridge::{GraphHandle, Renderer, create_bridge};
use crate::config::EngineConfig;
use crate::effects::{AlgorithmicReverb, FilterPair, FilterPairState, ReverbParameters};
use crate::lifecycle::GraphLifecycle;
use crate::node::NodeId;
use crate::param_info::AutomatedParamList;
use crate::remote::{LogicBlockConfig, OscillatorConfig, RemoteError, RemoteStore};
use crate::sync::Clock;

#[derive(Debug)]
pub enum SynthError {
    Graph(GraphError),
    Bank(BankError),
    Remote(RemoteError),
    /// The named effect failed to build and is bypassed.
    EffectUnavailable(&'static str),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::Graph(e) => write!(f, "{}", e),
            SynthError::Bank(e) => write!(f, "{}", e),
            SynthError::Remote(e) => write!(f, "{}", e),
            SynthError::EffectUnavailable(name) => write!(f, "{} is not available", name),
        }
    }
}

impl std::error::Error for SynthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SynthError::Graph(e) => Some(e),
            SynthError::Bank(e) => Some(e),
            SynthError::Remote(e) => Some(e),
            SynthError::EffectUnavailable(_) => None,
        }
    }
}

impl From<GraphError> for SynthError {
    fn from(e: GraphError) -> Self {
        SynthError::Graph(e)
    }
}

impl From<BankError> for SynthError {
    fn from(e: BankError) -> Self {
        SynthError::Bank(e)
    }
}

impl From<RemoteError> for SynthError {
    fn from(e: RemoteError) -> Self {
        SynthError::Remote(e)
    }
}

const FILTERS: &str = "filter pair";
const REVERB: &str = "reverb";

pub struct Synth<G: AudioGraph> {
    lifecycle: GraphLifecycle<G>,
    bank: OscillatorBank,
    filters: Option<FilterPair>,
    reverb: Option<AlgorithmicReverb>,
    store: Arc<dyn RemoteStore>,
}

impl<G: AudioGraph> Synth<G> {
    /// Build the output bus and the effects chain. Voices are not loaded
    /// until [`load`](Self::load).
    pub fn new(
        graph: G,
        config: &EngineConfig,
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SynthError> {
        let mut lifecycle = GraphLifecycle::new(graph);
        let bus = lifecycle.init()?;

        let filters = FilterPair::new(&mut lifecycle)
            .map_err(|e| error!("{} bypassed: {}", FILTERS, e))
            .ok();
        let reverb = AlgorithmicReverb::new(&mut lifecycle)
            .map_err(|e| error!("{} bypassed: {}", REVERB, e))
            .ok();

        let destination = lifecycle.destination();
        let mut tail = bus;
        if let Some(filters) = &filters {
            lifecycle.connect(tail, filters.input())?;
            tail = filters.output();
        }
        if let Some(reverb) = &reverb {
            lifecycle.connect(tail, reverb.input())?;
            tail = reverb.output();
        }
        lifecycle.connect(tail, destination)?;

        let bank = OscillatorBank::new(config, Arc::clone(&store), clock);
        info!(
            "synth ready: {} voices, filters {}, reverb {}",
            bank.len(),
            if filters.is_some() { "on" } else { "bypassed" },
            if reverb.is_some() { "on" } else { "bypassed" },
        );

        Ok(Self {
            lifecycle,
            bank,
            filters,
            reverb,
            store,
        })
    }

    /// Fetch the voices from the store, or fall back to local defaults.
    pub fn load(&mut self) -> LoadOutcome {
        self.bank.load(&mut self.lifecycle)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Voices
    // ═══════════════════════════════════════════════════════════════════

    pub fn set_authority(&mut self, voice: usize, claim: Claim) -> Result<(), SynthError> {
        Ok(self.bank.set_authority(&mut self.lifecycle, voice, claim)?)
    }

    pub fn update_voice(&mut self, voice: usize, params: VoiceParams) -> Result<(), SynthError> {
        Ok(self
            .bank
            .update_parameters(&mut self.lifecycle, voice, params)?)
    }

    pub fn set_voice_active(&mut self, voice: usize, active: bool) -> Result<(), SynthError> {
        Ok(self.bank.set_active(&mut self.lifecycle, voice, active)?)
    }

    /// Apply a full oscillator record, e.g. one pushed by the store.
    pub fn apply_oscillator_config(&mut self, config: &OscillatorConfig) -> Result<(), SynthError> {
        Ok(self.bank.apply_config(&mut self.lifecycle, config)?)
    }

    pub fn release_voice(&mut self, voice: usize) -> Result<(), SynthError> {
        Ok(self.bank.release(&mut self.lifecycle, voice)?)
    }

    /// Logic blocks have no local audio; they go straight to the store.
    pub fn update_logic_block(&self, config: &LogicBlockConfig) -> Result<(), SynthError> {
        Ok(self.store.update_logic_block(config)?)
    }

    /// Fire due remote writes. Call from the control loop.
    pub fn poll(&mut self) -> Vec<WriteResult> {
        self.bank.poll()
    }

    pub fn flush(&mut self) -> Vec<WriteResult> {
        self.bank.flush()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.bank.next_deadline()
    }

    pub fn set_master_gain(&mut self, gain: f32) -> Result<(), SynthError> {
        Ok(self.lifecycle.set_bus_gain(gain.clamp(0.0, 1.0))?)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Effects
    // ═══════════════════════════════════════════════════════════════════

    fn filters_mut(&mut self) -> Result<(&mut FilterPair, &mut GraphLifecycle<G>), SynthError> {
        match self.filters.as_mut() {
            Some(filters) => Ok((filters, &mut self.lifecycle)),
            None => Err(SynthError::EffectUnavailable(FILTERS)),
        }
    }

    fn reverb_mut(
        &mut self,
    ) -> Result<(&mut AlgorithmicReverb, &mut GraphLifecycle<G>), SynthError> {
        match self.reverb.as_mut() {
            Some(reverb) => Ok((reverb, &mut self.lifecycle)),
            None => Err(SynthError::EffectUnavailable(REVERB)),
        }
    }

    pub fn set_filter_parameters(&mut self, state: FilterPairState) -> Result<(), SynthError> {
        let (filters, lifecycle) = self.filters_mut()?;
        Ok(filters.set_parameters(lifecycle, state)?)
    }

    pub fn filter_parameters(&self) -> Option<FilterPairState> {
        self.filters.as_ref().map(FilterPair::parameters)
    }

    pub fn set_reverb_mix(&mut self, mix: f32) -> Result<(), SynthError> {
        let (reverb, lifecycle) = self.reverb_mut()?;
        Ok(reverb.set_wet_dry_mix(lifecycle, mix)?)
    }

    pub fn set_reverb_decay(&mut self, seconds: f64) -> Result<(), SynthError> {
        let (reverb, lifecycle) = self.reverb_mut()?;
        Ok(reverb.set_decay_time(lifecycle, seconds)?)
    }

    pub fn set_reverb_feedback(&mut self, gain: f32) -> Result<(), SynthError> {
        let (reverb, lifecycle) = self.reverb_mut()?;
        Ok(reverb.set_feedback_gain(lifecycle, gain)?)
    }

    pub fn set_reverb_delay_times(&mut self, first: f32, second: f32) -> Result<(), SynthError> {
        let (reverb, lifecycle) = self.reverb_mut()?;
        reverb.set_delay_time_1(lifecycle, first)?;
        Ok(reverb.set_delay_time_2(lifecycle, second)?)
    }

    pub fn set_reverb_allpass(&mut self, index: usize, freq: f32) -> Result<(), SynthError> {
        let (reverb, lifecycle) = self.reverb_mut()?;
        Ok(reverb.set_allpass_freq(lifecycle, index, freq)?)
    }

    pub fn set_reverb_lowpass(&mut self, freq: f32) -> Result<(), SynthError> {
        let (reverb, lifecycle) = self.reverb_mut()?;
        Ok(reverb.set_lowpass_freq(lifecycle, freq)?)
    }

    pub fn set_reverb_parameters(&mut self, params: ReverbParameters) -> Result<(), SynthError> {
        let (reverb, lifecycle) = self.reverb_mut()?;
        Ok(reverb.set_all_parameters(lifecycle, params)?)
    }

    pub fn reverb_parameters(&self) -> Option<ReverbParameters> {
        self.reverb.as_ref().map(AlgorithmicReverb::parameters)
    }

    /// Automatable parameters of every live effect.
    pub fn automated_parameters(&self) -> Vec<AutomatedParamList> {
        let mut lists = Vec::new();
        if let Some(filters) = &self.filters {
            lists.push(filters.automated_parameters());
        }
        if let Some(reverb) = &self.reverb {
            lists.push(reverb.automated_parameters());
        }
        lists
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors & teardown
    // ═══════════════════════════════════════════════════════════════════

    pub fn bank(&self) -> &OscillatorBank {
        &self.bank
    }

    pub fn lifecycle(&self) -> &GraphLifecycle<G> {
        &self.lifecycle
    }

    pub fn output_bus(&self) -> Option<NodeId> {
        self.lifecycle.output_bus()
    }

    pub fn graph(&self) -> &G {
        self.lifecycle.graph()
    }

    pub fn graph_mut(&mut self) -> &mut G {
        self.lifecycle.graph_mut()
    }

    /// Flush remote writes, release every voice, destroy the effects and
    /// tear down the graph. Returns the results of the flushed writes.
    pub fn shutdown(&mut self) -> Vec<WriteResult> {
        let results = self.bank.shutdown(&mut self.lifecycle);
        if let Some(reverb) = self.reverb.take() {
            reverb.destroy(&mut self.lifecycle);
        }
        if let Some(filters) = self.filters.take() {
            filters.destroy(&mut self.lifecycle);
        }
        self.lifecycle.teardown();
        results
    }
}

/// Build a synth on a fresh control/render bridge.
///
/// The returned [`Renderer`] belongs on the audio thread.
pub fn create_synth(
    config: &EngineConfig,
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
) -> Result<(Synth<GraphHandle>, Renderer), SynthError> {
    let (handle, renderer) = create_bridge(config);
    let synth = Synth::new(handle, config, store, clock)?;
    Ok((synth, renderer))
}
