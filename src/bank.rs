//! Oscillator bank with per-voice authority.
//!
//! Each voice is either synthesized here (`Local`: one oscillator and one
//! gain node in the graph) or owned by the remote store (`Remote`: no nodes,
//! parameter changes are debounced and written out). Local state is always
//! updated first and stays authoritative between remote flushes.
//!
//! ```text
//!   Unclaimed ──> Local ⇄ Remote
//!       ^           │       │
//!       └── release / shutdown
//! ```

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::audio_graph::{AudioGraph, GraphError};
use crate::config::EngineConfig;
use crate::lifecycle::{GraphLifecycle, Owner};
use crate::node::{NodeId, NodeKind};
use crate::nodes::{MAX_FREQUENCY, MIN_FREQUENCY, Waveform, params};
use crate::remote::{OscillatorConfig, RemoteError, RemoteStore};
use crate::sync::{Clock, DebouncedWriter};

pub const MAX_AMPLITUDE: f32 = 100.0;

/// Default voice frequencies, one per waveform.
const DEFAULT_FREQUENCIES: [f32; 4] = [220.0, 330.0, 440.0, 550.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authority {
    #[default]
    Unclaimed,
    Local,
    Remote,
}

/// Authority a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Local,
    Remote,
}

impl From<Claim> for Authority {
    fn from(claim: Claim) -> Self {
        match claim {
            Claim::Local => Authority::Local,
            Claim::Remote => Authority::Remote,
        }
    }
}

/// Partial voice update. `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceParams {
    pub frequency: Option<f32>,
    pub amplitude: Option<f32>,
    pub waveform: Option<Waveform>,
    pub active: Option<bool>,
}

impl VoiceParams {
    pub fn frequency(hz: f32) -> Self {
        Self {
            frequency: Some(hz),
            ..Self::default()
        }
    }

    pub fn amplitude(amplitude: f32) -> Self {
        Self {
            amplitude: Some(amplitude),
            ..Self::default()
        }
    }

    pub fn waveform(waveform: Waveform) -> Self {
        Self {
            waveform: Some(waveform),
            ..Self::default()
        }
    }

    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }
}

impl From<&OscillatorConfig> for VoiceParams {
    fn from(config: &OscillatorConfig) -> Self {
        Self {
            frequency: Some(config.frequency),
            amplitude: Some(config.amplitude),
            waveform: Some(config.wave_type),
            active: Some(config.is_active),
        }
    }
}

#[derive(Debug)]
pub enum BankError {
    UnknownVoice(usize),
    Graph { voice: usize, source: GraphError },
    Remote(RemoteError),
}

impl fmt::Display for BankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankError::UnknownVoice(id) => write!(f, "no voice with id {}", id),
            BankError::Graph { voice, source } => write!(f, "voice {}: {}", voice, source),
            BankError::Remote(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BankError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BankError::UnknownVoice(_) => None,
            BankError::Graph { source, .. } => Some(source),
            BankError::Remote(e) => Some(e),
        }
    }
}

impl From<RemoteError> for BankError {
    fn from(e: RemoteError) -> Self {
        BankError::Remote(e)
    }
}

/// Where the bank's initial state came from.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Remote { voices: usize },
    Defaults { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNodes {
    pub oscillator: NodeId,
    pub gain: NodeId,
}

#[derive(Debug, Clone)]
pub struct Voice {
    config: OscillatorConfig,
    authority: Authority,
    nodes: Option<LocalNodes>,
}

impl Voice {
    fn new(config: OscillatorConfig) -> Self {
        Self {
            config,
            authority: Authority::Unclaimed,
            nodes: None,
        }
    }

    pub fn id(&self) -> usize {
        self.config.oscillator_id
    }

    pub fn config(&self) -> &OscillatorConfig {
        &self.config
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn is_active(&self) -> bool {
        self.config.is_active
    }

    pub fn amplitude(&self) -> f32 {
        self.config.amplitude
    }

    pub fn local_nodes(&self) -> Option<LocalNodes> {
        self.nodes
    }

    fn apply(&mut self, params: &VoiceParams) {
        if let Some(hz) = params.frequency {
            self.config.frequency = clamp_frequency(hz);
        }
        if let Some(amplitude) = params.amplitude {
            self.config.amplitude = clamp_amplitude(amplitude);
        }
        if let Some(waveform) = params.waveform {
            self.config.wave_type = waveform;
        }
        if let Some(active) = params.active {
            self.config.is_active = active;
        }
    }
}

fn clamp_frequency(hz: f32) -> f32 {
    if hz.is_nan() {
        MIN_FREQUENCY
    } else {
        hz.clamp(MIN_FREQUENCY, MAX_FREQUENCY)
    }
}

fn clamp_amplitude(amplitude: f32) -> f32 {
    if amplitude.is_nan() {
        0.0
    } else {
        amplitude.clamp(0.0, MAX_AMPLITUDE)
    }
}

#[inline]
fn amplitude_to_gain(amplitude: f32) -> f32 {
    amplitude / MAX_AMPLITUDE
}

/// Gain a local voice should sit at. Inactive voices are held silent.
fn voice_gain(config: &OscillatorConfig) -> f32 {
    if config.is_active {
        amplitude_to_gain(config.amplitude)
    } else {
        0.0
    }
}

/// Default voice `id`: waveforms cycle Sine/Square/Sawtooth/Triangle, 220 Hz
/// upwards in 110 Hz steps, silent and inactive.
pub fn default_voice(id: usize) -> OscillatorConfig {
    let waveform = Waveform::ALL[id % Waveform::ALL.len()];
    let frequency = DEFAULT_FREQUENCIES
        .get(id)
        .copied()
        .unwrap_or(220.0 + 110.0 * id as f32);
    OscillatorConfig::new(id, waveform, clamp_frequency(frequency))
}

pub fn default_bank(size: usize) -> Vec<OscillatorConfig> {
    (0..size).map(default_voice).collect()
}

type RemoteWriter = DebouncedWriter<OscillatorConfig, Result<(), RemoteError>>;
pub type WriteResult = (usize, Result<(), RemoteError>);

pub struct OscillatorBank {
    voices: Vec<Voice>,
    writers: Vec<RemoteWriter>,
    /// Writes that came due while a new value was being queued, held until
    /// the next `poll` or `flush`.
    fired: Vec<WriteResult>,
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    smoothing_seconds: f64,
    error: Option<String>,
}

impl OscillatorBank {
    pub fn new(config: &EngineConfig, store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        let writers = (0..config.bank_size)
            .map(|_| {
                let store = Arc::clone(&store);
                DebouncedWriter::new(
                    move |osc: OscillatorConfig| store.update_oscillator(&osc),
                    config.debounce_delay_ms,
                    config.debounce_max_wait_ms,
                )
            })
            .collect();

        Self {
            voices: default_bank(config.bank_size)
                .into_iter()
                .map(Voice::new)
                .collect(),
            writers,
            fired: Vec::new(),
            store,
            clock,
            smoothing_seconds: config.param_smoothing_seconds,
            error: None,
        }
    }

    /// Fetch the bank from the store, falling back to local defaults.
    ///
    /// On success every voice is `Remote`. On failure the default bank is
    /// installed, every voice is `Local`, and the reason is kept in
    /// [`error`](Self::error).
    pub fn load<G: AudioGraph>(&mut self, lifecycle: &mut GraphLifecycle<G>) -> LoadOutcome {
        for id in 0..self.voices.len() {
            self.release_local(lifecycle, id);
            self.writers[id].cancel();
        }

        match self.store.fetch_oscillators() {
            Ok(configs) => {
                for (id, voice) in self.voices.iter_mut().enumerate() {
                    *voice = Voice::new(default_voice(id));
                }
                for config in configs {
                    let id = config.oscillator_id;
                    let Some(voice) = self.voices.get_mut(id) else {
                        warn!("store returned unknown oscillator {}, ignoring", id);
                        continue;
                    };
                    voice.config = OscillatorConfig {
                        frequency: clamp_frequency(config.frequency),
                        amplitude: clamp_amplitude(config.amplitude),
                        ..config
                    };
                }
                for voice in &mut self.voices {
                    voice.authority = Authority::Remote;
                }
                self.error = None;
                info!("loaded {} oscillators from the store", self.voices.len());
                LoadOutcome::Remote {
                    voices: self.voices.len(),
                }
            }
            Err(e) => {
                warn!("{}, using default oscillators", e);
                for (id, voice) in self.voices.iter_mut().enumerate() {
                    *voice = Voice::new(default_voice(id));
                }
                for id in 0..self.voices.len() {
                    if let Err(e) = self.set_authority(lifecycle, id, Claim::Local) {
                        error!("default voice {} unavailable: {}", id, e);
                    }
                }
                let reason = format!("Defaults loaded: {}", e);
                self.error = Some(reason.clone());
                LoadOutcome::Defaults { reason }
            }
        }
    }

    /// Move a voice to `claim`. Claiming the current authority is a no-op.
    pub fn set_authority<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        id: usize,
        claim: Claim,
    ) -> Result<(), BankError> {
        let previous = self.voice(id)?.authority;
        let target = Authority::from(claim);
        if previous == target {
            return Ok(());
        }

        if previous == Authority::Local {
            self.release_local(lifecycle, id);
        }
        self.voices[id].authority = target;
        debug!("voice {} authority {:?} -> {:?}", id, previous, target);

        match claim {
            Claim::Local => self.ensure_local_nodes(lifecycle, id)?,
            Claim::Remote => self.queue_remote_write(id),
        }
        Ok(())
    }

    /// Update a voice. Local state changes first, then the change goes to
    /// the graph (Local) or the store (Remote).
    pub fn update_parameters<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        id: usize,
        params: VoiceParams,
    ) -> Result<(), BankError> {
        let voice = self.voice_mut(id)?;
        voice.apply(&params);

        match voice.authority {
            Authority::Local => self.update_local(lifecycle, id, &params),
            Authority::Remote => {
                self.queue_remote_write(id);
                Ok(())
            }
            Authority::Unclaimed => Ok(()),
        }
    }

    /// Replace a voice's whole record, as the store would.
    pub fn apply_config<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        config: &OscillatorConfig,
    ) -> Result<(), BankError> {
        let id = config.oscillator_id;
        let voice = self.voice_mut(id)?;
        voice.config.phase = config.phase;
        voice.config.detune = config.detune;
        voice.config.pwm = config.pwm;
        self.update_parameters(lifecycle, id, VoiceParams::from(config))
    }

    pub fn set_active<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        id: usize,
        active: bool,
    ) -> Result<(), BankError> {
        self.update_parameters(lifecycle, id, VoiceParams::active(active))
    }

    fn update_local<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        id: usize,
        params: &VoiceParams,
    ) -> Result<(), BankError> {
        let voice = &self.voices[id];
        let Some(nodes) = voice.nodes else {
            // Released by an earlier deactivation.
            if voice.is_active() {
                return self.ensure_local_nodes(lifecycle, id);
            }
            return Ok(());
        };
        if params.active == Some(false) {
            self.release_local(lifecycle, id);
            return Ok(());
        }

        let config = &voice.config;
        let graph_err = |source| BankError::Graph { voice: id, source };

        if params.waveform.is_some() {
            lifecycle
                .set_param(nodes.oscillator, params::WAVEFORM, config.wave_type.as_param())
                .map_err(graph_err)?;
        }
        if params.frequency.is_some() {
            lifecycle
                .set_param_now(nodes.oscillator, params::FREQUENCY, config.frequency)
                .map_err(graph_err)?;
        }
        if params.amplitude.is_some() || params.active.is_some() {
            lifecycle
                .ramp_param(
                    nodes.gain,
                    params::GAIN,
                    voice_gain(config),
                    self.smoothing_seconds,
                )
                .map_err(graph_err)?;
        }
        Ok(())
    }

    /// Build, configure and start the voice's node pair if it has none.
    fn ensure_local_nodes<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        id: usize,
    ) -> Result<(), BankError> {
        if self.voices[id].nodes.is_some() {
            return Ok(());
        }

        match build_voice_nodes(lifecycle, id, &self.voices[id].config) {
            Ok(nodes) => {
                self.voices[id].nodes = Some(nodes);
                Ok(())
            }
            Err(source) => {
                error!("voice {} could not be created: {}", id, source);
                lifecycle.release_owner(Owner::Voice(id));
                self.voices[id].authority = Authority::Unclaimed;
                Err(BankError::Graph { voice: id, source })
            }
        }
    }

    /// Stop, disconnect and release the voice's nodes, if any.
    fn release_local<G: AudioGraph>(&mut self, lifecycle: &mut GraphLifecycle<G>, id: usize) {
        let Some(nodes) = self.voices[id].nodes.take() else {
            return;
        };
        if let Err(e) = lifecycle.stop(nodes.oscillator) {
            warn!("voice {}: stop failed: {}", id, e);
        }
        for node in [nodes.oscillator, nodes.gain] {
            if let Err(e) = lifecycle.disconnect(node) {
                warn!("voice {}: disconnect of node {} failed: {}", id, node, e);
            }
            if let Err(e) = lifecycle.release(node) {
                warn!("voice {}: release of node {} failed: {}", id, node, e);
            }
        }
    }

    /// Return a voice to `Unclaimed`. Releasing an unclaimed voice is a no-op.
    pub fn release<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
        id: usize,
    ) -> Result<(), BankError> {
        if self.voice(id)?.authority == Authority::Unclaimed {
            return Ok(());
        }
        self.release_local(lifecycle, id);
        self.voices[id].authority = Authority::Unclaimed;
        Ok(())
    }

    /// Hand the voice's current record to its writer.
    ///
    /// A write that is already overdue fires first; its result is kept for
    /// the next `poll` or `flush`.
    fn queue_remote_write(&mut self, id: usize) {
        let now = self.clock.now_ms();
        if let Some(result) = self.writers[id].poll(now) {
            self.record(id, &result);
            self.fired.push((id, result));
        }
        let config = self.voices[id].config.clone();
        self.writers[id].call(config, now);
    }

    /// Fire any debounced remote writes that are due.
    ///
    /// Failed writes are returned so the caller can retry; they are not
    /// retried here.
    pub fn poll(&mut self) -> Vec<WriteResult> {
        let now = self.clock.now_ms();
        self.collect(|writer| writer.poll(now))
    }

    /// Fire every pending remote write now.
    pub fn flush(&mut self) -> Vec<WriteResult> {
        self.collect(|writer| writer.flush())
    }

    pub fn cancel_pending(&mut self) {
        for writer in &mut self.writers {
            writer.cancel();
        }
    }

    fn collect<F>(&mut self, mut fire: F) -> Vec<WriteResult>
    where
        F: FnMut(&mut RemoteWriter) -> Option<Result<(), RemoteError>>,
    {
        let mut results = std::mem::take(&mut self.fired);
        for id in 0..self.writers.len() {
            if let Some(result) = fire(&mut self.writers[id]) {
                self.record(id, &result);
                results.push((id, result));
            }
        }
        results
    }

    fn record(&mut self, id: usize, result: &Result<(), RemoteError>) {
        if let Err(e) = result {
            warn!("remote write for voice {} failed: {}", id, e);
            self.error = Some(e.to_string());
        }
    }

    /// Earliest time (clock ms) at which `poll` has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        self.writers.iter().filter_map(|w| w.next_deadline()).min()
    }

    pub fn pending_writes(&self) -> usize {
        self.writers.iter().filter(|w| w.is_pending()).count()
    }

    /// Flush remote writes and return every voice to `Unclaimed`.
    pub fn shutdown<G: AudioGraph>(
        &mut self,
        lifecycle: &mut GraphLifecycle<G>,
    ) -> Vec<WriteResult> {
        let results = self.flush();
        for id in 0..self.voices.len() {
            self.release_local(lifecycle, id);
            self.voices[id].authority = Authority::Unclaimed;
        }
        info!("oscillator bank shut down");
        results
    }

    pub fn voice(&self, id: usize) -> Result<&Voice, BankError> {
        self.voices.get(id).ok_or(BankError::UnknownVoice(id))
    }

    fn voice_mut(&mut self, id: usize) -> Result<&mut Voice, BankError> {
        self.voices.get_mut(id).ok_or(BankError::UnknownVoice(id))
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn configs(&self) -> Vec<OscillatorConfig> {
        self.voices.iter().map(|v| v.config.clone()).collect()
    }

    pub fn authority(&self, id: usize) -> Option<Authority> {
        self.voices.get(id).map(|v| v.authority)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Last non-fatal error (fallback reason or failed remote write).
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

fn build_voice_nodes<G: AudioGraph>(
    lifecycle: &mut GraphLifecycle<G>,
    id: usize,
    config: &OscillatorConfig,
) -> Result<LocalNodes, GraphError> {
    let owner = Owner::Voice(id);
    let oscillator = lifecycle.create(owner, NodeKind::Oscillator)?;
    let gain = lifecycle.create(owner, NodeKind::Gain)?;

    lifecycle.set_param(oscillator, params::WAVEFORM, config.wave_type.as_param())?;
    lifecycle.set_param_now(oscillator, params::FREQUENCY, config.frequency)?;
    lifecycle.set_param_now(gain, params::GAIN, voice_gain(config))?;

    lifecycle.connect(oscillator, gain)?;
    lifecycle.connect_to_bus(gain)?;
    lifecycle.start(oscillator)?;

    Ok(LocalNodes { oscillator, gain })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParamEvent;
    use crate::remote::MemoryStore;
    use crate::sync::ManualClock;
    use crate::testing::RecordingGraph;

    struct Fixture {
        bank: OscillatorBank,
        lifecycle: GraphLifecycle<RecordingGraph>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(store: MemoryStore) -> Fixture {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(0));
        let remote: Arc<dyn RemoteStore> = store.clone();
        let timer: Arc<dyn Clock> = clock.clone();
        let mut lifecycle = GraphLifecycle::new(RecordingGraph::new());
        lifecycle.init().unwrap();
        Fixture {
            bank: OscillatorBank::new(&EngineConfig::default(), remote, timer),
            lifecycle,
            store,
            clock,
        }
    }

    fn remote_fixture() -> Fixture {
        let mut configs = default_bank(4);
        configs[1].is_active = true;
        configs[1].amplitude = 50.0;
        let mut f = fixture(MemoryStore::new(configs));
        f.bank.load(&mut f.lifecycle);
        f
    }

    fn oscillators(f: &Fixture) -> usize {
        f.lifecycle.graph().created(NodeKind::Oscillator)
    }

    #[test]
    fn fallback_bank_is_local_silent_and_inactive() {
        let mut f = fixture(MemoryStore::unreachable());
        let outcome = f.bank.load(&mut f.lifecycle);

        assert!(matches!(outcome, LoadOutcome::Defaults { .. }));
        assert_eq!(f.bank.len(), 4);
        for (voice, waveform) in f.bank.voices().iter().zip(Waveform::ALL) {
            assert!(!voice.is_active());
            assert_eq!(voice.amplitude(), 0.0);
            assert_eq!(voice.authority(), Authority::Local);
            assert_eq!(voice.config().wave_type, waveform);
        }
        assert_eq!(f.bank.voices()[2].config().frequency, 440.0);
        assert!(f.bank.error().unwrap().starts_with("Defaults loaded:"));

        // Every Local voice owns a pair, held at zero gain while inactive.
        assert_eq!(oscillators(&f), 4);
        for voice in f.bank.voices() {
            let nodes = voice.local_nodes().unwrap();
            assert_eq!(f.lifecycle.graph().param(nodes.gain, params::GAIN), Some(0.0));
        }
    }

    #[test]
    fn successful_load_hands_voices_to_the_store() {
        let f = remote_fixture();
        assert!(f.bank.voices().iter().all(|v| v.authority() == Authority::Remote));
        assert!(f.bank.voices()[1].is_active());
        assert!(f.bank.error().is_none());
        assert_eq!(oscillators(&f), 0);
    }

    #[test]
    fn claiming_local_twice_creates_one_oscillator() {
        let mut f = remote_fixture();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();

        assert_eq!(oscillators(&f), 1);
        assert_eq!(f.lifecycle.count_owned(Owner::Voice(1)), 2);
        let nodes = f.bank.voice(1).unwrap().local_nodes().unwrap();
        let graph = f.lifecycle.graph();
        assert!(graph.is_connected(nodes.oscillator, nodes.gain));
        assert_eq!(graph.param(nodes.gain, params::GAIN), Some(0.5));
        assert_eq!(graph.playing(), 1);
    }

    #[test]
    fn leaving_local_stops_and_disconnects_one_pair() {
        let mut f = remote_fixture();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Remote).unwrap();

        let graph = f.lifecycle.graph();
        assert_eq!(graph.stops(), 1);
        assert_eq!(graph.disconnects(), 2);
        assert_eq!(graph.live_of(NodeKind::Oscillator), 0);
        assert!(f.bank.voice(1).unwrap().local_nodes().is_none());

        // The current config goes out once the debounce settles.
        f.clock.set(500);
        let results = f.bank.poll();
        assert_eq!(results.len(), 1);
        assert_eq!(f.store.write_count(), 1);
    }

    #[test]
    fn already_stopped_oscillator_is_tolerated() {
        let mut f = remote_fixture();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();
        let osc = f.bank.voice(1).unwrap().local_nodes().unwrap().oscillator;
        f.lifecycle.graph_mut().stop(osc, 0.0).unwrap();

        assert!(f.bank.set_authority(&mut f.lifecycle, 1, Claim::Remote).is_ok());
        assert_eq!(f.lifecycle.graph().live_of(NodeKind::Oscillator), 0);
    }

    #[test]
    fn local_claim_on_inactive_voice_creates_a_silent_pair() {
        let mut f = fixture(MemoryStore::new(default_bank(4)));
        f.bank.load(&mut f.lifecycle);
        f.bank.set_authority(&mut f.lifecycle, 0, Claim::Local).unwrap();
        f.bank.set_authority(&mut f.lifecycle, 0, Claim::Local).unwrap();

        assert_eq!(oscillators(&f), 1);
        let nodes = f.bank.voice(0).unwrap().local_nodes().unwrap();
        assert_eq!(f.lifecycle.graph().param(nodes.gain, params::GAIN), Some(0.0));
    }

    #[test]
    fn deactivation_releases_and_reactivation_recreates() {
        let mut f = remote_fixture();
        f.bank.set_authority(&mut f.lifecycle, 0, Claim::Local).unwrap();
        f.bank.set_active(&mut f.lifecycle, 0, true).unwrap();
        assert_eq!(oscillators(&f), 1);

        f.bank.set_active(&mut f.lifecycle, 0, false).unwrap();
        assert_eq!(f.lifecycle.graph().live_of(NodeKind::Oscillator), 0);
        assert_eq!(f.bank.authority(0), Some(Authority::Local));

        f.bank.set_active(&mut f.lifecycle, 0, true).unwrap();
        assert_eq!(oscillators(&f), 2);
        assert!(f.bank.voice(0).unwrap().local_nodes().is_some());
    }

    #[test]
    fn local_updates_are_timed_writes() {
        let mut f = remote_fixture();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();
        let nodes = f.bank.voice(1).unwrap().local_nodes().unwrap();
        f.lifecycle.graph_mut().set_time(2.0);

        let params = VoiceParams {
            frequency: Some(880.0),
            amplitude: Some(25.0),
            ..VoiceParams::default()
        };
        f.bank.update_parameters(&mut f.lifecycle, 1, params).unwrap();

        let events = f.lifecycle.graph().events();
        assert!(events.contains(&(
            nodes.oscillator,
            params::FREQUENCY,
            ParamEvent::SetValue {
                value: 880.0,
                time: 2.0
            }
        )));
        let ramp = events.iter().find_map(|&(node, param, event)| match event {
            ParamEvent::LinearRamp { value, end_time } if node == nodes.gain && param == params::GAIN => {
                Some((value, end_time))
            }
            _ => None,
        });
        let (value, end_time) = ramp.unwrap();
        assert_eq!(value, 0.25);
        assert!((end_time - 2.005).abs() < 1e-9);
        assert_eq!(f.store.write_count(), 0);
    }

    #[test]
    fn remote_updates_are_debounced() {
        let mut f = remote_fixture();
        for (t, hz) in [(0, 300.0), (50, 310.0), (100, 320.0)] {
            f.clock.set(t);
            f.bank
                .update_parameters(&mut f.lifecycle, 2, VoiceParams::frequency(hz))
                .unwrap();
        }
        assert_eq!(f.bank.next_deadline(), Some(600));

        f.clock.set(599);
        assert!(f.bank.poll().is_empty());
        f.clock.set(600);
        assert_eq!(f.bank.poll().len(), 1);
        assert_eq!(f.store.write_count(), 1);
        assert_eq!(f.store.oscillator(2).unwrap().frequency, 320.0);
        assert_eq!(oscillators(&f), 0);
    }

    #[test]
    fn failed_remote_write_is_reported_not_retried() {
        let mut f = remote_fixture();
        f.store.set_unreachable(true);
        f.bank
            .update_parameters(&mut f.lifecycle, 0, VoiceParams::amplitude(80.0))
            .unwrap();

        let results = f.bank.flush();
        assert!(matches!(results.as_slice(), [(0, Err(RemoteError::Unreachable(_)))]));
        assert_eq!(f.bank.pending_writes(), 0);
        // Local state still holds the latest value.
        assert_eq!(f.bank.voice(0).unwrap().amplitude(), 80.0);
    }

    #[test]
    fn overdue_failure_is_reported_when_the_next_value_is_queued() {
        let mut f = remote_fixture();
        f.store.set_unreachable(true);
        f.bank
            .update_parameters(&mut f.lifecycle, 0, VoiceParams::amplitude(30.0))
            .unwrap();

        // The first write is overdue when the second value arrives.
        f.clock.set(700);
        f.bank
            .update_parameters(&mut f.lifecycle, 0, VoiceParams::amplitude(40.0))
            .unwrap();
        assert!(f.bank.error().is_some());
        f.store.set_unreachable(false);

        let results = f.bank.poll();
        assert!(matches!(results.as_slice(), [(0, Err(RemoteError::Unreachable(_)))]));

        f.clock.set(1200);
        let results = f.bank.poll();
        assert!(matches!(results.as_slice(), [(0, Ok(()))]));
        assert_eq!(f.store.oscillator(0).unwrap().amplitude, 40.0);
    }

    #[test]
    fn creation_failure_leaves_only_that_voice_unclaimed() {
        let mut f = remote_fixture();
        f.bank.set_active(&mut f.lifecycle, 0, true).unwrap();
        f.lifecycle.graph_mut().fail_creation(NodeKind::Oscillator);

        let err = f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local);
        assert!(matches!(err, Err(BankError::Graph { voice: 1, .. })));
        assert_eq!(f.bank.authority(1), Some(Authority::Unclaimed));
        assert_eq!(f.bank.authority(0), Some(Authority::Remote));
        assert_eq!(f.lifecycle.count_owned(Owner::Voice(1)), 0);

        f.lifecycle.graph_mut().allow_creation(NodeKind::Oscillator);
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();
        assert_eq!(oscillators(&f), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let mut f = remote_fixture();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();
        f.bank.release(&mut f.lifecycle, 1).unwrap();
        f.bank.release(&mut f.lifecycle, 1).unwrap();

        assert_eq!(f.bank.authority(1), Some(Authority::Unclaimed));
        assert_eq!(f.lifecycle.graph().live_of(NodeKind::Oscillator), 0);
        assert!(matches!(
            f.bank.release(&mut f.lifecycle, 9),
            Err(BankError::UnknownVoice(9))
        ));
    }

    #[test]
    fn parameters_are_clamped() {
        let mut f = remote_fixture();
        let params = VoiceParams {
            frequency: Some(5.0),
            amplitude: Some(250.0),
            ..VoiceParams::default()
        };
        f.bank.update_parameters(&mut f.lifecycle, 3, params).unwrap();
        let voice = f.bank.voice(3).unwrap();
        assert_eq!(voice.config().frequency, MIN_FREQUENCY);
        assert_eq!(voice.amplitude(), MAX_AMPLITUDE);
    }

    #[test]
    fn shutdown_flushes_and_unclaims_everything() {
        let mut f = remote_fixture();
        f.bank.set_authority(&mut f.lifecycle, 1, Claim::Local).unwrap();
        f.bank
            .update_parameters(&mut f.lifecycle, 2, VoiceParams::waveform(Waveform::Square))
            .unwrap();

        let results = f.bank.shutdown(&mut f.lifecycle);
        assert_eq!(results.len(), 1);
        assert!(f.bank.voices().iter().all(|v| v.authority() == Authority::Unclaimed));
        assert_eq!(f.lifecycle.graph().live_of(NodeKind::Oscillator), 0);
    }
}
