//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { lunette_init, LunetteSynth } from './lunette.js';
//!
//! await init();
//! lunette_init();
//!
//! // Records fetched by the page; pass undefined to start from defaults.
//! const synth = new LunetteSynth(undefined, oscillatorsJson);
//! synth.set_authority(0, true);
//! synth.set_active(0, true);
//! synth.set_amplitude(0, 60);
//!
//! // Inside the AudioWorklet
//! synth.render(128, interleaved);
//! // From the control loop
//! synth.tick(performance.now());
//! ```

use std::sync::Arc;

use wasm_bindgen::prelude::*;

use crate::bank::{Claim, LoadOutcome, VoiceParams};
use crate::bridge::{GraphHandle, Renderer};
use crate::config::EngineConfig;
use crate::effects::FilterPairState;
use crate::nodes::Waveform;
use crate::remote::{LogicBlockConfig, MemoryStore, RemoteStore};
use crate::sync::ManualClock;
use crate::synth::{Synth, create_synth};

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn lunette_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

fn js_err<E: std::fmt::Display>(e: E) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Synth
// ═══════════════════════════════════════════════════════════════════════════

/// Synth and renderer in one object, for hosts where control and audio
/// share a thread (AudioWorklet).
///
/// The page owns the network: it seeds the store with fetched records and
/// reads back `store_json()` to push local changes upstream.
#[wasm_bindgen]
pub struct LunetteSynth {
    synth: Synth<GraphHandle>,
    renderer: Renderer,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    max_block: usize,
}

#[wasm_bindgen]
impl LunetteSynth {
    /// `config_json`: optional `EngineConfig` as JSON.
    /// `oscillators_json`: optional array of oscillator records. Without it
    /// the bank starts from local defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        oscillators_json: Option<String>,
    ) -> Result<LunetteSynth, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(js_err)?,
            None => EngineConfig::default(),
        };
        let store = match oscillators_json {
            Some(json) => MemoryStore::from_json(&json).map_err(js_err)?,
            None => MemoryStore::unreachable(),
        };
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(0));
        let remote: Arc<dyn RemoteStore> = store.clone();

        let (mut synth, renderer) = create_synth(&config, remote, clock.clone()).map_err(js_err)?;
        if let LoadOutcome::Defaults { .. } = synth.load() {
            // Offline from here on; local edits still land in the store.
            store.set_unreachable(false);
        }

        Ok(LunetteSynth {
            synth,
            renderer,
            store,
            clock,
            max_block: config.max_block_size.max(1),
        })
    }

    // --------------------------------
    // Voices
    // --------------------------------

    /// `local = true` claims the voice for local synthesis.
    pub fn set_authority(&mut self, voice: usize, local: bool) -> Result<(), JsValue> {
        let claim = if local { Claim::Local } else { Claim::Remote };
        self.synth.set_authority(voice, claim).map_err(js_err)
    }

    pub fn set_frequency(&mut self, voice: usize, hz: f32) -> Result<(), JsValue> {
        self.synth
            .update_voice(voice, VoiceParams::frequency(hz))
            .map_err(js_err)
    }

    /// 0-100
    pub fn set_amplitude(&mut self, voice: usize, amplitude: f32) -> Result<(), JsValue> {
        self.synth
            .update_voice(voice, VoiceParams::amplitude(amplitude))
            .map_err(js_err)
    }

    /// "SINE", "SQUARE", "SAWTOOTH" or "TRIANGLE" (case-insensitive).
    pub fn set_waveform(&mut self, voice: usize, waveform: &str) -> Result<(), JsValue> {
        let waveform: Waveform =
            serde_json::from_value(serde_json::Value::String(waveform.to_uppercase()))
                .map_err(js_err)?;
        self.synth
            .update_voice(voice, VoiceParams::waveform(waveform))
            .map_err(js_err)
    }

    pub fn set_active(&mut self, voice: usize, active: bool) -> Result<(), JsValue> {
        self.synth.set_voice_active(voice, active).map_err(js_err)
    }

    pub fn update_logic_block(&self, json: &str) -> Result<(), JsValue> {
        let block: LogicBlockConfig = serde_json::from_str(json).map_err(js_err)?;
        self.synth.update_logic_block(&block).map_err(js_err)
    }

    /// Logic network output (127 or -128) for four oscillator samples.
    pub fn logic_output(&self, s0: f32, s1: f32, s2: f32, s3: f32) -> i8 {
        self.store.logic_network().output([s0, s1, s2, s3])
    }

    /// Current voice records as JSON.
    pub fn voices_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.synth.bank().configs()).map_err(js_err)
    }

    /// Records the store has accepted, for the page to push upstream.
    pub fn store_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.store.oscillators()).map_err(js_err)
    }

    /// Last non-fatal error, e.g. "Defaults loaded: ...".
    pub fn error(&self) -> Option<String> {
        self.synth.bank().error().map(str::to_owned)
    }

    // --------------------------------
    // Effects
    // --------------------------------

    pub fn set_filters(&mut self, highpass_hz: f32, lowpass_hz: f32) -> Result<(), JsValue> {
        let state = FilterPairState {
            highpass_freq_hz: highpass_hz,
            lowpass_freq_hz: lowpass_hz,
        };
        self.synth.set_filter_parameters(state).map_err(js_err)
    }

    pub fn set_reverb_mix(&mut self, mix: f32) -> Result<(), JsValue> {
        self.synth.set_reverb_mix(mix).map_err(js_err)
    }

    pub fn set_reverb_decay(&mut self, seconds: f64) -> Result<(), JsValue> {
        self.synth.set_reverb_decay(seconds).map_err(js_err)
    }

    pub fn set_reverb_feedback(&mut self, gain: f32) -> Result<(), JsValue> {
        self.synth.set_reverb_feedback(gain).map_err(js_err)
    }

    pub fn set_reverb_delays(&mut self, first: f32, second: f32) -> Result<(), JsValue> {
        self.synth.set_reverb_delay_times(first, second).map_err(js_err)
    }

    pub fn set_reverb_allpass(&mut self, index: usize, hz: f32) -> Result<(), JsValue> {
        self.synth.set_reverb_allpass(index, hz).map_err(js_err)
    }

    pub fn set_reverb_lowpass(&mut self, hz: f32) -> Result<(), JsValue> {
        self.synth.set_reverb_lowpass(hz).map_err(js_err)
    }

    pub fn set_master_gain(&mut self, gain: f32) -> Result<(), JsValue> {
        self.synth.set_master_gain(gain).map_err(js_err)
    }

    // --------------------------------
    // Timing & audio
    // --------------------------------

    /// Advance the control clock and fire due store writes.
    /// Returns the number of writes that failed.
    pub fn tick(&mut self, now_ms: f64) -> u32 {
        self.clock.set(now_ms.max(0.0) as u64);
        self.synth
            .poll()
            .iter()
            .filter(|(_, result)| result.is_err())
            .count() as u32
    }

    /// Render audio frames to the provided output buffer (interleaved stereo).
    /// Output format: [L0, R0, L1, R1, L2, R2, ...]
    ///
    /// The output slice must have length >= frames * 2.
    pub fn render(&mut self, frames: u32, output: &mut [f32]) {
        let total_frames = frames as usize;
        if output.len() < total_frames * 2 {
            output.fill(0.0);
            return;
        }

        let mut offset = 0;
        while offset < total_frames {
            let chunk_frames = (total_frames - offset).min(self.max_block);
            let block = self.renderer.render(chunk_frames);
            let out_chunk = &mut output[offset * 2..(offset + chunk_frames) * 2];
            for (frame, &sample) in out_chunk.chunks_exact_mut(2).zip(block) {
                frame[0] = sample;
                frame[1] = sample;
            }
            offset += chunk_frames;
        }
    }

    pub fn sample_position(&self) -> f64 {
        self.renderer.sample_position() as f64
    }

    pub fn sample_rate(&self) -> f64 {
        self.renderer.sample_rate()
    }

    /// Clear reverb tails and filter memory.
    pub fn reset(&mut self) {
        self.renderer.reset();
    }

    /// Flush store writes and release every node.
    pub fn shutdown(&mut self) {
        self.synth.shutdown();
        self.renderer.process_commands();
    }
}
