// src/nodes/mod.rs
//
// Standard node types for the synthesizer.

mod effects;
mod filters;
mod oscillators;
mod reverb;

pub use effects::*;
pub use filters::*;
pub use oscillators::*;
pub use reverb::*;

// ═══════════════════════════════════════════════════════════════════
// Parameter IDs (per node kind)
// ═══════════════════════════════════════════════════════════════════

pub mod params {
    // Oscillator params
    pub const FREQUENCY: u32 = 0;
    pub const WAVEFORM: u32 = 1;

    // Gain params
    pub const GAIN: u32 = 0;

    // Filter params
    pub const CUTOFF: u32 = 0;
    pub const RESONANCE: u32 = 1;

    // Reverb tank params
    pub const DELAY_TIME_1: u32 = 0;
    pub const DELAY_TIME_2: u32 = 1;
    pub const ALLPASS_FREQ_1: u32 = 2;
    pub const ALLPASS_FREQ_2: u32 = 3;
    pub const ALLPASS_FREQ_3: u32 = 4;
    pub const ALLPASS_FREQ_4: u32 = 5;
    pub const FEEDBACK_GAIN: u32 = 6;
    pub const LOWPASS_FREQ: u32 = 7;

    /// Allpass frequency parameter for stage `index` (0..4).
    #[inline]
    pub const fn allpass_freq(index: usize) -> u32 {
        ALLPASS_FREQ_1 + index as u32
    }
}
