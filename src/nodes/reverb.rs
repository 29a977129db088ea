// src/nodes/reverb.rs
//
// Reverberator core: two delay lines, each diffused by a cascade of two
// first-order allpass sections, averaged into a one-pole damping lowpass whose
// output is both the wet signal and the feedback into both delay lines. The
// average keeps the loop gain at or below the feedback gain.

use std::f64::consts::PI;

use crate::node::{Node, ParamId, ProcessContext};
use crate::parameter::AutomationParam;

use super::params;

/// Longest supported delay line, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 10.0;

/// Length of the crossfade used when a delay line changes length.
pub const DELAY_CROSSFADE_SECONDS: f64 = 0.02;

/// Upper bound accepted for feedback gain. Anything at or above 1.0 makes the
/// loop grow instead of decay.
pub const MAX_FEEDBACK_GAIN: f32 = 2.0;

/// Highest allpass frequency accepted from callers. Stays below SR/4 for
/// 44.1 kHz and up; `allpass_coefficient` clamps anything higher.
pub const MAX_ALLPASS_FREQUENCY: f32 = 11_000.0;

/// Amplitude ratio that defines decay time (-60 dB).
const DECAY_RATIO: f64 = 0.001;

// ═══════════════════════════════════════════════════════════════════
// Coefficients
// ═══════════════════════════════════════════════════════════════════

/// First-order allpass coefficient for a target frequency.
///
/// `a = (1 - α) / (1 + α)` with `α = sin(w) / (2 cos(w))`, `w = 2πf / SR`.
/// The frequency is kept below SR/4, where `cos(w)` would change sign.
pub fn allpass_coefficient(freq: f64, sample_rate: f64) -> f64 {
    let nyquist_quarter = sample_rate * 0.25;
    let freq = freq.clamp(1.0, nyquist_quarter * 0.999);
    let w0 = 2.0 * PI * freq / sample_rate;
    let alpha = w0.sin() / (2.0 * w0.cos());
    (1.0 - alpha) / (1.0 + alpha)
}

/// One-pole lowpass coefficient `c = exp(-2πf / SR)`.
pub fn lowpass_coefficient(freq: f64, sample_rate: f64) -> f64 {
    let freq = freq.clamp(0.0, sample_rate * 0.5);
    (-2.0 * PI * freq / sample_rate).exp()
}

/// Feedback gain that makes the loop decay by 60 dB in `decay_time` seconds.
///
/// `g = 0.001^(L / D)` where `L = delay_time_1 + delay_time_2`, clamped to
/// `[0, 1)` so the result is always stable.
pub fn feedback_for_decay(delay_time_1: f64, delay_time_2: f64, decay_time: f64) -> f32 {
    let loop_delay = (delay_time_1 + delay_time_2).max(0.0);
    if decay_time <= 0.0 {
        return 0.0;
    }
    let g = DECAY_RATIO.powf(loop_delay / decay_time) as f32;
    g.clamp(0.0, 1.0 - f32::EPSILON)
}

// ═══════════════════════════════════════════════════════════════════
// Building blocks
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct Crossfade {
    from: usize,
    pos: usize,
}

/// Ring buffer with a fixed capacity and a variable tap length.
///
/// Length changes are crossfaded from the old tap to the new one, so a
/// parameter change never produces a step in the output.
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
    length: usize,
    target: usize,
    fade: Option<Crossfade>,
    fade_len: usize,
}

impl DelayLine {
    fn new() -> Self {
        Self {
            buffer: vec![0.0; 2],
            write: 0,
            length: 1,
            target: 1,
            fade: None,
            fade_len: 1,
        }
    }

    fn allocate(&mut self, capacity: usize, fade_len: usize) {
        self.buffer = vec![0.0; capacity.max(2)];
        self.write = 0;
        self.fade = None;
        self.fade_len = fade_len.max(1);
        self.length = self.length.clamp(1, self.buffer.len() - 1);
        self.target = self.target.clamp(1, self.buffer.len() - 1);
    }

    fn set_length(&mut self, samples: usize) {
        self.target = samples.clamp(1, self.buffer.len() - 1);
    }

    /// Set the length without a crossfade (before audio starts).
    fn jump_to_length(&mut self, samples: usize) {
        self.set_length(samples);
        self.length = self.target;
        self.fade = None;
    }

    #[inline]
    fn tap(&self, length: usize) -> f32 {
        let cap = self.buffer.len();
        self.buffer[(self.write + cap - length) % cap]
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        if self.fade.is_none() && self.target != self.length {
            self.fade = Some(Crossfade {
                from: self.length,
                pos: 0,
            });
            self.length = self.target;
        }

        let out = match &mut self.fade {
            Some(fade) => {
                let g = fade.pos as f32 / self.fade_len as f32;
                let from = fade.from;
                fade.pos += 1;
                if fade.pos >= self.fade_len {
                    self.fade = None;
                }
                self.tap(from) * (1.0 - g) + self.tap(self.length) * g
            }
            None => self.tap(self.length),
        };

        self.buffer[self.write] = input;
        self.write = (self.write + 1) % self.buffer.len();
        out
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// First-order allpass: `y = a·x + x1 − a·y1`.
#[derive(Debug, Clone, Copy, Default)]
struct Allpass {
    coeff: f32,
    x1: f32,
    y1: f32,
}

impl Allpass {
    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.coeff * input + self.x1 - self.coeff * self.y1;
        self.x1 = input;
        self.y1 = output;
        output
    }
}

/// One-pole lowpass: `y = c·y1 + (1 − c)·x`.
#[derive(Debug, Clone, Copy, Default)]
struct OnePole {
    coeff: f32,
    y1: f32,
}

impl OnePole {
    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        self.y1 = self.coeff * self.y1 + (1.0 - self.coeff) * input;
        self.y1
    }
}

// ═══════════════════════════════════════════════════════════════════
// Reverb tank
// ═══════════════════════════════════════════════════════════════════

/// The recirculating part of the algorithmic reverb.
///
/// Input is the wet send; output is the damped, diffused tail. Dry/wet mixing
/// happens outside, in the graph.
pub struct ReverbTank {
    delay_times: [f32; 2],
    allpass_freqs: [f32; 4],
    lowpass_freq: AutomationParam,
    feedback_gain: AutomationParam,

    lines: [DelayLine; 2],
    allpasses: [Allpass; 4],
    damping: OnePole,

    /// Last damped output, fed back on the next sample.
    recirculating: f32,

    coeff_lowpass: f32,
    sample_rate: f64,
}

impl ReverbTank {
    pub fn new() -> Self {
        Self {
            delay_times: [0.1, 0.15],
            allpass_freqs: [1000.0, 2000.0, 3000.0, 4000.0],
            lowpass_freq: AutomationParam::new(2000.0, 10.0, 24_000.0),
            feedback_gain: AutomationParam::new(0.5, 0.0, MAX_FEEDBACK_GAIN),
            lines: [DelayLine::new(), DelayLine::new()],
            allpasses: [Allpass::default(); 4],
            damping: OnePole::default(),
            recirculating: 0.0,
            coeff_lowpass: 0.0,
            sample_rate: 48_000.0,
        }
    }

    fn delay_samples(&self, seconds: f32) -> usize {
        (seconds.max(0.0) as f64 * self.sample_rate).round() as usize
    }

    fn update_allpass(&mut self, index: usize) {
        self.allpasses[index].coeff =
            allpass_coefficient(self.allpass_freqs[index] as f64, self.sample_rate) as f32;
    }

    fn update_lowpass(&mut self, freq: f32) {
        self.coeff_lowpass = freq;
        self.damping.coeff = lowpass_coefficient(freq as f64, self.sample_rate) as f32;
    }

    #[inline]
    fn process_sample(&mut self, input: f32, feedback: f32) -> f32 {
        let send = input + self.recirculating * feedback;

        let d1 = self.lines[0].process(send);
        let d2 = self.lines[1].process(send);

        let a = self.allpasses[0].process(d1);
        let a = self.allpasses[1].process(a);
        let b = self.allpasses[2].process(d2);
        let b = self.allpasses[3].process(b);

        let damped = self.damping.process(0.5 * (a + b));
        self.recirculating = damped;
        damped
    }
}

impl Default for ReverbTank {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ReverbTank {
    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = sample_rate;

        let capacity = (MAX_DELAY_SECONDS * sample_rate).ceil() as usize + 1;
        let fade_len = (DELAY_CROSSFADE_SECONDS * sample_rate).round() as usize;
        for i in 0..2 {
            let length = self.delay_samples(self.delay_times[i]);
            self.lines[i].allocate(capacity, fade_len);
            self.lines[i].jump_to_length(length);
        }

        for i in 0..4 {
            self.update_allpass(i);
        }
        self.update_lowpass(self.lowpass_freq.value());
    }

    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        for (i, (out, x)) in output.iter_mut().zip(input).enumerate() {
            let t = ctx.time_at(i);
            let lowpass = self.lowpass_freq.value_at(t);
            if lowpass != self.coeff_lowpass {
                self.update_lowpass(lowpass);
            }
            let feedback = self.feedback_gain.value_at(t);
            *out = self.process_sample(*x, feedback);
        }
    }

    fn set_param(&mut self, param_id: ParamId, value: f32) {
        match param_id {
            params::DELAY_TIME_1 | params::DELAY_TIME_2 => {
                let index = (param_id - params::DELAY_TIME_1) as usize;
                let seconds = value.clamp(0.0, MAX_DELAY_SECONDS as f32);
                self.delay_times[index] = seconds;
                let samples = self.delay_samples(seconds);
                self.lines[index].set_length(samples);
            }
            params::ALLPASS_FREQ_1..=params::ALLPASS_FREQ_4 => {
                let index = (param_id - params::ALLPASS_FREQ_1) as usize;
                self.allpass_freqs[index] = value;
                self.update_allpass(index);
            }
            params::FEEDBACK_GAIN => self.feedback_gain.set_immediate(value),
            params::LOWPASS_FREQ => {
                self.lowpass_freq.set_immediate(value);
                self.update_lowpass(self.lowpass_freq.value());
            }
            _ => {}
        }
    }

    fn automation_mut(&mut self, param_id: ParamId) -> Option<&mut AutomationParam> {
        match param_id {
            params::FEEDBACK_GAIN => Some(&mut self.feedback_gain),
            params::LOWPASS_FREQ => Some(&mut self.lowpass_freq),
            _ => None,
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        for ap in &mut self.allpasses {
            ap.x1 = 0.0;
            ap.y1 = 0.0;
        }
        self.damping.y1 = 0.0;
        self.recirculating = 0.0;
    }
}
