// Basic oscillator node.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::node::{Node, ParamId, ProcessContext};
use crate::parameter::AutomationParam;

use super::params;

pub const MIN_FREQUENCY: f32 = 20.0;
pub const MAX_FREQUENCY: f32 = 20_000.0;

/// Oscillator waveform. Serialized the way the remote store spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    /// Parameter encoding used by `params::WAVEFORM`.
    #[inline]
    pub fn as_param(self) -> f32 {
        self as u8 as f32
    }

    #[inline]
    pub fn from_param(value: f32) -> Self {
        match value.round() as i32 {
            1 => Waveform::Square,
            2 => Waveform::Sawtooth,
            3 => Waveform::Triangle,
            _ => Waveform::Sine,
        }
    }

    /// Naive (non-bandlimited) sample at `phase` in [0, 1).
    #[inline]
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        }
    }
}

/// Playback state of a source node.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Playback {
    Idle,
    Scheduled { start: f64, stop: Option<f64> },
}

// ═══════════════════════════════════════════════════════════════════
// Oscillator
// ═══════════════════════════════════════════════════════════════════

pub struct OscillatorNode {
    waveform: Waveform,
    frequency: AutomationParam,
    phase: f32,
    playback: Playback,
    sample_rate: f32,
}

impl OscillatorNode {
    pub fn new() -> Self {
        Self {
            waveform: Waveform::Sine,
            frequency: AutomationParam::new(440.0, MIN_FREQUENCY, MAX_FREQUENCY),
            phase: 0.0,
            playback: Playback::Idle,
            sample_rate: 48_000.0,
        }
    }

    #[inline]
    fn is_playing(&self, time: f64) -> bool {
        match self.playback {
            Playback::Idle => false,
            Playback::Scheduled { start, stop } => {
                time >= start && stop.map_or(true, |stop| time < stop)
            }
        }
    }
}

impl Default for OscillatorNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for OscillatorNode {
    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = sample_rate as f32;
    }

    fn process(&mut self, ctx: &ProcessContext, _input: &[f32], output: &mut [f32]) {
        if self.playback == Playback::Idle {
            output.fill(0.0);
            return;
        }

        for (i, sample) in output.iter_mut().enumerate() {
            let t = ctx.time_at(i);
            let freq = self.frequency.value_at(t);
            if !self.is_playing(t) {
                *sample = 0.0;
                continue;
            }
            *sample = self.waveform.sample(self.phase);
            self.phase = (self.phase + freq / self.sample_rate).fract();
        }
    }

    fn set_param(&mut self, param_id: ParamId, value: f32) {
        match param_id {
            params::FREQUENCY => self.frequency.set_immediate(value),
            params::WAVEFORM => self.waveform = Waveform::from_param(value),
            _ => {}
        }
    }

    fn automation_mut(&mut self, param_id: ParamId) -> Option<&mut AutomationParam> {
        match param_id {
            params::FREQUENCY => Some(&mut self.frequency),
            _ => None,
        }
    }

    fn start(&mut self, at: f64) {
        if self.playback == Playback::Idle {
            self.playback = Playback::Scheduled {
                start: at,
                stop: None,
            };
        }
    }

    fn stop(&mut self, at: f64) {
        if let Playback::Scheduled { start, stop } = &mut self.playback {
            *stop = Some(at.max(*start));
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(node: &mut OscillatorNode, frames: usize, sample_pos: u64) -> Vec<f32> {
        let ctx = ProcessContext::new(frames, 48_000.0, sample_pos);
        let mut out = vec![0.0; frames];
        node.process(&ctx, &[], &mut out);
        out
    }

    #[test]
    fn silent_until_started() {
        let mut osc = OscillatorNode::new();
        osc.prepare(48_000.0, 128);
        assert!(render(&mut osc, 128, 0).iter().all(|s| *s == 0.0));

        osc.start(0.0);
        assert!(render(&mut osc, 128, 128).iter().any(|s| *s != 0.0));
    }

    #[test]
    fn stop_silences_from_stop_time() {
        let mut osc = OscillatorNode::new();
        osc.prepare(48_000.0, 128);
        osc.set_param(params::WAVEFORM, Waveform::Square.as_param());
        osc.start(0.0);
        osc.stop(64.0 / 48_000.0);

        let out = render(&mut osc, 128, 0);
        assert!(out[..64].iter().all(|s| s.abs() == 1.0));
        assert!(out[64..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn waveform_serializes_uppercase() {
        let json = serde_json::to_string(&Waveform::Sawtooth).unwrap();
        assert_eq!(json, "\"SAWTOOTH\"");
    }
}
