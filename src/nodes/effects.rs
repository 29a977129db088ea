// Gain stage, also used as the graph destination.

use crate::node::{Node, ParamId, ProcessContext};
use crate::parameter::AutomationParam;

use super::params;

/// Upper bound for a gain stage. Linear, not dB.
const MAX_GAIN: f32 = 4.0;

// ═══════════════════════════════════════════════════════════════════
// Gain Node
// ═══════════════════════════════════════════════════════════════════

pub struct GainNode {
    gain: AutomationParam,
}

impl GainNode {
    pub fn new() -> Self {
        Self::with_gain(1.0)
    }

    pub fn with_gain(gain: f32) -> Self {
        Self {
            gain: AutomationParam::new(gain, 0.0, MAX_GAIN),
        }
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for GainNode {
    fn prepare(&mut self, _sample_rate: f64, _max_block: usize) {}

    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        if self.gain.is_static() {
            let g = self.gain.value_at(ctx.time_at(0));
            for (out, x) in output.iter_mut().zip(input) {
                *out = x * g;
            }
            return;
        }

        for (i, (out, x)) in output.iter_mut().zip(input).enumerate() {
            *out = x * self.gain.value_at(ctx.time_at(i));
        }
    }

    fn set_param(&mut self, param_id: ParamId, value: f32) {
        if param_id == params::GAIN {
            self.gain.set_immediate(value);
        }
    }

    fn automation_mut(&mut self, param_id: ParamId) -> Option<&mut AutomationParam> {
        match param_id {
            params::GAIN => Some(&mut self.gain),
            _ => None,
        }
    }
}
