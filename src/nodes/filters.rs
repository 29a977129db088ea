// src/nodes/filters.rs
//
// Filter node using State Variable Filter (SVF) topology.
// Serves the lowpass and highpass stages of the output filter pair.

use crate::node::{FilterType, Node, ParamId, ProcessContext};
use crate::parameter::AutomationParam;

use super::params;

/// Resonance giving a Butterworth-like response (k = sqrt(2)).
pub const DEFAULT_RESONANCE: f32 = 0.293;

/// State Variable Filter implementation.
///
/// The SVF stays stable under fast cutoff modulation, which is what makes
/// immediate cutoff writes safe while audio is running.
pub struct FilterNode {
    filter_type: FilterType,
    cutoff: AutomationParam,
    resonance: f32,

    // Filter state
    ic1eq: f32,
    ic2eq: f32,

    // Cached coefficients
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,

    coeff_cutoff: f32,
    sample_rate: f64,
}

impl FilterNode {
    pub fn new(filter_type: FilterType) -> Self {
        let mut filter = Self {
            filter_type,
            cutoff: AutomationParam::new(1000.0, 10.0, 24_000.0),
            resonance: DEFAULT_RESONANCE,
            ic1eq: 0.0,
            ic2eq: 0.0,
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            coeff_cutoff: 0.0,
            sample_rate: 48_000.0,
        };
        filter.recalc_coeffs(1000.0);
        filter
    }

    pub fn lowpass() -> Self {
        Self::new(FilterType::Lowpass)
    }

    pub fn highpass() -> Self {
        Self::new(FilterType::Highpass)
    }

    fn recalc_coeffs(&mut self, cutoff: f32) {
        self.coeff_cutoff = cutoff;

        // Clamp cutoff to valid range
        let cutoff = cutoff.clamp(10.0, (self.sample_rate as f32 * 0.49).max(10.0));

        // Resonance clamped to prevent self-oscillation issues
        let resonance = self.resonance.clamp(0.0, 0.99);

        let g = (std::f32::consts::PI * cutoff / self.sample_rate as f32).tan();
        self.k = 2.0 - 2.0 * resonance;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    #[inline]
    fn process_sample(&mut self, input: f32) -> f32 {
        let v3 = input - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match self.filter_type {
            FilterType::Lowpass => v2,
            FilterType::Highpass => input - self.k * v1 - v2,
        }
    }
}

impl Node for FilterNode {
    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = sample_rate;
        self.recalc_coeffs(self.cutoff.value());
    }

    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        for (i, (out, x)) in output.iter_mut().zip(input).enumerate() {
            let cutoff = self.cutoff.value_at(ctx.time_at(i));
            if cutoff != self.coeff_cutoff {
                self.recalc_coeffs(cutoff);
            }
            *out = self.process_sample(*x);
        }
    }

    fn set_param(&mut self, param_id: ParamId, value: f32) {
        match param_id {
            params::CUTOFF => {
                self.cutoff.set_immediate(value);
                self.recalc_coeffs(self.cutoff.value());
            }
            params::RESONANCE => {
                self.resonance = value;
                self.recalc_coeffs(self.cutoff.value());
            }
            _ => {}
        }
    }

    fn automation_mut(&mut self, param_id: ParamId) -> Option<&mut AutomationParam> {
        match param_id {
            params::CUTOFF => Some(&mut self.cutoff),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}
