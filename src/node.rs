// src/node.rs

use crate::parameter::AutomationParam;

/// Unique identifier for a node instance in the graph.
pub type NodeId = u32;

/// Unique identifier for a parameter within a node kind.
pub type ParamId = u32;

/// Response shape of a filter node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    Lowpass,
    Highpass,
}

/// The node kinds the graph knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Oscillator,
    Gain,
    Filter(FilterType),
    /// Dual delay / allpass / damped-feedback reverberator core.
    ReverbTank,
    /// Final mix point; exactly one per graph.
    Destination,
}

impl NodeKind {
    /// Whether the node must be started before it produces sound.
    #[inline]
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Oscillator)
    }
}

/// Context passed to nodes during processing.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    /// Number of frames to process
    pub frames: usize,

    /// Sample rate
    pub sample_rate: f64,

    /// Sample position of the first frame in this block
    pub sample_pos: u64,
}

impl ProcessContext {
    pub fn new(frames: usize, sample_rate: f64, sample_pos: u64) -> Self {
        Self {
            frames,
            sample_rate,
            sample_pos,
        }
    }

    /// Audio-clock time of frame `i` in this block, in seconds.
    #[inline]
    pub fn time_at(&self, i: usize) -> f64 {
        (self.sample_pos + i as u64) as f64 / self.sample_rate
    }
}

/// Core DSP node trait.
///
/// Nodes:
/// - do NOT know about ownership or authority
/// - do NOT allocate in `process`
/// - ONLY process audio for the given context
pub trait Node: Send {
    /// Called on the control thread before the node is handed to the renderer.
    /// This is where buffers get sized.
    fn prepare(&mut self, sample_rate: f64, max_block: usize);

    /// Process one block.
    ///
    /// `input` is the sum of every connected upstream node (silence for
    /// sources). `output` is exactly `ctx.frames` long.
    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]);

    /// Immediate, non-automated parameter write.
    fn set_param(&mut self, param_id: ParamId, value: f32);

    /// Automatable parameter, if `param_id` names one.
    fn automation_mut(&mut self, _param_id: ParamId) -> Option<&mut AutomationParam> {
        None
    }

    /// Schedule playback start. Only meaningful for sources.
    fn start(&mut self, _at: f64) {}

    /// Schedule playback stop. Only meaningful for sources.
    fn stop(&mut self, _at: f64) {}

    /// Clear internal state (delay lines, filter memory).
    fn reset(&mut self) {}
}
