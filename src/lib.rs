// src/lib.rs
//
// Library entry point. Multi-voice synthesis core: an oscillator bank whose
// voices play locally or defer to a remote store, followed by a filter pair
// and an algorithmic reverb.

mod audio_graph;
mod bank;
mod bridge;
mod config;
mod effects;
mod graph;
mod lifecycle;
mod logic;
mod node;
mod node_factory;
mod nodes;
mod param_info;
mod parameter;
mod remote;
mod sync;
mod synth;

#[cfg(test)]
mod testing;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use audio_graph::{AudioGraph, GraphError};
pub use bank::{
    Authority, BankError, Claim, LoadOutcome, LocalNodes, OscillatorBank, Voice, VoiceParams,
    WriteResult, default_bank,
};
pub use bridge::{GraphHandle, Renderer, create_bridge, create_bridge_with_factory};
pub use config::EngineConfig;
pub use graph::{DESTINATION, Graph};
pub use effects::{AlgorithmicReverb, FilterPair, FilterPairState, ReverbParameters};
pub use lifecycle::{GraphLifecycle, Owner};
pub use logic::{LOGIC_GATES, LOGIC_HIGH, LOGIC_LOW, LogicNetwork, UnknownGate};
pub use node::{FilterType, Node, NodeId, NodeKind, ParamId, ProcessContext};
pub use node_factory::{NodeFactory, StandardNodes};
pub use nodes::{Waveform, feedback_for_decay, params};
pub use param_info::{AutomatedParam, AutomatedParamList, DisplayCurve, ParamInfo, ParamUnit};
pub use parameter::{AutomationParam, ParamEvent};
pub use remote::{
    LogicBlockConfig, LogicOp, MemoryStore, OscillatorConfig, RemoteError, RemoteStore,
};
pub use sync::{Clock, DebouncedWriter, ManualClock, SystemClock};
pub use synth::{Synth, SynthError, create_synth};
