// src/remote.rs
//
// The remote oscillator / logic-block store, as seen from the synth.
// Transport lives outside this crate; `MemoryStore` covers tests and
// offline hosts.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::logic::LogicNetwork;
use crate::nodes::Waveform;

/// Oscillator record as the store keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorConfig {
    pub oscillator_id: usize,
    pub is_active: bool,
    pub wave_type: Waveform,
    pub frequency: f32,
    /// 0-100
    pub amplitude: f32,
    #[serde(default)]
    pub phase: f32,
    #[serde(default)]
    pub detune: f32,
    #[serde(default)]
    pub pwm: f32,
}

impl OscillatorConfig {
    pub fn new(oscillator_id: usize, wave_type: Waveform, frequency: f32) -> Self {
        Self {
            oscillator_id,
            is_active: false,
            wave_type,
            frequency,
            amplitude: 0.0,
            phase: 0.0,
            detune: 0.0,
            pwm: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOp {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
}

impl LogicOp {
    pub const ALL: [LogicOp; 6] = [
        LogicOp::And,
        LogicOp::Or,
        LogicOp::Xor,
        LogicOp::Nand,
        LogicOp::Nor,
        LogicOp::Xnor,
    ];

    #[inline]
    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            LogicOp::And => a && b,
            LogicOp::Or => a || b,
            LogicOp::Xor => a != b,
            LogicOp::Nand => !(a && b),
            LogicOp::Nor => !(a || b),
            LogicOp::Xnor => a == b,
        }
    }
}

/// Logic block wiring. Forwarded to the store as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicBlockConfig {
    pub logic_block_id: usize,
    pub operation_type: LogicOp,
    #[serde(rename = "conection1_id")]
    pub connection1_id: String,
    #[serde(rename = "conection2_id")]
    pub connection2_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    Unreachable(String),
    Rejected { status: u16, message: String },
    Malformed(String),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Unreachable(reason) => write!(f, "store unreachable: {}", reason),
            RemoteError::Rejected { status, message } => {
                write!(f, "store rejected request ({}): {}", status, message)
            }
            RemoteError::Malformed(reason) => write!(f, "malformed store data: {}", reason),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Malformed(e.to_string())
    }
}

pub trait RemoteStore: Send + Sync {
    fn fetch_oscillators(&self) -> Result<Vec<OscillatorConfig>, RemoteError>;

    fn update_oscillator(&self, config: &OscillatorConfig) -> Result<(), RemoteError>;

    fn update_logic_block(&self, config: &LogicBlockConfig) -> Result<(), RemoteError>;
}

#[derive(Debug, Default)]
struct StoreState {
    oscillators: Vec<OscillatorConfig>,
    logic_blocks: Vec<LogicBlockConfig>,
    network: LogicNetwork,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    unreachable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(oscillators: Vec<OscillatorConfig>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                oscillators,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Seed from a JSON array of oscillator records.
    pub fn from_json(json: &str) -> Result<Self, RemoteError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// A store every call to which fails.
    pub fn unreachable() -> Self {
        let store = Self::default();
        store.set_unreachable(true);
        store
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn oscillators(&self) -> Vec<OscillatorConfig> {
        self.lock().oscillators.clone()
    }

    pub fn oscillator(&self, id: usize) -> Option<OscillatorConfig> {
        self.lock()
            .oscillators
            .iter()
            .find(|o| o.oscillator_id == id)
            .cloned()
    }

    pub fn logic_block(&self, id: usize) -> Option<LogicBlockConfig> {
        self.lock()
            .logic_blocks
            .iter()
            .find(|b| b.logic_block_id == id)
            .cloned()
    }

    pub fn logic_network(&self) -> LogicNetwork {
        self.lock().network
    }

    /// Run the logic network over the current samples of oscillators 0-3.
    pub fn evaluate_logic(&self, samples: [f32; 4]) -> bool {
        self.lock().network.evaluate(samples)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable(&self) -> Result<(), RemoteError> {
        if self.unreachable.load(Ordering::Relaxed) {
            Err(RemoteError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl RemoteStore for MemoryStore {
    fn fetch_oscillators(&self) -> Result<Vec<OscillatorConfig>, RemoteError> {
        self.reachable()?;
        Ok(self.lock().oscillators.clone())
    }

    fn update_oscillator(&self, config: &OscillatorConfig) -> Result<(), RemoteError> {
        self.reachable()?;
        let mut state = self.lock();
        match state
            .oscillators
            .iter_mut()
            .find(|o| o.oscillator_id == config.oscillator_id)
        {
            Some(existing) => *existing = config.clone(),
            None => state.oscillators.push(config.clone()),
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn update_logic_block(&self, config: &LogicBlockConfig) -> Result<(), RemoteError> {
        self.reachable()?;
        let mut state = self.lock();
        state
            .network
            .set_op(config.logic_block_id, config.operation_type)
            .map_err(|e| RemoteError::Rejected {
                status: 400,
                message: e.to_string(),
            })?;
        match state
            .logic_blocks
            .iter_mut()
            .find(|b| b.logic_block_id == config.logic_block_id)
        {
            Some(existing) => *existing = config.clone(),
            None => state.logic_blocks.push(config.clone()),
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_records() {
        let store = MemoryStore::from_json(
            r#"[{"oscillator_id": 2, "is_active": true, "wave_type": "TRIANGLE",
                 "frequency": 330.0, "amplitude": 40, "phase": 0, "detune": 5, "pwm": 0}]"#,
        )
        .unwrap();
        let osc = store.oscillator(2).unwrap();
        assert_eq!(osc.wave_type, Waveform::Triangle);
        assert_eq!(osc.detune, 5.0);
        assert!(osc.is_active);
    }

    #[test]
    fn logic_block_uses_store_field_names() {
        let block = LogicBlockConfig {
            logic_block_id: 1,
            operation_type: LogicOp::Xor,
            connection1_id: "osc0".into(),
            connection2_id: "osc1".into(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["conection1_id"], "osc0");
        assert_eq!(json["operation_type"], "XOR");
    }

    #[test]
    fn every_operation_parses_and_applies() {
        let names: Vec<LogicOp> =
            serde_json::from_str(r#"["AND", "OR", "XOR", "NAND", "NOR", "XNOR"]"#).unwrap();
        assert_eq!(names, LogicOp::ALL);

        let table = |op: LogicOp| {
            [(false, false), (false, true), (true, false), (true, true)].map(|(a, b)| op.apply(a, b))
        };
        assert_eq!(table(LogicOp::Nand), [true, true, true, false]);
        assert_eq!(table(LogicOp::Nor), [true, false, false, false]);
        assert_eq!(table(LogicOp::Xnor), [true, false, false, true]);
    }

    #[test]
    fn logic_block_updates_drive_the_network() {
        let store = MemoryStore::new(Vec::new());
        let samples = [1.0, 1.0, -1.0, -1.0];
        // (1 AND 1) XOR (0 OR 0)
        assert!(store.evaluate_logic(samples));

        let block = LogicBlockConfig {
            logic_block_id: 1,
            operation_type: LogicOp::Nor,
            connection1_id: "osc2".into(),
            connection2_id: "osc3".into(),
        };
        store.update_logic_block(&block).unwrap();
        // (1 AND 1) XOR (0 NOR 0)
        assert!(!store.evaluate_logic(samples));
        assert_eq!(store.logic_block(1), Some(block));
    }

    #[test]
    fn unknown_logic_block_is_rejected() {
        let store = MemoryStore::new(Vec::new());
        let block = LogicBlockConfig {
            logic_block_id: 3,
            operation_type: LogicOp::And,
            connection1_id: "osc0".into(),
            connection2_id: "osc1".into(),
        };
        assert!(matches!(
            store.update_logic_block(&block),
            Err(RemoteError::Rejected { status: 400, .. })
        ));
        assert!(store.logic_block(3).is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn unreachable_store_fails_every_call() {
        let store = MemoryStore::unreachable();
        assert!(matches!(
            store.fetch_oscillators(),
            Err(RemoteError::Unreachable(_))
        ));
        assert!(store
            .update_oscillator(&OscillatorConfig::new(0, Waveform::Sine, 220.0))
            .is_err());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn updates_upsert_by_id() {
        let store = MemoryStore::new(vec![OscillatorConfig::new(0, Waveform::Sine, 220.0)]);
        let mut osc = OscillatorConfig::new(0, Waveform::Square, 440.0);
        store.update_oscillator(&osc).unwrap();
        osc.oscillator_id = 7;
        store.update_oscillator(&osc).unwrap();

        assert_eq!(store.oscillator(0).unwrap().frequency, 440.0);
        assert!(store.oscillator(7).is_some());
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn bad_json_is_malformed() {
        assert!(matches!(
            MemoryStore::from_json("[{\"oscillator_id\": }]"),
            Err(RemoteError::Malformed(_))
        ));
    }
}
