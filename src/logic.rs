// src/logic.rs
//
// Gate network over the signs of the first four oscillators:
//
//   osc0 ─┐
//         ├─ gate 0 ─┐
//   osc1 ─┘          │
//                    ├─ gate 2 ──> out
//   osc2 ─┐          │
//         ├─ gate 1 ─┘
//   osc3 ─┘

use std::fmt;

use crate::remote::LogicOp;

pub const LOGIC_GATES: usize = 3;

/// Output levels for a false / true network result.
pub const LOGIC_LOW: i8 = -128;
pub const LOGIC_HIGH: i8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownGate(pub usize);

impl fmt::Display for UnknownGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid logic block ID {}", self.0)
    }
}

impl std::error::Error for UnknownGate {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicNetwork {
    ops: [LogicOp; LOGIC_GATES],
}

impl Default for LogicNetwork {
    fn default() -> Self {
        Self {
            ops: [LogicOp::And, LogicOp::Or, LogicOp::Xor],
        }
    }
}

impl LogicNetwork {
    pub fn ops(&self) -> [LogicOp; LOGIC_GATES] {
        self.ops
    }

    pub fn set_op(&mut self, gate: usize, op: LogicOp) -> Result<(), UnknownGate> {
        let slot = self.ops.get_mut(gate).ok_or(UnknownGate(gate))?;
        *slot = op;
        Ok(())
    }

    /// A sample counts as true when it is strictly positive.
    pub fn evaluate(&self, samples: [f32; 4]) -> bool {
        let [a, b, c, d] = samples.map(|s| s > 0.0);
        let left = self.ops[0].apply(a, b);
        let right = self.ops[1].apply(c, d);
        self.ops[2].apply(left, right)
    }

    pub fn output(&self, samples: [f32; 4]) -> i8 {
        if self.evaluate(samples) { LOGIC_HIGH } else { LOGIC_LOW }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_network_is_and_or_then_xor() {
        let net = LogicNetwork::default();
        assert_eq!(net.ops(), [LogicOp::And, LogicOp::Or, LogicOp::Xor]);

        assert!(net.evaluate([1.0, 1.0, -1.0, -1.0]));
        assert!(!net.evaluate([1.0, 1.0, 1.0, -1.0]));
        assert!(net.evaluate([1.0, -1.0, -1.0, 0.5]));
        assert!(!net.evaluate([-1.0, 0.2, -1.0, -1.0]));
    }

    #[test]
    fn zero_counts_as_false() {
        let net = LogicNetwork::default();
        assert_eq!(net.output([0.0, 0.0, 0.0, 0.0]), LOGIC_LOW);
        assert_eq!(net.output([0.0, 0.0, 0.0, 0.1]), LOGIC_HIGH);
    }

    #[test]
    fn gates_can_be_rewired() {
        let mut net = LogicNetwork::default();
        net.set_op(2, LogicOp::Xnor).unwrap();
        assert!(!net.evaluate([1.0, 1.0, -1.0, -1.0]));
        assert_eq!(net.set_op(3, LogicOp::And), Err(UnknownGate(3)));
    }
}
