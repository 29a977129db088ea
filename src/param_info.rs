// src/param_info.rs
//
// Parameter metadata for automation UIs and validation.

use std::fmt;

use crate::node::{NodeId, ParamId};

/// How a 0..1 control position maps onto the range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DisplayCurve {
    #[default]
    Linear,
    Logarithmic,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ParamUnit {
    #[default]
    None,
    Hz,
    Seconds,
}

impl fmt::Display for ParamUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamUnit::None => Ok(()),
            ParamUnit::Hz => write!(f, "Hz"),
            ParamUnit::Seconds => write!(f, "s"),
        }
    }
}

/// Range, default and display hints for one automatable parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// Parameter id on the node that owns it.
    pub id: ParamId,
    pub name: String,
    /// Three-letter label for knobs.
    pub short_name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub unit: ParamUnit,
    pub curve: DisplayCurve,
}

impl ParamInfo {
    pub fn new(id: ParamId, name: impl Into<String>) -> Self {
        let name = name.into();
        let short_name = name.chars().take(3).collect::<String>().to_uppercase();
        Self {
            id,
            name,
            short_name,
            min: 0.0,
            max: 1.0,
            default: 0.0,
            unit: ParamUnit::None,
            curve: DisplayCurve::Linear,
        }
    }

    pub fn short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    pub fn range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn default(mut self, value: f32) -> Self {
        self.default = value;
        self
    }

    pub fn unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn curve(mut self, curve: DisplayCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Frequency parameter: Hz, logarithmic.
    pub fn frequency(id: ParamId, name: impl Into<String>, min: f32, max: f32) -> Self {
        Self::new(id, name)
            .range(min, max)
            .unit(ParamUnit::Hz)
            .curve(DisplayCurve::Logarithmic)
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Control position (0..1) of `value`.
    pub fn normalize(&self, value: f32) -> f32 {
        match self.curve {
            DisplayCurve::Linear => (value - self.min) / (self.max - self.min),
            DisplayCurve::Logarithmic => {
                let min = self.min.max(f32::MIN_POSITIVE);
                (value.max(min) / min).ln() / (self.max / min).ln()
            }
        }
    }

    /// Value at control position `normalized`.
    pub fn denormalize(&self, normalized: f32) -> f32 {
        match self.curve {
            DisplayCurve::Linear => self.min + normalized * (self.max - self.min),
            DisplayCurve::Logarithmic => {
                let min = self.min.max(f32::MIN_POSITIVE);
                min * (self.max / min).powf(normalized)
            }
        }
    }

    /// Hz as whole numbers, everything else to 2 places.
    pub fn format(&self, value: f32) -> String {
        match self.unit {
            ParamUnit::None => format!("{:.2}", value),
            ParamUnit::Hz => format!("{:.0} {}", value, self.unit),
            ParamUnit::Seconds => format!("{:.2} {}", value, self.unit),
        }
    }
}

/// A live, automatable parameter: metadata plus where to write it.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomatedParam {
    pub info: ParamInfo,
    pub node: NodeId,
}

/// The automatable parameters one effect exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomatedParamList {
    pub host_name: &'static str,
    pub params: Vec<AutomatedParam>,
}

impl AutomatedParamList {
    pub fn new(host_name: &'static str) -> Self {
        Self {
            host_name,
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, node: NodeId, info: ParamInfo) {
        self.params.push(AutomatedParam { info, node });
    }

    pub fn find(&self, name: &str) -> Option<&AutomatedParam> {
        self.params.iter().find(|p| p.info.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
