// src/parameter.rs
//
// Sample-accurate automation for node parameters.

use std::collections::VecDeque;

/// A timed write against an automatable parameter.
///
/// Times are in seconds on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEvent {
    /// Jump to `value` at `time`.
    SetValue { value: f32, time: f64 },

    /// Move linearly from the previous value to `value`, arriving at `end_time`.
    LinearRamp { value: f32, end_time: f64 },
}

impl ParamEvent {
    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { time, .. } => time,
            ParamEvent::LinearRamp { end_time, .. } => end_time,
        }
    }
}

/// A control value that can be written immediately or scheduled ahead.
///
/// The render thread evaluates it once per sample; the control thread only
/// ever enqueues events, so a parameter change never touches the render loop
/// directly.
#[derive(Debug, Clone)]
pub struct AutomationParam {
    value: f32,
    min: f32,
    max: f32,
    events: VecDeque<ParamEvent>,

    /// Start point of the ramp at the head of the queue.
    anchor_time: f64,
    anchor_value: f32,
}

impl AutomationParam {
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        let value = value.clamp(min, max);
        Self {
            value,
            min,
            max,
            events: VecDeque::with_capacity(16),
            anchor_time: 0.0,
            anchor_value: value,
        }
    }

    /// Current value (as of the last evaluation).
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Overwrite the value and drop everything that was scheduled.
    pub fn set_immediate(&mut self, value: f32) {
        self.events.clear();
        self.value = value.clamp(self.min, self.max);
        self.anchor_value = self.value;
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent::SetValue { value, time });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, end_time: f64) {
        self.insert(ParamEvent::LinearRamp { value, end_time });
    }

    pub fn schedule(&mut self, event: ParamEvent) {
        self.insert(event);
    }

    /// Remove every event at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Number of events not yet reached.
    #[inline]
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    fn insert(&mut self, event: ParamEvent) {
        // Events sharing a timestamp keep arrival order.
        let at = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(at, event);
    }

    /// Advance to `time` and return the value there.
    #[inline]
    pub fn value_at(&mut self, time: f64) -> f32 {
        while let Some(&event) = self.events.front() {
            match event {
                ParamEvent::SetValue { value, time: at } if at <= time => {
                    self.value = value;
                    self.anchor_time = at;
                    self.anchor_value = value;
                    self.events.pop_front();
                }
                ParamEvent::LinearRamp { value, end_time } => {
                    if end_time <= time {
                        self.value = value;
                        self.anchor_time = end_time;
                        self.anchor_value = value;
                        self.events.pop_front();
                    } else {
                        let span = end_time - self.anchor_time;
                        let frac = if span > 0.0 {
                            ((time - self.anchor_time) / span).clamp(0.0, 1.0) as f32
                        } else {
                            1.0
                        };
                        self.value = self.anchor_value + (value - self.anchor_value) * frac;
                        break;
                    }
                }
                _ => break,
            }
        }

        if self.events.is_empty() {
            self.anchor_time = time;
            self.anchor_value = self.value;
        }

        self.value.clamp(self.min, self.max)
    }

    /// True when nothing is scheduled, so a block can use a constant value.
    #[inline]
    pub fn is_static(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_value_applies_at_its_time() {
        let mut p = AutomationParam::new(1.0, 0.0, 10.0);
        p.set_value_at_time(5.0, 0.5);

        assert_eq!(p.value_at(0.25), 1.0);
        assert_eq!(p.value_at(0.5), 5.0);
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn linear_ramp_starts_from_last_evaluation() {
        let mut p = AutomationParam::new(0.0, 0.0, 1.0);
        p.value_at(1.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);

        assert!((p.value_at(1.5) - 0.5).abs() < 1e-6);
        assert_eq!(p.value_at(2.0), 1.0);
        assert!(p.is_static());
    }

    #[test]
    fn cancel_drops_future_events() {
        let mut p = AutomationParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.3, 1.0);
        p.set_value_at_time(0.6, 2.0);
        p.cancel_scheduled_values(1.5);

        assert_eq!(p.pending(), 1);
        assert_eq!(p.value_at(3.0), 0.3);
    }

    #[test]
    fn values_are_clamped_to_range() {
        let mut p = AutomationParam::new(0.0, -1.0, 1.0);
        p.set_value_at_time(4.0, 0.0);
        assert_eq!(p.value_at(0.0), 1.0);
    }
}
