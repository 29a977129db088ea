// src/sync/mod.rs
//
// Control-thread timing: the debounced writer used for remote parameter
// writes, and the clock that drives it.

mod clock;
mod debounce;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::DebouncedWriter;
