// src/effects/mod.rs
//
// Composite effects built from graph nodes. Each effect owns its node ids
// but never creates or frees nodes itself; that goes through the lifecycle.

mod filter_pair;
mod reverb;

pub use filter_pair::*;
pub use reverb::*;
