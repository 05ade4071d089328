//! State machine primitives: the weighted transition table and the per-worker
//! draw stream that drives it.

pub mod rng;
pub mod transitions;

pub use rng::TransitionRng;
pub use transitions::{Transition, TransitionTable};
