//! Per-worker random number generation for transition selection.
//!
//! Every worker owns its own ChaCha8 stream derived from the run seed and the
//! worker id, so a run is reproducible from its seed no matter how the
//! workers interleave. Behaviors never touch this stream: all transition
//! randomness goes through [`TransitionRng::draw`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Mixes the worker id into the run seed (splitmix64 finalizer).
fn worker_seed(run_seed: u64, tid: usize) -> u64 {
    let mut z = run_seed.wrapping_add((tid as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministic source of uniform draws in `[0, 1)` for one worker.
#[derive(Debug, Clone)]
pub struct TransitionRng {
    rng: ChaCha8Rng,
    draws: u64,
}

impl TransitionRng {
    /// Stream for worker `tid` of a run seeded with `run_seed`.
    pub fn new(run_seed: u64, tid: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(worker_seed(run_seed, tid)),
            draws: 0,
        }
    }

    /// Next uniform draw in `[0, 1)`.
    pub fn draw(&mut self) -> f64 {
        self.draws += 1;
        self.rng.random::<f64>()
    }

    /// Number of draws taken so far.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }
}

/// Pick a fresh run seed when the caller did not pin one.
pub fn random_run_seed() -> u64 {
    rand::random()
}
