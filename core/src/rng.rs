//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through StageRng instances derived
//! from the single master seed the engine was built with.
//!
//! Each stage gets its own stream, seeded from
//! (master_seed, stage slot, tick). This means:
//!   - Extra draws in one stage never shift another stage's stream.
//!   - Any tick of any stage can be replayed in isolation.

use crate::{
    error::{SimError, SimResult},
    types::Tick,
};
use rand::{seq::SliceRandom, RngCore, SeedableRng};
use rand_distr::{Beta, Distribution};
use rand_pcg::Pcg64Mcg;

const SLOT_MIX: u64 = 0x9e37_79b9_7f4a_7c15;
const TICK_MIX: u64 = 0xbf58_476d_1ce4_e5b9;

/// A named, deterministic RNG for a single stage.
pub struct StageRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StageRng {
    /// Create a stream from a raw seed. Prefer `RngBank` in simulation code.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            name:  "unnamed",
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform draw in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Pick an index with probability proportional to `weights`.
    ///
    /// Zero-weight entries are never returned. Weights need not sum to 1.
    /// Returns None when the total weight is not positive.
    pub fn categorical(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) {
            return None;
        }
        let roll = self.next_f64() * total;
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if *w > 0.0 && roll < cumulative {
                return Some(i);
            }
        }
        // Rounding can leave roll == total; fall back to the last live entry.
        weights.iter().rposition(|w| *w > 0.0)
    }

    /// Sample from Beta(alpha, beta). Both parameters must be positive.
    pub fn beta(&mut self, alpha: f64, beta: f64) -> SimResult<f64> {
        let dist = Beta::new(alpha, beta).map_err(|e| {
            SimError::config(format!("Beta({alpha}, {beta}) is undefined: {e}"))
        })?;
        Ok(dist.sample(&mut self.inner))
    }

    /// Shuffle a slice in place (Fisher-Yates).
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }

    /// A uniformly random permutation of 0..n.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        self.shuffle(&mut order);
        order
    }

    /// Draw `amount` distinct positions out of 0..length, unordered.
    /// Requests larger than `length` are clamped.
    pub fn sample_indices(&mut self, length: usize, amount: usize) -> Vec<usize> {
        let amount = amount.min(length);
        if amount == 0 {
            return Vec::new();
        }
        rand::seq::index::sample(&mut self.inner, length, amount).into_vec()
    }
}

/// Derives every stage stream for a single run.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Tick-independent stream, for one-time construction work.
    pub fn for_stage(&self, slot: StageSlot) -> StageRng {
        let seed = self.master_seed ^ (slot as u64).wrapping_mul(SLOT_MIX);
        StageRng::from_seed(seed).with_name(slot.name())
    }

    /// Stream for one stage at one tick.
    pub fn for_stage_at_tick(&self, slot: StageSlot, tick: Tick) -> StageRng {
        let seed = self.master_seed
            ^ (slot as u64).wrapping_mul(SLOT_MIX)
            ^ (tick.wrapping_add(1)).wrapping_mul(TICK_MIX);
        StageRng::from_seed(seed).with_name(slot.name())
    }
}

/// Stable stage slot assignments.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every stage's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StageSlot {
    Population = 0,
    Network    = 1,
    Scheduler  = 2,
    Audit      = 3,
    Behaviour  = 4,
}

impl StageSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Population => "population",
            Self::Network    => "network",
            Self::Scheduler  => "scheduler",
            Self::Audit      => "audit",
            Self::Behaviour  => "behaviour",
        }
    }
}
