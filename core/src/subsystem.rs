//! Stage trait and the per-tick state shared between stages.
//!
//! RULE: Every stage implements SimSubsystem.
//! The engine calls update() on each registered stage
//! in registration order, every tick.
//! Execution order is fixed and documented in engine.rs.

use crate::{
    clock::TaxCalendar,
    error::SimResult,
    event::SimEvent,
    network::PeerNetwork,
    population::Population,
    rng::StageRng,
    snapshot::PeerSnapshot,
    types::{GroupKey, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-tick intervention inputs. Cleared by the engine at the start of
/// every tick, then filled by the scheduler and the audit allocator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TickInputs {
    /// Summed broadcast effect this tick.
    pub global_comm:      f64,
    /// Targeted warning effect per flagged group.
    pub sector_warnings:  BTreeMap<GroupKey, f64>,
    pub high_urgency:     bool,
    pub audited_count:    usize,
    pub audited_fraction: f64,
    /// Spend incurred this tick, added to the run total by the engine.
    pub tick_cost:        f64,
}

impl TickInputs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn targeted_comm(&self, key: GroupKey) -> f64 {
        self.sector_warnings.get(&key).copied().unwrap_or(0.0)
    }
}

/// Everything a stage may touch during one tick.
pub struct TickContext<'a> {
    pub tick:       Tick,
    pub calendar:   &'a TaxCalendar,
    pub population: &'a mut Population,
    pub network:    &'a PeerNetwork,
    /// Settled state from before this tick's stages ran.
    pub snapshot:   &'a PeerSnapshot,
    pub inputs:     &'a mut TickInputs,
}

/// The contract every stage must fulfil.
pub trait SimSubsystem: Send {
    /// Unique stable name for this stage.
    fn name(&self) -> &'static str;

    /// Called once per tick by the engine.
    ///
    /// - `ctx`: shared tick state; earlier stages' inputs are already filled
    /// - `rng`: this stage's deterministic stream for this tick
    ///
    /// Returns the events to add to the tick's event log.
    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        rng: &mut StageRng,
    ) -> SimResult<Vec<SimEvent>>;
}
