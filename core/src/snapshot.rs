//! Frozen views of simulation state.
//!
//! `PeerSnapshot` is taken at the start of every tick so peer reads never
//! observe a neighbour's same-tick update. `EngineSnapshot` is persisted
//! every SNAPSHOT_INTERVAL ticks and captures everything needed to inspect
//! or resume a run from that tick.

use crate::{
    calibration::TaxGapLink,
    clock::SimClock,
    entity::ComplianceEntity,
    population::Population,
    types::{EntityId, RunId, Tick},
};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_INTERVAL: Tick = 52; // yearly

#[derive(Debug, Clone, Default)]
pub struct PeerSnapshot {
    last_audit: Vec<Option<Tick>>,
    propensity: Vec<f64>,
}

impl PeerSnapshot {
    pub fn capture(population: &Population) -> Self {
        let entities = population.entities();
        Self {
            last_audit: entities.iter().map(ComplianceEntity::last_audit).collect(),
            propensity: entities.iter().map(ComplianceEntity::propensity).collect(),
        }
    }

    pub fn ticks_since_audit(&self, id: EntityId, tick: Tick) -> Option<u64> {
        self.last_audit
            .get(id)
            .copied()
            .flatten()
            .map(|at| tick.saturating_sub(at))
    }

    pub fn propensity(&self, id: EntityId) -> f64 {
        self.propensity.get(id).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub run_id:     RunId,
    pub tick:       Tick,
    pub clock:      SimClock,
    pub total_cost: f64,
    pub link:       TaxGapLink,
    pub entities:   Vec<ComplianceEntity>,
}
