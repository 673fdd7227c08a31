//! Entity updates, in a fresh random order every tick.
//!
//! Peer effects are read from the tick-start snapshot, so the visiting order
//! only matters for which random draws go to which entity.

use crate::{
    clock::TaxCalendar,
    config::{BehaviourConfig, PeerConfig},
    entity::StepInputs,
    error::SimResult,
    event::SimEvent,
    network::PeerNetwork,
    rng::StageRng,
    snapshot::PeerSnapshot,
    subsystem::{SimSubsystem, TickContext},
    types::{EntityId, Tick},
};

pub struct BehaviourSubsystem {
    config: BehaviourConfig,
}

impl BehaviourSubsystem {
    pub fn new(config: BehaviourConfig) -> Self {
        Self { config }
    }
}

impl SimSubsystem for BehaviourSubsystem {
    fn name(&self) -> &'static str {
        "behaviour"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        rng: &mut StageRng,
    ) -> SimResult<Vec<SimEvent>> {
        let order = rng.permutation(ctx.population.len());
        for id in order {
            let peer_comm = peer_contribution(
                id,
                ctx.tick,
                ctx.snapshot,
                ctx.network,
                ctx.calendar,
                &self.config.peer,
                rng,
            );
            let Some(entity) = ctx.population.get_mut(id) else {
                continue;
            };
            let inputs = StepInputs {
                global_comm:   ctx.inputs.global_comm,
                targeted_comm: ctx.inputs.targeted_comm(entity.group()),
                peer_comm,
                high_urgency:  ctx.inputs.high_urgency,
            };
            entity.step(&inputs, &self.config);
        }
        log::debug!(
            "tick={} behaviour: mean propensity {:.4}",
            ctx.tick,
            ctx.population.mean_propensity()
        );
        Ok(Vec::new())
    }
}

// ── Peer contagion ─────────────────────────────────────────────────

/// Signed peer signal for one entity.
///
/// Audited itself last tick: a one-off negative shock. Per neighbour:
/// audited last tick adds a crater bonus, an audit 48-105 ticks old fades
/// as `-scale·ln(dt)`, otherwise there is a chance of deadline chatter
/// (scaled by proximity to the deadline) or, failing that, idle chatter.
pub fn peer_contribution(
    id: EntityId,
    tick: Tick,
    snapshot: &PeerSnapshot,
    network: &PeerNetwork,
    calendar: &TaxCalendar,
    peer: &PeerConfig,
    rng: &mut StageRng,
) -> f64 {
    let mut total = 0.0;
    if snapshot.ticks_since_audit(id, tick) == Some(1) {
        total += peer.audit_shock;
    }

    let fade_window = peer.fade_window_start..=peer.fade_window_end;
    let deadline_chance = peer.deadline_chatter_probability * calendar.deadline_proximity(tick);

    for &neighbour in network.neighbors(id) {
        match snapshot.ticks_since_audit(neighbour, tick) {
            Some(1) => total += peer.crater_bonus,
            Some(dt) if fade_window.contains(&dt) => {
                total -= peer.fade_scale * (dt as f64).ln();
            }
            _ => {
                if rng.chance(deadline_chance) {
                    total += peer.deadline_chatter_effect;
                } else if rng.chance(peer.idle_chatter_probability) {
                    total += rng.uniform(0.0, peer.idle_chatter_max);
                }
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::ComplianceEntity,
        population::Population,
        types::{AgeCategory, SizeCategory},
    };

    fn population(n: usize) -> Population {
        let entities = (0..n)
            .map(|id| {
                ComplianceEntity::new(
                    id,
                    SizeCategory::Micro,
                    AgeCategory::Old,
                    None,
                    100_000.0,
                    0.3,
                    false,
                    0.5,
                )
            })
            .collect();
        Population::from_entities(entities, Vec::new())
    }

    fn quiet_peers() -> PeerConfig {
        PeerConfig {
            deadline_chatter_probability: 0.0,
            idle_chatter_probability: 0.0,
            ..PeerConfig::default()
        }
    }

    #[test]
    fn audited_entity_gets_the_shock_once() {
        let mut pop = population(2);
        pop.get_mut(0).unwrap().receive_audit(0.9, 20);
        let snapshot = PeerSnapshot::capture(&pop);
        let network = PeerNetwork::default();
        let calendar = TaxCalendar::default();
        let peer = quiet_peers();
        let mut rng = StageRng::from_seed(1);

        let next = peer_contribution(0, 21, &snapshot, &network, &calendar, &peer, &mut rng);
        assert_eq!(next, peer.audit_shock);
        let later = peer_contribution(0, 22, &snapshot, &network, &calendar, &peer, &mut rng);
        assert_eq!(later, 0.0);
    }

    #[test]
    fn neighbour_audits_crater_then_fade() {
        let mut pop = population(2);
        pop.get_mut(1).unwrap().receive_audit(0.9, 20);
        let snapshot = PeerSnapshot::capture(&pop);
        let network = PeerNetwork::from_edges(2, &[(0, 1)]);
        let calendar = TaxCalendar::default();
        let peer = quiet_peers();
        let mut rng = StageRng::from_seed(1);

        let crater = peer_contribution(0, 21, &snapshot, &network, &calendar, &peer, &mut rng);
        assert_eq!(crater, peer.crater_bonus);

        let faded = peer_contribution(0, 20 + 60, &snapshot, &network, &calendar, &peer, &mut rng);
        assert!((faded + peer.fade_scale * 60f64.ln()).abs() < 1e-15);

        let outside = peer_contribution(0, 20 + 200, &snapshot, &network, &calendar, &peer, &mut rng);
        assert_eq!(outside, 0.0);
    }
}
