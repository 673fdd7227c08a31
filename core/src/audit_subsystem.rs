//! Yearly audit campaign.
//!
//! Opens on `deadline_week + audit_delay_weeks` each year. Every other week
//! the audited fraction is 0. On the campaign week:
//!   1. per group, target = round(rate × group size), drawn without
//!      replacement from members outside the cooldown window;
//!   2. the whole selection is shuffled and split in half;
//!   3. the first half gets a uniformly random tier;
//!   4. the second half is sorted by group mean (worst first) and split in
//!      thirds: deepest, middle, lightest tier.

use crate::{
    config::AuditConfig,
    error::SimResult,
    event::{AuditSelection, SimEvent},
    rng::StageRng,
    subsystem::{SimSubsystem, TickContext},
    types::EntityId,
};

pub struct AuditAllocator {
    config: AuditConfig,
}

impl AuditAllocator {
    pub fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    /// Eligible members drawn per group, in group order.
    fn select(&self, ctx: &TickContext<'_>, rng: &mut StageRng) -> (usize, Vec<EntityId>) {
        let cooldown = self.config.cooldown_ticks;
        let mut targeted = 0;
        let mut selected = Vec::new();

        for (group, members) in ctx.population.members_by_group() {
            let rate = self.config.rate_for(group);
            let target = (rate * members.len() as f64).round() as usize;
            if target == 0 {
                continue;
            }
            targeted += target;

            let eligible: Vec<EntityId> = members
                .into_iter()
                .filter(|&id| {
                    ctx.population
                        .get(id)
                        .is_some_and(|e| e.is_audit_eligible(ctx.tick, cooldown))
                })
                .collect();
            let picks = rng.sample_indices(eligible.len(), target);
            selected.extend(picks.into_iter().map(|i| eligible[i]));
        }
        (targeted, selected)
    }

    /// Tier index per selected entity, in selection order.
    fn assign_tiers(
        &self,
        ctx: &TickContext<'_>,
        selected: &[EntityId],
        rng: &mut StageRng,
    ) -> Vec<(EntityId, usize, AuditSelection)> {
        let tier_count = self.config.tiers.len() as u64;
        let (random_half, targeted_half) = selected.split_at(selected.len() / 2);

        let mut plan: Vec<(EntityId, usize, AuditSelection)> = random_half
            .iter()
            .map(|&id| (id, rng.next_u64_below(tier_count) as usize, AuditSelection::Random))
            .collect();

        let means = ctx.population.group_means();
        let mean_of = |id: EntityId| {
            ctx.population
                .get(id)
                .and_then(|e| means.get(&e.group()).copied())
                .unwrap_or(0.0)
        };
        let mut ranked = targeted_half.to_vec();
        ranked.sort_by(|a, b| mean_of(*a).total_cmp(&mean_of(*b)));

        let n = ranked.len() as f64;
        for (i, id) in ranked.into_iter().enumerate() {
            let position = i as f64;
            let tier = if position < n / 3.0 {
                self.config.deepest_tier()
            } else if position < 2.0 * n / 3.0 {
                self.config.middle_tier()
            } else {
                self.config.lightest_tier()
            };
            plan.push((id, tier, AuditSelection::Targeted));
        }
        plan
    }
}

impl SimSubsystem for AuditAllocator {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        rng: &mut StageRng,
    ) -> SimResult<Vec<SimEvent>> {
        if !ctx.calendar.is_audit_campaign(ctx.tick) {
            ctx.inputs.audited_count = 0;
            ctx.inputs.audited_fraction = 0.0;
            return Ok(Vec::new());
        }

        let (targeted, mut selected) = self.select(ctx, rng);
        rng.shuffle(&mut selected);
        let plan = self.assign_tiers(ctx, &selected, rng);

        let mut events = Vec::with_capacity(plan.len() + 1);
        events.push(SimEvent::AuditCampaignOpened {
            tick: ctx.tick,
            targeted,
            selected: selected.len(),
        });

        for (id, tier_index, selection) in plan {
            let tier = &self.config.tiers[tier_index];
            let Some(entity) = ctx.population.get_mut(id) else {
                continue;
            };
            entity.receive_audit(tier.effect, ctx.tick);
            ctx.inputs.tick_cost += tier.cost;
            events.push(SimEvent::EntityAudited {
                tick: ctx.tick,
                entity_id: id,
                group: entity.group(),
                tier: tier.name.clone(),
                selection,
                effect: tier.effect,
                cost: tier.cost,
            });
        }

        let n = ctx.population.len();
        ctx.inputs.audited_count = selected.len();
        ctx.inputs.audited_fraction = if n > 0 { selected.len() as f64 / n as f64 } else { 0.0 };
        log::debug!(
            "tick={} audit: campaign targeted {} and audited {} ({:.2}%)",
            ctx.tick,
            targeted,
            selected.len(),
            ctx.inputs.audited_fraction * 100.0
        );
        Ok(events)
    }
}
