//! Communication schedule and the targeted company-visit campaign.
//!
//! Broadcasts go to every entity in the weeks the schedule names relative to
//! the filing deadline. One week out, the effect is multiplied (cost is not).
//! On the warning-visit week every group whose mean propensity sits below the
//! compliance target gets the warning channel for that tick only.

use crate::{
    config::CommunicationConfig,
    error::SimResult,
    event::SimEvent,
    rng::StageRng,
    subsystem::{SimSubsystem, TickContext},
};

pub struct InterventionScheduler {
    comm:              CommunicationConfig,
    compliance_target: f64,
}

impl InterventionScheduler {
    pub fn new(comm: CommunicationConfig, compliance_target: f64) -> Self {
        Self { comm, compliance_target }
    }

    fn effect(&self, channel: &str) -> f64 {
        self.comm.channel_effects.get(channel).copied().unwrap_or(0.0)
    }

    fn unit_cost(&self, channel: &str) -> f64 {
        self.comm.channel_costs.get(channel).copied().unwrap_or(0.0)
    }

    fn broadcast(&self, ctx: &mut TickContext<'_>) -> Vec<SimEvent> {
        let weeks_until = ctx.calendar.weeks_until_deadline(ctx.tick);
        let channels = match u32::try_from(weeks_until).ok().and_then(|w| self.comm.schedule.get(&w)) {
            Some(channels) if !channels.is_empty() => channels,
            _ => return Vec::new(),
        };

        let urgent = weeks_until == 1;
        let multiplier = if urgent { self.comm.urgency_multiplier } else { 1.0 };
        let reached = ctx.population.len();

        let mut events = Vec::with_capacity(channels.len());
        for channel in channels {
            let effect = self.effect(channel) * multiplier;
            let cost = reached as f64 * self.unit_cost(channel);
            ctx.inputs.global_comm += effect;
            ctx.inputs.tick_cost += cost;
            events.push(SimEvent::CommunicationSent {
                tick: ctx.tick,
                channel: channel.clone(),
                effect,
                reached,
                cost,
                urgent,
            });
        }
        ctx.inputs.high_urgency = urgent;
        log::debug!(
            "tick={} scheduler: {} channel(s), {} week(s) to deadline, intensity {:.4}",
            ctx.tick,
            channels.len(),
            weeks_until,
            ctx.inputs.global_comm
        );
        events
    }

    fn warning_visits(&self, ctx: &mut TickContext<'_>) -> Vec<SimEvent> {
        let channel = self.comm.warning_channel.as_str();
        let effect = self.effect(channel);
        let unit_cost = self.unit_cost(channel);

        let mut events = Vec::new();
        for (group, mean) in ctx.population.group_means() {
            if mean >= self.compliance_target {
                continue;
            }
            let reached = ctx.population.group_count(group);
            let cost = reached as f64 * unit_cost;
            ctx.inputs.sector_warnings.insert(group, effect);
            ctx.inputs.tick_cost += cost;
            events.push(SimEvent::WarningVisitIssued {
                tick: ctx.tick,
                group,
                group_mean: mean,
                effect,
                reached,
                cost,
            });
        }
        log::debug!("tick={} scheduler: {} group(s) flagged for visits", ctx.tick, events.len());
        events
    }
}

impl SimSubsystem for InterventionScheduler {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        _rng: &mut StageRng,
    ) -> SimResult<Vec<SimEvent>> {
        let mut events = self.broadcast(ctx);
        if ctx.calendar.is_warning_visit(ctx.tick) {
            events.extend(self.warning_visits(ctx));
        }
        Ok(events)
    }
}
