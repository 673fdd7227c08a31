//! A single SME taxpayer and its weekly behavioural update.

use crate::{
    config::BehaviourConfig,
    types::{AgeCategory, EntityId, GroupKey, SectorId, SizeCategory, Tick},
};
use serde::{Deserialize, Serialize};

pub fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Everything an entity consumes in one step besides its own audit signal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepInputs {
    /// Broadcast intensity this tick.
    pub global_comm:   f64,
    /// Targeted warning intensity for this entity's group this tick.
    pub targeted_comm: f64,
    /// Signed sum of peer contributions.
    pub peer_comm:     f64,
    /// One week before the deadline with a broadcast out.
    pub high_urgency:  bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceEntity {
    pub id:                 EntityId,
    pub size:               SizeCategory,
    pub age:                AgeCategory,
    pub sector:             Option<SectorId>,
    pub turnover:           f64,
    pub tax_rate:           f64,
    pub has_advisor:        bool,
    pub initial_propensity: f64,
    propensity:             f64,
    /// One-shot audit effect, consumed and cleared by the next step.
    audit_impact:           f64,
    last_audit:             Option<Tick>,
    comm_sensitivity:       f64,
}

impl ComplianceEntity {
    pub fn new(
        id: EntityId,
        size: SizeCategory,
        age: AgeCategory,
        sector: Option<SectorId>,
        turnover: f64,
        tax_rate: f64,
        has_advisor: bool,
        propensity: f64,
    ) -> Self {
        let propensity = clip01(propensity);
        Self {
            id,
            size,
            age,
            sector,
            turnover,
            tax_rate,
            has_advisor,
            initial_propensity: propensity,
            propensity,
            audit_impact: 0.0,
            last_audit: None,
            comm_sensitivity: 1.0,
        }
    }

    pub fn group(&self) -> GroupKey {
        GroupKey::new(self.size, self.age)
    }

    pub fn propensity(&self) -> f64 {
        self.propensity
    }

    /// Overwrite the propensity (clipped). Used by baseline calibration;
    /// also resets the recorded initial propensity.
    pub fn rebase_propensity(&mut self, propensity: f64) {
        self.propensity = clip01(propensity);
        self.initial_propensity = self.propensity;
    }

    /// Full tax liability: turnover × tax rate.
    pub fn liability(&self) -> f64 {
        self.turnover * self.tax_rate
    }

    pub fn audit_impact(&self) -> f64 {
        self.audit_impact
    }

    pub fn last_audit(&self) -> Option<Tick> {
        self.last_audit
    }

    pub fn comm_sensitivity(&self) -> f64 {
        self.comm_sensitivity
    }

    pub fn ticks_since_audit(&self, tick: Tick) -> Option<u64> {
        self.last_audit.map(|at| tick.saturating_sub(at))
    }

    /// Never audited, or the last audit is at least `cooldown` ticks old.
    pub fn is_audit_eligible(&self, tick: Tick, cooldown: u64) -> bool {
        self.ticks_since_audit(tick).map_or(true, |dt| dt >= cooldown)
    }

    /// Record an audit. The effect lands on the next call to `step`.
    pub fn receive_audit(&mut self, effect: f64, tick: Tick) {
        self.audit_impact = effect;
        self.last_audit = Some(tick);
    }

    pub fn decay_rate(&self, params: &BehaviourConfig) -> f64 {
        if self.has_advisor {
            params.decay_factor * (1.0 - params.advisor_decay_relief)
        } else {
            params.decay_factor * (1.0 + params.unadvised_decay_penalty)
        }
    }

    /// Weekly update: apply the audit signal and communication, then decay.
    /// Returns the change in propensity.
    pub fn step(&mut self, inputs: &StepInputs, params: &BehaviourConfig) -> f64 {
        let before = self.propensity;

        let sensitivity = if params.apply_comm_sensitivity { self.comm_sensitivity } else { 1.0 };
        let d = sensitivity * (inputs.global_comm + inputs.targeted_comm) + inputs.peer_comm;
        let improvement = (1.0 - before) * (self.audit_impact + d);
        let deterioration = before * self.decay_rate(params);
        self.propensity = clip01(before + improvement - deterioration);

        self.audit_impact = 0.0;

        if inputs.high_urgency {
            self.comm_sensitivity = (self.comm_sensitivity * params.urgency_sensitivity_growth)
                .min(params.max_comm_sensitivity.max(self.comm_sensitivity));
        }

        self.propensity - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(propensity: f64, has_advisor: bool) -> ComplianceEntity {
        ComplianceEntity::new(
            0,
            SizeCategory::Micro,
            AgeCategory::Young,
            None,
            100_000.0,
            0.3,
            has_advisor,
            propensity,
        )
    }

    #[test]
    fn decay_only_shrinks_proportionally() {
        let params = BehaviourConfig { decay_factor: 0.01, ..BehaviourConfig::default() };
        let mut e = entity(0.5, false);
        e.step(&StepInputs::default(), &params);
        let expected = 0.5 * (1.0 - 0.01 * 1.05);
        assert!((e.propensity() - expected).abs() < 1e-12);

        let mut advised = entity(0.5, true);
        advised.step(&StepInputs::default(), &params);
        assert!(advised.propensity() > e.propensity(), "advisors decay slower");
    }

    #[test]
    fn audit_signal_is_consumed_once() {
        let params = BehaviourConfig { decay_factor: 0.0, ..BehaviourConfig::default() };
        let mut e = entity(0.6, true);
        e.receive_audit(0.5, 20);
        e.step(&StepInputs::default(), &params);
        assert!((e.propensity() - 0.8).abs() < 1e-12);
        assert_eq!(e.audit_impact(), 0.0);

        e.step(&StepInputs::default(), &params);
        assert!((e.propensity() - 0.8).abs() < 1e-12, "no second application");
        assert_eq!(e.last_audit(), Some(20));
    }

    #[test]
    fn propensity_is_clipped_under_extreme_inputs() {
        let params = BehaviourConfig::default();
        let mut e = entity(0.4, false);
        let shove = StepInputs { peer_comm: -50.0, ..StepInputs::default() };
        e.step(&shove, &params);
        assert_eq!(e.propensity(), 0.0);

        let mut e = entity(0.4, false);
        e.receive_audit(25.0, 3);
        e.step(&StepInputs::default(), &params);
        assert_eq!(e.propensity(), 1.0);
    }

    #[test]
    fn cooldown_eligibility() {
        let mut e = entity(0.5, true);
        assert!(e.is_audit_eligible(0, 156));
        e.receive_audit(1.0, 20);
        assert!(!e.is_audit_eligible(175, 156));
        assert!(e.is_audit_eligible(176, 156));
    }

    #[test]
    fn sensitivity_grows_only_on_urgent_weeks_and_caps() {
        let params = BehaviourConfig::default();
        let mut e = entity(0.5, true);
        e.step(&StepInputs::default(), &params);
        assert_eq!(e.comm_sensitivity(), 1.0);

        let urgent = StepInputs { high_urgency: true, ..StepInputs::default() };
        for _ in 0..100 {
            e.step(&urgent, &params);
        }
        assert_eq!(e.comm_sensitivity(), params.max_comm_sensitivity);
    }

    #[test]
    fn grown_sensitivity_only_scales_comm_when_enabled() {
        let params = BehaviourConfig { decay_factor: 0.0, ..BehaviourConfig::default() };
        let urgent = StepInputs { high_urgency: true, ..StepInputs::default() };
        let mail = StepInputs { global_comm: 0.01, ..StepInputs::default() };

        let mut e = entity(0.5, true);
        e.step(&urgent, &params);
        assert!(e.comm_sensitivity() > 1.0);
        e.step(&mail, &params);
        assert!((e.propensity() - (0.5 + 0.5 * 0.01)).abs() < 1e-12);

        let scaled = BehaviourConfig { apply_comm_sensitivity: true, ..params };
        let mut e = entity(0.5, true);
        e.step(&urgent, &scaled);
        let s = e.comm_sensitivity();
        e.step(&mail, &scaled);
        assert!((e.propensity() - (0.5 + 0.5 * 0.01 * s)).abs() < 1e-12);
    }
}
