use crate::{
    clock::TaxCalendar,
    error::{SimError, SimResult},
    types::{AgeCategory, GroupKey, SizeCategory},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Population ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorShare {
    pub name:  String,
    pub share: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TurnoverBand {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub size: usize,
    pub size_shares: BTreeMap<SizeCategory, f64>,
    pub age_shares: BTreeMap<AgeCategory, f64>,
    /// Optional sector breakdown. Empty means entities carry no sector.
    #[serde(default)]
    pub sectors: Vec<SectorShare>,
    /// Population-wide mean propensity the mu-table is centred on.
    pub compliance_target: f64,
    /// Shift in group mean per size-score step above the weighted mean.
    pub size_weight: f64,
    /// Shift in group mean per age-score step above the weighted mean.
    pub age_weight: f64,
    /// Beta concentration (kappa). Higher = tighter around the group mean.
    pub concentration: f64,
    /// Probability of having a professional tax advisor, by size.
    pub advisor_probability: BTreeMap<SizeCategory, f64>,
    /// Nudge applied to the group mean before the Beta draw.
    pub advisor_shift: f64,
    pub turnover_bands: BTreeMap<SizeCategory, TurnoverBand>,
    pub statutory_tax_rate: f64,
    /// Half-width of the uniform jitter around the statutory rate.
    pub tax_rate_jitter: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mean_degree: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { mean_degree: 4.0 }
    }
}

// ── Interventions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationConfig {
    /// Propensity effect per channel name.
    pub channel_effects: BTreeMap<String, f64>,
    /// Cost per entity reached, per channel name.
    pub channel_costs: BTreeMap<String, f64>,
    /// Weeks before the deadline → channels sent that week.
    pub schedule: BTreeMap<u32, Vec<String>>,
    /// Channel used for the targeted company-visit campaign.
    pub warning_channel: String,
    /// Effect multiplier one week before the deadline. Cost is unaffected.
    #[serde(default = "default_urgency_multiplier")]
    pub urgency_multiplier: f64,
}

fn default_urgency_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditTier {
    pub name:   String,
    pub effect: f64,
    pub cost:   f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Share of each group audited on the campaign week.
    pub rates: BTreeMap<GroupKey, f64>,
    /// Ordered lightest → deepest.
    pub tiers: Vec<AuditTier>,
    /// Minimum ticks between two audits of the same entity.
    #[serde(default = "default_cooldown")]
    pub cooldown_ticks: u64,
}

fn default_cooldown() -> u64 {
    156
}

impl AuditConfig {
    /// Total lookup: groups without an entry are never audited.
    pub fn rate_for(&self, key: GroupKey) -> f64 {
        self.rates.get(&key).copied().unwrap_or(0.0)
    }

    pub fn lightest_tier(&self) -> usize {
        0
    }

    pub fn middle_tier(&self) -> usize {
        self.tiers.len() / 2
    }

    pub fn deepest_tier(&self) -> usize {
        self.tiers.len().saturating_sub(1)
    }
}

// ── Behaviour ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Added to the entity's own communication the tick after it is audited.
    pub audit_shock: f64,
    /// Per neighbour audited on the previous tick.
    pub crater_bonus: f64,
    /// Ticks-since-audit window in which an old neighbour audit fades.
    pub fade_window_start: u64,
    pub fade_window_end: u64,
    /// Fading contribution is `-fade_scale * ln(ticks since audit)`.
    pub fade_scale: f64,
    /// Chance of deadline chatter at full proximity, per neighbour.
    pub deadline_chatter_probability: f64,
    pub deadline_chatter_effect: f64,
    pub idle_chatter_probability: f64,
    /// Idle chatter is uniform in [0, idle_chatter_max).
    pub idle_chatter_max: f64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            audit_shock: -0.5,
            crater_bonus: 0.0005,
            fade_window_start: 48,
            fade_window_end: 105,
            fade_scale: 0.000005,
            deadline_chatter_probability: 0.05,
            deadline_chatter_effect: 0.0005,
            idle_chatter_probability: 0.01,
            idle_chatter_max: 0.000005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviourConfig {
    pub decay_factor: f64,
    /// Fraction of decay removed for entities with an advisor.
    pub advisor_decay_relief: f64,
    /// Fraction of decay added for entities without one.
    pub unadvised_decay_penalty: f64,
    /// Propensity at or above which an entity counts as highly compliant.
    pub high_compliance_threshold: f64,
    /// Comm-sensitivity growth factor applied on high-urgency weeks.
    pub urgency_sensitivity_growth: f64,
    pub max_comm_sensitivity: f64,
    /// Scale broadcast and warning effects by the entity's comm sensitivity.
    /// Off by default: sensitivity is tracked but does not feed the update.
    pub apply_comm_sensitivity: bool,
    pub peer: PeerConfig,
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.0005,
            advisor_decay_relief: 0.05,
            unadvised_decay_penalty: 0.05,
            high_compliance_threshold: 0.8,
            urgency_sensitivity_growth: 1.05,
            max_comm_sensitivity: 2.0,
            apply_comm_sensitivity: false,
            peer: PeerConfig::default(),
        }
    }
}

// ── Calibration ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Liability-weighted gross tax gap the baseline should reproduce.
    pub tax_gap_target_rate: f64,
    /// Unweighted non-compliance incidence, used by `align_incidence`.
    pub noncompliance_target_rate: f64,
    /// Derive the underpayment intensity from the baseline population.
    pub calibrate_baseline: bool,
    /// Shift initial propensities so mean(1 - p) hits the incidence target.
    pub align_incidence: bool,
    /// Fixed underpayment intensity. Overrides calibration when set.
    pub underpayment_intensity: Option<f64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            tax_gap_target_rate: 0.05,
            noncompliance_target_rate: 0.30,
            calibrate_baseline: true,
            align_incidence: false,
            underpayment_intensity: None,
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub population: PopulationConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub calendar: TaxCalendar,
    pub communication: CommunicationConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub behaviour: BehaviourConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl SimConfig {
    /// Load a JSON scenario file and validate it.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config = Self::from_json_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot load {path}: {e}"))?;
        Ok(config)
    }

    /// Parse and validate a JSON scenario.
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn sector_names(&self) -> Vec<String> {
        self.population.sectors.iter().map(|s| s.name.clone()).collect()
    }

    /// Reject configurations the engine cannot run. Called by the engine
    /// before anything is built.
    pub fn validate(&self) -> SimResult<()> {
        let pop = &self.population;
        if pop.size == 0 {
            return Err(SimError::config("population.size must be positive"));
        }
        check_shares("population.size_shares", pop.size_shares.values())?;
        check_shares("population.age_shares", pop.age_shares.values())?;
        if !pop.sectors.is_empty() {
            check_shares("population.sectors", pop.sectors.iter().map(|s| &s.share))?;
            let mut seen = BTreeSet::new();
            for sector in &pop.sectors {
                if sector.name.is_empty() || !seen.insert(sector.name.as_str()) {
                    return Err(SimError::config(format!(
                        "sector names must be unique and non-empty, got '{}'",
                        sector.name
                    )));
                }
            }
        }
        check_unit("population.compliance_target", pop.compliance_target)?;
        if !(pop.concentration > 0.0 && pop.concentration.is_finite()) {
            return Err(SimError::config(format!(
                "population.concentration must be positive, got {}",
                pop.concentration
            )));
        }
        check_finite("population.size_weight", pop.size_weight)?;
        check_finite("population.age_weight", pop.age_weight)?;
        for (size, p) in &pop.advisor_probability {
            check_unit(&format!("population.advisor_probability.{}", size.as_str()), *p)?;
        }
        check_non_negative("population.advisor_shift", pop.advisor_shift)?;
        for (size, share) in &pop.size_shares {
            if *share <= 0.0 {
                continue;
            }
            let band = pop.turnover_bands.get(size).ok_or_else(|| {
                SimError::config(format!(
                    "population.turnover_bands has no band for size '{}'",
                    size.as_str()
                ))
            })?;
            if !(band.min >= 0.0 && band.min <= band.max && band.max.is_finite()) {
                return Err(SimError::config(format!(
                    "turnover band for '{}' must satisfy 0 <= min <= max, got {:?}",
                    size.as_str(),
                    band
                )));
            }
        }
        check_unit("population.statutory_tax_rate", pop.statutory_tax_rate)?;
        check_non_negative("population.tax_rate_jitter", pop.tax_rate_jitter)?;

        check_non_negative("network.mean_degree", self.network.mean_degree)?;

        let cal = &self.calendar;
        if cal.weeks_per_year == 0 {
            return Err(SimError::config("calendar.weeks_per_year must be positive"));
        }
        for (name, week) in [
            ("calendar.deadline_week", cal.deadline_week),
            ("calendar.deadline_week + audit_delay_weeks", cal.audit_campaign_week()),
            ("calendar.warning_visit_week", cal.warning_visit_week),
        ] {
            if week >= cal.weeks_per_year {
                return Err(SimError::config(format!(
                    "{name} = {week} falls outside a {}-week year",
                    cal.weeks_per_year
                )));
            }
        }

        let comm = &self.communication;
        for (channel, effect) in &comm.channel_effects {
            check_finite(&format!("communication.channel_effects.{channel}"), *effect)?;
        }
        for (channel, cost) in &comm.channel_costs {
            check_non_negative(&format!("communication.channel_costs.{channel}"), *cost)?;
        }
        let scheduled = comm.schedule.values().flatten();
        for channel in scheduled.chain(std::iter::once(&comm.warning_channel)) {
            if !comm.channel_effects.contains_key(channel) {
                return Err(SimError::config(format!(
                    "channel '{channel}' has no entry in communication.channel_effects"
                )));
            }
            if !comm.channel_costs.contains_key(channel) {
                return Err(SimError::config(format!(
                    "channel '{channel}' has no entry in communication.channel_costs"
                )));
            }
        }
        check_non_negative("communication.urgency_multiplier", comm.urgency_multiplier)?;

        let audit = &self.audit;
        if audit.tiers.is_empty() {
            return Err(SimError::config("audit.tiers must name at least one tier"));
        }
        for tier in &audit.tiers {
            check_finite(&format!("audit.tiers.{}.effect", tier.name), tier.effect)?;
            check_non_negative(&format!("audit.tiers.{}.cost", tier.name), tier.cost)?;
        }
        for (key, rate) in &audit.rates {
            check_non_negative(&format!("audit.rates.{key}"), *rate)?;
        }

        let beh = &self.behaviour;
        check_non_negative("behaviour.decay_factor", beh.decay_factor)?;
        check_unit("behaviour.advisor_decay_relief", beh.advisor_decay_relief)?;
        check_non_negative("behaviour.unadvised_decay_penalty", beh.unadvised_decay_penalty)?;
        check_unit("behaviour.high_compliance_threshold", beh.high_compliance_threshold)?;
        if !(beh.urgency_sensitivity_growth >= 1.0 && beh.max_comm_sensitivity >= 1.0) {
            return Err(SimError::config(
                "behaviour.urgency_sensitivity_growth and max_comm_sensitivity must be >= 1",
            ));
        }
        let peer = &beh.peer;
        if peer.fade_window_start == 0 || peer.fade_window_start > peer.fade_window_end {
            return Err(SimError::config(format!(
                "behaviour.peer fade window [{}, {}] is empty or starts at 0",
                peer.fade_window_start, peer.fade_window_end
            )));
        }
        check_unit("behaviour.peer.deadline_chatter_probability", peer.deadline_chatter_probability)?;
        check_unit("behaviour.peer.idle_chatter_probability", peer.idle_chatter_probability)?;
        check_finite("behaviour.peer.audit_shock", peer.audit_shock)?;
        check_finite("behaviour.peer.crater_bonus", peer.crater_bonus)?;
        check_finite("behaviour.peer.fade_scale", peer.fade_scale)?;
        check_finite("behaviour.peer.deadline_chatter_effect", peer.deadline_chatter_effect)?;
        check_non_negative("behaviour.peer.idle_chatter_max", peer.idle_chatter_max)?;

        let calib = &self.calibration;
        check_unit("calibration.tax_gap_target_rate", calib.tax_gap_target_rate)?;
        check_unit("calibration.noncompliance_target_rate", calib.noncompliance_target_rate)?;
        if let Some(u) = calib.underpayment_intensity {
            check_unit("calibration.underpayment_intensity", u)?;
        }
        Ok(())
    }

    /// Dutch SME baseline scenario.
    pub fn baseline() -> Self {
        let size_shares = [
            (SizeCategory::Micro, 0.9683),
            (SizeCategory::Small, 0.0248),
            (SizeCategory::Medium, 0.0053),
        ]
        .into();
        let age_shares = [
            (AgeCategory::Young, 0.57),
            (AgeCategory::Mature, 0.04),
            (AgeCategory::Old, 0.39),
        ]
        .into();

        Self {
            population: PopulationConfig {
                size: 10_000,
                size_shares,
                age_shares,
                sectors: Vec::new(),
                compliance_target: 0.693,
                size_weight: 0.05,
                age_weight: 0.05,
                concentration: 339.0,
                advisor_probability: [
                    (SizeCategory::Micro, 0.743),
                    (SizeCategory::Small, 0.98),
                    (SizeCategory::Medium, 1.0),
                ]
                .into(),
                advisor_shift: 0.02,
                turnover_bands: [
                    (SizeCategory::Micro, TurnoverBand { min: 80_000.0, max: 400_000.0 }),
                    (SizeCategory::Small, TurnoverBand { min: 400_000.0, max: 2_500_000.0 }),
                    (SizeCategory::Medium, TurnoverBand { min: 2_500_000.0, max: 20_000_000.0 }),
                ]
                .into(),
                statutory_tax_rate: 0.30,
                tax_rate_jitter: 0.0001,
            },
            network: NetworkConfig::default(),
            calendar: TaxCalendar::default(),
            communication: CommunicationConfig {
                channel_effects: [
                    ("physical_letter".into(), 0.003),
                    ("email".into(), 0.008),
                    ("warning_letter".into(), 0.020),
                ]
                .into(),
                channel_costs: [
                    ("physical_letter".into(), 0.65),
                    ("email".into(), 0.39),
                    ("warning_letter".into(), 196.84),
                ]
                .into(),
                schedule: [
                    (8, vec!["physical_letter".into(), "email".into()]),
                    (6, vec!["email".into()]),
                    (2, vec!["physical_letter".into()]),
                    (1, vec!["email".into()]),
                ]
                .into(),
                warning_channel: "warning_letter".into(),
                urgency_multiplier: 2.0,
            },
            audit: AuditConfig {
                rates: GroupKey::all().map(|k| (k, 0.02)).collect(),
                tiers: vec![
                    AuditTier { name: "Light".into(),    effect: 0.90, cost: 2340.0 },
                    AuditTier { name: "Standard".into(), effect: 0.90, cost: 2340.0 },
                    AuditTier { name: "Deep".into(),     effect: 1.80, cost: 4680.0 },
                ],
                cooldown_ticks: 156,
            },
            behaviour: BehaviourConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }

    /// Small population with two sectors, for unit and integration tests.
    pub fn default_test() -> Self {
        let mut config = Self::baseline();
        config.population.size = 600;
        config.population.size_shares = [
            (SizeCategory::Micro, 0.70),
            (SizeCategory::Small, 0.20),
            (SizeCategory::Medium, 0.10),
        ]
        .into();
        config.population.age_shares = [
            (AgeCategory::Young, 0.40),
            (AgeCategory::Mature, 0.30),
            (AgeCategory::Old, 0.30),
        ]
        .into();
        config.population.sectors = vec![
            SectorShare { name: "Retail".into(),       share: 0.6 },
            SectorShare { name: "Construction".into(), share: 0.4 },
        ];
        config.population.concentration = 50.0;
        config.audit.rates = GroupKey::all().map(|k| (k, 0.10)).collect();
        config
    }
}

fn check_shares<'a>(name: &str, shares: impl Iterator<Item = &'a f64>) -> SimResult<()> {
    let mut total = 0.0;
    for share in shares {
        if !(share.is_finite() && *share >= 0.0) {
            return Err(SimError::config(format!(
                "{name} contains an invalid share {share}"
            )));
        }
        total += share;
    }
    if total <= 0.0 {
        return Err(SimError::config(format!("{name} must sum to a positive value")));
    }
    Ok(())
}

fn check_unit(name: &str, value: f64) -> SimResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::config(format!("{name} must lie in [0, 1], got {value}")))
    }
}

fn check_non_negative(name: &str, value: f64) -> SimResult<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SimError::config(format!("{name} must be a non-negative number, got {value}")))
    }
}

fn check_finite(name: &str, value: f64) -> SimResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimError::config(format!("{name} must be finite, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_and_test_configs_validate() {
        SimConfig::baseline().validate().unwrap();
        SimConfig::default_test().validate().unwrap();
    }

    #[test]
    fn config_survives_a_json_round_trip() {
        let json = serde_json::to_string(&SimConfig::default_test()).unwrap();
        let parsed = SimConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.population.size, 600);
        assert_eq!(parsed.audit.rate_for(GroupKey::new(SizeCategory::Small, AgeCategory::Old)), 0.10);
        assert_eq!(parsed.communication.schedule[&1], vec!["email".to_string()]);
    }

    #[test]
    fn tier_positions_follow_declaration_order() {
        let audit = SimConfig::baseline().audit;
        assert_eq!(audit.tiers[audit.lightest_tier()].name, "Light");
        assert_eq!(audit.tiers[audit.middle_tier()].name, "Standard");
        assert_eq!(audit.tiers[audit.deepest_tier()].name, "Deep");
    }
}
