//! Synthetic SME population and group statistics over it.

use crate::{
    config::PopulationConfig,
    entity::{clip01, ComplianceEntity},
    error::{SimError, SimResult},
    rng::StageRng,
    types::{AgeCategory, EntityId, GroupKey, SectorId, SizeCategory},
};
use std::collections::BTreeMap;

// ── Mu-table ────────────────────────────────────────────────────────

/// Mean initial propensity per (size, age) group.
#[derive(Debug, Clone, PartialEq)]
pub struct MuTable {
    values: BTreeMap<GroupKey, f64>,
}

impl MuTable {
    /// Centre every group on the compliance target, shifted by how far its
    /// size and age scores sit from the population-weighted mean score.
    pub fn build(cfg: &PopulationConfig) -> Self {
        let size_weights = size_weights(cfg);
        let age_weights = age_weights(cfg);
        let mean_size = weighted_mean_score(&size_weights, |i| SizeCategory::ALL[i].score());
        let mean_age = weighted_mean_score(&age_weights, |i| AgeCategory::ALL[i].score());

        let values = GroupKey::all()
            .map(|key| {
                let mu = cfg.compliance_target
                    + cfg.size_weight * (key.size.score() - mean_size)
                    + cfg.age_weight * (key.age.score() - mean_age);
                (key, clip01(mu))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: GroupKey) -> f64 {
        self.values.get(&key).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &f64)> {
        self.values.iter()
    }
}

fn size_weights(cfg: &PopulationConfig) -> Vec<f64> {
    SizeCategory::ALL
        .iter()
        .map(|s| cfg.size_shares.get(s).copied().unwrap_or(0.0))
        .collect()
}

fn age_weights(cfg: &PopulationConfig) -> Vec<f64> {
    AgeCategory::ALL
        .iter()
        .map(|a| cfg.age_shares.get(a).copied().unwrap_or(0.0))
        .collect()
}

fn weighted_mean_score(weights: &[f64], score: impl Fn(usize) -> f64) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    weights.iter().enumerate().map(|(i, w)| w / total * score(i)).sum()
}

// ── Population ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Population {
    entities:     Vec<ComplianceEntity>,
    sector_names: Vec<String>,
    group_counts: BTreeMap<GroupKey, usize>,
}

impl Population {
    /// Wrap an existing entity list. Entity ids must equal their index.
    pub fn from_entities(entities: Vec<ComplianceEntity>, sector_names: Vec<String>) -> Self {
        let mut group_counts = BTreeMap::new();
        for e in &entities {
            *group_counts.entry(e.group()).or_insert(0) += 1;
        }
        Self { entities, sector_names, group_counts }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[ComplianceEntity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut [ComplianceEntity] {
        &mut self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&ComplianceEntity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut ComplianceEntity> {
        self.entities.get_mut(id)
    }

    pub fn sector_names(&self) -> &[String] {
        &self.sector_names
    }

    pub fn sector_name(&self, sector: SectorId) -> Option<&str> {
        self.sector_names.get(sector.0).map(String::as_str)
    }

    /// Members per group. Groups that drew nobody are absent.
    pub fn group_counts(&self) -> &BTreeMap<GroupKey, usize> {
        &self.group_counts
    }

    pub fn group_count(&self, key: GroupKey) -> usize {
        self.group_counts.get(&key).copied().unwrap_or(0)
    }

    /// Entity ids per populated group, in id order.
    pub fn members_by_group(&self) -> BTreeMap<GroupKey, Vec<EntityId>> {
        let mut members: BTreeMap<GroupKey, Vec<EntityId>> = BTreeMap::new();
        for e in &self.entities {
            members.entry(e.group()).or_default().push(e.id);
        }
        members
    }

    /// Current mean propensity per populated group.
    pub fn group_means(&self) -> BTreeMap<GroupKey, f64> {
        let mut sums: BTreeMap<GroupKey, f64> = BTreeMap::new();
        for e in &self.entities {
            *sums.entry(e.group()).or_insert(0.0) += e.propensity();
        }
        sums.into_iter()
            .map(|(key, sum)| (key, sum / self.group_count(key) as f64))
            .collect()
    }

    /// 0 for groups without members.
    pub fn group_mean(&self, key: GroupKey) -> f64 {
        let count = self.group_count(key);
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .entities
            .iter()
            .filter(|e| e.group() == key)
            .map(ComplianceEntity::propensity)
            .sum();
        sum / count as f64
    }

    pub fn mean_propensity(&self) -> f64 {
        if self.entities.is_empty() {
            return 0.0;
        }
        self.entities.iter().map(ComplianceEntity::propensity).sum::<f64>()
            / self.entities.len() as f64
    }
}

// ── Synthesis ───────────────────────────────────────────────────────

/// Draw a full population from the configured shares.
///
/// Per entity the draw order is size, age, advisor, propensity, turnover,
/// tax rate, sector. Changing it changes every seeded population.
pub fn synthesize(cfg: &PopulationConfig, rng: &mut StageRng) -> SimResult<Population> {
    let mu_table = MuTable::build(cfg);
    let size_weights = size_weights(cfg);
    let age_weights = age_weights(cfg);
    let sector_weights: Vec<f64> = cfg.sectors.iter().map(|s| s.share).collect();

    let mut entities = Vec::with_capacity(cfg.size);
    for id in 0..cfg.size {
        let size = rng
            .categorical(&size_weights)
            .map(|i| SizeCategory::ALL[i])
            .ok_or_else(|| SimError::config("size shares sum to zero"))?;
        let age = rng
            .categorical(&age_weights)
            .map(|i| AgeCategory::ALL[i])
            .ok_or_else(|| SimError::config("age shares sum to zero"))?;

        let advisor_p = cfg.advisor_probability.get(&size).copied().unwrap_or(0.0);
        let has_advisor = rng.chance(advisor_p);

        let mu = mu_table.get(GroupKey::new(size, age));
        let propensity = draw_propensity(mu, has_advisor, cfg, rng)?;

        let band = cfg.turnover_bands.get(&size).ok_or_else(|| {
            SimError::config(format!("no turnover band for size '{}'", size.as_str()))
        })?;
        let turnover = rng.uniform(band.min, band.max);
        let tax_rate = rng.uniform(
            cfg.statutory_tax_rate - cfg.tax_rate_jitter,
            cfg.statutory_tax_rate + cfg.tax_rate_jitter,
        );

        let sector = if sector_weights.is_empty() {
            None
        } else {
            rng.categorical(&sector_weights).map(SectorId)
        };

        entities.push(ComplianceEntity::new(
            id, size, age, sector, turnover, tax_rate, has_advisor, propensity,
        ));
    }

    let population = Population::from_entities(
        entities,
        cfg.sectors.iter().map(|s| s.name.clone()).collect(),
    );
    log::info!(
        "population: synthesized {} entities across {} groups, mean propensity {:.4}",
        population.len(),
        population.group_counts().len(),
        population.mean_propensity(),
    );
    Ok(population)
}

/// Group means at the bounds are fixed, not sampled. Otherwise the advisor
/// nudge is applied first and a nudged mean at a bound is fixed too.
fn draw_propensity(
    mu: f64,
    has_advisor: bool,
    cfg: &PopulationConfig,
    rng: &mut StageRng,
) -> SimResult<f64> {
    if mu <= 0.0 {
        return Ok(0.0);
    }
    if mu >= 1.0 {
        return Ok(1.0);
    }
    let shifted = if has_advisor {
        clip01(mu + cfg.advisor_shift)
    } else {
        clip01(mu - cfg.advisor_shift)
    };
    if shifted <= 0.0 || shifted >= 1.0 {
        return Ok(shifted);
    }
    let kappa = cfg.concentration;
    Ok(clip01(rng.beta(kappa * shifted, kappa * (1.0 - shifted))?))
}
