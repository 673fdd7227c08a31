//! Per-tick measurements, tax-gap breakdowns and the end-of-run report.

use crate::{
    calibration::{noncompliance_ratio, TaxGapLink},
    config::SimConfig,
    entity::ComplianceEntity,
    population::Population,
    subsystem::TickInputs,
    types::{AgeCategory, EntityId, GroupKey, RunId, SizeCategory, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sector label for entities without one.
pub const UNKNOWN_SECTOR: &str = "Unknown";

// ── Tax gap ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GapEntry {
    /// Full liability.
    pub potential: f64,
    /// Liability minus expected unpaid.
    pub collected: f64,
    pub gap:       f64,
    /// Gap as a percentage of potential. 0 when potential is 0.
    pub gap_pct:   f64,
}

impl GapEntry {
    fn add(&mut self, potential: f64, collected: f64) {
        self.potential += potential;
        self.collected += collected;
    }

    fn finalize(mut self) -> Self {
        self.gap = self.potential - self.collected;
        self.gap_pct = if self.potential > 0.0 { self.gap / self.potential * 100.0 } else { 0.0 };
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaxGapBreakdown {
    pub total:     GapEntry,
    pub by_size:   BTreeMap<SizeCategory, GapEntry>,
    pub by_group:  BTreeMap<GroupKey, GapEntry>,
    pub by_sector: BTreeMap<String, GapEntry>,
}

impl TaxGapBreakdown {
    pub fn compute(population: &Population, link: &TaxGapLink) -> Self {
        let mut out = Self::default();
        for e in population.entities() {
            let potential = e.liability();
            let collected = link.expected_paid(e);
            out.total.add(potential, collected);
            out.by_size.entry(e.size).or_default().add(potential, collected);
            out.by_group.entry(e.group()).or_default().add(potential, collected);
            out.by_sector
                .entry(sector_label(population, e).to_string())
                .or_default()
                .add(potential, collected);
        }
        out.total = out.total.finalize();
        for entry in out
            .by_size
            .values_mut()
            .chain(out.by_group.values_mut())
            .chain(out.by_sector.values_mut())
        {
            *entry = entry.finalize();
        }
        out
    }
}

fn sector_label<'a>(population: &'a Population, e: &ComplianceEntity) -> &'a str {
    e.sector
        .and_then(|s| population.sector_name(s))
        .unwrap_or(UNKNOWN_SECTOR)
}

// ── Step metrics ────────────────────────────────────────────────────

/// Mean propensity with and without an advisor. 0 for an empty side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AdvisorSplit {
    pub with_advisor:    f64,
    pub without_advisor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepMetrics {
    /// Completed steps. The pre-run baseline is step 0.
    pub step:                     Tick,
    pub overall_mean:             f64,
    pub mean_by_group:            BTreeMap<GroupKey, f64>,
    pub mean_by_group_advisor:    BTreeMap<GroupKey, AdvisorSplit>,
    pub mean_by_sector:           BTreeMap<String, f64>,
    pub audited_fraction:         f64,
    pub high_compliance_fraction: f64,
    pub noncompliance_ratio:      f64,
    pub tax_gap_rate:             f64,
    pub underpayment_intensity:   f64,
    pub communication_intensity:  f64,
    /// Cumulative spend up to and including this step.
    pub total_cost:               f64,
    pub tax_gap:                  TaxGapBreakdown,
}

impl StepMetrics {
    pub fn collect(
        step: Tick,
        population: &Population,
        link: &TaxGapLink,
        inputs: &TickInputs,
        total_cost: f64,
        high_compliance_threshold: f64,
    ) -> Self {
        let entities = population.entities();
        let n = entities.len();

        let mut advisor_sums: BTreeMap<GroupKey, [(f64, usize); 2]> = BTreeMap::new();
        let mut sector_sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut high = 0usize;
        for e in entities {
            let p = e.propensity();
            let side = &mut advisor_sums.entry(e.group()).or_default()[usize::from(e.has_advisor)];
            side.0 += p;
            side.1 += 1;
            let sector = sector_sums.entry(sector_label(population, e).to_string()).or_default();
            sector.0 += p;
            sector.1 += 1;
            if p >= high_compliance_threshold {
                high += 1;
            }
        }

        let mean_by_group_advisor = advisor_sums
            .into_iter()
            .map(|(key, [without, with])| {
                (key, AdvisorSplit {
                    with_advisor:    ratio(with.0, with.1),
                    without_advisor: ratio(without.0, without.1),
                })
            })
            .collect();
        let mean_by_sector = sector_sums
            .into_iter()
            .map(|(name, (sum, count))| (name, ratio(sum, count)))
            .collect();

        Self {
            step,
            overall_mean: population.mean_propensity(),
            mean_by_group: population.group_means(),
            mean_by_group_advisor,
            mean_by_sector,
            audited_fraction: inputs.audited_fraction,
            high_compliance_fraction: ratio(high as f64, n),
            noncompliance_ratio: noncompliance_ratio(entities),
            tax_gap_rate: link.tax_gap_rate(entities),
            underpayment_intensity: link.underpayment_intensity,
            communication_intensity: inputs.global_comm,
            total_cost,
            tax_gap: TaxGapBreakdown::compute(population, link),
        }
    }

    pub fn group_mean(&self, key: GroupKey) -> f64 {
        self.mean_by_group.get(&key).copied().unwrap_or(0.0)
    }
}

fn ratio(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

// ── Run summary ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// Initial gap minus final gap, in currency units.
    pub tax_gap_reduction: f64,
    pub total_cost:        f64,
    pub net_benefit:       f64,
    /// Reduction per unit spent. 0 when nothing was spent.
    pub roi_ratio:         f64,
}

impl RunSummary {
    pub fn from_gaps(initial_gap: f64, final_gap: f64, total_cost: f64) -> Self {
        let reduction = initial_gap - final_gap;
        Self {
            tax_gap_reduction: reduction,
            total_cost,
            net_benefit: reduction - total_cost,
            roi_ratio: if total_cost > 0.0 { reduction / total_cost } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityChange {
    pub id:          EntityId,
    pub size:        SizeCategory,
    pub age:         AgeCategory,
    pub sector:      String,
    pub has_advisor: bool,
    pub start:       f64,
    pub end:         f64,
    pub change:      f64,
}

impl EntityChange {
    pub fn collect(population: &Population) -> Vec<Self> {
        population
            .entities()
            .iter()
            .map(|e| Self {
                id:          e.id,
                size:        e.size,
                age:         e.age,
                sector:      sector_label(population, e).to_string(),
                has_advisor: e.has_advisor,
                start:       e.initial_propensity,
                end:         e.propensity(),
                change:      e.propensity() - e.initial_propensity,
            })
            .collect()
    }
}

/// Everything a caller needs to chart or archive a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id:         RunId,
    pub seed:           u64,
    pub config:         SimConfig,
    pub initial:        StepMetrics,
    pub steps:          Vec<StepMetrics>,
    #[serde(rename = "final")]
    pub final_metrics:  StepMetrics,
    pub summary:        RunSummary,
    pub entity_changes: Vec<EntityChange>,
}
