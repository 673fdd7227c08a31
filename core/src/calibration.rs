//! Link between compliance propensity and money owed.
//!
//! The incidence proxy for an entity is `1 - propensity`. The expected
//! unpaid amount is `liability * (1 - p) * u`, where the underpayment
//! intensity `u` is fixed once per run.

use crate::{
    config::CalibrationConfig,
    entity::ComplianceEntity,
    population::Population,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntensitySource {
    /// Derived so the baseline reproduces the target gap rate.
    Calibrated,
    /// Taken from `calibration.underpayment_intensity`.
    Fixed,
    /// Calibration switched off: nothing is counted as unpaid.
    Disabled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TaxGapLink {
    pub underpayment_intensity: f64,
    /// Liability-weighted non-compliance at calibration time.
    pub weighted_noncompliance: f64,
    /// Intensity before clamping to [0, 1].
    pub raw_intensity:          f64,
    pub saturated:              bool,
    pub source:                 IntensitySource,
}

impl TaxGapLink {
    pub fn calibrate(population: &Population, cfg: &CalibrationConfig) -> Self {
        let weighted = weighted_noncompliance(population.entities());

        if let Some(u) = cfg.underpayment_intensity {
            return Self {
                underpayment_intensity: u,
                weighted_noncompliance: weighted,
                raw_intensity: u,
                saturated: false,
                source: IntensitySource::Fixed,
            };
        }
        if !cfg.calibrate_baseline {
            return Self {
                underpayment_intensity: 0.0,
                weighted_noncompliance: weighted,
                raw_intensity: 0.0,
                saturated: false,
                source: IntensitySource::Disabled,
            };
        }

        let raw = if weighted > 0.0 { cfg.tax_gap_target_rate / weighted } else { 0.0 };
        let saturated = raw > 1.0;
        if saturated {
            log::warn!(
                "calibration: target gap {:.4} needs intensity {:.4} at weighted \
                 non-compliance {:.4}; clamping to 1.0",
                cfg.tax_gap_target_rate,
                raw,
                weighted,
            );
        }
        let link = Self {
            underpayment_intensity: raw.clamp(0.0, 1.0),
            weighted_noncompliance: weighted,
            raw_intensity: raw,
            saturated,
            source: IntensitySource::Calibrated,
        };
        log::info!(
            "calibration: weighted non-compliance {:.4}, underpayment intensity {:.6}",
            weighted,
            link.underpayment_intensity
        );
        link
    }

    pub fn expected_unpaid(&self, entity: &ComplianceEntity) -> f64 {
        entity.liability() * (1.0 - entity.propensity()) * self.underpayment_intensity
    }

    pub fn expected_paid(&self, entity: &ComplianceEntity) -> f64 {
        entity.liability() - self.expected_unpaid(entity)
    }

    pub fn tax_gap_rate(&self, entities: &[ComplianceEntity]) -> f64 {
        tax_gap_rate(entities, self.underpayment_intensity)
    }
}

/// Σ(L·(1−p)) / ΣL, or 0 when there is no liability.
pub fn weighted_noncompliance(entities: &[ComplianceEntity]) -> f64 {
    let (owed, weighted) = entities.iter().fold((0.0, 0.0), |(owed, weighted), e| {
        let l = e.liability();
        (owed + l, weighted + l * (1.0 - e.propensity()))
    });
    if owed > 0.0 { weighted / owed } else { 0.0 }
}

/// Unweighted mean of (1 − p).
pub fn noncompliance_ratio(entities: &[ComplianceEntity]) -> f64 {
    if entities.is_empty() {
        return 0.0;
    }
    entities.iter().map(|e| 1.0 - e.propensity()).sum::<f64>() / entities.len() as f64
}

pub fn tax_gap_rate(entities: &[ComplianceEntity], intensity: f64) -> f64 {
    weighted_noncompliance(entities) * intensity
}

/// Shift every propensity by the same amount (clipped) so the unweighted
/// non-compliance ratio lands on `target`. Returns the shift applied.
///
/// Clipping can leave the ratio slightly off target when many entities sit
/// near a bound; the shift is refined a few times to absorb that.
pub fn align_incidence(population: &mut Population, target: f64) -> f64 {
    let baseline: Vec<f64> = population.entities().iter().map(|e| e.propensity()).collect();
    let mut shift = 0.0;
    for _ in 0..8 {
        let ratio = noncompliance_ratio(population.entities());
        let error = ratio - target;
        if error.abs() < 1e-9 {
            break;
        }
        shift += error;
        for (e, p0) in population.entities_mut().iter_mut().zip(&baseline) {
            e.rebase_propensity(p0 + shift);
        }
    }
    log::info!(
        "calibration: shifted propensities by {:+.4}, non-compliance ratio {:.4}",
        shift,
        noncompliance_ratio(population.entities())
    );
    shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgeCategory, SizeCategory};

    fn entity(id: usize, turnover: f64, propensity: f64) -> ComplianceEntity {
        ComplianceEntity::new(
            id,
            SizeCategory::Small,
            AgeCategory::Old,
            None,
            turnover,
            0.3,
            true,
            propensity,
        )
    }

    fn population(rows: &[(f64, f64)]) -> Population {
        let entities = rows
            .iter()
            .enumerate()
            .map(|(i, (t, p))| entity(i, *t, *p))
            .collect();
        Population::from_entities(entities, Vec::new())
    }

    #[test]
    fn calibrated_intensity_hits_the_target() {
        let pop = population(&[(100_000.0, 0.7), (1_000_000.0, 0.5), (300_000.0, 0.9)]);
        let cfg = CalibrationConfig::default();
        let link = TaxGapLink::calibrate(&pop, &cfg);
        assert_eq!(link.source, IntensitySource::Calibrated);
        assert!((link.tax_gap_rate(pop.entities()) - cfg.tax_gap_target_rate).abs() < 1e-12);
    }

    #[test]
    fn full_compliance_means_zero_intensity() {
        let pop = population(&[(100_000.0, 1.0), (200_000.0, 1.0)]);
        let link = TaxGapLink::calibrate(&pop, &CalibrationConfig::default());
        assert_eq!(link.underpayment_intensity, 0.0);
        assert!(!link.saturated);
    }

    #[test]
    fn saturation_is_clamped_not_an_error() {
        let pop = population(&[(100_000.0, 0.99)]);
        let cfg = CalibrationConfig { tax_gap_target_rate: 0.5, ..CalibrationConfig::default() };
        let link = TaxGapLink::calibrate(&pop, &cfg);
        assert!(link.saturated);
        assert_eq!(link.underpayment_intensity, 1.0);
        assert!(link.raw_intensity > 1.0);
    }

    #[test]
    fn fixed_and_disabled_sources() {
        let pop = population(&[(100_000.0, 0.5)]);
        let fixed = CalibrationConfig {
            underpayment_intensity: Some(0.25),
            ..CalibrationConfig::default()
        };
        assert_eq!(TaxGapLink::calibrate(&pop, &fixed).underpayment_intensity, 0.25);

        let off = CalibrationConfig { calibrate_baseline: false, ..CalibrationConfig::default() };
        let link = TaxGapLink::calibrate(&pop, &off);
        assert_eq!(link.source, IntensitySource::Disabled);
        assert_eq!(link.expected_unpaid(&pop.entities()[0]), 0.0);
    }

    #[test]
    fn incidence_alignment_moves_the_ratio() {
        let mut pop = population(&[(1.0, 0.5), (1.0, 0.6), (1.0, 0.7)]);
        align_incidence(&mut pop, 0.30);
        assert!((noncompliance_ratio(pop.entities()) - 0.30).abs() < 1e-9);
    }
}
