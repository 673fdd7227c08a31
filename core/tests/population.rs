//! Population synthesis through the public engine API.

use taxgap_core::{
    config::SimConfig,
    engine::SimEngine,
    types::SizeCategory,
};

fn with_flat_target(target: f64) -> SimConfig {
    let mut config = SimConfig::default_test();
    config.population.compliance_target = target;
    config.population.size_weight = 0.0;
    config.population.age_weight = 0.0;
    config
}

#[test]
fn initial_population_generates_correct_count() {
    let engine = SimEngine::build_test("pop-count-test".into(), 42).unwrap();
    assert_eq!(engine.population().len(), 600, "Expected 600 test entities");
    assert_eq!(engine.network().node_count(), 600, "One network node per entity");
}

#[test]
fn group_mean_of_one_fixes_every_propensity_at_one() {
    let engine = SimEngine::build("mu-one".into(), 3, with_flat_target(1.0)).unwrap();
    for e in engine.population().entities() {
        assert_eq!(e.propensity(), 1.0, "entity {} drew {}", e.id, e.propensity());
    }
    assert_eq!(engine.calibration().underpayment_intensity, 0.0,
        "Full compliance leaves nothing to calibrate against");
}

#[test]
fn group_mean_of_zero_fixes_every_propensity_at_zero() {
    let engine = SimEngine::build("mu-zero".into(), 3, with_flat_target(0.0)).unwrap();
    for e in engine.population().entities() {
        assert_eq!(e.propensity(), 0.0, "entity {} drew {}", e.id, e.propensity());
    }
}

#[test]
fn initial_propensities_stay_in_bounds_and_near_target() {
    let engine = SimEngine::build_test("pop-bounds".into(), 11).unwrap();
    let pop = engine.population();
    for e in pop.entities() {
        assert!((0.0..=1.0).contains(&e.propensity()));
        assert_eq!(e.propensity(), e.initial_propensity);
        assert!(e.last_audit().is_none());
    }
    let mean = pop.mean_propensity();
    assert!((mean - 0.693).abs() < 0.05, "Mean propensity {mean:.4} far from target");
}

#[test]
fn medium_firms_always_have_an_advisor() {
    let engine = SimEngine::build_test("pop-advisor".into(), 5).unwrap();
    let mediums: Vec<_> = engine
        .population()
        .entities()
        .iter()
        .filter(|e| e.size == SizeCategory::Medium)
        .collect();
    assert!(!mediums.is_empty(), "Expected some Medium firms at a 10% share");
    assert!(mediums.iter().all(|e| e.has_advisor));
}

#[test]
fn every_entity_carries_a_configured_sector() {
    let engine = SimEngine::build_test("pop-sector".into(), 9).unwrap();
    let pop = engine.population();
    for e in pop.entities() {
        let name = e.sector.and_then(|s| pop.sector_name(s));
        assert!(matches!(name, Some("Retail") | Some("Construction")), "got {name:?}");
    }
    let sectors = engine.metrics().mean_by_sector;
    assert_eq!(sectors.len(), 2);
}
