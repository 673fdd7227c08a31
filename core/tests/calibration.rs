//! Tax-gap calibration at construction.

use taxgap_core::{
    calibration::IntensitySource,
    config::SimConfig,
    engine::SimEngine,
    event::SimEvent,
};

#[test]
fn baseline_gap_rate_matches_target() {
    let engine = SimEngine::build_test("calib-target".into(), 42).unwrap();
    let link = engine.calibration();
    assert_eq!(link.source, IntensitySource::Calibrated);
    assert!(!link.saturated, "Test population should not saturate");

    let rate = engine.tax_gap_rate();
    assert!((rate - 0.05).abs() < 1e-6, "Calibrated gap rate {rate} != 0.05");
    assert!((engine.metrics().tax_gap_rate - 0.05).abs() < 1e-6);
}

#[test]
fn breakdown_agrees_with_gap_rate() {
    let engine = SimEngine::build_test("calib-breakdown".into(), 8).unwrap();
    let metrics = engine.metrics();
    let total = &metrics.tax_gap.total;
    assert!((total.gap_pct / 100.0 - metrics.tax_gap_rate).abs() < 1e-9);

    let by_size: f64 = metrics.tax_gap.by_size.values().map(|g| g.gap).sum();
    let by_group: f64 = metrics.tax_gap.by_group.values().map(|g| g.gap).sum();
    let by_sector: f64 = metrics.tax_gap.by_sector.values().map(|g| g.gap).sum();
    for part in [by_size, by_group, by_sector] {
        assert!((part - total.gap).abs() < 1e-6 * total.potential);
    }
}

#[test]
fn fixed_intensity_overrides_calibration() {
    let mut config = SimConfig::default_test();
    config.calibration.underpayment_intensity = Some(0.4);
    let engine = SimEngine::build("calib-fixed".into(), 42, config).unwrap();
    assert_eq!(engine.calibration().source, IntensitySource::Fixed);
    assert_eq!(engine.calibration().underpayment_intensity, 0.4);
}

#[test]
fn disabled_calibration_counts_nothing_unpaid() {
    let mut config = SimConfig::default_test();
    config.calibration.calibrate_baseline = false;
    let engine = SimEngine::build("calib-off".into(), 42, config).unwrap();
    assert_eq!(engine.calibration().underpayment_intensity, 0.0);
    assert_eq!(engine.tax_gap_rate(), 0.0);
}

#[test]
fn saturation_is_clamped_and_reported() {
    let mut config = SimConfig::default_test();
    config.calibration.tax_gap_target_rate = 0.9;
    let engine = SimEngine::build_test_with("calib-saturated".into(), 42, config).unwrap();

    let link = engine.calibration();
    assert!(link.saturated);
    assert_eq!(link.underpayment_intensity, 1.0);
    assert!(engine
        .last_events()
        .iter()
        .any(|e| matches!(e, SimEvent::CalibrationSaturated { .. })));

    let stored = engine
        .store()
        .unwrap()
        .count_events("calib-saturated", "calibration_saturated")
        .unwrap();
    assert_eq!(stored, 1);
}

#[test]
fn incidence_alignment_hits_the_noncompliance_target() {
    let mut config = SimConfig::default_test();
    config.calibration.align_incidence = true;
    config.calibration.noncompliance_target_rate = 0.25;
    let engine = SimEngine::build("calib-align".into(), 42, config).unwrap();

    let ratio = engine.metrics().noncompliance_ratio;
    assert!((ratio - 0.25).abs() < 1e-6, "Non-compliance ratio {ratio}");
    assert!((engine.tax_gap_rate() - 0.05).abs() < 1e-6);
}
